//! Module for errors.
use std::{error::Error, fmt::Display};

/// Error from the dataset pipeline.
#[derive(Debug)]
pub enum WsrDataErr {
    // Inherited errors from std
    /// Error forwarded from std
    IO(::std::io::Error),

    // Other forwarded errors
    /// Error forwarded from serde_json
    Json(::serde_json::Error),
    /// Error forwarded from serde_yaml
    Yaml(::serde_yaml::Error),
    /// Error forwarded from the csv crate
    Csv(::csv::Error),
    /// Error forwarded from the http client
    Http(::reqwest::Error),
    /// Error forwarded from the xml parser
    Xml(::quick_xml::Error),
    /// Error reading an array from an npz or npy file
    ReadArray(String),
    /// Error writing an array to an npz file
    WriteArray(String),
    /// Error forwarded from chrono while parsing a time
    TimeParse(::chrono::ParseError),
    /// General error with any cause information erased and replaced by a string
    GeneralError(String),

    // My own errors from this crate
    /// A scan file name did not match the fixed width station/time pattern.
    MalformedKey(String),
    /// The remote store has no object for this key.
    NotFound(String),
    /// Any other failure while fetching from the remote store.
    TransientFetch(String),
    /// The raw scan file could not be read or decoded.
    Decode(String),
    /// Rendering one channel set failed.
    Render(String),
    /// An array version was reused with a different configuration.
    VersionConflict(String),
    /// A version directory exists on disk but is not in the registry.
    UnregisteredArrayVersion(String),
    /// The manifest or splits would be inconsistent.
    IntegrityViolation(String),
    /// A required input file or directory is missing.
    MissingInput(String),
    /// The configuration is not usable.
    InvalidConfig(String),
}

impl Display for WsrDataErr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        use crate::errors::WsrDataErr::*;

        match self {
            IO(err) => write!(f, "std lib io error: {}", err),

            Json(err) => write!(f, "json error: {}", err),
            Yaml(err) => write!(f, "yaml error: {}", err),
            Csv(err) => write!(f, "csv error: {}", err),
            Http(err) => write!(f, "http error: {}", err),
            Xml(err) => write!(f, "xml error: {}", err),
            ReadArray(msg) => write!(f, "error reading array: {}", msg),
            WriteArray(msg) => write!(f, "error writing array: {}", msg),
            TimeParse(err) => write!(f, "error parsing time: {}", err),
            GeneralError(msg) => write!(f, "general error forwarded: {}", msg),

            MalformedKey(name) => write!(f, "malformed scan key: {}", name),
            NotFound(key) => write!(f, "not found in remote store: {}", key),
            TransientFetch(msg) => write!(f, "fetch failed: {}", msg),
            Decode(msg) => write!(f, "unable to decode scan: {}", msg),
            Render(msg) => write!(f, "rendering failed: {}", msg),
            VersionConflict(ver) => write!(
                f,
                "array version {} already exists with a different configuration",
                ver
            ),
            UnregisteredArrayVersion(ver) => write!(
                f,
                "array version directory {} is not recorded in previous_versions.json",
                ver
            ),
            IntegrityViolation(msg) => write!(f, "integrity violation: {}", msg),
            MissingInput(path) => write!(f, "missing required input: {}", path),
            InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl Error for WsrDataErr {}

impl WsrDataErr {
    /// True if this is a failure that should be recorded as known absent rather than retried.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WsrDataErr::NotFound(_))
    }
}

impl From<::std::io::Error> for WsrDataErr {
    fn from(err: ::std::io::Error) -> WsrDataErr {
        WsrDataErr::IO(err)
    }
}

impl From<::serde_json::Error> for WsrDataErr {
    fn from(err: ::serde_json::Error) -> WsrDataErr {
        WsrDataErr::Json(err)
    }
}

impl From<::serde_yaml::Error> for WsrDataErr {
    fn from(err: ::serde_yaml::Error) -> WsrDataErr {
        WsrDataErr::Yaml(err)
    }
}

impl From<::csv::Error> for WsrDataErr {
    fn from(err: ::csv::Error) -> WsrDataErr {
        WsrDataErr::Csv(err)
    }
}

impl From<::reqwest::Error> for WsrDataErr {
    fn from(err: ::reqwest::Error) -> WsrDataErr {
        WsrDataErr::Http(err)
    }
}

impl From<::quick_xml::Error> for WsrDataErr {
    fn from(err: ::quick_xml::Error) -> WsrDataErr {
        WsrDataErr::Xml(err)
    }
}

impl From<::ndarray_npy::ReadNpzError> for WsrDataErr {
    fn from(err: ::ndarray_npy::ReadNpzError) -> WsrDataErr {
        WsrDataErr::ReadArray(err.to_string())
    }
}

impl From<::ndarray_npy::ReadNpyError> for WsrDataErr {
    fn from(err: ::ndarray_npy::ReadNpyError) -> WsrDataErr {
        WsrDataErr::ReadArray(err.to_string())
    }
}

impl From<::ndarray_npy::WriteNpzError> for WsrDataErr {
    fn from(err: ::ndarray_npy::WriteNpzError) -> WsrDataErr {
        WsrDataErr::WriteArray(err.to_string())
    }
}

impl From<::chrono::ParseError> for WsrDataErr {
    fn from(err: ::chrono::ParseError) -> WsrDataErr {
        WsrDataErr::TimeParse(err)
    }
}

impl From<Box<dyn Error>> for WsrDataErr {
    fn from(err: Box<dyn Error>) -> WsrDataErr {
        WsrDataErr::GeneralError(err.to_string())
    }
}
