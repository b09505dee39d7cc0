//! Reading and writing the JSON documents of a dataset.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::WsrDataErr;

/// Deserialize a JSON file. A missing file is reported as a missing input.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, WsrDataErr> {
    let file = File::open(path)
        .map_err(|_| WsrDataErr::MissingInput(path.display().to_string()))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Serialize to a JSON file, compact when `indent` is `None`.
pub fn write_json<T: Serialize>(
    path: &Path,
    value: &T,
    indent: Option<usize>,
) -> Result<(), WsrDataErr> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);

    match indent {
        Some(n) => {
            let spaces = vec![b' '; n];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&spaces);
            let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
            value.serialize(&mut ser)?;
        }
        None => serde_json::to_writer(&mut writer, value)?,
    }

    writer.flush()?;
    Ok(())
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
