//! Append-only attempt logs and failure lists.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;

use crate::errors::WsrDataErr;

/// An append-only log of per-scan attempts.
///
/// Each line is `<UTC time> [ <source> ] : <message>`, where the source is usually the scan list
/// that drove the run.
#[derive(Debug)]
pub struct AttemptLog {
    path: PathBuf,
    source: String,
    file: File,
}

impl AttemptLog {
    /// Open, creating if needed, the log at `path`.
    pub fn open(path: &Path, source: &str) -> Result<Self, WsrDataErr> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(AttemptLog {
            path: path.to_path_buf(),
            source: source.to_owned(),
            file,
        })
    }

    /// Where this log is written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a successful step.
    pub fn info(&mut self, msg: &str) -> Result<(), WsrDataErr> {
        log::info!("{}", msg);
        self.write_line(msg)
    }

    /// Record a non-fatal oddity.
    pub fn warn(&mut self, msg: &str) -> Result<(), WsrDataErr> {
        log::warn!("{}", msg);
        self.write_line(msg)
    }

    /// Record a failure.
    pub fn error(&mut self, msg: &str) -> Result<(), WsrDataErr> {
        log::error!("{}", msg);
        self.write_line(msg)
    }

    fn write_line(&mut self, msg: &str) -> Result<(), WsrDataErr> {
        writeln!(
            self.file,
            "{} [ {} ] : {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            self.source,
            msg
        )?;
        Ok(())
    }
}

/// Append names to a newline delimited list file. Nothing is written for an empty list.
pub fn append_list(path: &Path, names: &[String]) -> Result<(), WsrDataErr> {
    if names.is_empty() {
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for name in names {
        writeln!(file, "{}", name)?;
    }

    Ok(())
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
