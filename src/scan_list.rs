//! Newline delimited scan list files.
//!
//! Each line holds a scan name, optionally followed by `;STATION`. Blank lines are ignored.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::errors::WsrDataErr;

/// Read the scan names from a list, dropping any `;STATION` suffix.
pub fn read_names(path: &Path) -> Result<Vec<String>, WsrDataErr> {
    let file = File::open(path)
        .map_err(|_| WsrDataErr::MissingInput(path.display().to_string()))?;

    let mut names = vec![];
    for line in BufReader::new(file).lines() {
        let line = line?;
        let name = line.split(';').next().unwrap_or("").trim();
        if !name.is_empty() {
            names.push(name.to_owned());
        }
    }

    Ok(names)
}

/// Write one line per item, creating parent directories as needed.
pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<(), WsrDataErr>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(writer, "{}", line.as_ref())?;
    }
    writer.flush()?;

    Ok(())
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
