//! A [`Renderer`] that shells out to an external rendering program.

use std::{
    fs::File,
    io::{BufWriter, Read},
    path::{Path, PathBuf},
    process::Command,
};

use flate2::read::GzDecoder;
use ndarray::Array4;
use tempfile::TempDir;

use super::{RenderConfig, Renderer};
use crate::errors::WsrDataErr;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Runs `<program> [args...] <volume> <config.json> <out.npy>` once per channel set.
///
/// The program is expected to write a 4 dimensional `f32` array to `<out.npy>` and exit with
/// status zero.
#[derive(Clone, Debug)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
}

/// A raw volume decompressed into a private temporary directory.
#[derive(Debug)]
pub struct DecodedVolume {
    _dir: TempDir,
    path: PathBuf,
}

impl DecodedVolume {
    /// Path to the uncompressed level II file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandRenderer {
    /// Create a renderer for `program`, passing `args` ahead of the per-call arguments.
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        CommandRenderer {
            program: program.into(),
            args,
        }
    }
}

fn is_level2(bytes: &[u8]) -> bool {
    bytes.starts_with(b"AR2V") || bytes.starts_with(b"ARCHIVE2")
}

impl Renderer for CommandRenderer {
    type Volume = DecodedVolume;

    fn load(&self, scan_file: &Path) -> Result<DecodedVolume, WsrDataErr> {
        let decode_err = |msg: String| WsrDataErr::Decode(format!("{}: {}", scan_file.display(), msg));

        let raw = std::fs::read(scan_file).map_err(|err| decode_err(err.to_string()))?;

        let bytes = if raw.starts_with(&GZIP_MAGIC) {
            let mut out = Vec::with_capacity(raw.len() * 4);
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(|err| decode_err(err.to_string()))?;
            out
        } else {
            raw
        };

        if !is_level2(&bytes) {
            return Err(decode_err("not a level II archive".to_owned()));
        }

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("volume.ar2v");
        std::fs::write(&path, &bytes)?;

        Ok(DecodedVolume { _dir: dir, path })
    }

    fn render(
        &self,
        volume: &DecodedVolume,
        config: &RenderConfig,
    ) -> Result<Array4<f32>, WsrDataErr> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.json");
        let out_path = dir.path().join("out.npy");

        serde_json::to_writer(BufWriter::new(File::create(&config_path)?), config)?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(volume.path())
            .arg(&config_path)
            .arg(&out_path)
            .status()
            .map_err(|err| {
                WsrDataErr::Render(format!("unable to run {}: {}", self.program.display(), err))
            })?;

        if !status.success() {
            return Err(WsrDataErr::Render(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }

        ndarray_npy::read_npy(&out_path).map_err(|err| WsrDataErr::Render(err.to_string()))
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use tempdir::TempDir;

    #[test]
    fn test_load_gzipped_volume() {
        let tmp = TempDir::new("wsrdata-test-command").unwrap();
        let path = tmp.path().join("KOKX20130721_093320_V06.gz");

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"AR2V0006.501").unwrap();
        std::fs::write(&path, enc.finish().unwrap()).unwrap();

        let renderer = CommandRenderer::new("render-scan", vec![]);
        let volume = renderer.load(&path).unwrap();
        assert_eq!(std::fs::read(volume.path()).unwrap(), b"AR2V0006.501");
    }

    #[test]
    fn test_load_rejects_garbage() {
        let tmp = TempDir::new("wsrdata-test-command").unwrap();
        let path = tmp.path().join("KTBW20031123_115217.gz");
        std::fs::write(&path, b"<html>not a scan</html>").unwrap();

        let renderer = CommandRenderer::new("render-scan", vec![]);
        match renderer.load(&path) {
            Err(WsrDataErr::Decode(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        match renderer.load(&tmp.path().join("missing.gz")) {
            Err(WsrDataErr::Decode(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_a_render_error() {
        let tmp = TempDir::new("wsrdata-test-command").unwrap();
        let path = tmp.path().join("KOKX20130721_093320_V06");
        std::fs::write(&path, b"ARCHIVE2.001").unwrap();

        let renderer = CommandRenderer::new(tmp.path().join("no-such-renderer"), vec![]);
        let volume = renderer.load(&path).unwrap();
        match renderer.render(&volume, &RenderConfig::standard()) {
            Err(WsrDataErr::Render(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
