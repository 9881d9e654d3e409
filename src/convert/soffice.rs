//! Headless office suite rasterizer.
//!
//! Runs `soffice --headless --convert-to pdf` inside a temporary directory
//! and moves the result to the requested location.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

use super::{ConversionError, Rasterizer};

pub const DEFAULT_PROGRAM: &str = "soffice";

pub struct SofficeRasterizer {
    program: String,
}

impl SofficeRasterizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, input: &Path, workdir: &TempDir) -> Result<PathBuf, ConversionError> {
        let output = Command::new(&self.program)
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(workdir.path())
            .arg(input)
            .current_dir(workdir.path())
            .output()
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => ConversionError::Environment {
                    program: self.program.clone(),
                    source,
                },
                _ => ConversionError::Failed {
                    input: input.to_path_buf(),
                    reason: source.to_string(),
                },
            })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::Failed {
                input: input.to_path_buf(),
                reason: format!("{} exited with code {}: {}", self.program, code, stderr.trim()),
            });
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = workdir.path().join(format!("{}.pdf", stem));
        if !produced.is_file() {
            return Err(ConversionError::Failed {
                input: input.to_path_buf(),
                reason: "converter produced no PDF".to_string(),
            });
        }

        Ok(produced)
    }
}

impl Default for SofficeRasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Rasterizer for SofficeRasterizer {
    fn rasterize(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let input = input.canonicalize().map_err(|e| ConversionError::Failed {
            input: input.to_path_buf(),
            reason: e.to_string(),
        })?;

        let workdir = tempdir().map_err(ConversionError::Workspace)?;
        let produced = self.run(&input, &workdir)?;

        // rename fails across filesystems; the temp dir is usually elsewhere
        if fs::rename(&produced, output).is_err() {
            fs::copy(&produced, output).map_err(|e| ConversionError::Failed {
                input: input.clone(),
                reason: format!("cannot write {}: {}", output.display(), e),
            })?;
        }

        log::debug!("{} converted {}", self.program, input.display());
        Ok(())
    }
}
