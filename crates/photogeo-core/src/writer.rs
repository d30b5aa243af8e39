use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::photo::PhotoRecord;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Copies the GPS position of a tagged photo into another file.
pub trait GpsWriter: Send + Sync {
    fn write_gps(&self, source: &PhotoRecord, target: &Path) -> Result<(), WriteError>;

    /// Whether this writer actually modifies files
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Delegates to the `exiftool` command line.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    overwrite_original: bool,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            overwrite_original: false,
        }
    }

    /// Skip the `_original` backup exiftool keeps by default.
    pub fn with_overwrite_original(mut self, overwrite: bool) -> Self {
        self.overwrite_original = overwrite;
        self
    }

    fn command(&self, source: &Path, target: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-tagsFromFile")
            .arg(source)
            .args(["-GPSLatitude", "-GPSLongitude", "-GPSLatitudeRef", "-GPSLongitudeRef"]);
        if self.overwrite_original {
            cmd.arg("-overwrite_original");
        }
        cmd.arg(target);
        cmd
    }
}

impl GpsWriter for ExifTool {
    fn write_gps(&self, source: &PhotoRecord, target: &Path) -> Result<(), WriteError> {
        let program = self.program.display().to_string();
        let output = self
            .command(source.path(), target)
            .output()
            .map_err(|source| WriteError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(WriteError::Failed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Reports what would be written without touching any file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRun;

impl GpsWriter for DryRun {
    fn write_gps(&self, _source: &PhotoRecord, _target: &Path) -> Result<(), WriteError> {
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
