//! Short-lived audio files scoped to one capture or synthesis call

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::Result;

/// A filesystem-backed audio file that never outlives its owner
///
/// The file is removed when the artifact is dropped, which covers early
/// returns, errors, watchdog timeouts and cancelled futures alike.
#[derive(Debug)]
pub struct TransientArtifact {
    path: Option<TempPath>,
}

impl TransientArtifact {
    /// Create an empty artifact in `dir` with the given extension
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created
    pub fn create(dir: &Path, extension: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = tempfile::Builder::new()
            .prefix("parley-")
            .suffix(&format!(".{extension}"))
            .tempfile_in(dir)?;
        let path = file.into_temp_path();
        tracing::trace!(path = %path.display(), "artifact created");
        Ok(Self { path: Some(path) })
    }

    /// Location of the file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Read the whole file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let artifact_path: PathBuf = path.to_path_buf();
        match path.close() {
            Ok(()) => tracing::trace!(path = %artifact_path.display(), "artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %artifact_path.display(), error = %e, "failed to remove artifact");
            }
        }
    }
}
