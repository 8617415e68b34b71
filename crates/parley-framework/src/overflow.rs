//! Handling of texts longer than the platform accepts.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use parley_core::{MediaKind, MediaSource, StorageError};

use crate::error::{Error, Result};

/// What an oversized text is sent as instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub kind: MediaKind,
    pub source: MediaSource,
    pub caption: Option<String>,
}

/// Replaces an oversized text with a media message.
#[async_trait]
pub trait OverflowHook: Send + Sync + 'static {
    async fn on_overflow(&self, text: &str) -> Result<Replacement>;
}

/// Writes the text to a temporary `.txt` file, sends it as a document and
/// deletes the file shortly afterwards.
#[derive(Debug, Clone)]
pub struct TempFileOverflow {
    dir: PathBuf,
    keep_for: Duration,
}

impl Default for TempFileOverflow {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            keep_for: Duration::from_secs(5),
        }
    }
}

impl TempFileOverflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the files into `dir` (builder pattern).
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Deletes the files after `keep_for` (builder pattern).
    pub fn keep_for(mut self, keep_for: Duration) -> Self {
        self.keep_for = keep_for;
        self
    }
}

#[async_trait]
impl OverflowHook for TempFileOverflow {
    async fn on_overflow(&self, text: &str) -> Result<Replacement> {
        let io = |e: std::io::Error| Error::from(StorageError::from(e));

        let mut file = tempfile::Builder::new()
            .prefix("overflow-")
            .suffix(".txt")
            .tempfile_in(&self.dir)
            .map_err(io)?;
        writeln!(file, "{text}").map_err(io)?;

        let path = file.into_temp_path();
        let source = MediaSource::Path(path.to_path_buf());
        debug!(path = %path.display(), chars = text.chars().count(), "message overflowed to file");

        let keep_for = self.keep_for;
        tokio::spawn(async move {
            tokio::time::sleep(keep_for).await;
            if let Err(e) = path.close() {
                warn!(error = %e, "failed to remove overflow file");
            }
        });

        Ok(Replacement {
            kind: MediaKind::Document,
            source,
            caption: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn overflow_file_is_removed_later() {
        let dir = tempfile::tempdir().unwrap();
        let hook = TempFileOverflow::new().in_dir(dir.path());

        let replacement = hook.on_overflow(&"x".repeat(5000)).await.unwrap();
        assert_eq!(replacement.kind, MediaKind::Document);
        let MediaSource::Path(path) = replacement.source else {
            panic!("expected a path");
        };
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim_end().len(), 5000);

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert!(!path.exists());
    }
}
