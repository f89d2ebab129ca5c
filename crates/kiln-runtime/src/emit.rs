//! Writing planned outputs to disk
//!
//! The emitter owns the output directory for the duration of a build. Every
//! file it writes is recorded so a failed or cancelled build can remove
//! exactly what it produced.

use std::path::{Path, PathBuf};

use kiln_core::{Error, Result};

use crate::build::CancelFlag;

/// A file ready to be written, relative to the output directory
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// Relative path, forward slashes
    pub path: String,
    /// Contents
    pub bytes: Vec<u8>,
}

/// Writes build outputs under one directory
#[derive(Debug)]
pub struct Emitter {
    out_dir: PathBuf,
    written: Vec<String>,
}

impl Emitter {
    /// Create an emitter for `out_dir`
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            written: Vec::new(),
        }
    }

    /// The output directory
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Create the output directory, emptying it first when `clean` is set
    pub async fn prepare(&self, clean: bool) -> Result<()> {
        if clean && tokio::fs::try_exists(&self.out_dir).await? {
            let mut entries = tokio::fs::read_dir(&self.out_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    tokio::fs::remove_dir_all(&path).await?;
                } else {
                    tokio::fs::remove_file(&path).await?;
                }
            }
            tracing::debug!(dir = %self.out_dir.display(), "cleaned output directory");
        }
        tokio::fs::create_dir_all(&self.out_dir).await?;
        Ok(())
    }

    /// Write every file, rolling back on error or cancellation
    pub async fn write_all(&mut self, files: Vec<OutputFile>, cancel: &CancelFlag) -> Result<()> {
        for file in files {
            let outcome = if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                self.write(&file).await
            };
            if let Err(err) = outcome {
                tracing::warn!(error = %err, files = self.written.len(), "rolling back partial output");
                self.rollback().await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn write(&mut self, file: &OutputFile) -> Result<()> {
        let target = self.out_dir.join(&file.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &file.bytes).await?;
        self.written.push(file.path.clone());
        Ok(())
    }

    /// Remove every file written so far; removal errors are logged, not returned
    pub async fn rollback(&mut self) {
        for path in self.written.drain(..) {
            if let Err(err) = tokio::fs::remove_file(self.out_dir.join(&path)).await {
                tracing::warn!(path = %path, error = %err, "failed to remove partial output");
            }
        }
    }

    /// Relative paths written by this emitter
    pub fn written(&self) -> &[String] {
        &self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(path: &str, bytes: &str) -> OutputFile {
        OutputFile {
            path: path.to_string(),
            bytes: bytes.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_prepare_cleans_previous_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist");
        std::fs::create_dir_all(out.join("old")).unwrap();
        std::fs::write(out.join("stale.js"), "x").unwrap();
        std::fs::write(out.join("old/a.css"), "x").unwrap();

        Emitter::new(&out).prepare(true).await.unwrap();
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_without_clean_keeps_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("keep.js"), "x").unwrap();

        Emitter::new(&out).prepare(false).await.unwrap();
        assert!(out.join("keep.js").exists());
    }

    #[tokio::test]
    async fn test_write_all_creates_subdirectories() {
        let dir = TempDir::new().unwrap();
        let mut emitter = Emitter::new(dir.path());
        emitter
            .write_all(
                vec![file("index.js", "a"), file("img/logo.png", "b")],
                &CancelFlag::new(),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("img/logo.png")).unwrap(), "b");
        assert_eq!(emitter.written(), &["index.js".to_string(), "img/logo.png".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut emitter = Emitter::new(dir.path());
        let err = emitter
            .write_all(vec![file("index.js", "a")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!dir.path().join("index.js").exists());
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let dir = TempDir::new().unwrap();
        // A file where a directory is needed makes the second write fail
        std::fs::write(dir.path().join("blocker"), "x").unwrap();

        let mut emitter = Emitter::new(dir.path());
        let err = emitter
            .write_all(
                vec![file("index.js", "a"), file("blocker/b.js", "b")],
                &CancelFlag::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!dir.path().join("index.js").exists());
        assert!(emitter.written().is_empty());
    }
}
