//! `clean` plugin: remove stale files from the output directory
//!
//! Anything under the output directory that neither the build nor an
//! earlier plugin wrote is deleted, which clears out hashed files from
//! previous builds when `clean: false` keeps the directory between runs.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use kiln_core::{Error, Result};

use super::{PluginContext, PostBuildPlugin, parse_options};

/// Deletes files the current build did not produce
pub struct Clean;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CleanOptions {
    /// Only log what would be removed
    dry: bool,
    /// Patterns (matched against relative paths) that are never removed
    keep: Vec<String>,
}

impl CleanOptions {
    fn keep_patterns(&self) -> Result<Vec<Regex>> {
        self.keep
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| Error::invalid(format!("invalid keep pattern '{p}': {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl PostBuildPlugin for Clean {
    fn name(&self) -> &str {
        "clean"
    }

    fn check_options(&self, options: &serde_json::Value) -> Result<()> {
        parse_options::<CleanOptions>(options)?.keep_patterns().map(|_| ())
    }

    async fn run(&self, ctx: &mut PluginContext<'_>, options: &serde_json::Value) -> Result<()> {
        let opts: CleanOptions = parse_options(options)?;
        let keep = opts.keep_patterns()?;

        let mut stale = Vec::new();
        for entry in walkdir::WalkDir::new(ctx.output_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(ctx.output_dir) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if ctx.emitted().contains(&relative) || keep.iter().any(|k| k.is_match(&relative)) {
                continue;
            }
            stale.push(relative);
        }

        for path in &stale {
            if opts.dry {
                tracing::info!(path = %path, "would remove stale file");
            } else {
                tracing::debug!(path = %path, "removing stale file");
                ctx.remove(path).await?;
            }
        }

        if !opts.dry {
            remove_empty_dirs(ctx.output_dir);
        }
        tracing::info!(removed = stale.len(), dry = opts.dry, "cleaned output directory");
        Ok(())
    }
}

fn remove_empty_dirs(root: &std::path::Path) {
    for entry in walkdir::WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        // Fails harmlessly on directories that still have files
        let _ = std::fs::remove_dir(entry.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{Manifest, Mode};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        for path in ["index.new.js", "index.old.js", "css/style.old.css", "robots.txt"] {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, "x").unwrap();
        }
        dir
    }

    async fn run(dir: &TempDir, options: serde_json::Value) {
        let manifest = Manifest::default();
        let mut ctx = PluginContext::new(
            &manifest,
            dir.path(),
            dir.path(),
            Mode::Development,
            "t",
            ["index.new.js".to_string()],
        );
        Clean.run(&mut ctx, &options).await.unwrap();
    }

    #[tokio::test]
    async fn test_removes_files_not_emitted() {
        let dir = setup();
        run(&dir, serde_json::Value::Null).await;

        assert!(dir.path().join("index.new.js").exists());
        assert!(!dir.path().join("index.old.js").exists());
        assert!(!dir.path().join("robots.txt").exists());
        assert!(!dir.path().join("css").exists());
    }

    #[tokio::test]
    async fn test_keep_patterns_and_dry_run() {
        let dir = setup();
        run(&dir, json!({"keep": ["^robots\\.txt$"]})).await;
        assert!(dir.path().join("robots.txt").exists());

        let dir = setup();
        run(&dir, json!({"dry": true})).await;
        assert!(dir.path().join("index.old.js").exists());
        assert!(dir.path().join("css/style.old.css").exists());
    }

    #[test]
    fn test_invalid_keep_pattern() {
        assert!(Clean.check_options(&json!({"keep": ["(oops"]})).is_err());
    }
}
