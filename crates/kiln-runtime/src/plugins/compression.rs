//! `compression` plugin: gzip copies of text outputs

use async_trait::async_trait;
use flate2::Compression as Level;
use flate2::write::GzEncoder;
use regex::Regex;
use serde::Deserialize;
use std::io::Write;

use kiln_core::{Error, Result};

use super::{PluginContext, PostBuildPlugin, parse_options};

/// Writes `<file>.gz` next to compressible outputs
pub struct Compression;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CompressionOptions {
    /// Files to consider, matched against relative paths
    test: String,
    /// Skip files smaller than this many bytes
    threshold: u64,
    /// Keep the `.gz` only when compressed/original is at most this
    min_ratio: f64,
    /// gzip level, 0-9
    level: u32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            test: r"\.(js|css|html|svg)$".to_string(),
            threshold: 0,
            min_ratio: 0.8,
            level: 9,
        }
    }
}

impl CompressionOptions {
    fn validate(&self) -> Result<Regex> {
        if self.level > 9 {
            return Err(Error::invalid("compression level must be between 0 and 9"));
        }
        if !(self.min_ratio > 0.0 && self.min_ratio <= 1.0) {
            return Err(Error::invalid("min_ratio must be in (0, 1]"));
        }
        Regex::new(&self.test)
            .map_err(|e| Error::invalid(format!("invalid test pattern '{}': {e}", self.test)))
    }
}

fn gzip(bytes: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Level::new(level));
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

#[async_trait]
impl PostBuildPlugin for Compression {
    fn name(&self) -> &str {
        "compression"
    }

    fn check_options(&self, options: &serde_json::Value) -> Result<()> {
        parse_options::<CompressionOptions>(options)?.validate().map(|_| ())
    }

    async fn run(&self, ctx: &mut PluginContext<'_>, options: &serde_json::Value) -> Result<()> {
        let opts: CompressionOptions = parse_options(options)?;
        let test = opts.validate()?;

        let candidates: Vec<String> = ctx
            .emitted()
            .iter()
            .filter(|p| test.is_match(p) && !p.ends_with(".gz"))
            .cloned()
            .collect();

        let mut written = 0usize;
        for path in candidates {
            let original = tokio::fs::read(ctx.output_path(&path)).await?;
            if (original.len() as u64) < opts.threshold || original.is_empty() {
                continue;
            }
            let compressed = gzip(&original, opts.level)?;
            let ratio = compressed.len() as f64 / original.len() as f64;
            if ratio > opts.min_ratio {
                tracing::debug!(path = %path, ratio, "compression not worthwhile");
                continue;
            }
            ctx.write(&format!("{path}.gz"), compressed).await?;
            written += 1;
        }

        tracing::info!(files = written, "wrote gzip files");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use kiln_core::{Manifest, Mode};
    use serde_json::json;
    use std::io::Read;
    use tempfile::TempDir;

    async fn run(dir: &TempDir, emitted: &[&str], options: serde_json::Value) {
        let manifest = Manifest::default();
        let mut ctx = PluginContext::new(
            &manifest,
            dir.path(),
            dir.path(),
            Mode::Production,
            "t",
            emitted.iter().map(|s| s.to_string()),
        );
        Compression.run(&mut ctx, &options).await.unwrap();
    }

    #[tokio::test]
    async fn test_compresses_matching_files() {
        let dir = TempDir::new().unwrap();
        let js = "console.log('hello');\n".repeat(200);
        std::fs::write(dir.path().join("app.js"), &js).unwrap();
        std::fs::write(dir.path().join("logo.png"), "x".repeat(2000)).unwrap();

        run(&dir, &["app.js", "logo.png"], serde_json::Value::Null).await;

        let gz = std::fs::read(dir.path().join("app.js.gz")).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(gz.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, js);
        assert!(!dir.path().join("logo.png.gz").exists());
    }

    #[tokio::test]
    async fn test_skips_small_and_incompressible_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tiny.css"), "a{}").unwrap();
        std::fs::write(dir.path().join("big.css"), "a{}".repeat(1000)).unwrap();

        run(&dir, &["tiny.css", "big.css"], json!({"threshold": 100})).await;
        assert!(!dir.path().join("tiny.css.gz").exists());
        assert!(dir.path().join("big.css.gz").exists());

        // Three bytes never compress below 80%
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tiny.css"), "a{}").unwrap();
        run(&dir, &["tiny.css"], serde_json::Value::Null).await;
        assert!(!dir.path().join("tiny.css.gz").exists());
    }

    #[test]
    fn test_option_validation() {
        assert!(Compression.check_options(&json!({"level": 12})).is_err());
        assert!(Compression.check_options(&json!({"min_ratio": 0})).is_err());
        assert!(Compression.check_options(&json!({"test": "("})).is_err());
        assert!(Compression.check_options(&json!({"threshold": 10240})).is_ok());
    }
}
