//! Build the project

use anyhow::{Context, Result};
use kiln_core::{Config, Mode};
use kiln_runtime::{Builder, CancelFlag};

/// Command-line overrides applied on top of the configuration file
#[derive(Debug, Default)]
pub struct Overrides {
    /// Build mode
    pub mode: Option<Mode>,
    /// Worker count
    pub workers: Option<usize>,
    /// Skip post-build plugins
    pub no_plugins: bool,
    /// Output directory
    pub output_dir: Option<String>,
    /// Report every asset copied through unchanged
    pub verbose: bool,
}

/// Run the build command
pub async fn run(config_path: &str, overrides: Overrides) -> Result<()> {
    tracing::info!("Loading configuration from {}", config_path);

    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(mode) = overrides.mode {
        config.build.mode = mode;
    }
    if let Some(workers) = overrides.workers {
        config.build.workers = Some(workers);
    }
    if let Some(output_dir) = overrides.output_dir {
        config.build.output_dir = output_dir;
    }
    config.validate().context("Invalid command-line override")?;

    let output_dir = config.output_dir();
    let cancel = CancelFlag::new();
    let mut builder = Builder::new(config).with_cancel(cancel.clone());
    if overrides.no_plugins {
        builder = builder.without_plugins();
    }

    // Ctrl+C stops the build between asset pipelines; written files are removed
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received interrupt, cancelling build");
            cancel.cancel();
        }
    });
    let result = builder.build().await;
    watcher.abort();
    let report = result.context("Build failed")?;

    println!("{:<40} {:<48} {:>10}", "SOURCE", "OUTPUT", "SIZE");
    for (id, entry) in report.manifest.iter() {
        println!("{:<40} {:<48} {:>10}", id.as_str(), entry.output_path, entry.size);
    }
    if overrides.verbose {
        for id in &report.passthrough {
            tracing::warn!("No rule matched {id}, copied unchanged");
        }
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    if !report.plugins.is_empty() {
        println!("plugins: {}", report.plugins.join(", "));
    }

    tracing::info!(
        "✓ Built {} assets into {} in {}ms",
        report.manifest.len(),
        output_dir.display(),
        report.duration.as_millis()
    );
    Ok(())
}
