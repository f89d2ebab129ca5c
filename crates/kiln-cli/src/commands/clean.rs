//! Remove build output

use anyhow::{Context, Result};
use kiln_core::Config;

/// Run the clean command
pub async fn run(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let output_dir = config.output_dir();

    if !output_dir.exists() {
        tracing::info!("Nothing to clean: {} does not exist", output_dir.display());
        return Ok(());
    }

    tokio::fs::remove_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to remove {}", output_dir.display()))?;
    tracing::info!("✓ Removed {}", output_dir.display());
    Ok(())
}
