//! Validate configuration command

use anyhow::{Context, Result};
use kiln_core::Config;
use kiln_runtime::Builder;

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("✓ Project: {}", config.build.name);
    tracing::info!("✓ Entry: {}", config.build.entry);
    tracing::info!("✓ Mode: {:?}", config.build.mode);

    if !config.entry_path().is_file() {
        anyhow::bail!("Entry point not found: {}", config.entry_path().display());
    }

    let rules = config.rule_set().context("Invalid rules")?;
    let builder = Builder::new(config);
    let host = builder.check().context("Invalid stage or plugin")?;

    tracing::info!(
        "✓ Rules: {} ({:?} match policy)",
        rules.rules().len(),
        rules.policy()
    );
    tracing::info!("✓ Plugins: {}", host.names().join(", "));
    tracing::info!("✓ Configuration is valid");
    Ok(())
}
