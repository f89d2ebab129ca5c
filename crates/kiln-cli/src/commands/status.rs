//! Show project status command

use anyhow::{Context, Result};
use kiln_core::{Config, Manifest};

/// Run the status command
pub async fn run(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let build = &config.build;

    println!("Project:   {}", build.name);
    println!("Entry:     {}", build.entry);
    println!("Output:    {}", config.output_dir().display());
    println!("Mode:      {:?}", build.mode);
    println!("Template:  {}", build.filename_template);
    println!("Rules:     {}", build.rules.len());
    for (i, rule) in build.rules.iter().enumerate() {
        let stages: Vec<&str> = rule.stages.iter().map(|s| s.name()).collect();
        println!(
            "  #{i} {} -> [{}]",
            rule.test.as_deref().unwrap_or("*"),
            stages.join(", ")
        );
    }
    let plugins: Vec<&str> = build.plugins.iter().map(|p| p.name()).collect();
    println!("Plugins:   {}", if plugins.is_empty() { "none".to_string() } else { plugins.join(", ") });

    let manifest_path = config.output_dir().join(&build.manifest_file);
    if build.manifest_file.is_empty() || !manifest_path.is_file() {
        println!("Last build: none");
        return Ok(());
    }

    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let manifest = Manifest::from_json(&json).context("Manifest is corrupt")?;
    println!("Last build: {} assets", manifest.len());
    for (id, entry) in manifest.iter() {
        println!("  {id} -> {} ({})", entry.output_path, entry.asset_type);
    }
    Ok(())
}
