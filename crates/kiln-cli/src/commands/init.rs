//! Initialize a new Kiln project

use anyhow::Result;
use kiln_core::CONFIG_FILE;
use std::fs;
use std::path::Path;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join(CONFIG_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {CONFIG_FILE}",
            project_dir.display()
        );
    }

    tracing::info!("Creating new Kiln project: {}", project_name);

    fs::create_dir_all(project_dir.join("src"))?;

    let config = format!(
        r#"# Kiln build configuration
name: {project_name}
entry: ./src/index.js
output_dir: dist
mode: development
filename_template: "[name].[hash:8].[ext]"
source_maps: true

rules:
  - test: '\.css$'
    stages:
      - css-extract
      - css
      - name: autoprefix
        options:
          vendor_prefixes: ["-webkit-"]
  - test: '\.(png|svg|jpe?g|gif)$'
    filename: "images/[name].[hash:8].[ext]"
    stages: [resource]
  - test: '\.m?js$'
    exclude: node_modules
    stages: [script]

plugins:
  - name: html
    options:
      template: ./src/index.html
  - compression
"#
    );
    fs::write(project_dir.join(CONFIG_FILE), config)?;

    let script = r#"// Entry point
import './style.css';

const root = document.getElementById('app');
root.textContent = 'Hello from Kiln!';
"#;
    fs::write(project_dir.join("src/index.js"), script)?;

    let style = r#"body {
  margin: 0;
  font-family: sans-serif;
  user-select: none;
}
"#;
    fs::write(project_dir.join("src/style.css"), style)?;

    let page = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{{ title }}</title>
</head>
<body>
  <div id="app"></div>
</body>
</html>
"#;
    fs::write(project_dir.join("src/index.html"), page)?;

    let gitignore = r#"# Build output
dist/

# IDE
.idea/
.vscode/
*.swp
"#;
    fs::write(project_dir.join(".gitignore"), gitignore)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  kiln validate    # Check configuration");
    tracing::info!("  kiln build       # Build into dist/");

    Ok(())
}
