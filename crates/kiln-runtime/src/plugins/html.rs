//! `html` plugin: render the page that loads the build
//!
//! The template is rendered with minijinja. Its context exposes:
//!
//! - `title` - page title (defaults to the project name)
//! - `mode` - `development` or `production`
//! - `scripts` - hrefs of the entry script
//! - `styles` - hrefs of extracted stylesheets
//! - `assets` - every manifest entry as `{ source, path, type }`
//!
//! With `inject` on, tags for scripts and styles the template does not
//! mention are inserted before `</body>` and `</head>`.

use async_trait::async_trait;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

use kiln_core::{AssetType, Error, Result};

use super::{PluginContext, PostBuildPlugin, parse_options};

const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ title }}</title>
</head>
<body>
</body>
</html>
"#;

/// Renders an HTML page for the build
pub struct Html;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HtmlOptions {
    template: Option<String>,
    filename: String,
    title: Option<String>,
    inject: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            template: None,
            filename: "index.html".to_string(),
            title: None,
            inject: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct AssetLink {
    source: String,
    path: String,
    #[serde(rename = "type")]
    asset_type: AssetType,
}

#[async_trait]
impl PostBuildPlugin for Html {
    fn name(&self) -> &str {
        "html"
    }

    fn check_options(&self, options: &serde_json::Value) -> Result<()> {
        let opts: HtmlOptions = parse_options(options)?;
        if opts.filename.is_empty()
            || opts.filename.starts_with('/')
            || opts.filename.split('/').any(|s| s == "..")
        {
            return Err(Error::invalid(format!(
                "html filename '{}' must be a relative path inside the output directory",
                opts.filename
            )));
        }
        Ok(())
    }

    async fn run(&self, ctx: &mut PluginContext<'_>, options: &serde_json::Value) -> Result<()> {
        let opts: HtmlOptions = parse_options(options)?;

        let source = match &opts.template {
            Some(path) => tokio::fs::read_to_string(ctx.project_root.join(path)).await?,
            None => DEFAULT_TEMPLATE.to_string(),
        };

        // Hrefs are relative to the page, which may sit in a subdirectory
        let prefix = "../".repeat(opts.filename.matches('/').count());
        let href = |path: &str| format!("{prefix}{path}");

        let manifest = ctx.manifest;
        let scripts: Vec<String> = manifest
            .entry_output()
            .filter(|e| e.asset_type == AssetType::Script)
            .map(|e| href(&e.output_path))
            .into_iter()
            .collect();
        let styles: Vec<String> = manifest
            .iter()
            .filter(|(_, e)| e.extracted)
            .map(|(_, e)| href(&e.output_path))
            .collect();
        let assets: Vec<AssetLink> = manifest
            .iter()
            .map(|(id, e)| AssetLink {
                source: id.to_string(),
                path: href(&e.output_path),
                asset_type: e.asset_type,
            })
            .collect();

        let title = opts.title.clone().unwrap_or_else(|| ctx.name.to_string());
        let env = Environment::new();
        let mut page = env.render_str(
            &source,
            context! {
                title => title,
                mode => ctx.mode,
                scripts => &scripts,
                styles => &styles,
                assets => assets,
            },
        )?;

        if opts.inject {
            let links: String = styles
                .iter()
                .filter(|s| !page.contains(s.as_str()))
                .map(|s| format!("  <link rel=\"stylesheet\" href=\"{s}\">\n"))
                .collect();
            insert_before(&mut page, "</head>", &links, false);

            let tags: String = scripts
                .iter()
                .filter(|s| !page.contains(s.as_str()))
                .map(|s| format!("  <script src=\"{s}\"></script>\n"))
                .collect();
            insert_before(&mut page, "</body>", &tags, true);
        }

        tracing::debug!(filename = %opts.filename, styles = styles.len(), "rendered html page");
        ctx.write(&opts.filename, page).await
    }
}

/// Insert `tags` before `marker`, or at the start or end when it is missing
fn insert_before(page: &mut String, marker: &str, tags: &str, append_if_missing: bool) {
    if tags.is_empty() {
        return;
    }
    match page.find(marker) {
        Some(pos) => page.insert_str(pos, tags),
        None if append_if_missing => page.push_str(tags),
        None => page.insert_str(0, tags),
    }
}
