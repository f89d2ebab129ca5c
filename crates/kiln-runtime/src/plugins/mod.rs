//! Post-build plugins
//!
//! Plugins run after every artifact has been written, strictly in the order
//! the configuration lists them. Each gets read-only access to the frozen
//! manifest and may write or delete files under the output directory. The
//! first failure stops the remaining plugins.
//!
//! # Built-in plugins
//!
//! - `html` - render an HTML page linking the build outputs
//! - `clean` - delete stale files left by earlier builds
//! - `compression` - write gzip copies of text outputs

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_core::{Error, Manifest, Mode, PluginConfig, Result};

pub mod clean;
pub mod compression;
pub mod html;

pub use clean::Clean;
pub use compression::Compression;
pub use html::Html;

/// A hook that runs once after a successful build
#[async_trait]
pub trait PostBuildPlugin: Send + Sync {
    /// Registered name
    fn name(&self) -> &str;

    /// Reject malformed options before the build starts
    fn check_options(&self, _options: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    /// Run against the finished build
    async fn run(&self, ctx: &mut PluginContext<'_>, options: &serde_json::Value) -> Result<()>;
}

/// Deserialize plugin options, treating `null` as all defaults
pub fn parse_options<T: DeserializeOwned + Default>(options: &serde_json::Value) -> Result<T> {
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone())
        .map_err(|e| Error::invalid(format!("invalid plugin options: {e}")))
}

/// What a plugin can see and touch
pub struct PluginContext<'a> {
    /// Frozen manifest of the build
    pub manifest: &'a Manifest,
    /// Project root, for resolving option paths
    pub project_root: &'a Path,
    /// Output directory
    pub output_dir: &'a Path,
    /// Build mode
    pub mode: Mode,
    /// Project name
    pub name: &'a str,
    emitted: BTreeSet<String>,
}

impl<'a> PluginContext<'a> {
    /// Create a context; `emitted` lists files the build wrote
    pub fn new(
        manifest: &'a Manifest,
        project_root: &'a Path,
        output_dir: &'a Path,
        mode: Mode,
        name: &'a str,
        emitted: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            manifest,
            project_root,
            output_dir,
            mode,
            name,
            emitted: emitted.into_iter().collect(),
        }
    }

    /// Files written by the build and by plugins so far
    pub fn emitted(&self) -> &BTreeSet<String> {
        &self.emitted
    }

    /// Absolute path of a file under the output directory
    pub fn output_path(&self, relative: &str) -> PathBuf {
        self.output_dir.join(relative)
    }

    /// Write a file under the output directory and record it
    pub async fn write(&mut self, relative: &str, bytes: impl AsRef<[u8]>) -> Result<()> {
        let target = self.output_path(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        self.emitted.insert(relative.to_string());
        Ok(())
    }

    /// Delete a file under the output directory
    pub async fn remove(&mut self, relative: &str) -> Result<()> {
        tokio::fs::remove_file(self.output_path(relative)).await?;
        self.emitted.remove(relative);
        Ok(())
    }
}

/// Plugins available to the configuration, by name
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn PostBuildPlugin>>,
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in plugin
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn PostBuildPlugin>; 3] =
            [Arc::new(Html), Arc::new(Clean), Arc::new(Compression)];
        for plugin in builtins {
            registry.plugins.insert(plugin.name().to_string(), plugin);
        }
        registry
    }

    /// Register a plugin; names must be unique
    pub fn register(&mut self, plugin: impl PostBuildPlugin + 'static) -> Result<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(Error::invalid(format!("plugin '{name}' is already registered")));
        }
        self.plugins.insert(name, Arc::new(plugin));
        Ok(())
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn PostBuildPlugin>> {
        self.plugins.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// The configured plugins, in run order
#[derive(Clone, Default)]
pub struct PluginHost {
    plugins: Vec<(Arc<dyn PostBuildPlugin>, serde_json::Value)>,
}

impl PluginHost {
    /// Look up each configured plugin and check its options
    pub fn from_config(registry: &PluginRegistry, configs: &[PluginConfig]) -> Result<Self> {
        let mut plugins = Vec::with_capacity(configs.len());
        for config in configs {
            let plugin = registry.get(config.name()).ok_or_else(|| {
                Error::invalid(format!(
                    "unknown plugin '{}' (available: {})",
                    config.name(),
                    registry.names().join(", ")
                ))
            })?;
            plugin.check_options(config.options())?;
            plugins.push((plugin, config.options().clone()));
        }
        Ok(Self { plugins })
    }

    /// Plugin names, in run order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|(p, _)| p.name()).collect()
    }

    /// Whether no plugins are configured
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every plugin in order, stopping at the first failure
    pub async fn run(&self, ctx: &mut PluginContext<'_>) -> Result<()> {
        for (plugin, options) in &self.plugins {
            let name = plugin.name();
            tracing::info!(plugin = %name, "running post-build plugin");
            if let Err(err) = plugin.run(ctx, options).await {
                let err = match err {
                    err @ Error::PluginFailed { .. } => err,
                    other => Error::PluginFailed {
                        plugin: name.to_string(),
                        message: other.to_string(),
                    },
                };
                tracing::error!(plugin = %name, error = %err, "plugin failed, skipping the rest");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.names())
            .finish()
    }
}
