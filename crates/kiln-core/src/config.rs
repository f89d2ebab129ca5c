//! Configuration parsing and validation
//!
//! This module handles loading and validating the `kiln.yaml` build file.
//!
//! # Example
//!
//! ```yaml
//! name: my-site
//! entry: ./src/index.js
//! output_dir: dist
//! mode: production
//! filename_template: "[name].[hash].[ext]"
//! source_maps: true
//! rules:
//!   - test: '(?i)\.css$'
//!     stages: [css-extract, css, autoprefix]
//!   - test: '\.m?js$'
//!     exclude: node_modules
//!     stages: [script]
//! plugins:
//!   - name: html
//!     options:
//!       template: ./src/index.html
//!   - name: clean
//!   - name: compression
//! size_limits:
//!   max_entry_size: 10000000
//!   max_asset_size: 30000000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::asset::normalize_path;
use crate::error::{Error, Result};
use crate::rules::{MatchPolicy, RuleConfig, RuleSet};
use crate::template::FilenameTemplate;

/// Name of the build file looked up inside a project directory
pub const CONFIG_FILE: &str = "kiln.yaml";

/// Build mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Readable, debuggable artifacts
    #[default]
    Development,
    /// Minified, optimized artifacts
    Production,
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::invalid(format!(
                "unknown mode '{other}' (expected development or production)"
            ))),
        }
    }
}

/// Root build configuration from `kiln.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,

    /// Entry point, relative to the project root
    pub entry: String,

    /// Output directory, relative to the project root
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Build mode
    #[serde(default)]
    pub mode: Mode,

    /// Empty the output directory before writing
    #[serde(default = "default_true")]
    pub clean: bool,

    /// How multiple matching rules combine
    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Default output filename template
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Hex characters used for a bare `[hash]` placeholder
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,

    /// Emit `.map` files next to script and style artifacts
    #[serde(default)]
    pub source_maps: bool,

    /// Maximum number of assets processed concurrently
    #[serde(default)]
    pub workers: Option<usize>,

    /// Abandon a stage that runs longer than this
    #[serde(default)]
    pub stage_timeout_ms: Option<u64>,

    /// Manifest file name inside the output directory; empty disables it
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    /// Soft size limits
    #[serde(default)]
    pub size_limits: SizeLimits,

    /// Ordered transform rules
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Post-build plugins, run in this order
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

fn default_name() -> String {
    "kiln-project".to_string()
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_true() -> bool {
    true
}

fn default_filename_template() -> String {
    "[name].[hash].[ext]".to_string()
}

fn default_hash_length() -> usize {
    20
}

fn default_manifest_file() -> String {
    "manifest.json".to_string()
}

/// Soft limits that produce warnings, never failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeLimits {
    /// Combined size of the entry and everything it references
    #[serde(default = "default_size_limit")]
    pub max_entry_size: u64,

    /// Size of any single artifact
    #[serde(default = "default_size_limit")]
    pub max_asset_size: u64,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_entry_size: default_size_limit(),
            max_asset_size: default_size_limit(),
        }
    }
}

fn default_size_limit() -> u64 {
    250_000
}

/// A post-build plugin declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginConfig {
    /// Plugin with default options
    Name(String),

    /// Plugin with options passed through verbatim
    Detailed {
        /// Registered plugin name
        name: String,
        /// Opaque options
        #[serde(default)]
        options: serde_json::Value,
    },
}

impl PluginConfig {
    /// Plugin name
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    /// Plugin options (`null` when none were given)
    pub fn options(&self) -> &serde_json::Value {
        static NONE: serde_json::Value = serde_json::Value::Null;
        match self {
            Self::Name(_) => &NONE,
            Self::Detailed { options, .. } => options,
        }
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Build configuration
    pub build: BuildConfig,

    /// Project root (directory holding `kiln.yaml`)
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or kiln.yaml file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-site")?;
    /// println!("Entry: {}", config.entry_path().display());
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join(CONFIG_FILE), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config = Self::from_yaml(&contents, base_path)?;
        tracing::debug!(path = %config_path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a YAML string rooted at `base_path`
    pub fn from_yaml(yaml: &str, base_path: impl Into<PathBuf>) -> Result<Self> {
        let build: BuildConfig = serde_yaml::from_str(yaml)?;
        let base_path = base_path.into();
        // An empty parent ("kiln.yaml" given bare) means the current directory
        let base_path = if base_path.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            base_path
        };
        let config = Self { build, base_path };
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without the stage and plugin registries
    pub fn validate(&self) -> Result<()> {
        let build = &self.build;
        if build.entry.trim().is_empty() {
            return Err(Error::invalid("'entry' must not be empty"));
        }
        if build.output_dir.trim().is_empty() {
            return Err(Error::invalid("'output_dir' must not be empty"));
        }
        if build.hash_length == 0 || build.hash_length > 64 {
            return Err(Error::invalid("'hash_length' must be between 1 and 64"));
        }
        if build.workers == Some(0) {
            return Err(Error::invalid("'workers' must be at least 1"));
        }
        if build.stage_timeout_ms == Some(0) {
            return Err(Error::invalid("'stage_timeout_ms' must be positive"));
        }

        self.check_output_dir()?;

        FilenameTemplate::parse(&build.filename_template)?;
        for rule in &build.rules {
            if let Some(filename) = &rule.filename {
                FilenameTemplate::parse(filename)?;
            }
        }
        self.rule_set()?;
        Ok(())
    }

    /// The output directory is emptied on build, so it must not hold the project
    fn check_output_dir(&self) -> Result<()> {
        let root = normalize_path(&std::path::absolute(&self.base_path)?);
        let output = normalize_path(&root.join(&self.build.output_dir));
        if root.starts_with(&output) {
            return Err(Error::invalid(format!(
                "'output_dir' {} must not be the project root or one of its parents",
                self.build.output_dir
            )));
        }
        let entry = normalize_path(&root.join(&self.build.entry));
        if entry.starts_with(&output) {
            return Err(Error::invalid(format!(
                "'output_dir' {} must not contain the entry point {}",
                self.build.output_dir, self.build.entry
            )));
        }
        Ok(())
    }

    /// Compile the configured rules
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::compile(&self.build.rules, self.build.match_policy)
    }

    /// Absolute-ish path of the entry point
    pub fn entry_path(&self) -> PathBuf {
        self.base_path.join(&self.build.entry)
    }

    /// Path of the output directory
    pub fn output_dir(&self) -> PathBuf {
        self.base_path.join(&self.build.output_dir)
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        self.build.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Stage timeout, if configured
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.build.stage_timeout_ms.map(Duration::from_millis)
    }
}
