//! Kiln Core Library
//!
//! This crate provides the synchronous core of Kiln:
//! - Configuration parsing and validation
//! - Asset, artifact and manifest data model
//! - Rule matching and the stage registry
//! - Built-in stages and reference scanning
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Asset    │────▶│   RuleSet   │────▶│ StageChain  │────▶│  Artifact   │
//! │ (resolved)  │     │   (match)   │     │  (bound)    │     │  (+ hash)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_core::{Config, StageRegistry};
//!
//! let config = Config::load("./my-site")?;
//! let rules = config.rule_set()?;
//! let stages = StageRegistry::with_builtins();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod asset;
pub mod config;
pub mod error;
pub mod manifest;
pub mod references;
pub mod rules;
pub mod stage;
pub mod stages;
pub mod template;

pub use artifact::{Artifact, content_hash};
pub use asset::{Asset, AssetId, AssetType};
pub use config::{BuildConfig, CONFIG_FILE, Config, Mode, PluginConfig, SizeLimits};
pub use error::{Error, ErrorKind, Result};
pub use manifest::{Manifest, ManifestBuilder, ManifestEntry};
pub use rules::{MatchPolicy, RuleMatch, RuleSet, StageSpec};
pub use stage::{Content, Stage, StageChain, StageContext, StageFailure, StageOptions, StageRegistry};
pub use template::{FilenameTemplate, TemplateVars};
