//! Kiln Runtime
//!
//! This crate runs Kiln builds on top of the core data model.
//!
//! # Features
//!
//! - Asset graph resolution with cycle detection
//! - Stage execution on a bounded worker pool, with timeouts
//! - Output planning with content-hashed filenames and collision checks
//! - Post-build plugins (`html`, `clean`, `compression`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiln_runtime::Builder;
//!
//! let config = kiln_core::Config::load(".")?;
//! let report = Builder::new(config).build().await?;
//! println!("{} assets", report.manifest.len());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod build;
pub mod emit;
pub mod executor;
pub mod planner;
pub mod plugins;
pub mod resolver;

pub use build::{BuildReport, Builder, CancelFlag, SizeLimitKind, SizeWarning};
pub use executor::Executor;
pub use planner::{OutputPlanner, PlannedOutput};
pub use plugins::{PluginContext, PluginHost, PluginRegistry, PostBuildPlugin};
pub use resolver::Resolver;
