//! Error types for kiln-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for kiln operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, mirroring the build phases that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration could not be loaded or is invalid
    Config,
    /// Missing or cyclic asset reference
    Resolution,
    /// A stage failed, timed out, or a chain was mistyped
    Stage,
    /// Output naming failed (e.g. two assets mapped to one file)
    Planning,
    /// A post-build plugin failed
    Plugin,
    /// The build was cancelled
    Cancelled,
    /// Filesystem or serialization failure outside a specific phase
    Io,
}

/// Errors that can occur in kiln
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// An asset references a file that does not exist
    #[error("unresolved reference '{reference}' in {asset}")]
    MissingReference {
        /// Asset containing the reference
        asset: String,
        /// The specifier as written in the source
        reference: String,
    },

    /// The entry point itself could not be read
    #[error("entry point not found: {}", path.display())]
    EntryNotFound {
        /// Path of the entry file
        path: PathBuf,
    },

    /// Assets reference each other in a loop
    #[error("reference cycle detected: {}", cycle.join(" -> "))]
    ReferenceCycle {
        /// Asset ids along the cycle, first element repeated at the end
        cycle: Vec<String>,
    },

    /// A stage was referenced by a rule but never registered
    #[error("unknown stage '{stage}' for {asset}")]
    UnknownStage {
        /// Asset whose chain referenced it
        asset: String,
        /// Stage name
        stage: String,
    },

    /// Consecutive stages have incompatible types
    #[error("stage '{stage}' expects {expected} input but {asset} is {found} at that point")]
    StageTypeMismatch {
        /// Asset being planned
        asset: String,
        /// Offending stage
        stage: String,
        /// Type the stage accepts
        expected: String,
        /// Type produced by the previous stage
        found: String,
    },

    /// A stage returned an error
    #[error("stage '{stage}' failed for {asset}: {message}")]
    StageFailed {
        /// Asset being transformed
        asset: String,
        /// Stage name
        stage: String,
        /// Underlying cause
        message: String,
    },

    /// A stage exceeded the configured timeout and was abandoned
    #[error("stage '{stage}' timed out after {timeout_ms}ms for {asset}")]
    StageTimeout {
        /// Asset being transformed
        asset: String,
        /// Stage name
        stage: String,
        /// Configured limit
        timeout_ms: u64,
    },

    /// Several asset pipelines failed in the same build
    #[error("{} asset pipelines failed; first: {}", failures.len(), failures[0])]
    PipelineFailures {
        /// One error per failed asset, in asset order
        failures: Vec<Error>,
    },

    /// Two distinct assets were planned to the same output file
    #[error("output collision: {first} and {second} both map to '{path}'")]
    OutputCollision {
        /// Colliding output path
        path: String,
        /// First asset planned to it
        first: String,
        /// Second asset planned to it
        second: String,
    },

    /// Malformed filename template
    #[error("invalid filename template '{template}': {message}")]
    InvalidTemplate {
        /// The template string
        template: String,
        /// Description of the error
        message: String,
    },

    /// A post-build plugin failed
    #[error("plugin '{plugin}' failed: {message}")]
    PluginFailed {
        /// Plugin name
        plugin: String,
        /// Underlying cause
        message: String,
    },

    /// The build was cancelled before completion
    #[error("build cancelled")]
    Cancelled,

    /// Template rendering error
    #[error("template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigParse(_)
            | Self::ConfigInvalid { .. }
            | Self::InvalidTemplate { .. } => ErrorKind::Config,
            Self::MissingReference { .. }
            | Self::EntryNotFound { .. }
            | Self::ReferenceCycle { .. } => ErrorKind::Resolution,
            Self::UnknownStage { .. }
            | Self::StageTypeMismatch { .. }
            | Self::StageFailed { .. }
            | Self::StageTimeout { .. } => ErrorKind::Stage,
            Self::PipelineFailures { failures } => failures
                .first()
                .map(Error::kind)
                .unwrap_or(ErrorKind::Stage),
            Self::OutputCollision { .. } => ErrorKind::Planning,
            Self::PluginFailed { .. } | Self::TemplateError(_) => ErrorKind::Plugin,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for [`Error::ConfigInvalid`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = Error::ReferenceCycle {
            cycle: vec!["a.js".into(), "b.js".into(), "a.js".into()],
        };
        assert_eq!(
            err.to_string(),
            "reference cycle detected: a.js -> b.js -> a.js"
        );
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[test]
    fn test_pipeline_failures_take_kind_of_first() {
        let err = Error::PipelineFailures {
            failures: vec![
                Error::StageFailed {
                    asset: "src/a.css".into(),
                    stage: "css".into(),
                    message: "unbalanced braces".into(),
                },
                Error::StageTimeout {
                    asset: "src/b.css".into(),
                    stage: "css".into(),
                    timeout_ms: 10,
                },
            ],
        };
        assert_eq!(err.kind(), ErrorKind::Stage);
        assert!(err.to_string().starts_with("2 asset pipelines failed"));
        assert!(err.to_string().contains("src/a.css"));
    }

    #[test]
    fn test_plugin_error_names_plugin() {
        let err = Error::PluginFailed {
            plugin: "compression".into(),
            message: "disk full".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Plugin);
        assert!(err.to_string().contains("'compression'"));
    }
}
