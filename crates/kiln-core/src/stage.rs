//! Stage capability interface and registry
//!
//! A stage is a named, pure transform over asset content. Stages declare the
//! content type they accept and the type they produce so chains can be
//! checked before anything runs. All stages must be registered explicitly
//! at process start; rules refer to them by name.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::asset::{AssetId, AssetType};
use crate::config::Mode;
use crate::error::{Error, Result};
use crate::rules::StageSpec;

/// Options map handed to a stage, passed through from the config
pub type StageOptions = serde_json::Map<String, serde_json::Value>;

/// Content flowing between stages
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    /// Current bytes
    pub bytes: Vec<u8>,

    /// Current content type
    pub asset_type: AssetType,

    /// Set by stages that turn a stylesheet into a standalone file the
    /// HTML page should link
    pub extracted: bool,

    /// Output filename template requested by a stage
    pub filename: Option<String>,
}

impl Content {
    /// Wrap raw bytes of the given type
    pub fn new(bytes: impl Into<Vec<u8>>, asset_type: AssetType) -> Self {
        Self {
            bytes: bytes.into(),
            asset_type,
            extracted: false,
            filename: None,
        }
    }

    /// Content as UTF-8 text, or a stage failure naming the problem
    pub fn text(&self) -> std::result::Result<&str, StageFailure> {
        std::str::from_utf8(&self.bytes)
            .map_err(|e| StageFailure::new(format!("content is not valid UTF-8: {e}")))
    }
}

/// Build-wide settings visible to every stage
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Asset being transformed
    pub asset: AssetId,
    /// Development or production
    pub mode: Mode,
}

/// Failure reported by a stage; asset and stage names are attached by the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct StageFailure(pub String);

impl StageFailure {
    /// Create a failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A named transform with declared input and output types
pub trait Stage: Send + Sync {
    /// Registered name
    fn name(&self) -> &str;

    /// Accepted input type; `None` accepts anything
    fn input_type(&self) -> Option<AssetType>;

    /// Produced type; `None` keeps the input type
    fn output_type(&self) -> Option<AssetType> {
        None
    }

    /// Whether the stage talks to an external resource and may be retried
    fn transient(&self) -> bool {
        false
    }

    /// Reject malformed options before the chain runs
    fn check_options(&self, _options: &StageOptions) -> std::result::Result<(), StageFailure> {
        Ok(())
    }

    /// Transform `input`; must be deterministic for the same input and options
    fn apply(
        &self,
        input: Content,
        options: &StageOptions,
        ctx: &StageContext,
    ) -> std::result::Result<Content, StageFailure>;
}

/// Deserialize a stage's options into its typed form
pub fn parse_options<T: DeserializeOwned>(
    options: &StageOptions,
) -> std::result::Result<T, StageFailure> {
    serde_json::from_value(serde_json::Value::Object(options.clone()))
        .map_err(|e| StageFailure::new(format!("invalid options: {e}")))
}

/// A registered stage paired with the options a rule gave it
#[derive(Clone)]
pub struct BoundStage {
    /// The stage implementation
    pub stage: Arc<dyn Stage>,
    /// Options and retry budget from the rule
    pub spec: StageSpec,
}

impl fmt::Debug for BoundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundStage")
            .field("name", &self.spec.name)
            .field("options", &self.spec.options)
            .finish()
    }
}

/// A type-checked stage chain for one asset
#[derive(Debug, Clone)]
pub struct StageChain {
    /// Stages in application order
    pub stages: Vec<BoundStage>,
    /// Type of the content entering the chain
    pub input_type: AssetType,
    /// Type of the content leaving the chain
    pub output_type: AssetType,
}

impl StageChain {
    /// Stage names, in order
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|b| b.spec.name.as_str()).collect()
    }

    /// Whether the chain is empty (pass-through)
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Registry of stages available to rules
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in stage
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for stage in crate::stages::builtins() {
            registry.stages.insert(stage.name().to_string(), stage);
        }
        registry
    }

    /// Register a stage; names must be unique
    pub fn register(&mut self, stage: impl Stage + 'static) -> Result<()> {
        let name = stage.name().to_string();
        if self.stages.contains_key(&name) {
            return Err(Error::invalid(format!("stage '{name}' is already registered")));
        }
        self.stages.insert(name, Arc::new(stage));
        Ok(())
    }

    /// Look up a stage by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    /// Whether a stage is registered
    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `specs` into a chain and check it end to end
    ///
    /// Fails before any stage runs if a stage is unknown, rejects its
    /// options, or cannot accept the type produced by its predecessor.
    pub fn bind(&self, asset: &AssetId, start: AssetType, specs: &[StageSpec]) -> Result<StageChain> {
        let mut current = start;
        let mut stages = Vec::with_capacity(specs.len());

        for spec in specs {
            let stage = self.get(&spec.name).ok_or_else(|| Error::UnknownStage {
                asset: asset.to_string(),
                stage: spec.name.clone(),
            })?;

            if let Some(expected) = stage.input_type().filter(|t| *t != current) {
                return Err(Error::StageTypeMismatch {
                    asset: asset.to_string(),
                    stage: spec.name.clone(),
                    expected: expected.to_string(),
                    found: current.to_string(),
                });
            }

            stage
                .check_options(&spec.options)
                .map_err(|e| Error::StageFailed {
                    asset: asset.to_string(),
                    stage: spec.name.clone(),
                    message: e.to_string(),
                })?;

            current = stage.output_type().unwrap_or(current);
            stages.push(BoundStage {
                stage,
                spec: spec.clone(),
            });
        }

        Ok(StageChain {
            stages,
            input_type: start,
            output_type: current,
        })
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> StageSpec {
        StageSpec {
            name: name.to_string(),
            options: StageOptions::new(),
            retries: 0,
        }
    }

    struct Upper;

    impl Stage for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn input_type(&self) -> Option<AssetType> {
            None
        }

        fn apply(
            &self,
            input: Content,
            _options: &StageOptions,
            _ctx: &StageContext,
        ) -> std::result::Result<Content, StageFailure> {
            let text = input.text()?.to_uppercase();
            Ok(Content {
                bytes: text.into_bytes(),
                ..input
            })
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = StageRegistry::new();
        registry.register(Upper).unwrap();
        assert!(registry.register(Upper).is_err());
        assert_eq!(registry.names(), vec!["upper"]);
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = StageRegistry::with_builtins();
        for name in ["autoprefix", "css", "css-extract", "resource", "script", "style-inject"] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn test_bind_tracks_type_through_chain() {
        let registry = StageRegistry::with_builtins();
        let chain = registry
            .bind(
                &AssetId::from("a.css"),
                AssetType::Style,
                &[spec("css"), spec("style-inject"), spec("script")],
            )
            .unwrap();
        assert_eq!(chain.names(), vec!["css", "style-inject", "script"]);
        assert_eq!(chain.output_type, AssetType::Script);
    }

    #[test]
    fn test_bind_rejects_type_mismatch_before_running() {
        let registry = StageRegistry::with_builtins();
        let err = registry
            .bind(
                &AssetId::from("a.css"),
                AssetType::Style,
                &[spec("style-inject"), spec("autoprefix")],
            )
            .unwrap_err();
        match err {
            Error::StageTypeMismatch {
                stage,
                expected,
                found,
                ..
            } => {
                assert_eq!(stage, "autoprefix");
                assert_eq!(expected, "style");
                assert_eq!(found, "script");
            }
            other => panic!("Expected type mismatch, got {other}"),
        }
    }

    #[test]
    fn test_bind_rejects_unknown_stage() {
        let registry = StageRegistry::new();
        let err = registry
            .bind(&AssetId::from("a.js"), AssetType::Script, &[spec("babel")])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStage { .. }));
    }

    #[test]
    fn test_bind_checks_options() {
        let registry = StageRegistry::with_builtins();
        let mut bad = spec("autoprefix");
        bad.options
            .insert("vendor_prefixes".into(), serde_json::json!("-webkit-"));
        let err = registry
            .bind(&AssetId::from("a.css"), AssetType::Style, &[bad])
            .unwrap_err();
        assert!(err.to_string().contains("invalid options"));
    }

    #[test]
    fn test_empty_chain_keeps_type() {
        let registry = StageRegistry::new();
        let chain = registry
            .bind(&AssetId::from("a.png"), AssetType::Image, &[])
            .unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.output_type, AssetType::Image);
    }
}
