//! Pipeline execution
//!
//! Runs a bound stage chain over one asset. Stages are synchronous and may be
//! CPU heavy, so each one runs on the blocking pool; a configured timeout
//! abandons a stage that overruns and fails the asset.

use std::sync::Arc;
use std::time::Duration;

use kiln_core::rules::RuleMatch;
use kiln_core::stage::BoundStage;
use kiln_core::{
    Artifact, Asset, AssetId, Content, Error, Mode, Result, StageChain, StageContext,
    StageRegistry,
};

/// Executes stage chains
#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<StageRegistry>,
    mode: Mode,
    timeout: Option<Duration>,
}

impl Executor {
    /// Create an executor over a stage registry
    pub fn new(registry: Arc<StageRegistry>, mode: Mode) -> Self {
        Self {
            registry,
            mode,
            timeout: None,
        }
    }

    /// Abandon any stage running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bind and type-check the chain a rule match selected for `asset`
    pub fn prepare(&self, asset: &Asset, matched: &RuleMatch) -> Result<StageChain> {
        let start = matched.asset_type().unwrap_or(asset.asset_type);
        self.registry.bind(&asset.id, start, matched.stages())
    }

    /// Run `chain` over `asset` and produce its artifact
    pub async fn execute(
        &self,
        asset: &Asset,
        chain: &StageChain,
        filename: Option<&str>,
    ) -> Result<Artifact> {
        let mut content = Content::new(asset.content.to_vec(), chain.input_type);

        for bound in &chain.stages {
            let declared = bound.stage.output_type().unwrap_or(content.asset_type);
            content = self.run_stage(&asset.id, bound, content).await?;
            if content.asset_type != declared {
                return Err(Error::StageFailed {
                    asset: asset.id.to_string(),
                    stage: bound.spec.name.clone(),
                    message: format!(
                        "produced {} content but declares {declared}",
                        content.asset_type
                    ),
                });
            }
        }

        let mut artifact = Artifact::new(
            asset.id.clone(),
            content.bytes,
            content.asset_type,
            Arc::clone(&asset.content),
        );
        artifact.extracted = content.extracted;
        artifact.filename = filename.map(str::to_string).or(content.filename);
        artifact.links = asset.links.clone();

        tracing::debug!(
            asset = %asset.id,
            stages = ?chain.names(),
            size = artifact.size(),
            "executed pipeline"
        );
        Ok(artifact)
    }

    async fn run_stage(&self, asset: &AssetId, bound: &BoundStage, input: Content) -> Result<Content> {
        let attempts = if bound.stage.transient() {
            bound.spec.retries + 1
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            match self.attempt(asset, bound, input.clone()).await {
                Err(Error::StageFailed { message, .. }) if attempt < attempts => {
                    tracing::warn!(
                        asset = %asset,
                        stage = %bound.spec.name,
                        attempt,
                        error = %message,
                        "transient stage failed, retrying"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn attempt(&self, asset: &AssetId, bound: &BoundStage, input: Content) -> Result<Content> {
        let stage = Arc::clone(&bound.stage);
        let options = bound.spec.options.clone();
        let ctx = StageContext {
            asset: asset.clone(),
            mode: self.mode,
        };
        let handle = tokio::task::spawn_blocking(move || stage.apply(input, &options, &ctx));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(Error::StageTimeout {
                        asset: asset.to_string(),
                        stage: bound.spec.name.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => handle.await,
        };

        let failed = |message: String| Error::StageFailed {
            asset: asset.to_string(),
            stage: bound.spec.name.clone(),
            message,
        };
        joined
            .map_err(|e| failed(format!("stage panicked: {e}")))?
            .map_err(|e| failed(e.to_string()))
    }
}
