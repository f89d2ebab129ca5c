//! Build orchestration
//!
//! A build runs in phases, each finishing before the next starts:
//!
//! 1. resolve the asset graph from the entry point
//! 2. match rules and type-check every stage chain
//! 3. execute pipelines on a bounded number of workers
//! 4. link references to planned paths, plan every output and reject collisions
//! 5. write artifacts, source maps and the manifest
//! 6. run post-build plugins against the frozen manifest
//!
//! Nothing touches the output directory before phase 5, so resolution,
//! stage and planning errors leave a previous build intact.

use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use kiln_core::rules::RuleMatch;
use kiln_core::{
    Artifact, AssetId, Config, Error, FilenameTemplate, Manifest, ManifestBuilder, ManifestEntry,
    Result, StageRegistry,
};

use crate::emit::{Emitter, OutputFile};
use crate::executor::Executor;
use crate::planner::{OutputPlanner, PlannedOutput};
use crate::plugins::{PluginContext, PluginHost, PluginRegistry};
use crate::resolver::Resolver;

/// Shared flag that asks a running build to stop
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// New, unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Which soft limit was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimitKind {
    /// A single artifact
    Asset,
    /// The entry point plus everything it references
    Entry,
}

/// A soft size limit that was exceeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeWarning {
    /// Limit that was exceeded
    pub kind: SizeLimitKind,
    /// Asset id (the entry's id for entry warnings)
    pub subject: String,
    /// Actual size in bytes
    pub size: u64,
    /// Configured limit in bytes
    pub limit: u64,
}

impl fmt::Display for SizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            SizeLimitKind::Asset => "asset",
            SizeLimitKind::Entry => "entrypoint",
        };
        write!(
            f,
            "{what} {} is {} bytes, above the {} byte limit",
            self.subject, self.size, self.limit
        )
    }
}

/// Outcome of a successful build
#[derive(Debug)]
pub struct BuildReport {
    /// Frozen manifest
    pub manifest: Manifest,
    /// Files written by the build and by plugins, relative to the output directory
    pub files: Vec<String>,
    /// Soft limit warnings
    pub warnings: Vec<SizeWarning>,
    /// Assets no rule matched, emitted unchanged
    pub passthrough: Vec<AssetId>,
    /// Plugins that ran, in order
    pub plugins: Vec<String>,
    /// Wall time of the build
    pub duration: Duration,
}

/// Runs builds for one project
pub struct Builder {
    config: Config,
    stages: Arc<StageRegistry>,
    plugins: PluginRegistry,
    run_plugins: bool,
    cancel: CancelFlag,
}

impl Builder {
    /// Builder with the built-in stages and plugins
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stages: Arc::new(StageRegistry::with_builtins()),
            plugins: PluginRegistry::with_builtins(),
            run_plugins: true,
            cancel: CancelFlag::new(),
        }
    }

    /// Use a custom stage registry
    pub fn with_stages(mut self, stages: StageRegistry) -> Self {
        self.stages = Arc::new(stages);
        self
    }

    /// Use a custom plugin registry
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Skip post-build plugins entirely
    pub fn without_plugins(mut self) -> Self {
        self.run_plugins = false;
        self
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configuration being built
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check that every configured stage and plugin exists and accepts its options
    pub fn check(&self) -> Result<PluginHost> {
        // The config is public and may have been edited since it was loaded
        self.config.validate()?;
        for rule in &self.config.build.rules {
            for stage in &rule.stages {
                if !self.stages.contains(stage.name()) {
                    return Err(Error::invalid(format!(
                        "unknown stage '{}' (available: {})",
                        stage.name(),
                        self.stages.names().join(", ")
                    )));
                }
            }
        }
        if self.run_plugins {
            PluginHost::from_config(&self.plugins, &self.config.build.plugins)
        } else {
            Ok(PluginHost::default())
        }
    }

    /// Run a full build
    pub async fn build(&self) -> Result<BuildReport> {
        let started = Instant::now();
        let build = &self.config.build;
        let host = self.check()?;
        let rules = self.config.rule_set()?;
        let planner = OutputPlanner::new(
            FilenameTemplate::parse(&build.filename_template)?,
            build.hash_length,
        )
        .with_source_maps(build.source_maps);
        let executor = Executor::new(Arc::clone(&self.stages), build.mode)
            .with_timeout(self.config.stage_timeout());

        tracing::info!(
            project = %build.name,
            entry = %build.entry,
            mode = ?build.mode,
            "starting build"
        );

        // Resolve
        self.cancel.check()?;
        let assets = Resolver::new(&self.config.base_path)
            .resolve(Path::new(&build.entry))
            .await?;

        // Match and type-check every chain before any stage runs
        let mut jobs = Vec::with_capacity(assets.len());
        let mut passthrough = Vec::new();
        for asset in &assets {
            let matched = rules.match_asset(asset)?;
            if matches!(matched, RuleMatch::Passthrough) {
                passthrough.push(asset.id.clone());
            }
            let chain = executor.prepare(asset, &matched)?;
            jobs.push((asset, chain, matched.filename().map(str::to_string)));
        }

        // Execute
        let workers = self.config.workers();
        tracing::info!(assets = jobs.len(), workers, "executing pipelines");
        let executor = &executor;
        let cancel = &self.cancel;
        let mut results = stream::iter(jobs.iter().enumerate())
            .map(|(index, (asset, chain, filename))| async move {
                let result = match cancel.check() {
                    Ok(()) => executor.execute(asset, chain, filename.as_deref()).await,
                    Err(err) => Err(err),
                };
                (index, result)
            })
            .buffer_unordered(workers);

        let mut slots: Vec<Option<Artifact>> = vec![None; jobs.len()];
        let mut failures: Vec<(usize, Error)> = Vec::new();
        while let Some((index, result)) = results.next().await {
            match result {
                Ok(artifact) => slots[index] = Some(artifact),
                Err(err) => {
                    if !matches!(err, Error::Cancelled) {
                        tracing::error!(asset = %jobs[index].0.id, error = %err, "pipeline failed");
                    }
                    failures.push((index, err));
                }
            }
        }
        drop(results);

        self.cancel.check()?;
        if !failures.is_empty() {
            failures.sort_by_key(|(index, _)| *index);
            let mut failures: Vec<Error> = failures.into_iter().map(|(_, e)| e).collect();
            return Err(if failures.len() == 1 {
                failures.remove(0)
            } else {
                Error::PipelineFailures { failures }
            });
        }
        let mut artifacts: Vec<Artifact> = slots.into_iter().flatten().collect();

        // Link and plan, leaves first
        let planned = planner.plan_all(&mut artifacts)?;
        if !build.manifest_file.is_empty() {
            if let Some(clash) = planned.iter().find(|p| p.path == build.manifest_file) {
                return Err(Error::OutputCollision {
                    path: build.manifest_file.clone(),
                    first: clash.source.to_string(),
                    second: "manifest".to_string(),
                });
            }
        }

        let warnings = self.size_warnings(&artifacts);
        let manifest = assemble_manifest(&artifacts, &planned)?;

        // Write
        self.cancel.check()?;
        let mut files = Vec::with_capacity(artifacts.len() + 1);
        for (artifact, output) in artifacts.into_iter().zip(&planned) {
            if let Some(map_path) = &output.source_map {
                let file = output.path.rsplit('/').next().unwrap_or(&output.path);
                files.push(OutputFile {
                    path: map_path.clone(),
                    bytes: artifact.source_map(file)?,
                });
            }
            files.push(OutputFile {
                path: output.path.clone(),
                bytes: artifact.bytes,
            });
        }
        if !build.manifest_file.is_empty() {
            files.push(OutputFile {
                path: build.manifest_file.clone(),
                bytes: manifest.to_json()?.into_bytes(),
            });
        }

        let mut emitter = Emitter::new(self.config.output_dir());
        emitter.prepare(build.clean).await?;
        emitter.write_all(files, &self.cancel).await?;
        tracing::info!(
            files = emitter.written().len(),
            dir = %emitter.out_dir().display(),
            "wrote build output"
        );

        // Post-build
        let output_dir = self.config.output_dir();
        let mut ctx = PluginContext::new(
            &manifest,
            &self.config.base_path,
            &output_dir,
            build.mode,
            &build.name,
            emitter.written().iter().cloned(),
        );
        host.run(&mut ctx).await?;
        let files: Vec<String> = ctx.emitted().iter().cloned().collect();
        let plugins = host.names().into_iter().map(str::to_string).collect();

        for warning in &warnings {
            tracing::warn!("{warning}");
        }
        let duration = started.elapsed();
        tracing::info!(
            assets = manifest.len(),
            elapsed_ms = duration.as_millis() as u64,
            "build complete"
        );

        Ok(BuildReport {
            manifest,
            files,
            warnings,
            passthrough,
            plugins,
            duration,
        })
    }

    fn size_warnings(&self, artifacts: &[Artifact]) -> Vec<SizeWarning> {
        let limits = self.config.build.size_limits;
        let mut warnings: Vec<SizeWarning> = artifacts
            .iter()
            .filter(|a| a.size() as u64 > limits.max_asset_size)
            .map(|a| SizeWarning {
                kind: SizeLimitKind::Asset,
                subject: a.source.to_string(),
                size: a.size() as u64,
                limit: limits.max_asset_size,
            })
            .collect();

        // Everything resolved is reachable from the entry, which comes last
        let total: u64 = artifacts.iter().map(|a| a.size() as u64).sum();
        if let Some(entry) = artifacts.last().filter(|_| total > limits.max_entry_size) {
            warnings.push(SizeWarning {
                kind: SizeLimitKind::Entry,
                subject: entry.source.to_string(),
                size: total,
                limit: limits.max_entry_size,
            });
        }
        warnings
    }
}

/// Record every planned artifact; the manifest is frozen on return
fn assemble_manifest(artifacts: &[Artifact], planned: &[PlannedOutput]) -> Result<Manifest> {
    let entry = artifacts
        .last()
        .map(|a| a.source.clone())
        .ok_or_else(|| Error::invalid("build produced no artifacts"))?;
    let mut builder = ManifestBuilder::new(entry);
    for (artifact, output) in artifacts.iter().zip(planned) {
        builder.insert(
            artifact.source.clone(),
            ManifestEntry {
                output_path: output.path.clone(),
                hash: artifact.hash.clone(),
                asset_type: artifact.asset_type,
                extracted: artifact.extracted,
                size: artifact.size() as u64,
            },
        )?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(other.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_size_warning_message() {
        let warning = SizeWarning {
            kind: SizeLimitKind::Entry,
            subject: "src/index.js".into(),
            size: 300_000,
            limit: 250_000,
        };
        assert_eq!(
            warning.to_string(),
            "entrypoint src/index.js is 300000 bytes, above the 250000 byte limit"
        );
    }
}
