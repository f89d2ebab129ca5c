//! Output planning
//!
//! Assigns every artifact its path under the output directory. Planning runs
//! over the whole build before anything is written, so a collision fails the
//! build with the output directory untouched. References between artifacts
//! are rewritten here to the names their targets are written under.

use std::collections::HashMap;

use kiln_core::references;
use kiln_core::{Artifact, AssetId, AssetType, Error, FilenameTemplate, Result, TemplateVars};

/// Where one artifact (and its source map) will be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    /// Asset the artifact came from
    pub source: AssetId,
    /// Relative output path, forward slashes
    pub path: String,
    /// Relative path of the `.map` file, when one is emitted
    pub source_map: Option<String>,
}

/// Turns artifacts into output paths
#[derive(Debug, Clone)]
pub struct OutputPlanner {
    template: FilenameTemplate,
    hash_length: usize,
    source_maps: bool,
}

impl OutputPlanner {
    /// Create a planner with the default filename template
    pub fn new(template: FilenameTemplate, hash_length: usize) -> Self {
        Self {
            template,
            hash_length,
            source_maps: false,
        }
    }

    /// Plan `.map` files for script and style artifacts
    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }

    /// Whether output names embed content hashes
    pub fn cache_busting(&self) -> bool {
        self.template.has_hash()
    }

    /// Plan a single artifact
    pub fn plan(&self, artifact: &Artifact) -> Result<PlannedOutput> {
        let custom;
        let template = match &artifact.filename {
            Some(filename) => {
                custom = FilenameTemplate::parse(filename)?;
                &custom
            }
            None => &self.template,
        };

        let id = &artifact.source;
        let source_ext = id.extension();
        // A stage that changed the content type also changes the extension
        let ext = if AssetType::from_extension(source_ext) == artifact.asset_type {
            source_ext
        } else {
            artifact.asset_type.default_extension().unwrap_or(source_ext)
        };

        let path = template.render(&TemplateVars {
            name: id.stem(),
            ext,
            dir: id.dir(),
            hash: &artifact.hash,
            hash_length: self.hash_length,
        });
        if path.is_empty() {
            return Err(Error::InvalidTemplate {
                template: template.as_str().to_string(),
                message: format!("renders an empty path for {id}"),
            });
        }

        let source_map = (self.source_maps && artifact.wants_source_map()).then(|| format!("{path}.map"));
        Ok(PlannedOutput {
            source: id.clone(),
            path,
            source_map,
        })
    }

    /// Link and plan every artifact, failing on the first two that share a path
    ///
    /// Artifacts must be leaves first, so each reference is planned before the
    /// artifact that uses it. Local specifiers are rewritten to the planned
    /// output paths before the final hash is taken, and a script's bare import
    /// of an extracted stylesheet is removed (the page links it instead).
    pub fn plan_all(&self, artifacts: &mut [Artifact]) -> Result<Vec<PlannedOutput>> {
        let mut claimed: HashMap<String, AssetId> = HashMap::new();
        let mut linked: HashMap<AssetId, Linked> = HashMap::new();
        let mut planned = Vec::with_capacity(artifacts.len());

        for artifact in artifacts.iter_mut() {
            let output = self.link(artifact, &linked)?;
            let paths = std::iter::once(&output.path).chain(output.source_map.as_ref());
            for path in paths {
                if let Some(first) = claimed.get(path) {
                    return Err(Error::OutputCollision {
                        path: path.clone(),
                        first: first.to_string(),
                        second: output.source.to_string(),
                    });
                }
                claimed.insert(path.clone(), output.source.clone());
            }
            tracing::debug!(asset = %output.source, path = %output.path, "planned output");
            linked.insert(
                output.source.clone(),
                Linked {
                    path: output.path.clone(),
                    extracted: artifact.extracted,
                },
            );
            planned.push(output);
        }
        Ok(planned)
    }

    fn link(
        &self,
        artifact: &mut Artifact,
        linked: &HashMap<AssetId, Linked>,
    ) -> Result<PlannedOutput> {
        let provisional = self.plan(artifact)?;
        let dir = parent_dir(&provisional.path).to_string();
        let Some(bytes) = linked_bytes(artifact, linked, Some(&dir)) else {
            return Ok(provisional);
        };

        let unlinked = artifact.set_bytes(bytes);
        let output = self.plan(artifact)?;
        if parent_dir(&output.path) == dir {
            return Ok(output);
        }

        // The hash sits in a directory segment, so relative links would move
        // with it; fall back to links from the output root
        artifact.set_bytes(unlinked);
        if let Some(bytes) = linked_bytes(artifact, linked, None) {
            artifact.set_bytes(bytes);
        }
        self.plan(artifact)
    }
}

/// Output of an artifact that has already been planned
struct Linked {
    path: String,
    extracted: bool,
}

/// Artifact bytes with references pointed at planned outputs
///
/// `from_dir` is the artifact's own output directory; `None` writes every
/// link relative to the output root.
fn linked_bytes(
    artifact: &Artifact,
    linked: &HashMap<AssetId, Linked>,
    from_dir: Option<&str>,
) -> Option<Vec<u8>> {
    let linkable = matches!(
        artifact.asset_type,
        AssetType::Script | AssetType::Style | AssetType::Markup
    );
    if !linkable || artifact.links.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(&artifact.bytes).ok()?;
    let target = |spec: &str| artifact.links.get(spec).and_then(|id| linked.get(id));

    let text = if artifact.asset_type == AssetType::Script {
        references::drop_imports(text, |spec| target(spec).is_some_and(|t| t.extracted))
    } else {
        text.to_string()
    };
    let text = references::rewrite(&text, |spec| {
        let output = target(spec)?;
        Some(match from_dir {
            Some(dir) if !spec.starts_with('/') => relative_path(dir, &output.path),
            _ => format!("/{}", output.path),
        })
    });
    Some(text.into_bytes())
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Path of `to` as seen from directory `from_dir`, both relative to the output root
fn relative_path(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to.split('/').collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count()
        .min(to.len() - 1);

    let mut out = if common == from.len() {
        "./".to_string()
    } else {
        "../".repeat(from.len() - common)
    };
    out.push_str(&to[common..].join("/"));
    out
}
