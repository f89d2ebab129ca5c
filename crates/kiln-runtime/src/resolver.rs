//! Asset resolution
//!
//! Walks the reference graph from the entry point and returns every reachable
//! asset exactly once, leaves first. A reference back onto the current walk
//! path is a cycle and fails the build before any stage runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use kiln_core::asset::normalize_path;
use kiln_core::references;
use kiln_core::{Asset, AssetId, Error, Result};

/// Extensions tried, in order, for a specifier without one
const IMPLICIT_EXTENSIONS: &[&str] = &["js", "mjs", "css"];

/// Resolves the asset graph under a project root
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
}

struct Frame {
    id: AssetId,
    next: usize,
}

impl Resolver {
    /// Create a resolver for the project rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discover every asset reachable from `entry`, in dependency order
    pub async fn resolve(&self, entry: &Path) -> Result<Vec<Asset>> {
        let root = tokio::fs::canonicalize(&self.root).await?;
        let entry_path = normalize_path(&root.join(entry));
        let entry_id = match AssetId::from_path(&root, &entry_path) {
            Some(id) if entry_path.is_file() => id,
            _ => return Err(Error::EntryNotFound { path: entry_path }),
        };

        let mut loaded: HashMap<AssetId, Asset> = HashMap::new();
        let mut done: HashSet<AssetId> = HashSet::new();
        let mut order: Vec<AssetId> = Vec::new();

        loaded.insert(entry_id.clone(), load(&root, entry_id.clone(), entry_path).await?);
        let mut stack = vec![Frame {
            id: entry_id,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let references = &loaded[&frame.id].references;
            let Some(child) = references.get(frame.next).cloned() else {
                let finished = frame.id.clone();
                stack.pop();
                tracing::debug!(asset = %finished, "resolved");
                done.insert(finished.clone());
                order.push(finished);
                continue;
            };
            frame.next += 1;

            if done.contains(&child) {
                continue;
            }
            if let Some(pos) = stack.iter().position(|f| f.id == child) {
                let mut cycle: Vec<String> = stack[pos..].iter().map(|f| f.id.to_string()).collect();
                cycle.push(child.to_string());
                return Err(Error::ReferenceCycle { cycle });
            }
            if !loaded.contains_key(&child) {
                let path = root.join(child.as_str());
                loaded.insert(child.clone(), load(&root, child.clone(), path).await?);
            }
            stack.push(Frame { id: child, next: 0 });
        }

        tracing::info!(assets = order.len(), "resolved asset graph");
        Ok(order
            .into_iter()
            .filter_map(|id| loaded.remove(&id))
            .collect())
    }
}

async fn load(root: &Path, id: AssetId, path: PathBuf) -> Result<Asset> {
    let content = tokio::fs::read(&path).await?;
    let mut asset = Asset::new(id, path, content);
    let base = asset.path.parent().unwrap_or(root).to_path_buf();

    for spec in references::scan(asset.asset_type, &asset.content) {
        let target = locate(root, &base, &spec).ok_or_else(|| Error::MissingReference {
            asset: asset.id.to_string(),
            reference: spec.clone(),
        })?;
        let Some(target_id) = AssetId::from_path(root, &target) else {
            return Err(Error::MissingReference {
                asset: asset.id.to_string(),
                reference: spec,
            });
        };
        if !asset.references.contains(&target_id) {
            asset.references.push(target_id.clone());
        }
        asset
            .links
            .insert(references::strip_suffix(&spec).to_string(), target_id);
    }
    Ok(asset)
}

/// Find the file a specifier points at
fn locate(root: &Path, base: &Path, spec: &str) -> Option<PathBuf> {
    let spec = references::strip_suffix(spec);
    let joined = match spec.strip_prefix('/') {
        Some(rooted) => root.join(rooted),
        None => base.join(spec),
    };
    let path = normalize_path(&joined);
    if !path.starts_with(root) {
        return None;
    }
    if path.is_file() {
        return Some(path);
    }
    if path.extension().is_none() {
        let implicit = IMPLICIT_EXTENSIONS
            .iter()
            .map(|ext| path.with_extension(ext))
            .chain(std::iter::once(path.join("index.js")));
        for candidate in implicit {
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
