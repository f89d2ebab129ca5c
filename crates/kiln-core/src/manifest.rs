//! Source-to-output mapping for a build
//!
//! The manifest is filled by a single writer while artifacts are planned and
//! frozen once every asset has an entry. Only `outputPath`, `hash` and `type`
//! are persisted; the remaining fields describe the build in memory for
//! post-build plugins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::asset::{AssetId, AssetType};
use crate::error::{Error, Result};

/// Where one asset ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Path relative to the output directory, forward slashes
    pub output_path: String,

    /// Content hash of the written bytes
    pub hash: String,

    /// Output type
    #[serde(rename = "type")]
    pub asset_type: AssetType,

    /// Extracted stylesheet
    #[serde(skip)]
    pub extracted: bool,

    /// Written size in bytes
    #[serde(skip)]
    pub size: u64,
}

/// Frozen manifest, read-only once the build completes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entry: Option<AssetId>,
    assets: BTreeMap<AssetId, ManifestEntry>,
}

impl Manifest {
    /// Id of the entry point, when built in this process
    pub fn entry(&self) -> Option<&AssetId> {
        self.entry.as_ref()
    }

    /// Manifest entry for the entry point
    pub fn entry_output(&self) -> Option<&ManifestEntry> {
        self.entry.as_ref().and_then(|id| self.assets.get(id))
    }

    /// Look up one asset
    pub fn get(&self, id: &AssetId) -> Option<&ManifestEntry> {
        self.assets.get(id)
    }

    /// All entries, sorted by source id
    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &ManifestEntry)> {
        self.assets.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the manifest is empty
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Entries of a given output type, sorted by source id
    pub fn of_type(&self, asset_type: AssetType) -> impl Iterator<Item = &ManifestEntry> {
        self.assets
            .values()
            .filter(move |e| e.asset_type == asset_type)
    }

    /// Serialize to the persisted JSON shape
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.assets)?)
    }

    /// Parse a persisted manifest; in-memory fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let assets = serde_json::from_str(json)?;
        Ok(Self {
            entry: None,
            assets,
        })
    }
}

/// Single-writer builder that freezes into a [`Manifest`]
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    entry: Option<AssetId>,
    assets: BTreeMap<AssetId, ManifestEntry>,
}

impl ManifestBuilder {
    /// Start a manifest for the given entry point
    pub fn new(entry: AssetId) -> Self {
        Self {
            entry: Some(entry),
            assets: BTreeMap::new(),
        }
    }

    /// Record an asset; each source may be recorded once
    pub fn insert(&mut self, id: AssetId, entry: ManifestEntry) -> Result<()> {
        if self.assets.contains_key(&id) {
            return Err(Error::invalid(format!("asset '{id}' was planned twice")));
        }
        self.assets.insert(id, entry);
        Ok(())
    }

    /// Number of recorded assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Freeze the manifest
    pub fn finish(self) -> Manifest {
        Manifest {
            entry: self.entry,
            assets: self.assets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, asset_type: AssetType) -> ManifestEntry {
        ManifestEntry {
            output_path: path.to_string(),
            hash: "abc123".to_string(),
            asset_type,
            extracted: false,
            size: 3,
        }
    }

    #[test]
    fn test_builder_rejects_duplicate_source() {
        let mut builder = ManifestBuilder::new(AssetId::from("src/index.js"));
        builder
            .insert("src/index.js".into(), entry("index.js", AssetType::Script))
            .unwrap();
        assert!(builder
            .insert("src/index.js".into(), entry("other.js", AssetType::Script))
            .is_err());
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_json_shape_is_stable() {
        let mut builder = ManifestBuilder::new(AssetId::from("src/index.js"));
        builder
            .insert("src/style.css".into(), entry("style.css", AssetType::Style))
            .unwrap();
        builder
            .insert("src/index.js".into(), entry("index.js", AssetType::Script))
            .unwrap();
        let manifest = builder.finish();

        let json: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "src/index.js": {"outputPath": "index.js", "hash": "abc123", "type": "script"},
                "src/style.css": {"outputPath": "style.css", "hash": "abc123", "type": "style"},
            })
        );
        assert_eq!(manifest.entry_output().unwrap().output_path, "index.js");
    }

    #[test]
    fn test_from_json_roundtrips_persisted_fields() {
        let mut builder = ManifestBuilder::new(AssetId::from("a.js"));
        builder
            .insert("a.js".into(), entry("a.js", AssetType::Script))
            .unwrap();
        let manifest = builder.finish();

        let parsed = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
        let e = parsed.get(&AssetId::from("a.js")).unwrap();
        assert_eq!(e.output_path, "a.js");
        assert_eq!(e.size, 0);
        assert!(parsed.entry().is_none());
    }

    #[test]
    fn test_of_type_filters() {
        let mut builder = ManifestBuilder::default();
        builder
            .insert("a.css".into(), entry("a.css", AssetType::Style))
            .unwrap();
        builder
            .insert("b.js".into(), entry("b.js", AssetType::Script))
            .unwrap();
        let manifest = builder.finish();
        let styles: Vec<_> = manifest.of_type(AssetType::Style).collect();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles[0].output_path, "a.css");
    }
}
