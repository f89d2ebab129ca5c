//! Artifacts produced by running an asset through its stage chain

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::asset::{AssetId, AssetType};
use crate::error::Result;

/// Hex-encoded SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Transformed output for one asset
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Asset this artifact was produced from
    pub source: AssetId,

    /// Final bytes
    pub bytes: Vec<u8>,

    /// Output type after the last stage
    pub asset_type: AssetType,

    /// Full content hash of `bytes`
    pub hash: String,

    /// Emitted as a standalone stylesheet the page links
    pub extracted: bool,

    /// Output template requested by the rule or a stage
    pub filename: Option<String>,

    /// Bytes as read from disk, kept for source maps
    pub original: Arc<[u8]>,

    /// Local specifiers in the bytes and the assets they name
    pub links: BTreeMap<String, AssetId>,
}

impl Artifact {
    /// Build an artifact and hash its bytes
    pub fn new(
        source: AssetId,
        bytes: Vec<u8>,
        asset_type: AssetType,
        original: Arc<[u8]>,
    ) -> Self {
        let hash = content_hash(&bytes);
        Self {
            source,
            bytes,
            asset_type,
            hash,
            extracted: false,
            filename: None,
            original,
            links: BTreeMap::new(),
        }
    }

    /// Swap in new bytes and rehash, returning the previous bytes
    pub fn set_bytes(&mut self, bytes: Vec<u8>) -> Vec<u8> {
        self.hash = content_hash(&bytes);
        std::mem::replace(&mut self.bytes, bytes)
    }

    /// Size of the output bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether a `.map` file makes sense for this artifact
    pub fn wants_source_map(&self) -> bool {
        matches!(self.asset_type, AssetType::Script | AssetType::Style)
    }

    /// Render a version 3 source map for the artifact written at `file`
    ///
    /// Unchanged content gets a line-by-line identity mapping; transformed
    /// content carries its sources without mappings.
    pub fn source_map(&self, file: &str) -> Result<Vec<u8>> {
        let original = String::from_utf8_lossy(&self.original);
        let mappings = if self.bytes.as_slice() == &*self.original {
            identity_mappings(original.lines().count())
        } else {
            String::new()
        };
        let map = SourceMap {
            version: 3,
            file,
            sources: [self.source.as_str()],
            sources_content: [original.as_ref()],
            names: [],
            mappings,
        };
        Ok(serde_json::to_vec(&map)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMap<'a> {
    version: u8,
    file: &'a str,
    sources: [&'a str; 1],
    sources_content: [&'a str; 1],
    names: [&'a str; 0],
    mappings: String,
}

// Each output line maps column 0 to column 0 of the same source line
fn identity_mappings(lines: usize) -> String {
    if lines == 0 {
        return String::new();
    }
    let mut out = String::from("AAAA");
    for _ in 1..lines {
        out.push_str(";AACA");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(bytes: &[u8], original: &[u8]) -> Artifact {
        Artifact::new(
            AssetId::from("src/app.js"),
            bytes.to_vec(),
            AssetType::Script,
            Arc::from(original),
        )
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = content_hash(b"body{}");
        assert_eq!(a, content_hash(b"body{}"));
        assert_ne!(a, content_hash(b"body{ }"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_set_bytes_rehashes() {
        let mut a = artifact(b"a()", b"a()");
        let before = a.hash.clone();
        let old = a.set_bytes(b"b()".to_vec());
        assert_eq!(old, b"a()");
        assert_eq!(a.hash, content_hash(b"b()"));
        assert_ne!(a.hash, before);
    }

    #[test]
    fn test_identity_source_map() {
        let a = artifact(b"a();\nb();\n", b"a();\nb();\n");
        let map: serde_json::Value =
            serde_json::from_slice(&a.source_map("app.1234.js").unwrap()).unwrap();
        assert_eq!(map["version"], 3);
        assert_eq!(map["file"], "app.1234.js");
        assert_eq!(map["sources"][0], "src/app.js");
        assert_eq!(map["sourcesContent"][0], "a();\nb();\n");
        assert_eq!(map["mappings"], "AAAA;AACA");
    }

    #[test]
    fn test_transformed_source_map_has_no_mappings() {
        let a = artifact(b"a();", b"// hi\na();");
        let map: serde_json::Value =
            serde_json::from_slice(&a.source_map("app.js").unwrap()).unwrap();
        assert_eq!(map["mappings"], "");
        assert_eq!(map["sourcesContent"][0], "// hi\na();");
    }

    #[test]
    fn test_only_code_gets_maps() {
        let mut a = artifact(b"x", b"x");
        assert!(a.wants_source_map());
        a.asset_type = AssetType::Image;
        assert!(!a.wants_source_map());
    }
}
