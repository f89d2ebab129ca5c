//! Assets discovered from the entry point
//!
//! An asset is identified by its path relative to the project root, written
//! with forward slashes so ids are stable across platforms.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Canonical identity of an asset (project-relative path)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Build an id from a path under `root`
    ///
    /// Returns `None` when `path` is not inside `root`.
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem (`src/index.js` -> `index`)
    pub fn stem(&self) -> &str {
        let file = self.file_name();
        match file.rfind('.') {
            Some(0) | None => file,
            Some(idx) => &file[..idx],
        }
    }

    /// Extension without the dot, empty when there is none
    pub fn extension(&self) -> &str {
        let file = self.file_name();
        match file.rfind('.') {
            Some(0) | None => "",
            Some(idx) => &file[idx + 1..],
        }
    }

    /// Directory part of the id, empty for top-level files
    pub fn dir(&self) -> &str {
        self.0.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
    }

    fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, f)| f).unwrap_or(&self.0)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content type of an asset or of a stage's input/output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// JavaScript
    Script,
    /// CSS
    Style,
    /// Raster or vector images
    Image,
    /// HTML documents
    Markup,
    /// JSON data
    Data,
    /// Anything else, emitted as-is
    Binary,
}

impl AssetType {
    /// Infer the type from a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Self::Script,
            "css" => Self::Style,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" => Self::Image,
            "html" | "htm" => Self::Markup,
            "json" => Self::Data,
            _ => Self::Binary,
        }
    }

    /// Lowercase name, as used in the manifest
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::Image => "image",
            Self::Markup => "markup",
            Self::Data => "data",
            Self::Binary => "binary",
        }
    }

    /// Whether the content is text that can carry a source map
    pub fn is_text(self) -> bool {
        matches!(self, Self::Script | Self::Style | Self::Markup | Self::Data)
    }

    /// Default extension used when a stage changes the type
    pub fn default_extension(self) -> Option<&'static str> {
        match self {
            Self::Script => Some("js"),
            Self::Style => Some("css"),
            Self::Markup => Some("html"),
            Self::Data => Some("json"),
            Self::Image | Self::Binary => None,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete input file tracked by the pipeline
///
/// Immutable once read; content is shared so assets can move into worker
/// tasks without copying.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Canonical identity
    pub id: AssetId,

    /// Absolute path on disk
    pub path: PathBuf,

    /// Raw bytes as read during resolution
    pub content: Arc<[u8]>,

    /// Declared type (inferred from extension)
    pub asset_type: AssetType,

    /// Outgoing references, in source order, deduplicated
    pub references: Vec<AssetId>,

    /// Specifier as written (query and fragment dropped) to the asset it names
    pub links: BTreeMap<String, AssetId>,
}

impl Asset {
    /// Create an asset with its type inferred from the id's extension
    pub fn new(id: AssetId, path: PathBuf, content: impl Into<Arc<[u8]>>) -> Self {
        let asset_type = AssetType::from_extension(id.extension());
        Self {
            id,
            path,
            content: content.into(),
            asset_type,
            references: Vec::new(),
            links: BTreeMap::new(),
        }
    }

    /// Size of the raw content in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_asset_id_from_path_uses_forward_slashes() {
        let root = Path::new("/project");
        let id = AssetId::from_path(root, &root.join("src").join("img").join("logo.png")).unwrap();
        assert_eq!(id.as_str(), "src/img/logo.png");
        assert_eq!(id.dir(), "src/img");
        assert_eq!(id.stem(), "logo");
        assert_eq!(id.extension(), "png");
    }

    #[test]
    fn test_asset_id_outside_root() {
        assert!(AssetId::from_path(Path::new("/project"), Path::new("/elsewhere/a.js")).is_none());
    }

    #[test]
    fn test_asset_id_dotfile_has_no_extension() {
        let id = AssetId::from(".babelrc");
        assert_eq!(id.stem(), ".babelrc");
        assert_eq!(id.extension(), "");
        assert_eq!(id.dir(), "");
    }

    #[rstest]
    #[case("js", AssetType::Script)]
    #[case("MJS", AssetType::Script)]
    #[case("css", AssetType::Style)]
    #[case("jpeg", AssetType::Image)]
    #[case("svg", AssetType::Image)]
    #[case("html", AssetType::Markup)]
    #[case("json", AssetType::Data)]
    #[case("woff2", AssetType::Binary)]
    fn test_type_from_extension(#[case] ext: &str, #[case] expected: AssetType) {
        assert_eq!(AssetType::from_extension(ext), expected);
    }

    #[test]
    fn test_asset_new_infers_type() {
        let asset = Asset::new(
            AssetId::from("src/style.css"),
            PathBuf::from("/p/src/style.css"),
            b".a{}".to_vec(),
        );
        assert_eq!(asset.asset_type, AssetType::Style);
        assert_eq!(asset.size(), 4);
    }
}
