//! Reference scanning
//!
//! Finds the specifiers an asset uses to pull in other files. Only local
//! specifiers (`./`, `../`, `/`) are reported; package imports and URLs are
//! left to the browser or runtime.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::asset::AssetType;
use crate::stages::script::remove_comments;

static SCRIPT_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)(?:^|[;\s])(?:import|export)\s*(?:[\w*{}\s,$]+\s*from\s*)?["']([^"']+)["']"#)
        .expect("static regex")
});

static SCRIPT_DYNAMIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:require|import)\s*\(\s*["']([^"']+)["']\s*\)"#).expect("static regex")
});

static STYLE_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"')\s;]+)["']?\s*\)?"#).expect("static regex")
});

static STYLE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*["']?([^"')\s]+)["']?\s*\)"#).expect("static regex"));

static MARKUP_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:src|href)\s*=\s*["']([^"']+)["']"#).expect("static regex")
});

static CSS_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static regex"));

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(["'(]\s*)(\.{0,2}/[^"'()\s?#\\]+)"#).expect("static regex")
});

static BARE_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import[ \t]*["']([^"'?#]+)[^"']*["'][ \t]*;?[ \t]*\r?\n?"#)
        .expect("static regex")
});

/// Extract local specifiers from `content`, in source order without duplicates
pub fn scan(asset_type: AssetType, content: &[u8]) -> Vec<String> {
    let Ok(text) = std::str::from_utf8(content) else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    let mut push = |spec: &str| {
        if is_local(spec) && !found.iter().any(|f| f == spec) {
            found.push(spec.to_string());
        }
    };

    match asset_type {
        AssetType::Script => {
            let text = remove_comments(text);
            let mut hits: Vec<(usize, &str)> = SCRIPT_IMPORT
                .captures_iter(&text)
                .chain(SCRIPT_DYNAMIC.captures_iter(&text))
                .filter_map(|c| c.get(1).map(|m| (m.start(), m.as_str())))
                .collect();
            hits.sort_by_key(|(pos, _)| *pos);
            hits.into_iter().for_each(|(_, s)| push(s));
        }
        AssetType::Style => {
            let text = CSS_COMMENT.replace_all(text, "");
            // @import url(x) also matches STYLE_URL; dedup takes care of it
            let mut hits: Vec<(usize, String)> = STYLE_IMPORT
                .captures_iter(&text)
                .chain(STYLE_URL.captures_iter(&text))
                .filter_map(|c| c.get(1).map(|m| (m.start(), m.as_str().to_string())))
                .collect();
            hits.sort_by_key(|(pos, _)| *pos);
            hits.iter().for_each(|(_, s)| push(s));
        }
        AssetType::Markup => {
            MARKUP_ATTR
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .for_each(|m| push(m.as_str()));
        }
        AssetType::Image | AssetType::Data | AssetType::Binary => {}
    }

    found
}

/// Replace every local specifier for which `replace` returns a new value
///
/// Specifiers are recognised after a quote or an opening parenthesis. A
/// `?query` or `#fragment` suffix is kept.
pub fn rewrite(text: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    LINK.replace_all(text, |caps: &Captures<'_>| match replace(&caps[2]) {
        Some(new) => format!("{}{new}", &caps[1]),
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Remove side-effect `import "x";` lines whose specifier `drop` selects
pub fn drop_imports(text: &str, drop: impl Fn(&str) -> bool) -> String {
    BARE_IMPORT
        .replace_all(text, |caps: &Captures<'_>| {
            if drop(&caps[1]) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Whether a specifier points at a file in the project
pub fn is_local(spec: &str) -> bool {
    if spec.starts_with("//") || spec.contains("://") || spec.starts_with("data:") {
        return false;
    }
    spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/')
}

/// Drop `?query` and `#fragment` suffixes from a specifier
pub fn strip_suffix(spec: &str) -> &str {
    let end = spec.find(['?', '#']).unwrap_or(spec.len());
    &spec[..end]
}
