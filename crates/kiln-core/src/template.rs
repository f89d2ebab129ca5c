//! Output filename templates
//!
//! Supported placeholders:
//!
//! - `[name]` - source file stem
//! - `[ext]` - output extension (a preceding `.` is dropped when empty)
//! - `[dir]` - source directory relative to the project root
//! - `[hash]` / `[contenthash]` - content hash, truncated to the configured length
//! - `[hash:N]` - content hash truncated to `N` hex characters

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Name,
    Ext,
    Dir,
    Hash(Option<usize>),
}

/// A parsed filename template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    parts: Vec<Part>,
}

/// Values substituted into a template
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    /// File stem
    pub name: &'a str,
    /// Extension without the dot
    pub ext: &'a str,
    /// Directory relative to the project root
    pub dir: &'a str,
    /// Full hex content hash
    pub hash: &'a str,
    /// Length of a bare `[hash]`
    pub hash_length: usize,
}

impl FilenameTemplate {
    /// Parse a template string
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidTemplate {
            template: template.to_string(),
            message: message.to_string(),
        };

        if template.trim().is_empty() {
            return Err(invalid("template is empty"));
        }
        if template.starts_with('/') || template.split('/').any(|seg| seg == "..") {
            return Err(invalid("template must stay inside the output directory"));
        }

        let mut parts = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('[') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find(']')
                .map(|i| open + i)
                .ok_or_else(|| invalid("unclosed '['"))?;
            let placeholder = &rest[open + 1..close];
            parts.push(match placeholder {
                "name" => Part::Name,
                "ext" => Part::Ext,
                "dir" => Part::Dir,
                "hash" | "contenthash" => Part::Hash(None),
                other => match other
                    .strip_prefix("hash:")
                    .or_else(|| other.strip_prefix("contenthash:"))
                {
                    Some(n) => match n.parse::<usize>() {
                        Ok(len) if (1..=64).contains(&len) => Part::Hash(Some(len)),
                        _ => return Err(invalid("hash length must be between 1 and 64")),
                    },
                    None => {
                        return Err(invalid(&format!("unknown placeholder '[{other}]'")));
                    }
                },
            });
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            source: template.to_string(),
            parts,
        })
    }

    /// The template as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the rendered name depends on content (cache busting)
    pub fn has_hash(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Hash(_)))
    }

    /// Render a relative output path
    pub fn render(&self, vars: &TemplateVars<'_>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Name => out.push_str(vars.name),
                Part::Dir => out.push_str(vars.dir),
                Part::Ext => {
                    if vars.ext.is_empty() {
                        if out.ends_with('.') {
                            out.pop();
                        }
                    } else {
                        out.push_str(vars.ext);
                    }
                }
                Part::Hash(len) => {
                    let len = len.unwrap_or(vars.hash_length).min(vars.hash.len());
                    out.push_str(&vars.hash[..len]);
                }
            }
        }
        // An empty [dir] leaves a leading or doubled separator behind
        out.split('/')
            .filter(|seg| !seg.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn vars<'a>(name: &'a str, ext: &'a str, dir: &'a str) -> TemplateVars<'a> {
        TemplateVars {
            name,
            ext,
            dir,
            hash: HASH,
            hash_length: 8,
        }
    }

    #[rstest]
    #[case("[name].[hash].[ext]", "index.01234567.js")]
    #[case("index.[hash].css", "index.01234567.css")]
    #[case("[name].[hash:4].[ext]", "index.0123.js")]
    #[case("[name].[contenthash:12].[ext]", "index.0123456789ab.js")]
    #[case("assets/[dir]/[name].[ext]", "assets/src/lib/index.js")]
    #[case("[name].[ext]", "index.js")]
    fn test_render(#[case] template: &str, #[case] expected: &str) {
        let t = FilenameTemplate::parse(template).unwrap();
        assert_eq!(t.render(&vars("index", "js", "src/lib")), expected);
    }

    #[test]
    fn test_empty_dir_and_ext_collapse() {
        let t = FilenameTemplate::parse("[dir]/[name].[ext]").unwrap();
        assert_eq!(t.render(&vars("LICENSE", "", "")), "LICENSE");
    }

    #[test]
    fn test_has_hash() {
        assert!(FilenameTemplate::parse("[name].[hash].[ext]").unwrap().has_hash());
        assert!(!FilenameTemplate::parse("[name].[ext]").unwrap().has_hash());
    }

    #[rstest]
    #[case("")]
    #[case("[name")]
    #[case("[name].[chunkhash].js")]
    #[case("[hash:0].js")]
    #[case("[hash:99].js")]
    #[case("../[name].js")]
    #[case("/abs/[name].js")]
    fn test_invalid_templates(#[case] template: &str) {
        let err = FilenameTemplate::parse(template).unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate { .. }));
    }
}
