//! Stylesheet stages: `css`, `autoprefix`, `css-extract` and `style-inject`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::asset::AssetType;
use crate::config::Mode;
use crate::stage::{Content, Stage, StageContext, StageFailure, StageOptions, parse_options};

/// Validates stylesheets and minifies them in production
pub struct Css;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CssOptions {
    /// Force minification on or off regardless of mode
    #[serde(default)]
    minify: Option<bool>,
}

impl Stage for Css {
    fn name(&self) -> &str {
        "css"
    }

    fn input_type(&self) -> Option<AssetType> {
        Some(AssetType::Style)
    }

    fn check_options(&self, options: &StageOptions) -> Result<(), StageFailure> {
        parse_options::<CssOptions>(options).map(|_| ())
    }

    fn apply(
        &self,
        input: Content,
        options: &StageOptions,
        ctx: &StageContext,
    ) -> Result<Content, StageFailure> {
        let opts: CssOptions = parse_options(options)?;
        let text = input.text()?;
        check_balanced(text)?;

        if !opts.minify.unwrap_or(ctx.mode == Mode::Production) {
            return Ok(input);
        }
        let minified = minify(text);
        Ok(Content {
            bytes: minified.into_bytes(),
            ..input
        })
    }
}

/// Verify `{`/`}` pairing outside strings and comments
fn check_balanced(css: &str) -> Result<(), StageFailure> {
    let mut depth = 0usize;
    let mut line = 1usize;
    let mut opened_at = Vec::new();

    for token in tokens(css) {
        match token {
            Token::Code(c) => {
                if c == '\n' {
                    line += 1;
                } else if c == '{' {
                    depth += 1;
                    opened_at.push(line);
                } else if c == '}' {
                    if depth == 0 {
                        return Err(StageFailure::new(format!(
                            "unexpected '}}' on line {line}"
                        )));
                    }
                    depth -= 1;
                    opened_at.pop();
                }
            }
            Token::Literal(s) | Token::Comment(s) => line += s.matches('\n').count(),
        }
    }

    match opened_at.last() {
        Some(open) => Err(StageFailure::new(format!(
            "unclosed '{{' opened on line {open}"
        ))),
        None => Ok(()),
    }
}

/// Strip comments and collapse whitespace, leaving strings untouched
fn minify(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut pending_space = false;

    for token in tokens(css) {
        match token {
            Token::Comment(_) => {}
            Token::Literal(s) => {
                if pending_space && needs_space(out.chars().last()) {
                    out.push(' ');
                }
                pending_space = false;
                out.push_str(s);
            }
            Token::Code(c) if c.is_whitespace() => pending_space = true,
            Token::Code(c) => {
                if matches!(c, '{' | '}' | ':' | ';' | ',' | '>') {
                    if c == '}' && out.ends_with(';') {
                        out.pop();
                    }
                } else if pending_space && needs_space(out.chars().last()) {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }
    out
}

fn needs_space(prev: Option<char>) -> bool {
    !matches!(prev, None | Some('{' | '}' | ':' | ';' | ',' | '>'))
}

enum Token<'a> {
    Code(char),
    Literal(&'a str),
    Comment(&'a str),
}

/// Split CSS into code characters, quoted strings and comments
fn tokens(css: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut chars = css.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '"' | '\'' => {
                let mut end = css.len();
                let mut escaped = false;
                for (i, d) in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if d == '\\' {
                        escaped = true;
                    } else if d == c {
                        end = i + d.len_utf8();
                        break;
                    }
                }
                out.push(Token::Literal(&css[start..end]));
            }
            '/' if chars.peek().is_some_and(|(_, n)| *n == '*') => {
                chars.next();
                let end = css[start + 2..]
                    .find("*/")
                    .map(|i| start + 2 + i + 2)
                    .unwrap_or(css.len());
                while chars.peek().is_some_and(|(i, _)| *i < end) {
                    chars.next();
                }
                out.push(Token::Comment(&css[start..end]));
            }
            _ => out.push(Token::Code(c)),
        }
    }
    out
}

/// Adds vendor-prefixed copies of declarations
pub struct Autoprefix;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AutoprefixOptions {
    #[serde(default = "default_prefixes", alias = "vendorPrefixes")]
    vendor_prefixes: Vec<String>,
    /// Properties to prefix; every property when absent
    #[serde(default)]
    properties: Option<Vec<String>>,
}

fn default_prefixes() -> Vec<String> {
    vec!["-webkit-".into(), "-moz-".into(), "-ms-".into()]
}

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{;]\s*)([A-Za-z][\w-]*)(\s*:[^;{}]*)[;}]").expect("static regex")
});

impl Stage for Autoprefix {
    fn name(&self) -> &str {
        "autoprefix"
    }

    fn input_type(&self) -> Option<AssetType> {
        Some(AssetType::Style)
    }

    fn check_options(&self, options: &StageOptions) -> Result<(), StageFailure> {
        let opts: AutoprefixOptions = parse_options(options)?;
        match opts
            .vendor_prefixes
            .iter()
            .find(|p| p.len() < 3 || !p.starts_with('-') || !p.ends_with('-'))
        {
            Some(bad) => Err(StageFailure::new(format!(
                "vendor prefix '{bad}' must look like '-webkit-'"
            ))),
            None => Ok(()),
        }
    }

    fn apply(
        &self,
        input: Content,
        options: &StageOptions,
        _ctx: &StageContext,
    ) -> Result<Content, StageFailure> {
        let opts: AutoprefixOptions = parse_options(options)?;
        let text = input.text()?;
        let prefixed = prefix_declarations(text, &opts);
        Ok(Content {
            bytes: prefixed.into_bytes(),
            ..input
        })
    }
}

fn prefix_declarations(css: &str, opts: &AutoprefixOptions) -> String {
    let wanted = |prop: &str| {
        opts.properties
            .as_ref()
            .is_none_or(|list| list.iter().any(|p| p.eq_ignore_ascii_case(prop)))
    };

    let mut out = String::with_capacity(css.len() * 2);
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = DECLARATION.captures_at(css, pos) {
        let (Some(lead), Some(prop), Some(rest)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            break;
        };
        // Resume at the terminator so it can open the next declaration
        pos = rest.end();

        if prop.as_str().starts_with('-') || !wanted(prop.as_str()) {
            continue;
        }

        out.push_str(&css[copied..lead.end()]);
        for prefix in &opts.vendor_prefixes {
            out.push_str(prefix);
            out.push_str(prop.as_str());
            out.push_str(rest.as_str());
            out.push(';');
        }
        copied = lead.end();
    }

    out.push_str(&css[copied..]);
    out
}

/// Marks a stylesheet for emission as its own linked file
pub struct CssExtract;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractOptions {
    /// Output filename template for the extracted stylesheet
    #[serde(default)]
    filename: Option<String>,
}

impl Stage for CssExtract {
    fn name(&self) -> &str {
        "css-extract"
    }

    fn input_type(&self) -> Option<AssetType> {
        Some(AssetType::Style)
    }

    fn check_options(&self, options: &StageOptions) -> Result<(), StageFailure> {
        parse_options::<ExtractOptions>(options).map(|_| ())
    }

    fn apply(
        &self,
        input: Content,
        options: &StageOptions,
        _ctx: &StageContext,
    ) -> Result<Content, StageFailure> {
        let opts: ExtractOptions = parse_options(options)?;
        Ok(Content {
            extracted: true,
            filename: opts.filename.or(input.filename.clone()),
            ..input
        })
    }
}

/// Turns a stylesheet into a script that injects it at runtime
pub struct StyleInject;

impl Stage for StyleInject {
    fn name(&self) -> &str {
        "style-inject"
    }

    fn input_type(&self) -> Option<AssetType> {
        Some(AssetType::Style)
    }

    fn output_type(&self) -> Option<AssetType> {
        Some(AssetType::Script)
    }

    fn apply(
        &self,
        input: Content,
        _options: &StageOptions,
        ctx: &StageContext,
    ) -> Result<Content, StageFailure> {
        let css = serde_json::to_string(input.text()?)
            .map_err(|e| StageFailure::new(e.to_string()))?;
        let id = serde_json::to_string(ctx.asset.as_str())
            .map_err(|e| StageFailure::new(e.to_string()))?;
        let script = format!(
            "(function () {{\n  var style = document.createElement(\"style\");\n  style.setAttribute(\"data-kiln\", {id});\n  style.textContent = {css};\n  document.head.appendChild(style);\n}})();\n"
        );
        Ok(Content {
            bytes: script.into_bytes(),
            asset_type: AssetType::Script,
            extracted: false,
            filename: input.filename,
        })
    }
}
