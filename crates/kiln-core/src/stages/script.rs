//! `script` stage: comment and blank-line stripping for production builds

use serde::Deserialize;

use crate::asset::AssetType;
use crate::config::Mode;
use crate::stage::{Content, Stage, StageContext, StageFailure, StageOptions, parse_options};

/// Cleans up JavaScript for production
pub struct Script;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptOptions {
    #[serde(default)]
    strip_comments: Option<bool>,
}

impl Stage for Script {
    fn name(&self) -> &str {
        "script"
    }

    fn input_type(&self) -> Option<AssetType> {
        Some(AssetType::Script)
    }

    fn check_options(&self, options: &StageOptions) -> Result<(), StageFailure> {
        parse_options::<ScriptOptions>(options).map(|_| ())
    }

    fn apply(
        &self,
        input: Content,
        options: &StageOptions,
        ctx: &StageContext,
    ) -> Result<Content, StageFailure> {
        let opts: ScriptOptions = parse_options(options)?;
        if !opts.strip_comments.unwrap_or(ctx.mode == Mode::Production) {
            return Ok(input);
        }
        let stripped = strip_comments(input.text()?);
        Ok(Content {
            bytes: stripped.into_bytes(),
            ..input
        })
    }
}

fn strip_comments(src: &str) -> String {
    let code = remove_comments(src);
    let mut out: String = code
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Drop `//` and `/* */` comments, leaving string and template literals intact
pub(crate) fn remove_comments(src: &str) -> String {
    let mut code = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                code.push(c);
                let mut escaped = false;
                for d in chars.by_ref() {
                    code.push(d);
                    if escaped {
                        escaped = false;
                    } else if d == '\\' {
                        escaped = true;
                    } else if d == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|n| *n != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for d in chars.by_ref() {
                    if prev == '*' && d == '/' {
                        break;
                    }
                    prev = d;
                }
            }
            _ => code.push(c),
        }
    }
    code
}
