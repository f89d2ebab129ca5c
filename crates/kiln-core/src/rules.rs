//! Rule matching
//!
//! Rules map assets to the stages that transform them. They are evaluated in
//! declaration order; the [`MatchPolicy`] decides whether the first match
//! wins or every match contributes its stages.
//!
//! # Example
//!
//! ```yaml
//! match_policy: first
//! rules:
//!   - test: '(?i)\.css$'
//!     stages:
//!       - css-extract
//!       - css
//!       - name: autoprefix
//!         options:
//!           vendor_prefixes: ["-webkit-"]
//!   - test: '\.(png|jpg|gif|svg|jpeg)$'
//!     type: image
//!     stages: [resource]
//!   - test: '\.m?js$'
//!     exclude: node_modules
//!     stages: [script]
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::asset::{Asset, AssetType};
use crate::error::{Error, Result};
use crate::stage::StageOptions;

/// How multiple matching rules combine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Only the first matching rule applies
    #[default]
    First,
    /// Every matching rule applies, stages concatenated in rule order
    All,
}

/// Reference to a stage inside a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageRef {
    /// Bare stage name
    Name(String),

    /// Stage with inline options
    Detailed {
        /// Registered stage name
        name: String,
        /// Options passed to the stage
        #[serde(default)]
        options: StageOptions,
        /// Retry budget, honoured only by stages that declare themselves transient
        #[serde(default)]
        retries: u32,
    },
}

impl StageRef {
    /// Stage name
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }
}

/// Rule as written in `kiln.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regex tested against the asset id
    #[serde(default)]
    pub test: Option<String>,

    /// Regex that excludes otherwise matching assets
    #[serde(default)]
    pub exclude: Option<String>,

    /// Restrict the rule to assets of these inferred types
    #[serde(default)]
    pub types: Vec<AssetType>,

    /// Re-tag matching assets with this type before stages run
    #[serde(default, rename = "type")]
    pub asset_type: Option<AssetType>,

    /// Output filename template overriding the global one
    #[serde(default)]
    pub filename: Option<String>,

    /// Stages to apply, in order
    #[serde(default)]
    pub stages: Vec<StageRef>,

    /// Options keyed by stage name; inline options take precedence
    #[serde(default)]
    pub options: HashMap<String, StageOptions>,
}

/// A stage bound to its effective options
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// Registered stage name
    pub name: String,
    /// Merged options
    pub options: StageOptions,
    /// Retry budget for transient stages
    pub retries: u32,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    index: usize,
    test: Option<Regex>,
    exclude: Option<Regex>,
    types: Vec<AssetType>,
    asset_type: Option<AssetType>,
    filename: Option<String>,
    stages: Vec<StageSpec>,
}

impl Rule {
    /// Compile a rule; `index` is its position in the config
    pub fn compile(index: usize, config: &RuleConfig) -> Result<Self> {
        if config.test.is_none() && config.types.is_empty() {
            return Err(Error::invalid(format!(
                "rule #{index} needs a 'test' pattern or a 'types' list"
            )));
        }

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                Error::invalid(format!("rule #{index}: invalid pattern '{pattern}': {e}"))
            })
        };

        let stages = config
            .stages
            .iter()
            .map(|stage_ref| {
                let mut options = config
                    .options
                    .get(stage_ref.name())
                    .cloned()
                    .unwrap_or_default();
                let retries = match stage_ref {
                    StageRef::Name(_) => 0,
                    StageRef::Detailed {
                        options: inline,
                        retries,
                        ..
                    } => {
                        options.extend(inline.clone());
                        *retries
                    }
                };
                StageSpec {
                    name: stage_ref.name().to_string(),
                    options,
                    retries,
                }
            })
            .collect();

        Ok(Self {
            index,
            test: config.test.as_deref().map(compile).transpose()?,
            exclude: config.exclude.as_deref().map(compile).transpose()?,
            types: config.types.clone(),
            asset_type: config.asset_type,
            filename: config.filename.clone(),
            stages,
        })
    }

    /// Whether the rule applies to `asset`
    pub fn matches(&self, asset: &Asset) -> bool {
        let id = asset.id.as_str();
        if !self.types.is_empty() && !self.types.contains(&asset.asset_type) {
            return false;
        }
        if self.test.as_ref().is_some_and(|test| !test.is_match(id)) {
            return false;
        }
        !self.exclude.as_ref().is_some_and(|ex| ex.is_match(id))
    }

    /// Position of the rule in the config
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stages of this rule
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }
}

/// Outcome of matching an asset against the rule set
#[derive(Debug, Clone, PartialEq)]
pub enum RuleMatch {
    /// No rule applies; the asset is emitted byte-for-byte
    Passthrough,
    /// At least one rule applies
    Matched(MatchedRules),
}

/// Stages and output settings collected from matching rules
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRules {
    /// Indices of the rules that matched, in order
    pub rules: Vec<usize>,
    /// Stage chain, in application order
    pub stages: Vec<StageSpec>,
    /// Type override from a rule's `type`
    pub asset_type: Option<AssetType>,
    /// Filename template override from a rule's `filename`
    pub filename: Option<String>,
}

impl RuleMatch {
    /// The stage chain (empty for pass-through)
    pub fn stages(&self) -> &[StageSpec] {
        match self {
            Self::Passthrough => &[],
            Self::Matched(m) => &m.stages,
        }
    }

    /// Filename template override, if any rule set one
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Passthrough => None,
            Self::Matched(m) => m.filename.as_deref(),
        }
    }

    /// Type override, if any rule set one
    pub fn asset_type(&self) -> Option<AssetType> {
        match self {
            Self::Passthrough => None,
            Self::Matched(m) => m.asset_type,
        }
    }
}

/// Ordered rules plus the policy used to combine them
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    policy: MatchPolicy,
}

impl RuleSet {
    /// Compile rule configs in declaration order
    pub fn compile(configs: &[RuleConfig], policy: MatchPolicy) -> Result<Self> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Rule::compile(i, c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, policy })
    }

    /// The compiled rules
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Active match policy
    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Find the stage chain for `asset`
    ///
    /// Under [`MatchPolicy::All`], two matching rules that set different
    /// `type` or `filename` values are a configuration error rather than a
    /// silent override.
    pub fn match_asset(&self, asset: &Asset) -> Result<RuleMatch> {
        let mut matched: Option<MatchedRules> = None;

        for rule in self.rules.iter().filter(|r| r.matches(asset)) {
            let acc = match matched.as_mut() {
                Some(acc) => acc,
                None => {
                    matched = Some(MatchedRules {
                        rules: vec![rule.index],
                        stages: rule.stages.clone(),
                        asset_type: rule.asset_type,
                        filename: rule.filename.clone(),
                    });
                    if self.policy == MatchPolicy::First {
                        break;
                    }
                    continue;
                }
            };

            let first = acc.rules[0];
            acc.asset_type = merge_setting(acc.asset_type.take(), rule.asset_type, || {
                format!(
                    "rules #{first} and #{} set different types for {}",
                    rule.index, asset.id
                )
            })?;
            acc.filename = merge_setting(acc.filename.take(), rule.filename.clone(), || {
                format!(
                    "rules #{first} and #{} set different filenames for {}",
                    rule.index, asset.id
                )
            })?;
            acc.rules.push(rule.index);
            acc.stages.extend(rule.stages.iter().cloned());
        }

        Ok(match matched {
            Some(m) => RuleMatch::Matched(m),
            None => {
                tracing::debug!(asset = %asset.id, "no rule matched, passing through unchanged");
                RuleMatch::Passthrough
            }
        })
    }
}

fn merge_setting<T: PartialEq>(
    current: Option<T>,
    next: Option<T>,
    conflict: impl FnOnce() -> String,
) -> Result<Option<T>> {
    match (current, next) {
        (Some(a), Some(b)) if a != b => Err(Error::invalid(conflict())),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetId;
    use serde_json::json;
    use std::path::PathBuf;

    fn asset(id: &str) -> Asset {
        Asset::new(AssetId::from(id), PathBuf::from(id), Vec::new())
    }

    fn rules(yaml: &str, policy: MatchPolicy) -> RuleSet {
        let configs: Vec<RuleConfig> = serde_yaml::from_str(yaml).unwrap();
        RuleSet::compile(&configs, policy).unwrap()
    }

    fn names(m: &RuleMatch) -> Vec<&str> {
        m.stages().iter().map(|s| s.name.as_str()).collect()
    }

    const TWO_STYLE_RULES: &str = r#"
- test: '\.css$'
  stages: [css-extract, css]
- types: [style]
  stages: [autoprefix]
"#;

    #[test]
    fn test_first_policy_stops_at_first_match() {
        let set = rules(TWO_STYLE_RULES, MatchPolicy::First);
        let m = set.match_asset(&asset("src/a.css")).unwrap();
        assert_eq!(names(&m), vec!["css-extract", "css"]);
    }

    #[test]
    fn test_all_policy_concatenates_in_rule_order() {
        let set = rules(TWO_STYLE_RULES, MatchPolicy::All);
        let m = set.match_asset(&asset("src/a.css")).unwrap();
        assert_eq!(names(&m), vec!["css-extract", "css", "autoprefix"]);
        match m {
            RuleMatch::Matched(m) => assert_eq!(m.rules, vec![0, 1]),
            RuleMatch::Passthrough => panic!("Expected matched rules"),
        }
    }

    #[test]
    fn test_unmatched_asset_is_explicit_passthrough() {
        let set = rules(TWO_STYLE_RULES, MatchPolicy::All);
        let m = set.match_asset(&asset("src/font.woff2")).unwrap();
        assert_eq!(m, RuleMatch::Passthrough);
        assert!(m.stages().is_empty());
    }

    #[test]
    fn test_exclude_pattern() {
        let set = rules(
            r#"
- test: '\.m?js$'
  exclude: node_modules
  stages: [script]
"#,
            MatchPolicy::First,
        );
        assert_eq!(
            names(&set.match_asset(&asset("src/app.mjs")).unwrap()),
            vec!["script"]
        );
        assert_eq!(
            set.match_asset(&asset("node_modules/lib/index.js")).unwrap(),
            RuleMatch::Passthrough
        );
    }

    #[test]
    fn test_inline_options_override_rule_options() {
        let set = rules(
            r#"
- test: '\.css$'
  options:
    autoprefix:
      vendor_prefixes: ["-moz-"]
      properties: [color]
  stages:
    - name: autoprefix
      options:
        vendor_prefixes: ["-webkit-"]
"#,
            MatchPolicy::First,
        );
        let m = set.match_asset(&asset("a.css")).unwrap();
        let spec = &m.stages()[0];
        assert_eq!(spec.options["vendor_prefixes"], json!(["-webkit-"]));
        assert_eq!(spec.options["properties"], json!(["color"]));
    }

    #[test]
    fn test_all_policy_rejects_conflicting_filenames() {
        let set = rules(
            r#"
- test: '\.css$'
  filename: "[name].css"
- types: [style]
  filename: "[name].[hash].css"
"#,
            MatchPolicy::All,
        );
        let err = set.match_asset(&asset("a.css")).unwrap_err();
        assert!(err.to_string().contains("different filenames"));
    }

    #[test]
    fn test_all_policy_allows_agreeing_settings() {
        let set = rules(
            r#"
- test: '\.svg$'
  type: image
- test: 'icons/'
  type: image
  filename: "icons/[name].[ext]"
"#,
            MatchPolicy::All,
        );
        let m = set.match_asset(&asset("icons/a.svg")).unwrap();
        assert_eq!(m.asset_type(), Some(AssetType::Image));
        assert_eq!(m.filename(), Some("icons/[name].[ext]"));
    }

    #[test]
    fn test_rule_without_predicate_is_rejected() {
        let configs: Vec<RuleConfig> = serde_yaml::from_str("- stages: [css]").unwrap();
        assert!(RuleSet::compile(&configs, MatchPolicy::First).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let configs: Vec<RuleConfig> = serde_yaml::from_str("- test: '[oops'").unwrap();
        let err = RuleSet::compile(&configs, MatchPolicy::First).unwrap_err();
        assert!(err.to_string().contains("rule #0"));
    }
}
