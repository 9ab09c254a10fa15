//! Parameter and layer selection
//!
//! A selector is either a sentinel or a list of exact names and `re:`
//! regular expressions. It is resolved once against the engine into a
//! concrete, ordered list of names.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::TensorEngine;
use crate::error::{PruneError, Result};

/// Sentinel selecting every parameter or layer.
pub const ALL_TOKEN: &str = "__ALL__";

/// Sentinel selecting every prunable parameter or layer.
pub const ALL_PRUNABLE_TOKEN: &str = "__ALL_PRUNABLE__";

/// Prefix marking a regular expression pattern.
pub const REGEX_PREFIX: &str = "re:";

/// Which parameters (or layers) a modifier applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ParamsRepr", into = "ParamsRepr")]
pub enum ParamSelector {
    /// Every parameter.
    All,
    /// Every parameter the engine reports as prunable.
    AllPrunable,
    /// Exact names and `re:` patterns.
    Patterns(Vec<String>),
}

impl ParamSelector {
    /// Build a pattern selector, validating every entry.
    pub fn patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamSelector::try_from(ParamsRepr::Many(patterns.into_iter().map(Into::into).collect()))
    }

    /// Resolve against the engine's parameters.
    pub fn resolve_parameters(&self, engine: &dyn TensorEngine) -> Result<Vec<String>> {
        let candidates: Vec<(String, bool)> =
            engine.parameters().into_iter().map(|p| (p.name, p.prunable)).collect();
        self.resolve(&candidates, "parameters")
    }

    /// Resolve against the engine's layers.
    pub fn resolve_layers(&self, engine: &dyn TensorEngine) -> Result<Vec<String>> {
        let candidates: Vec<(String, bool)> =
            engine.layers().into_iter().map(|l| (l.name, l.prunable)).collect();
        self.resolve(&candidates, "layers")
    }

    /// Resolve against `(name, prunable)` candidates, keeping candidate order.
    ///
    /// # Errors
    ///
    /// - `ParameterNotFound` when an explicit name or pattern matches nothing
    /// - `Config` when a sentinel matches nothing
    pub fn resolve(&self, candidates: &[(String, bool)], kind: &str) -> Result<Vec<String>> {
        let resolved: Vec<String> = match self {
            ParamSelector::All => candidates.iter().map(|(n, _)| n.clone()).collect(),
            ParamSelector::AllPrunable => {
                candidates.iter().filter(|(_, p)| *p).map(|(n, _)| n.clone()).collect()
            }
            ParamSelector::Patterns(patterns) => {
                let compiled = patterns
                    .iter()
                    .map(|p| NamePattern::parse(p))
                    .collect::<Result<Vec<_>>>()?;
                for pattern in &compiled {
                    if !candidates.iter().any(|(n, _)| pattern.matches(n)) {
                        return Err(PruneError::parameter_not_found(pattern.source()));
                    }
                }
                candidates
                    .iter()
                    .filter(|(n, _)| compiled.iter().any(|p| p.matches(n)))
                    .map(|(n, _)| n.clone())
                    .collect()
            }
        };

        if resolved.is_empty() {
            return Err(PruneError::config(format!("selector {self} matched no {kind}")));
        }
        Ok(resolved)
    }
}

impl std::fmt::Display for ParamSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamSelector::All => f.write_str(ALL_TOKEN),
            ParamSelector::AllPrunable => f.write_str(ALL_PRUNABLE_TOKEN),
            ParamSelector::Patterns(p) => write!(f, "{p:?}"),
        }
    }
}

/// Wire form of [`ParamSelector`]: one string or a list of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamsRepr {
    /// Single name, pattern, or sentinel.
    One(String),
    /// List of names and patterns.
    Many(Vec<String>),
}

impl TryFrom<ParamsRepr> for ParamSelector {
    type Error = PruneError;

    fn try_from(repr: ParamsRepr) -> Result<Self> {
        let entries = match repr {
            ParamsRepr::One(s) => vec![s],
            ParamsRepr::Many(v) => v,
        };
        match entries.as_slice() {
            [] => Err(PruneError::config("params must name at least one parameter")),
            [only] if only == ALL_TOKEN => Ok(ParamSelector::All),
            [only] if only == ALL_PRUNABLE_TOKEN => Ok(ParamSelector::AllPrunable),
            many => {
                if many.iter().any(|e| e == ALL_TOKEN || e == ALL_PRUNABLE_TOKEN) {
                    return Err(PruneError::config(format!(
                        "sentinels {ALL_TOKEN} / {ALL_PRUNABLE_TOKEN} cannot be mixed with names: {many:?}"
                    )));
                }
                for entry in many {
                    NamePattern::parse(entry)?;
                }
                Ok(ParamSelector::Patterns(many.to_vec()))
            }
        }
    }
}

impl From<ParamSelector> for ParamsRepr {
    fn from(selector: ParamSelector) -> Self {
        match selector {
            ParamSelector::All => ParamsRepr::One(ALL_TOKEN.to_string()),
            ParamSelector::AllPrunable => ParamsRepr::One(ALL_PRUNABLE_TOKEN.to_string()),
            ParamSelector::Patterns(p) => ParamsRepr::Many(p),
        }
    }
}

enum NamePattern<'a> {
    Exact(&'a str),
    Regex(&'a str, Regex),
}

impl<'a> NamePattern<'a> {
    fn parse(source: &'a str) -> Result<Self> {
        match source.strip_prefix(REGEX_PREFIX) {
            // anchored at the start of the name only
            Some(expr) => Regex::new(&format!("^(?:{expr})"))
                .map(|re| NamePattern::Regex(source, re))
                .map_err(|e| PruneError::config(format!("invalid pattern '{source}': {e}"))),
            None => Ok(NamePattern::Exact(source)),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Exact(exact) => *exact == name,
            NamePattern::Regex(_, re) => re.is_match(name),
        }
    }

    fn source(&self) -> &str {
        match self {
            NamePattern::Exact(s) | NamePattern::Regex(s, _) => s,
        }
    }
}
