//! Config resolution: profile defaults plus cascading override rules.
//!
//! Effective configuration for a flow invocation starts from the flow's
//! declared profile defaults. Every registered override rule whose flow and
//! profile patterns match is then deep-merged on top, least specific first,
//! so the most specific rule wins any conflict. Rules with equal rank apply in
//! registration order.

use crate::registry::{FlowDefinition, PathRegistry};
use crate::specificity::Rank;
use crate::value::deep_merge;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Profile used when none is requested.
pub const DEFAULT_PROFILE: &str = "$default";
/// Key of the parameter tree inside override patches.
pub const PARAMS_KEY: &str = "params";
/// Key of the CLI-binding defaults inside override patches.
pub const CLI_KEY: &str = "cli";

/// Errors that can occur during config resolution.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No flow is registered at the requested path.
    #[error("Flow not found: {path}")]
    NotFound { path: String },
    /// An override rule pattern failed to compile.
    #[error("Invalid pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// A pattern-scoped patch applied during config resolution.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    /// Glob over dotted flow paths.
    pub flow_pattern: String,
    /// Glob over profile names.
    pub profile_pattern: String,
    /// Patch of shape `{"params": {...}, "cli": {...}}`.
    pub config: Value,
    flow_glob: glob::Pattern,
    profile_glob: glob::Pattern,
    rank: Rank,
}

impl OverrideRule {
    /// Compiles a rule from its patterns and patch.
    pub fn new(flow_pattern: &str, profile_pattern: &str, config: Value) -> Result<Self, Error> {
        let compile = |pattern: &str| {
            glob::Pattern::new(&collapse_stars(pattern)).map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source: e,
            })
        };
        Ok(Self {
            flow_pattern: flow_pattern.to_string(),
            profile_pattern: profile_pattern.to_string(),
            flow_glob: compile(flow_pattern)?,
            profile_glob: compile(profile_pattern)?,
            rank: Rank::new(flow_pattern, profile_pattern),
            config,
        })
    }

    /// Whether the rule applies to the flow path and profile.
    pub fn matches(&self, flow_path: &str, profile: &str) -> bool {
        self.flow_glob.matches(flow_path) && self.profile_glob.matches(profile)
    }

    /// Specificity rank of this rule.
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

/// Append-only list of override rules in registration order.
#[derive(Debug, Clone, Default)]
pub struct OverrideRules {
    rules: Vec<OverrideRule>,
}

impl OverrideRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a compiled rule.
    pub fn push(&mut self, rule: OverrideRule) {
        debug!(
            flow = %rule.flow_pattern,
            profile = %rule.profile_pattern,
            rank = rule.rank.combined(),
            "Override rule registered"
        );
        self.rules.push(rule);
    }

    /// Compiles and appends a rule.
    pub fn register(
        &mut self,
        flow_pattern: &str,
        profile_pattern: &str,
        config: Value,
    ) -> Result<(), Error> {
        self.push(OverrideRule::new(flow_pattern, profile_pattern, config)?);
        Ok(())
    }

    /// Matching rules sorted by ascending rank; ties keep registration order.
    pub fn matching(&self, flow_path: &str, profile: &str) -> Vec<&OverrideRule> {
        let mut matched: Vec<&OverrideRule> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(flow_path, profile))
            .collect();
        matched.sort_by(|a, b| a.rank.total_cmp(&b.rank));
        matched
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Effective configuration of one flow invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Merged parameter tree.
    pub params: Value,
    /// Resolved CLI-binding defaults, e.g. `{"logger": "/tmp/log"}`.
    pub cli: Map<String, Value>,
}

/// Computes the effective configuration of a registered flow.
///
/// Pure with respect to its inputs: the same registry and rules always yield
/// the same result.
pub fn resolve_config(
    registry: &PathRegistry,
    rules: &OverrideRules,
    flow_path: &str,
    profile: &str,
) -> Result<ResolvedConfig, Error> {
    let definition = registry.get(flow_path).ok_or_else(|| Error::NotFound {
        path: flow_path.to_string(),
    })?;
    Ok(resolve_definition(&definition, rules, profile))
}

/// Computes the effective configuration of an already looked up flow.
pub fn resolve_definition(
    definition: &FlowDefinition,
    rules: &OverrideRules,
    profile: &str,
) -> ResolvedConfig {
    let seed = definition
        .metadata
        .profiles
        .get(profile)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    let mut accumulator = json!({ PARAMS_KEY: seed, CLI_KEY: {} });

    for rule in rules.matching(&definition.path, profile) {
        debug!(
            flow = %definition.path,
            profile,
            pattern = %rule.flow_pattern,
            profile_pattern = %rule.profile_pattern,
            "Applying override rule"
        );
        let mut patch = Map::new();
        for key in [PARAMS_KEY, CLI_KEY] {
            if let Some(value) = rule.config.get(key) {
                patch.insert(key.to_string(), value.clone());
            }
        }
        deep_merge(&mut accumulator, &Value::Object(patch));
    }

    let mut map = match accumulator {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let params = map
        .remove(PARAMS_KEY)
        .unwrap_or_else(|| Value::Object(Map::new()));
    let cli = match map.remove(CLI_KEY) {
        Some(Value::Object(cli)) => cli,
        _ => Map::new(),
    };
    ResolvedConfig { params, cli }
}

/// Collapses runs of `*` into one. Dotted paths have no separator for `**`
/// to span, and `*` already matches dots.
fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c == '*' && out.ends_with('*') {
            continue;
        }
        out.push(c);
    }
    out
}
