//! `CompilerConfig` — the dataset-specific knobs §9's Open Questions flag as
//! configuration rather than hardcoded constants: the "simple condition"
//! prefix allow/block lists, and extra operator aliases beyond the built-in
//! table.

use std::collections::HashMap;

use super::operator::{resolve_operator, OpTag};

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Field-path prefixes that disqualify a condition from the "simple"
    /// classification (§4.7) even though it would otherwise be a first-order
    /// comparison — e.g. denormalized array projections that must not be
    /// matched before the pipeline has had a chance to reshape them.
    pub simple_blocked_prefixes: Vec<String>,
    /// Field-path prefixes explicitly exempted from the scalar-only
    /// restriction in §4.7 ("the field is a scalar or a `candidate.*`
    /// sub-path").
    pub simple_allowed_prefixes: Vec<String>,
    /// Extra operator aliases, consulted before the built-in table.
    pub operator_aliases: HashMap<String, OpTag>,
    /// Whether the final (and initial) projection should omit `objectId`.
    pub exclude_object_id: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            simple_blocked_prefixes: vec!["prv_candidates".to_string(), "fp_hists".to_string()],
            simple_allowed_prefixes: vec!["candidate.".to_string()],
            operator_aliases: HashMap::new(),
            exclude_object_id: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked_prefix(&self, field: &str) -> bool {
        self.simple_blocked_prefixes
            .iter()
            .any(|p| field.starts_with(p.as_str()))
    }

    pub fn is_allowed_prefix(&self, field: &str) -> bool {
        self.simple_allowed_prefixes
            .iter()
            .any(|p| field.starts_with(p.as_str()))
    }

    /// Applies `{ simpleBlockedPrefixes?, simpleAllowedPrefixes?,
    /// excludeObjectId? }` overrides on top of [`CompilerConfig::default`]
    /// (§9's Open Question resolution: these knobs are runtime
    /// configuration, not hardcoded constants). Absent keys keep their
    /// default value; present keys replace the default wholesale rather
    /// than appending to it.
    pub fn from_overrides(raw: &serde_json::Value) -> Self {
        let mut config = Self::default();
        let Some(map) = raw.as_object() else {
            return config;
        };
        if let Some(prefixes) = map.get("simpleBlockedPrefixes").and_then(|v| v.as_array()) {
            config.simple_blocked_prefixes = prefixes.iter().filter_map(|v| v.as_str()).map(str::to_string).collect();
        }
        if let Some(prefixes) = map.get("simpleAllowedPrefixes").and_then(|v| v.as_array()) {
            config.simple_allowed_prefixes = prefixes.iter().filter_map(|v| v.as_str()).map(str::to_string).collect();
        }
        if let Some(exclude) = map.get("excludeObjectId").and_then(|v| v.as_bool()) {
            config.exclude_object_id = exclude;
        }
        if let Some(aliases) = map.get("operatorAliases").and_then(|v| v.as_object()) {
            for (alias, canonical) in aliases {
                if let Some(canonical_str) = canonical.as_str() {
                    let op = resolve_operator(canonical_str, &HashMap::new());
                    if !matches!(op, OpTag::Unknown(_)) {
                        config.operator_aliases.insert(alias.trim().to_lowercase(), op);
                    }
                }
            }
        }
        config
    }
}
