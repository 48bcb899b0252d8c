//! The canonical operator vocabulary (§3) and the alias table that resolves
//! human-readable synonyms at the tree's boundary (per the third Open
//! Question in §9 — aliases are resolved once, here, never re-checked deep
//! inside the predicate compiler).

use std::collections::HashMap;

/// A canonical predicate operator.
///
/// `Unknown` and `Malformed` are not part of the canonical operator
/// vocabulary; they are the in-tree encoding of §7's error policy (rules 1
/// and 4) so a
/// bad operator spelling or a missing field/operator never has to fail the
/// parse — it just rides along as a tagged value the predicate compiler
/// knows how to degrade gracefully.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpTag {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Exists,
    NotExists,
    IsNumber,
    Between,
    NotBetween,
    ArrayLength,
    ArrayEmpty,
    ArrayNotEmpty,
    LengthGt,
    LengthLt,
    AnyElementTrue,
    AllElementsTrue,
    Filter,
    Min,
    Max,
    Avg,
    Sum,
    /// Operator string present but not recognized (§7 rule 4).
    Unknown(String),
    /// No `field` or no `operator` key at all (§7 rule 1).
    Malformed,
}

impl OpTag {
    /// Operators that denote a list reduction (§4.5); these are the only
    /// operators a [`crate::model::ListCondition`] or a list-reduction
    /// condition may carry.
    pub fn is_reduction(&self) -> bool {
        matches!(
            self,
            OpTag::AnyElementTrue
                | OpTag::AllElementsTrue
                | OpTag::Filter
                | OpTag::Min
                | OpTag::Max
                | OpTag::Avg
                | OpTag::Sum
        )
    }

    pub fn is_length_threshold(&self) -> bool {
        matches!(self, OpTag::LengthGt | OpTag::LengthLt)
    }
}

/// Built-in canonical spellings plus the common human-readable aliases.
/// `CompilerConfig` may extend this table with dataset-specific synonyms
/// without touching this list.
fn builtin_aliases() -> HashMap<&'static str, OpTag> {
    use OpTag::*;
    HashMap::from([
        ("=", Eq),
        ("==", Eq),
        ("eq", Eq),
        ("equals", Eq),
        ("≠", Ne),
        ("!=", Ne),
        ("ne", Ne),
        ("not equals", Ne),
        ("<", Lt),
        ("lt", Lt),
        ("less than", Lt),
        ("≤", Le),
        ("<=", Le),
        ("lte", Le),
        (">", Gt),
        ("gt", Gt),
        ("greater than", Gt),
        ("≥", Ge),
        (">=", Ge),
        ("gte", Ge),
        ("in", In),
        ("not in", NotIn),
        ("nin", NotIn),
        ("contains", Contains),
        ("starts-with", StartsWith),
        ("starts with", StartsWith),
        ("startswith", StartsWith),
        ("ends-with", EndsWith),
        ("ends with", EndsWith),
        ("endswith", EndsWith),
        ("exists", Exists),
        ("not-exists", NotExists),
        ("not exists", NotExists),
        ("isnumber", IsNumber),
        ("is number", IsNumber),
        ("between", Between),
        ("not between", NotBetween),
        ("not-between", NotBetween),
        ("array length", ArrayLength),
        ("array-length", ArrayLength),
        ("array empty", ArrayEmpty),
        ("array-empty", ArrayEmpty),
        ("array not empty", ArrayNotEmpty),
        ("array-not-empty", ArrayNotEmpty),
        ("lengthgt", LengthGt),
        ("length-gt", LengthGt),
        ("lengthlt", LengthLt),
        ("length-lt", LengthLt),
        ("anyelementtrue", AnyElementTrue),
        ("any", AnyElementTrue),
        ("allelementstrue", AllElementsTrue),
        ("all", AllElementsTrue),
        ("filter", Filter),
        ("min", Min),
        ("max", Max),
        ("avg", Avg),
        ("average", Avg),
        ("sum", Sum),
    ])
}

/// Resolve an operator spelling to its [`OpTag`]. Never fails: an
/// unrecognized spelling resolves to `OpTag::Unknown`, per §7 rule 4 — the
/// caller decides what that means at compile time, not at parse time.
pub fn resolve_operator(raw: &str, extra: &HashMap<String, OpTag>) -> OpTag {
    let lower = raw.trim().to_lowercase();
    if let Some(op) = extra.get(&lower) {
        return op.clone();
    }
    builtin_aliases()
        .get(lower.as_str())
        .cloned()
        .unwrap_or_else(|| OpTag::Unknown(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_and_alias_spellings() {
        let extra = HashMap::new();
        assert_eq!(resolve_operator("=", &extra), OpTag::Eq);
        assert_eq!(resolve_operator("greater than", &extra), OpTag::Gt);
        assert_eq!(resolve_operator("lengthGt", &extra), OpTag::LengthGt);
        assert_eq!(
            resolve_operator("bogus", &extra),
            OpTag::Unknown("bogus".to_string())
        );
    }

    #[test]
    fn config_aliases_take_priority() {
        let mut extra = HashMap::new();
        extra.insert("close to".to_string(), OpTag::Eq);
        assert_eq!(resolve_operator("close to", &extra), OpTag::Eq);
    }
}
