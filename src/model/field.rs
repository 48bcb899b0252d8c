//! C1 — field-name normalizer.

/// Resolves a possibly-object field identifier to its canonical dotted string.
///
/// Mirrors §4.1: a bare JSON string passes through unchanged; an object is
/// read for `value`, then `name`, then `field`, in that order, falling back
/// to a stringified form of the object when none of those keys are present
/// (the tree is user-authored and a malformed `FieldId` should never abort
/// the compile — see §7 rule 1).
pub fn normalize_field(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            for key in ["value", "name", "field"] {
                if let Some(v) = map.get(key) {
                    return scalar_to_string(v);
                }
            }
            raw.to_string()
        }
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passes_through_plain_string() {
        assert_eq!(normalize_field(&json!("candidate.ra")), "candidate.ra");
    }

    #[test]
    fn prefers_value_key() {
        let field = json!({"value": "ra", "name": "ignored"});
        assert_eq!(normalize_field(&field), "ra");
    }

    #[test]
    fn falls_back_to_name_then_field() {
        assert_eq!(normalize_field(&json!({"name": "mag"})), "mag");
        assert_eq!(normalize_field(&json!({"field": "zp"})), "zp");
    }

    #[test]
    fn stringifies_when_no_known_key() {
        let field = json!({"bogus": 1});
        assert_eq!(normalize_field(&field), field.to_string());
    }
}
