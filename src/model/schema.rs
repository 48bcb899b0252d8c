//! Field-type schema — the collaborator behind `getFieldType` (§6.1).

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    String,
    Date,
    ObjectId,
    Array,
    Object,
}

/// Maps base field paths to their declared type. Lookup is a plain map read;
/// the arithmetic/list variable catalogs never carry their own schema entry
/// here — only base document fields do, since `getFieldType` is consulted
/// solely by the boolean-equality rule (§4.3, P7), which only ever fires for
/// base fields coming straight off the schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: HashMap<String, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, path: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(path.into(), ty);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, ty: FieldType) {
        self.fields.insert(path.into(), ty);
    }

    pub fn get_field_type(&self, path: &str) -> Option<FieldType> {
        self.fields.get(path).copied()
    }

    pub fn is_boolean(&self, path: &str) -> bool {
        self.get_field_type(path) == Some(FieldType::Boolean)
    }
}

impl FieldType {
    fn from_wire(name: &str) -> Option<FieldType> {
        match name.to_lowercase().as_str() {
            "boolean" | "bool" => Some(FieldType::Boolean),
            "integer" | "int" => Some(FieldType::Integer),
            "float" | "double" | "number" => Some(FieldType::Float),
            "string" | "str" => Some(FieldType::String),
            "date" | "datetime" => Some(FieldType::Date),
            "objectid" | "object_id" => Some(FieldType::ObjectId),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }
}

/// Parses `{ "field.path": "boolean", ... }` into a [`Schema`] (§6.1's
/// `getFieldType` collaborator, as data rather than a callback). Entries
/// whose type string isn't recognized are skipped rather than rejecting the
/// whole schema — an unrecognized type simply means `get_field_type` never
/// matches it, which only affects the boolean-equality rule (§4.3, P7).
pub fn parse_schema(raw: &serde_json::Value) -> Schema {
    let mut schema = Schema::new();
    if let Some(map) = raw.as_object() {
        for (path, ty) in map {
            if let Some(ty) = ty.as_str().and_then(FieldType::from_wire) {
                schema.insert(path.clone(), ty);
            }
        }
    }
    schema
}
