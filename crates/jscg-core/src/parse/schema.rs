use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON Schema type keyword value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl SchemaType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => value
                .as_f64()
                .is_some_and(|n| n.fract() == 0.0 && n.is_finite()),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Array => value.is_array(),
            SchemaType::Object => value.is_object(),
            SchemaType::Null => value.is_null(),
        }
    }
}

/// The `type` field can be a single type or an array of types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSet {
    Single(SchemaType),
    Multiple(Vec<SchemaType>),
}

impl TypeSet {
    pub fn types(&self) -> Vec<SchemaType> {
        match self {
            TypeSet::Single(t) => vec![*t],
            TypeSet::Multiple(ts) => ts.clone(),
        }
    }
}

/// Keywords that never change the shape of a schema. A `$ref` accompanied
/// only by these is a pure reference.
pub const ANNOTATION_KEYWORDS: &[&str] = &[
    "$comment",
    "$schema",
    "title",
    "description",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
];

/// Keywords holding a map of named sub-schemas that are never instance
/// constraints themselves.
pub const DEFINITION_KEYWORDS: &[&str] = &["$defs", "definitions"];

/// `true` when `value` is an object with a `$ref` and nothing but annotations
/// beside it.
pub fn is_pure_ref(value: &Value) -> bool {
    match value.as_object() {
        Some(map) if map.contains_key("$ref") => map.keys().all(|k| {
            k == "$ref"
                || ANNOTATION_KEYWORDS.contains(&k.as_str())
                || DEFINITION_KEYWORDS.contains(&k.as_str())
                || k.starts_with("x-")
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_set_forms() {
        let single: TypeSet = serde_json::from_value(json!("integer")).unwrap();
        assert_eq!(single.types(), vec![SchemaType::Integer]);
        let multi: TypeSet = serde_json::from_value(json!(["string", "null"])).unwrap();
        assert_eq!(multi.types(), vec![SchemaType::String, SchemaType::Null]);
        assert!(serde_json::from_value::<TypeSet>(json!(42)).is_err());
    }

    #[test]
    fn test_integer_matches_integral_numbers() {
        assert!(SchemaType::Integer.matches(&json!(3)));
        assert!(SchemaType::Integer.matches(&json!(3.0)));
        assert!(!SchemaType::Integer.matches(&json!(3.5)));
        assert!(SchemaType::Number.matches(&json!(3.5)));
    }

    #[test]
    fn test_pure_ref_detection() {
        assert!(is_pure_ref(&json!({ "$ref": "#/$defs/A" })));
        assert!(is_pure_ref(&json!({ "$ref": "#/$defs/A", "description": "d" })));
        assert!(!is_pure_ref(&json!({ "$ref": "#/$defs/A", "required": ["x"] })));
        assert!(!is_pure_ref(&json!({ "type": "string" })));
    }
}
