use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

use super::resolver::{NodeId, SchemaResolver};
use crate::error::BuildError;
use crate::ir::NumberValue;
use crate::parse::document::SchemaLocation;
use crate::parse::schema::{SchemaType, TypeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalProperties {
    Absent,
    Allowed(bool),
    Schema(NodeId),
}

/// Every keyword present on one schema node, flattened. Child schemas are
/// referenced by their raw (unresolved) node.
#[derive(Debug, Clone)]
pub struct Constraints {
    pub location: SchemaLocation,
    /// Declared types other than `null`, in declaration order.
    pub types: Vec<SchemaType>,
    pub type_declared: bool,
    pub nullable: bool,
    /// The schema is the literal `false`.
    pub never: bool,

    pub minimum: Option<NumberValue>,
    pub maximum: Option<NumberValue>,
    pub exclusive_minimum: Option<NumberValue>,
    pub exclusive_maximum: Option<NumberValue>,
    pub multiple_of: Option<NumberValue>,

    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub format: Option<String>,

    pub const_value: Option<Value>,
    pub enum_values: Option<Vec<Value>>,

    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub items: Option<NodeId>,

    pub properties: Vec<(String, NodeId)>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub pattern_properties: Vec<(String, NodeId)>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,

    pub one_of: Vec<NodeId>,
    pub any_of: Vec<NodeId>,
    pub all_of: Vec<NodeId>,
    pub not: Option<NodeId>,
    /// Target of a `$ref` that has sibling keywords.
    pub reference: Option<NodeId>,

    pub title: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub examples: Vec<Value>,
    pub extensions: IndexMap<String, Value>,
}

impl Constraints {
    pub(crate) fn empty(location: SchemaLocation) -> Self {
        Self {
            location,
            types: Vec::new(),
            type_declared: false,
            nullable: false,
            never: false,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            min_length: None,
            max_length: None,
            pattern: None,
            format: None,
            const_value: None,
            enum_values: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            items: None,
            properties: Vec::new(),
            required: Vec::new(),
            additional_properties: AdditionalProperties::Absent,
            pattern_properties: Vec::new(),
            min_properties: None,
            max_properties: None,
            one_of: Vec::new(),
            any_of: Vec::new(),
            all_of: Vec::new(),
            not: None,
            reference: None,
            title: None,
            description: None,
            default: None,
            examples: Vec::new(),
            extensions: IndexMap::new(),
        }
    }

    pub fn has_type(&self, t: SchemaType) -> bool {
        self.types.contains(&t)
    }

    /// The only declared non-null type.
    pub fn single_type(&self) -> Option<SchemaType> {
        match self.types.as_slice() {
            [t] => Some(*t),
            _ => None,
        }
    }

    /// `{"type": "null"}` and nothing else that constrains the shape.
    pub fn is_null_only(&self) -> bool {
        self.type_declared && self.types.is_empty() && self.nullable
    }

    pub fn is_object_like(&self) -> bool {
        self.has_type(SchemaType::Object)
            || !self.properties.is_empty()
            || !self.pattern_properties.is_empty()
            || self.additional_properties != AdditionalProperties::Absent
            || !self.required.is_empty()
            || self.min_properties.is_some()
            || self.max_properties.is_some()
    }

    pub fn is_array_like(&self) -> bool {
        self.has_type(SchemaType::Array)
            || self.items.is_some()
            || self.min_items.is_some()
            || self.max_items.is_some()
            || self.unique_items
    }

    pub fn is_scalar_like(&self) -> bool {
        self.types.iter().any(|t| {
            matches!(
                t,
                SchemaType::String | SchemaType::Number | SchemaType::Integer | SchemaType::Boolean
            )
        }) || self.const_value.is_some()
            || self.enum_values.is_some()
            || self.format.is_some()
            || self.pattern.is_some()
            || self.min_length.is_some()
            || self.max_length.is_some()
            || self.minimum.is_some()
            || self.maximum.is_some()
            || self.exclusive_minimum.is_some()
            || self.exclusive_maximum.is_some()
            || self.multiple_of.is_some()
    }

    pub fn is_required(&self, key: &str) -> bool {
        self.required.iter().any(|r| r == key)
    }

    /// The extension value as text, for matching against configured values.
    pub fn extension_text(&self, keyword: &str) -> Option<String> {
        self.extensions.get(keyword).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Read the keywords present on `id`. References are not followed except to
/// record the target of a `$ref` that has sibling keywords.
pub fn extract(resolver: &mut SchemaResolver, id: NodeId) -> Result<Constraints, BuildError> {
    let node = resolver.node(id);
    let location = node.location.clone();
    let mut c = Constraints::empty(location.clone());

    let map = match &node.value {
        Value::Bool(allowed) => {
            c.never = !allowed;
            return Ok(c);
        }
        Value::Object(map) => map.clone(),
        _ => return Err(BuildError::invalid(&location, "schema must be an object or a boolean")),
    };
    let reader = Reader {
        map: &map,
        location: &location,
    };

    if let Some(value) = map.get("type") {
        let set: TypeSet = serde_json::from_value(value.clone())
            .map_err(|_| BuildError::invalid(&location, format!("invalid type {value}")))?;
        c.type_declared = true;
        for t in set.types() {
            if t == SchemaType::Null {
                c.nullable = true;
            } else if !c.types.contains(&t) {
                c.types.push(t);
            }
        }
    }

    c.minimum = reader.number("minimum")?;
    c.maximum = reader.number("maximum")?;
    match map.get("exclusiveMinimum") {
        Some(Value::Bool(true)) => c.exclusive_minimum = c.minimum.take(),
        Some(Value::Bool(false)) | None => {}
        Some(_) => c.exclusive_minimum = reader.number("exclusiveMinimum")?,
    }
    match map.get("exclusiveMaximum") {
        Some(Value::Bool(true)) => c.exclusive_maximum = c.maximum.take(),
        Some(Value::Bool(false)) | None => {}
        Some(_) => c.exclusive_maximum = reader.number("exclusiveMaximum")?,
    }
    c.multiple_of = reader.number("multipleOf")?;
    if c.multiple_of.as_ref().is_some_and(|m| m.as_f64() <= 0.0) {
        return Err(BuildError::invalid(&location, "multipleOf must be greater than zero"));
    }

    c.min_length = reader.count("minLength")?;
    c.max_length = reader.count("maxLength")?;
    c.pattern = reader.string("pattern")?;
    if let Some(pattern) = &c.pattern {
        check_regex(&location, pattern)?;
    }
    c.format = reader.string("format")?;

    c.const_value = map.get("const").cloned();
    if let Some(value) = map.get("enum") {
        let values = value
            .as_array()
            .ok_or_else(|| BuildError::invalid(&location, "enum must be an array"))?;
        if values.is_empty() {
            return Err(BuildError::invalid(&location, "enum must not be empty"));
        }
        c.enum_values = Some(values.clone());
    }

    c.min_items = reader.count("minItems")?;
    c.max_items = reader.count("maxItems")?;
    c.unique_items = reader.flag("uniqueItems")?;
    match map.get("items") {
        Some(Value::Object(_) | Value::Bool(_)) => {
            c.items = Some(resolver.raw_child(id, &["items"])?);
        }
        Some(Value::Array(_)) => {
            log::debug!("{location}: tuple-form items treated as untyped");
        }
        Some(_) => return Err(BuildError::invalid(&location, "items must be a schema")),
        None => {}
    }

    if let Some(properties) = reader.object("properties")? {
        for key in properties.keys() {
            let child = resolver.raw_child(id, &["properties", key])?;
            c.properties.push((key.clone(), child));
        }
    }
    if let Some(required) = map.get("required") {
        let names = required
            .as_array()
            .ok_or_else(|| BuildError::invalid(&location, "required must be an array"))?;
        for name in names {
            let name = name
                .as_str()
                .ok_or_else(|| BuildError::invalid(&location, "required entries must be strings"))?;
            if !c.is_required(name) {
                c.required.push(name.to_string());
            }
        }
    }
    c.additional_properties = match map.get("additionalProperties") {
        None => AdditionalProperties::Absent,
        Some(Value::Bool(allowed)) => AdditionalProperties::Allowed(*allowed),
        Some(Value::Object(_)) => {
            AdditionalProperties::Schema(resolver.raw_child(id, &["additionalProperties"])?)
        }
        Some(_) => {
            return Err(BuildError::invalid(
                &location,
                "additionalProperties must be a schema",
            ));
        }
    };
    if let Some(patterns) = reader.object("patternProperties")? {
        for pattern in patterns.keys() {
            check_regex(&location, pattern)?;
            let child = resolver.raw_child(id, &["patternProperties", pattern])?;
            c.pattern_properties.push((pattern.clone(), child));
        }
    }
    c.min_properties = reader.count("minProperties")?;
    c.max_properties = reader.count("maxProperties")?;

    c.one_of = composition(resolver, id, &reader, "oneOf")?;
    c.any_of = composition(resolver, id, &reader, "anyOf")?;
    c.all_of = composition(resolver, id, &reader, "allOf")?;
    if map.contains_key("not") {
        c.not = Some(resolver.raw_child(id, &["not"])?);
    }

    if let Some(reference) = reader.string("$ref")?
        && !resolver.node(id).is_pure_ref()
    {
        c.reference = Some(resolver.resolve_ref(id, &reference)?);
    }

    c.title = reader.string("title")?;
    c.description = reader.string("description")?;
    c.default = map.get("default").cloned();
    if let Some(examples) = map.get("examples") {
        c.examples = examples
            .as_array()
            .cloned()
            .ok_or_else(|| BuildError::invalid(&location, "examples must be an array"))?;
    }
    c.extensions = map
        .iter()
        .filter(|(k, _)| k.starts_with("x-"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(c)
}

fn composition(
    resolver: &mut SchemaResolver,
    id: NodeId,
    reader: &Reader,
    keyword: &str,
) -> Result<Vec<NodeId>, BuildError> {
    let Some(value) = reader.map.get(keyword) else {
        return Ok(Vec::new());
    };
    let branches = value.as_array().ok_or_else(|| {
        BuildError::invalid(reader.location, format!("{keyword} must be an array"))
    })?;
    if branches.is_empty() {
        return Err(BuildError::invalid(
            reader.location,
            format!("{keyword} must not be empty"),
        ));
    }
    (0..branches.len())
        .map(|i| {
            resolver
                .raw_child(id, &[keyword, &i.to_string()])
                .map_err(BuildError::from)
        })
        .collect()
}

fn check_regex(location: &SchemaLocation, pattern: &str) -> Result<(), BuildError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| BuildError::invalid(location, format!("invalid regex {pattern}: {e}")))
}

struct Reader<'m> {
    map: &'m Map<String, Value>,
    location: &'m SchemaLocation,
}

impl Reader<'_> {
    fn number(&self, keyword: &str) -> Result<Option<NumberValue>, BuildError> {
        match self.map.get(keyword) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(NumberValue::from_number(n))),
            Some(_) => Err(self.wrong(keyword, "a number")),
        }
    }

    fn count(&self, keyword: &str) -> Result<Option<u64>, BuildError> {
        match self.map.get(keyword) {
            None => Ok(None),
            Some(value) => match value.as_u64() {
                Some(n) => Ok(Some(n)),
                None => Err(self.wrong(keyword, "a non-negative integer")),
            },
        }
    }

    fn string(&self, keyword: &str) -> Result<Option<String>, BuildError> {
        match self.map.get(keyword) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.wrong(keyword, "a string")),
        }
    }

    fn flag(&self, keyword: &str) -> Result<bool, BuildError> {
        match self.map.get(keyword) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.wrong(keyword, "a boolean")),
        }
    }

    fn object(&self, keyword: &str) -> Result<Option<&'_ Map<String, Value>>, BuildError> {
        match self.map.get(keyword) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(self.wrong(keyword, "an object")),
        }
    }

    fn wrong(&self, keyword: &str, expected: &str) -> BuildError {
        BuildError::invalid(self.location, format!("{keyword} must be {expected}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::store::DocumentStore;
    use serde_json::json;

    fn with_schema<T>(schema: Value, f: impl FnOnce(&mut SchemaResolver, NodeId) -> T) -> T {
        let mut store = DocumentStore::new();
        store.add_value("file:///s.json", schema).unwrap();
        let mut resolver = SchemaResolver::new(&store);
        let root = resolver.resolve("file:///s.json", "").unwrap();
        f(&mut resolver, root)
    }

    #[test]
    fn test_extract_object_keywords() {
        with_schema(
            json!({
                "type": ["object", "null"],
                "properties": { "b": { "type": "string" }, "a": { "type": "integer" } },
                "required": ["a", "a"],
                "additionalProperties": false,
                "patternProperties": { "^x-": { "type": "string" } },
                "minProperties": 1,
                "x-kind": "money"
            }),
            |resolver, root| {
                let c = extract(resolver, root).unwrap();
                assert_eq!(c.types, vec![SchemaType::Object]);
                assert!(c.nullable);
                let keys: Vec<_> = c.properties.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["b", "a"]);
                assert_eq!(c.required, vec!["a"]);
                assert_eq!(c.additional_properties, AdditionalProperties::Allowed(false));
                assert_eq!(c.pattern_properties.len(), 1);
                assert_eq!(c.min_properties, Some(1));
                assert_eq!(c.extension_text("x-kind").as_deref(), Some("money"));
                assert!(c.is_object_like());
            },
        );
    }

    #[test]
    fn test_extract_does_not_follow_refs() {
        with_schema(
            json!({
                "properties": { "a": { "$ref": "#/$defs/A" } },
                "$defs": { "A": { "type": "string" } }
            }),
            |resolver, root| {
                let c = extract(resolver, root).unwrap();
                let (_, child) = c.properties[0];
                assert_eq!(resolver.node(child).location.pointer, "/properties/a");
                assert!(resolver.node(child).is_pure_ref());
            },
        );
    }

    #[test]
    fn test_ref_with_siblings_records_reference() {
        with_schema(
            json!({
                "$ref": "#/$defs/A",
                "required": ["x"],
                "$defs": { "A": { "type": "object" } }
            }),
            |resolver, root| {
                let c = extract(resolver, root).unwrap();
                let target = c.reference.unwrap();
                assert_eq!(resolver.node(target).location.pointer, "/$defs/A");
            },
        );
    }

    #[test]
    fn test_draft4_exclusive_bounds() {
        with_schema(
            json!({ "type": "integer", "minimum": 0, "exclusiveMinimum": true, "maximum": 10 }),
            |resolver, root| {
                let c = extract(resolver, root).unwrap();
                assert_eq!(c.minimum, None);
                assert_eq!(c.exclusive_minimum, Some(NumberValue::Int32(0)));
                assert_eq!(c.maximum, Some(NumberValue::Int32(10)));
            },
        );
    }

    #[test]
    fn test_malformed_keywords_are_located_errors() {
        let cases = [
            json!({ "type": 7 }),
            json!({ "minLength": -1 }),
            json!({ "required": "a" }),
            json!({ "enum": [] }),
            json!({ "pattern": "(" }),
            json!({ "patternProperties": { "[": {} } }),
            json!({ "oneOf": {} }),
            json!({ "multipleOf": 0 }),
        ];
        for schema in cases {
            with_schema(schema.clone(), |resolver, root| {
                let err = extract(resolver, root).unwrap_err();
                assert!(
                    matches!(err, BuildError::InvalidSchema { .. }),
                    "{schema}: {err}"
                );
                assert_eq!(err.location().unwrap().uri, "file:///s.json");
            });
        }
    }

    #[test]
    fn test_boolean_schemas() {
        with_schema(json!(false), |resolver, root| {
            assert!(extract(resolver, root).unwrap().never);
        });
        with_schema(json!(true), |resolver, root| {
            let c = extract(resolver, root).unwrap();
            assert!(!c.never && !c.is_object_like() && !c.is_scalar_like());
        });
    }

    #[test]
    fn test_null_only() {
        with_schema(json!({ "type": "null" }), |resolver, root| {
            assert!(extract(resolver, root).unwrap().is_null_only());
        });
    }
}
