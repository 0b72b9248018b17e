use std::collections::HashMap;

use url::Url;

use super::constraints::Constraints;
use crate::ir::ClassRef;
use crate::parse::document::SchemaLocation;

/// User-supplied classes that stand in for schema nodes, plus generated-name
/// overrides.
///
/// Lookups consult, in order: the node's exact location, its `format`, then
/// its vendor extension keywords.
#[derive(Debug, Clone, Default)]
pub struct CustomClassRegistry {
    by_uri: HashMap<SchemaLocation, ClassRef>,
    by_format: HashMap<String, ClassRef>,
    by_extension: HashMap<(String, String), ClassRef>,
    class_names: HashMap<SchemaLocation, String>,
}

impl CustomClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the schema at `uri` (`document#pointer`) to `class`.
    pub fn add_by_uri(&mut self, uri: &str, class: impl Into<ClassRef>) {
        let class = class.into();
        if let Some(previous) = self.by_uri.insert(location_key(uri), class.clone()) {
            log::debug!("custom class for {uri} replaced: {previous} -> {class}");
        }
    }

    pub fn add_by_format(&mut self, format: &str, class: impl Into<ClassRef>) {
        let class = class.into();
        if let Some(previous) = self.by_format.insert(format.to_string(), class.clone()) {
            log::debug!("custom class for format {format} replaced: {previous} -> {class}");
        }
    }

    pub fn add_by_extension(&mut self, keyword: &str, value: &str, class: impl Into<ClassRef>) {
        let class = class.into();
        let key = (keyword.to_string(), value.to_string());
        if let Some(previous) = self.by_extension.insert(key, class.clone()) {
            log::debug!("custom class for {keyword}={value} replaced: {previous} -> {class}");
        }
    }

    /// Give the class synthesized for the schema at `uri` a fixed name.
    pub fn add_class_name(&mut self, uri: &str, name: &str) {
        self.class_names.insert(location_key(uri), name.to_string());
    }

    pub fn lookup(&self, c: &Constraints) -> Option<&ClassRef> {
        if let Some(class) = self.by_uri.get(&c.location) {
            return Some(class);
        }
        if let Some(format) = &c.format
            && let Some(class) = self.by_format.get(format)
        {
            return Some(class);
        }
        c.extensions.keys().find_map(|keyword| {
            let value = c.extension_text(keyword)?;
            self.by_extension.get(&(keyword.clone(), value))
        })
    }

    pub fn class_name_for(&self, location: &SchemaLocation) -> Option<&str> {
        self.class_names.get(location).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
            && self.by_format.is_empty()
            && self.by_extension.is_empty()
            && self.class_names.is_empty()
    }
}

/// Configured keys may spell the document URI loosely; compare them the way
/// the document store keys its documents.
fn location_key(uri: &str) -> SchemaLocation {
    let mut location = SchemaLocation::parse(uri);
    if let Ok(url) = Url::parse(&location.uri) {
        location.uri = url.to_string();
    }
    location
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::store::DocumentStore;
    use crate::transform::constraints::extract;
    use crate::transform::resolver::SchemaResolver;
    use serde_json::{Value, json};

    fn constraints_at(schema: Value, pointer: &str) -> Constraints {
        let mut store = DocumentStore::new();
        store.add_value("http://x.io/s.json", schema).unwrap();
        let mut resolver = SchemaResolver::new(&store);
        let id = resolver.resolve("http://x.io/s.json", pointer).unwrap();
        extract(&mut resolver, id).unwrap()
    }

    #[test]
    fn test_precedence_uri_then_format_then_extension() {
        let schema = json!({
            "$defs": {
                "Money": { "type": "string", "format": "money", "x-kind": "amount" }
            }
        });
        let c = constraints_at(schema, "/$defs/Money");

        let mut registry = CustomClassRegistry::new();
        registry.add_by_extension("x-kind", "amount", "com.ext.Amount");
        assert_eq!(registry.lookup(&c).unwrap().name, "Amount");

        registry.add_by_format("money", "com.fmt.Money");
        assert_eq!(registry.lookup(&c).unwrap().name, "Money");
        assert_eq!(
            registry.lookup(&c).unwrap().namespace.as_deref(),
            Some("com.fmt")
        );

        registry.add_by_uri("http://x.io/s.json#/$defs/Money", ("Cash", "com.uri"));
        assert_eq!(registry.lookup(&c).unwrap().qualified_name(), "com.uri.Cash");
    }

    #[test]
    fn test_last_write_wins() {
        let c = constraints_at(json!({ "type": "string", "format": "money" }), "");
        let mut registry = CustomClassRegistry::new();
        registry.add_by_format("money", "a.First");
        registry.add_by_format("money", "b.Second");
        assert_eq!(registry.lookup(&c).unwrap().qualified_name(), "b.Second");
    }

    #[test]
    fn test_no_match() {
        let c = constraints_at(json!({ "type": "string", "x-kind": "other" }), "");
        let mut registry = CustomClassRegistry::new();
        registry.add_by_extension("x-kind", "amount", "Amount");
        assert!(registry.lookup(&c).is_none());
    }

    #[test]
    fn test_class_names_match_encoded_fragments() {
        let mut registry = CustomClassRegistry::new();
        registry.add_class_name("http://x.io/s.json#/$defs/line%20item", "LineItem");
        let location = SchemaLocation::new("http://x.io/s.json", "/$defs/line item");
        assert_eq!(registry.class_name_for(&location), Some("LineItem"));
    }
}
