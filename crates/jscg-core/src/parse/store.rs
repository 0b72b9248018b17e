use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use url::Url;

use super::document::{SchemaDocument, SchemaLocation, escape_segment};
use crate::error::ParseError;

/// Keywords whose values are instance data, not sub-schemas.
const INSTANCE_KEYWORDS: &[&str] = &["const", "enum", "default", "examples"];

/// Already-fetched schema documents keyed by URI, plus an index of every
/// `$id` and `$anchor` they declare.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: IndexMap<String, SchemaDocument>,
    ids: HashMap<String, SchemaLocation>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: SchemaDocument) {
        let key = document.uri.to_string();
        if document.base != document.uri {
            self.ids
                .insert(document.base.to_string(), document.location(""));
        }
        let mut found = Vec::new();
        collect_ids(&document.root, &document.base, "", &mut found);
        for (id, pointer) in found {
            log::debug!("indexed {id} -> {key}#{pointer}");
            self.ids.insert(id, SchemaLocation::new(key.clone(), pointer));
        }
        if self.documents.insert(key.clone(), document).is_some() {
            log::debug!("replaced document {key}");
        }
    }

    pub fn add_json(&mut self, uri: &str, input: &str) -> Result<(), ParseError> {
        self.insert(super::from_json(uri, input)?);
        Ok(())
    }

    pub fn add_yaml(&mut self, uri: &str, input: &str) -> Result<(), ParseError> {
        self.insert(super::from_yaml(uri, input)?);
        Ok(())
    }

    pub fn add_value(&mut self, uri: &str, root: Value) -> Result<(), ParseError> {
        self.insert(SchemaDocument::new(uri, root)?);
        Ok(())
    }

    pub fn get(&self, uri: &str) -> Option<&SchemaDocument> {
        self.documents
            .get(uri)
            .or_else(|| self.documents.get(normalize(uri)?.as_str()))
    }

    /// The location declared by `$id` (or `id#anchor` for `$anchor`).
    pub fn lookup_id(&self, id: &str) -> Option<&SchemaLocation> {
        self.ids.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &SchemaDocument> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn normalize(uri: &str) -> Option<String> {
    let mut url = Url::parse(uri).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

fn collect_ids(value: &Value, base: &Url, pointer: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            let mut base = base.clone();
            if !pointer.is_empty()
                && let Some(id) = map.get("$id").and_then(Value::as_str)
                && let Ok(joined) = base.join(id)
            {
                base = joined;
                let mut key = base.clone();
                key.set_fragment(None);
                out.push((key.to_string(), pointer.to_string()));
            }
            if let Some(anchor) = map.get("$anchor").and_then(Value::as_str) {
                let mut key = base.clone();
                key.set_fragment(Some(anchor));
                out.push((key.to_string(), pointer.to_string()));
            }
            for (name, child) in map {
                if INSTANCE_KEYWORDS.contains(&name.as_str()) {
                    continue;
                }
                let child_pointer = format!("{pointer}/{}", escape_segment(name));
                collect_ids(child, &base, &child_pointer, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_ids(child, base, &format!("{pointer}/{i}"), out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_indexes_ids_and_anchors() {
        let mut store = DocumentStore::new();
        store
            .add_value(
                "http://example.com/root.json",
                json!({
                    "$defs": {
                        "a": { "$id": "a.json", "type": "string" },
                        "b": { "$anchor": "bee", "type": "integer" },
                        "c": { "const": { "$id": "not-a-schema.json" } }
                    }
                }),
            )
            .unwrap();

        let a = store.lookup_id("http://example.com/a.json").unwrap();
        assert_eq!(a.pointer, "/$defs/a");
        let b = store.lookup_id("http://example.com/root.json#bee").unwrap();
        assert_eq!(b.pointer, "/$defs/b");
        assert!(store
            .lookup_id("http://example.com/not-a-schema.json")
            .is_none());
    }

    #[test]
    fn test_get_ignores_fragment() {
        let mut store = DocumentStore::new();
        store.add_json("file:///s.json", "{}").unwrap();
        assert!(store.get("file:///s.json").is_some());
        assert!(store.get("file:///s.json#/x").is_some());
        assert!(store.get("file:///other.json").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_root_id_is_an_alias() {
        let mut store = DocumentStore::new();
        store
            .add_value(
                "file:///local/person.json",
                json!({ "$id": "https://schemas.example.com/person.json" }),
            )
            .unwrap();
        let loc = store
            .lookup_id("https://schemas.example.com/person.json")
            .unwrap();
        assert_eq!(loc.uri, "file:///local/person.json");
        assert_eq!(loc.pointer, "");
    }
}
