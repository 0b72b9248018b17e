use std::collections::HashMap;

use serde_json::{Map, Value};
use url::Url;

use crate::error::ResolveError;
use crate::parse::document::{SchemaLocation, decode_fragment, escape_segment};
use crate::parse::schema::is_pure_ref;
use crate::parse::store::DocumentStore;

/// Index of a schema node in the resolver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// A schema subtree at a known location.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub id: NodeId,
    pub location: SchemaLocation,
    /// Base URI for references made from inside this node.
    pub base: Url,
    pub value: Value,
}

impl SchemaNode {
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        self.value.as_object()
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    pub fn is_pure_ref(&self) -> bool {
        is_pure_ref(&self.value)
    }
}

/// Interns schema nodes by `(document, pointer)` and resolves `$ref`.
///
/// A node is *canonical* once every pure `$ref` in front of it has been
/// followed. Two references to the same target always yield the same
/// [`NodeId`].
pub struct SchemaResolver<'a> {
    store: &'a DocumentStore,
    nodes: Vec<SchemaNode>,
    identities: HashMap<(String, String), NodeId>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(store: &'a DocumentStore) -> Self {
        Self {
            store,
            nodes: Vec::new(),
            identities: HashMap::new(),
        }
    }

    pub fn store(&self) -> &'a DocumentStore {
        self.store
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The canonical node at `uri#pointer`.
    pub fn resolve(&mut self, uri: &str, pointer: &str) -> Result<NodeId, ResolveError> {
        let raw = self.intern(uri, pointer)?;
        self.canonical(raw)
    }

    /// The canonical node `reference` points at, relative to `from`.
    pub fn resolve_ref(&mut self, from: NodeId, reference: &str) -> Result<NodeId, ResolveError> {
        let target = self.target_of(from, reference)?;
        let raw = self.intern(&target.uri, &target.pointer)?;
        self.canonical(raw)
    }

    /// The node reached from `parent` through `segments`, without following
    /// any `$ref` it may hold.
    pub fn raw_child(&mut self, parent: NodeId, segments: &[&str]) -> Result<NodeId, ResolveError> {
        let location = self.node(parent).location.clone();
        let mut pointer = location.pointer;
        for segment in segments {
            pointer.push('/');
            pointer.push_str(&escape_segment(segment));
        }
        self.intern(&location.uri, &pointer)
    }

    /// Follow pure `$ref`s from `id` until a node with its own keywords.
    pub fn canonical(&mut self, id: NodeId) -> Result<NodeId, ResolveError> {
        let mut current = id;
        let mut seen = vec![current];
        while self.node(current).is_pure_ref() {
            let reference = self
                .node(current)
                .keyword("$ref")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let target = self.target_of(current, &reference)?;
            let next = self.intern(&target.uri, &target.pointer)?;
            if seen.contains(&next) {
                return Err(ResolveError::ReferenceCycle(
                    self.node(current).location.clone(),
                ));
            }
            log::debug!(
                "{} -> {}",
                self.node(current).location,
                self.node(next).location
            );
            seen.push(next);
            current = next;
        }
        Ok(current)
    }

    fn intern(&mut self, uri: &str, pointer: &str) -> Result<NodeId, ResolveError> {
        let store = self.store;
        let document = store
            .get(uri)
            .ok_or_else(|| ResolveError::DocumentNotFound(uri.to_string()))?;
        let key = (document.uri.to_string(), pointer.to_string());
        if let Some(id) = self.identities.get(&key) {
            return Ok(*id);
        }
        let (value, base) = document
            .locate(pointer)
            .ok_or_else(|| ResolveError::PointerNotFound(document.location(pointer)))?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(SchemaNode {
            id,
            location: document.location(pointer),
            base,
            value: value.clone(),
        });
        self.identities.insert(key, id);
        Ok(id)
    }

    fn target_of(&self, from: NodeId, reference: &str) -> Result<SchemaLocation, ResolveError> {
        let node = self.node(from);
        let mut absolute =
            node.base
                .join(reference)
                .map_err(|_| ResolveError::InvalidRefFormat {
                    reference: reference.to_string(),
                    location: node.location.clone(),
                })?;
        let fragment = decode_fragment(absolute.fragment().unwrap_or(""));
        absolute.set_fragment(None);
        let document_uri = absolute.to_string();

        if !fragment.is_empty() && !fragment.starts_with('/') {
            // plain-name fragment, declared with $anchor
            let anchor = format!("{document_uri}#{fragment}");
            return self
                .store
                .lookup_id(&anchor)
                .cloned()
                .ok_or_else(|| self.unresolved(node, reference));
        }

        if let Some(document) = self.store.get(&document_uri) {
            return Ok(SchemaLocation::new(document.uri.as_str(), fragment));
        }
        if let Some(declared) = self.store.lookup_id(&document_uri) {
            return Ok(SchemaLocation::new(
                declared.uri.clone(),
                format!("{}{fragment}", declared.pointer),
            ));
        }
        Err(self.unresolved(node, reference))
    }

    fn unresolved(&self, node: &SchemaNode, reference: &str) -> ResolveError {
        ResolveError::UnresolvedRef {
            reference: reference.to_string(),
            location: node.location.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(docs: &[(&str, Value)]) -> DocumentStore {
        let mut store = DocumentStore::new();
        for (uri, value) in docs {
            store.add_value(uri, value.clone()).unwrap();
        }
        store
    }

    #[test]
    fn test_same_target_same_identity() {
        let store = store(&[(
            "file:///s.json",
            json!({
                "properties": {
                    "a": { "$ref": "#/$defs/Address" },
                    "b": { "$ref": "#/$defs/Address", "description": "second use" }
                },
                "$defs": { "Address": { "type": "object" } }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let root = resolver.resolve("file:///s.json", "").unwrap();
        let a = resolver.raw_child(root, &["properties", "a"]).unwrap();
        let b = resolver.raw_child(root, &["properties", "b"]).unwrap();
        let a = resolver.canonical(a).unwrap();
        let b = resolver.canonical(b).unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.node(a).location.pointer, "/$defs/Address");
        assert_eq!(
            resolver.resolve("file:///s.json", "/$defs/Address").unwrap(),
            a
        );
    }

    #[test]
    fn test_ref_with_siblings_keeps_identity() {
        let store = store(&[(
            "file:///s.json",
            json!({
                "$defs": {
                    "Base": { "type": "object" },
                    "Tight": { "$ref": "#/$defs/Base", "required": ["x"] }
                }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let tight = resolver.resolve("file:///s.json", "/$defs/Tight").unwrap();
        assert_eq!(resolver.node(tight).location.pointer, "/$defs/Tight");
        let base = resolver.resolve_ref(tight, "#/$defs/Base").unwrap();
        assert_eq!(resolver.node(base).location.pointer, "/$defs/Base");
    }

    #[test]
    fn test_cross_document_and_relative_refs() {
        let store = store(&[
            (
                "http://example.com/schemas/order.json",
                json!({
                    "properties": { "customer": { "$ref": "customer.json#/$defs/Customer" } }
                }),
            ),
            (
                "http://example.com/schemas/customer.json",
                json!({ "$defs": { "Customer": { "type": "object" } } }),
            ),
        ]);
        let mut resolver = SchemaResolver::new(&store);
        let order = resolver
            .resolve("http://example.com/schemas/order.json", "")
            .unwrap();
        let customer = resolver.raw_child(order, &["properties", "customer"]).unwrap();
        let customer = resolver.canonical(customer).unwrap();
        assert_eq!(
            resolver.node(customer).location.to_string(),
            "http://example.com/schemas/customer.json#/$defs/Customer"
        );
    }

    #[test]
    fn test_embedded_id_and_anchor() {
        let store = store(&[(
            "http://example.com/root.json",
            json!({
                "$defs": {
                    "money": { "$id": "money.json", "type": "object" },
                    "tag": { "$anchor": "tag", "type": "string" }
                },
                "properties": {
                    "price": { "$ref": "money.json" },
                    "label": { "$ref": "#tag" }
                }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let price = resolver
            .resolve("http://example.com/root.json", "/properties/price")
            .unwrap();
        assert_eq!(resolver.node(price).location.pointer, "/$defs/money");
        let label = resolver
            .resolve("http://example.com/root.json", "/properties/label")
            .unwrap();
        assert_eq!(resolver.node(label).location.pointer, "/$defs/tag");
    }

    #[test]
    fn test_percent_encoded_and_escaped_pointers() {
        let store = store(&[(
            "file:///s.json",
            json!({
                "$defs": { "a b": { "type": "string" }, "c/d": { "type": "integer" } },
                "properties": {
                    "x": { "$ref": "#/$defs/a%20b" },
                    "y": { "$ref": "#/$defs/c~1d" }
                }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let x = resolver.resolve("file:///s.json", "/properties/x").unwrap();
        assert_eq!(resolver.node(x).value, json!({ "type": "string" }));
        let y = resolver.resolve("file:///s.json", "/properties/y").unwrap();
        assert_eq!(resolver.node(y).value, json!({ "type": "integer" }));
    }

    #[test]
    fn test_pure_ref_cycle_is_fatal() {
        let store = store(&[(
            "file:///s.json",
            json!({
                "$defs": {
                    "A": { "$ref": "#/$defs/B" },
                    "B": { "$ref": "#/$defs/A" }
                }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let err = resolver.resolve("file:///s.json", "/$defs/A").unwrap_err();
        assert!(matches!(err, ResolveError::ReferenceCycle(_)));
    }

    #[test]
    fn test_recursion_through_object_is_legal() {
        let store = store(&[(
            "file:///s.json",
            json!({
                "$defs": {
                    "Node": {
                        "type": "object",
                        "properties": { "next": { "$ref": "#/$defs/Node" } }
                    }
                }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let node = resolver.resolve("file:///s.json", "/$defs/Node").unwrap();
        let next = resolver.raw_child(node, &["properties", "next"]).unwrap();
        assert_eq!(resolver.canonical(next).unwrap(), node);
    }

    #[test]
    fn test_unresolvable_refs() {
        let store = store(&[(
            "file:///s.json",
            json!({
                "properties": {
                    "a": { "$ref": "other.json#/x" },
                    "b": { "$ref": "#/$defs/Missing" }
                }
            }),
        )]);
        let mut resolver = SchemaResolver::new(&store);
        let err = resolver.resolve("file:///s.json", "/properties/a").unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvedRef { .. }));
        let err = resolver.resolve("file:///s.json", "/properties/b").unwrap_err();
        assert!(matches!(err, ResolveError::PointerNotFound(_)));
        let err = resolver.resolve("file:///nope.json", "").unwrap_err();
        assert!(matches!(err, ResolveError::DocumentNotFound(_)));
    }
}
