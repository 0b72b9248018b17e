use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;
use url::Url;

use crate::error::ParseError;

/// Document URI plus JSON pointer, rendered as `uri#pointer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaLocation {
    pub uri: String,
    pub pointer: String,
}

impl SchemaLocation {
    pub fn new(uri: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            pointer: pointer.into(),
        }
    }

    /// Location of a child reached through one more pointer segment.
    pub fn child(&self, segment: &str) -> Self {
        Self {
            uri: self.uri.clone(),
            pointer: format!("{}/{}", self.pointer, escape_segment(segment)),
        }
    }

    /// Last pointer segment, unescaped. `None` for a document root.
    pub fn last_segment(&self) -> Option<String> {
        let (_, last) = self.pointer.rsplit_once('/')?;
        Some(unescape_segment(last))
    }

    /// Parse `uri#pointer`; a missing fragment means the document root.
    pub fn parse(text: &str) -> Self {
        match text.split_once('#') {
            Some((uri, fragment)) => Self::new(uri, decode_fragment(fragment)),
            None => Self::new(text, ""),
        }
    }
}

impl fmt::Display for SchemaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.uri, self.pointer)
    }
}

impl Serialize for SchemaLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A parsed schema document keyed by its retrieval URI.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    /// Retrieval URI, without fragment.
    pub uri: Url,
    /// Base URI for relative references (the root `$id`, joined on `uri`).
    pub base: Url,
    pub root: Value,
}

impl SchemaDocument {
    pub fn new(uri: &str, root: Value) -> Result<Self, ParseError> {
        let mut uri = Url::parse(uri).map_err(|source| ParseError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;
        uri.set_fragment(None);

        if !root.is_object() && !root.is_boolean() {
            return Err(ParseError::NotASchema(uri.to_string()));
        }

        let base = match root.get("$id").and_then(Value::as_str) {
            Some(id) => uri.join(id).map_err(|source| ParseError::InvalidUri {
                uri: id.to_string(),
                source,
            })?,
            None => uri.clone(),
        };

        Ok(Self { uri, base, root })
    }

    pub fn location(&self, pointer: &str) -> SchemaLocation {
        SchemaLocation::new(self.uri.as_str(), pointer)
    }

    /// Walk `pointer` from the root, returning the value and the base URI in
    /// effect at that value (every `$id` on the way is applied).
    pub fn locate(&self, pointer: &str) -> Option<(&Value, Url)> {
        let mut current = &self.root;
        let mut base = self.base.clone();
        for segment in split_pointer(pointer)? {
            current = match current {
                Value::Object(map) => map.get(&segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
            if let Some(id) = current.get("$id").and_then(Value::as_str) {
                base = base.join(id).ok()?;
            }
        }
        Some((current, base))
    }
}

pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Split a JSON pointer into unescaped segments. `None` if it is malformed.
pub fn split_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(rest.split('/').map(unescape_segment).collect())
}

/// Percent-decode a URI fragment.
pub fn decode_fragment(fragment: &str) -> String {
    percent_encoding::percent_decode_str(fragment)
        .decode_utf8_lossy()
        .into_owned()
}
