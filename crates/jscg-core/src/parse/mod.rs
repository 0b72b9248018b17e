pub mod document;
pub mod schema;
pub mod store;

use serde_json::Value;

use crate::error::ParseError;
use document::SchemaDocument;

/// Parse a schema document from YAML.
pub fn from_yaml(uri: &str, input: &str) -> Result<SchemaDocument, ParseError> {
    let root: Value = serde_yaml_ng::from_str(input)?;
    SchemaDocument::new(uri, root)
}

/// Parse a schema document from JSON.
pub fn from_json(uri: &str, input: &str) -> Result<SchemaDocument, ParseError> {
    let root: Value = serde_json::from_str(input)?;
    SchemaDocument::new(uri, root)
}
