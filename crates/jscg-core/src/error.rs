use thiserror::Error;

use crate::parse::document::SchemaLocation;
use crate::transform::examples::ExampleFailure;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid document URI {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("document {0} is not a schema (expected an object or a boolean)")]
    NotASchema(String),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("pointer not found: {0}")]
    PointerNotFound(SchemaLocation),

    #[error("unresolved reference {reference} at {location}")]
    UnresolvedRef {
        reference: String,
        location: SchemaLocation,
    },

    #[error("invalid reference format {reference} at {location}")]
    InvalidRefFormat {
        reference: String,
        location: SchemaLocation,
    },

    #[error("reference cycle detected at {0}")]
    ReferenceCycle(SchemaLocation),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("invalid custom class entry {key}: {reason}")]
    InvalidOverride { key: String, reason: String },

    #[error("invalid format handler {name}: {reason}")]
    InvalidFormat { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid schema at {location}: {reason}")]
    InvalidSchema {
        location: SchemaLocation,
        reason: String,
    },

    #[error("naming collision for class {name} at {location}")]
    NameCollision {
        name: String,
        location: SchemaLocation,
    },

    #[error("incompatible polymorphic group at {location}: {reason}")]
    IncompatibleBranches {
        location: SchemaLocation,
        reason: String,
    },

    #[error("{} example(s) failed validation", .0.len())]
    ExamplesInvalid(Vec<ExampleFailure>),
}

impl BuildError {
    pub(crate) fn invalid(location: &SchemaLocation, reason: impl Into<String>) -> Self {
        BuildError::InvalidSchema {
            location: location.clone(),
            reason: reason.into(),
        }
    }

    /// The schema location the error points at, when it has one.
    pub fn location(&self) -> Option<&SchemaLocation> {
        match self {
            BuildError::Resolve(ResolveError::PointerNotFound(location))
            | BuildError::Resolve(ResolveError::ReferenceCycle(location))
            | BuildError::Resolve(ResolveError::UnresolvedRef { location, .. })
            | BuildError::Resolve(ResolveError::InvalidRefFormat { location, .. })
            | BuildError::InvalidSchema { location, .. }
            | BuildError::NameCollision { location, .. }
            | BuildError::IncompatibleBranches { location, .. } => Some(location),
            BuildError::Resolve(ResolveError::DocumentNotFound(_))
            | BuildError::Parse(_)
            | BuildError::Config(_)
            | BuildError::ExamplesInvalid(_) => None,
        }
    }
}
