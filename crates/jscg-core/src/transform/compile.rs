use serde_json::Value;

use super::builder::BuildContext;
use super::custom_class::CustomClassRegistry;
use super::formats::FormatRegistry;
use crate::config::CompilerConfig;
use crate::error::{BuildError, ConfigError, ResolveError};
use crate::ir::{ClassModel, ClassRef};
use crate::parse::document::escape_segment;
use crate::parse::store::DocumentStore;

/// URI given to a schema compiled from an in-memory value.
pub const DEFAULT_DOCUMENT_URI: &str = "file:///schema.json";

/// One schema to compile into a root class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileTarget {
    pub uri: String,
    pub pointer: String,
    /// Class name; derived from the schema location when absent.
    pub name: Option<String>,
    /// Directories between the input root and the document, outermost first.
    pub sub_directories: Vec<String>,
}

impl CompileTarget {
    pub fn new(uri: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            pointer: pointer.into(),
            name: None,
            sub_directories: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_directories(mut self, directories: Vec<String>) -> Self {
        self.sub_directories = directories;
        self
    }
}

/// Compiles schemas into a [`ClassModel`] under one configuration.
#[derive(Debug, Clone)]
pub struct Compiler {
    pub(crate) config: CompilerConfig,
    pub(crate) registry: CustomClassRegistry,
    pub(crate) formats: FormatRegistry,
    pub(crate) marker: Option<ClassRef>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            config: CompilerConfig::default(),
            registry: CustomClassRegistry::new(),
            formats: FormatRegistry::new(),
            marker: None,
        }
    }
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut registry = CustomClassRegistry::new();
        for (uri, class) in &config.custom_classes.uri {
            registry.add_by_uri(uri, ClassRef::parse(class));
        }
        for (format, class) in &config.custom_classes.format {
            registry.add_by_format(format, ClassRef::parse(class));
        }
        for (keyword, values) in &config.custom_classes.extension {
            for (value, class) in values {
                registry.add_by_extension(keyword, value, ClassRef::parse(class));
            }
        }
        for (uri, name) in &config.class_names {
            registry.add_class_name(uri, name);
        }

        let mut formats = FormatRegistry::new();
        formats.register_all(&config.non_standard_formats)?;

        let marker = config.marker_interface.as_deref().map(ClassRef::parse);
        Ok(Self {
            config,
            registry,
            formats,
            marker,
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut CustomClassRegistry {
        &mut self.registry
    }

    pub fn formats_mut(&mut self) -> &mut FormatRegistry {
        &mut self.formats
    }

    /// Compile `targets` in order; every root is declared before any class
    /// is filled, so references between targets land on their root classes.
    pub fn compile(
        &self,
        store: &DocumentStore,
        targets: &[CompileTarget],
    ) -> Result<ClassModel, BuildError> {
        let mut cx = BuildContext::new(store, self);
        for target in targets {
            cx.declare_root(target)?;
        }
        let model = cx.finish()?;
        log::debug!(
            "compiled {} target(s) into {} class(es)",
            targets.len(),
            model.classes.len()
        );
        Ok(model)
    }

    /// Compile every entry of the object at `pointer` (e.g. `/$defs`), each
    /// as a root named after its key.
    pub fn compile_definitions(
        &self,
        store: &DocumentStore,
        uri: &str,
        pointer: &str,
    ) -> Result<ClassModel, BuildError> {
        let targets = definition_targets(store, uri, pointer)?;
        self.compile(store, &targets)
    }

    /// Compile a single in-memory schema as the root class `name`.
    pub fn compile_value(&self, schema: Value, name: &str) -> Result<ClassModel, BuildError> {
        let mut store = DocumentStore::new();
        store.add_value(DEFAULT_DOCUMENT_URI, schema)?;
        self.compile(&store, &[CompileTarget::new(DEFAULT_DOCUMENT_URI, "").named(name)])
    }
}

/// One target per entry of the definitions object at `uri#pointer`.
pub fn definition_targets(
    store: &DocumentStore,
    uri: &str,
    pointer: &str,
) -> Result<Vec<CompileTarget>, BuildError> {
    let document = store
        .get(uri)
        .ok_or_else(|| ResolveError::DocumentNotFound(uri.to_string()))?;
    let location = document.location(pointer);
    let (value, _) = document
        .locate(pointer)
        .ok_or_else(|| ResolveError::PointerNotFound(location.clone()))?;
    let entries = value
        .as_object()
        .ok_or_else(|| BuildError::invalid(&location, "definitions must be an object"))?;
    Ok(entries
        .keys()
        .map(|key| {
            let entry = format!("{pointer}/{}", escape_segment(key));
            CompileTarget::new(document.uri.as_str(), entry).named(key)
        })
        .collect())
}
