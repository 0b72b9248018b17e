use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use url::Url;

use super::compile::{CompileTarget, Compiler};
use super::constraints::{AdditionalProperties, Constraints, extract};
use super::examples::{ExampleFailure, InstanceValidator};
use super::name::{NUMBER_PREFIX, Name, NameGenerator, singularize};
use super::polymorphism;
use super::resolver::{NodeId, SchemaResolver};
use super::shape::{Shape, classify};
use super::type_infer::{
    array_validations, effective_types, infer_scalar, scalar_for, scalar_validations,
};
use crate::config::{AdditionalPropertiesMode, ExamplesMode, NestedClassNaming};
use crate::error::{BuildError, ResolveError};
use crate::ir::*;
use crate::parse::document::SchemaLocation;
use crate::parse::store::DocumentStore;

/// Numeric suffixes tried before a name collision is fatal.
const MAX_NAME_SUFFIX: u32 = 1000;

/// Naming hints for the class a node may become, in addition to whatever the
/// node itself offers.
#[derive(Debug, Clone, Default)]
pub(crate) struct NameSeed {
    pub property: Option<String>,
    pub reference: Option<String>,
    pub fallback: Option<String>,
}

impl NameSeed {
    pub fn property(key: &str) -> Self {
        Self {
            property: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn fallback(name: impl Into<String>) -> Self {
        Self {
            fallback: Some(name.into()),
            ..Self::default()
        }
    }

    fn singular(&self) -> Self {
        Self {
            property: self.property.as_deref().map(singularize),
            reference: None,
            fallback: self.fallback.as_deref().map(singularize),
        }
    }

    fn variant(&self, index: usize) -> Self {
        let numbered = |s: &String| format!("{s}Variant{}", index + 1);
        Self {
            property: self.property.as_ref().map(numbered),
            reference: None,
            fallback: self.fallback.as_ref().map(numbered),
        }
    }
}

/// Object keywords gathered from a node and the `allOf` branches merged
/// into it.
#[derive(Debug, Default)]
pub(crate) struct MergedObject {
    /// Raw property nodes per key; the first declaration supplies the type.
    pub properties: IndexMap<String, Vec<NodeId>>,
    pub required: Vec<String>,
    pub additional: Option<AdditionalProperties>,
    pub patterns: Vec<(String, NodeId)>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
}

impl MergedObject {
    fn absorb(&mut self, c: &Constraints) {
        for (key, node) in &c.properties {
            self.properties.entry(key.clone()).or_default().push(*node);
        }
        for key in &c.required {
            if !self.required.contains(key) {
                self.required.push(key.clone());
            }
        }
        if self.additional.is_none() && c.additional_properties != AdditionalProperties::Absent {
            self.additional = Some(c.additional_properties);
        }
        for (pattern, node) in &c.pattern_properties {
            if !self.patterns.iter().any(|(p, _)| p == pattern) {
                self.patterns.push((pattern.clone(), *node));
            }
        }
        self.min_properties = self.min_properties.max(c.min_properties);
        self.max_properties = match (self.max_properties, c.max_properties) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn is_required(&self, key: &str) -> bool {
        self.required.iter().any(|r| r == key)
    }

    fn has_map_keywords(&self) -> bool {
        !self.patterns.is_empty()
            || self.additional.is_some()
            || self.min_properties.is_some()
            || self.max_properties.is_some()
    }
}

/// A derived class whose base was still being filled when it was reached.
/// Its members are built once the base is complete.
#[derive(Debug)]
struct WaitingDerived {
    id: ClassId,
    node: NodeId,
    extensions: Vec<NodeId>,
    owner: ClassId,
}

/// Mutable state of one compilation run.
pub(crate) struct BuildContext<'s, 'c> {
    pub resolver: SchemaResolver<'s>,
    compiler: &'c Compiler,
    names: NameGenerator,
    pub classes: Vec<ClassDescriptor>,
    roots: Vec<ClassId>,
    by_identity: HashMap<NodeId, ClassId>,
    by_structure: HashMap<(String, String), ClassId>,
    pending: HashMap<ClassId, (NodeId, ClassId)>,
    started: HashSet<ClassId>,
    unfinished: HashSet<ClassId>,
    waiting: HashMap<ClassId, Vec<WaitingDerived>>,
    examples_checked: HashSet<NodeId>,
    failures: Vec<ExampleFailure>,
}

impl<'s, 'c> BuildContext<'s, 'c> {
    pub fn new(store: &'s DocumentStore, compiler: &'c Compiler) -> Self {
        Self {
            resolver: SchemaResolver::new(store),
            compiler,
            names: NameGenerator::default(),
            classes: Vec::new(),
            roots: Vec::new(),
            by_identity: HashMap::new(),
            by_structure: HashMap::new(),
            pending: HashMap::new(),
            started: HashSet::new(),
            unfinished: HashSet::new(),
            waiting: HashMap::new(),
            examples_checked: HashSet::new(),
            failures: Vec::new(),
        }
    }

    /// Reserve a root class for `target`. Targets that map to a custom class
    /// or do not describe a class are skipped.
    pub fn declare_root(&mut self, target: &CompileTarget) -> Result<Option<ClassId>, BuildError> {
        let node = self.resolver.resolve(&target.uri, &target.pointer)?;
        if let Some(&id) = self.by_identity.get(&node) {
            debug!("{}#{}: already declared as {id}", target.uri, target.pointer);
            return Ok(Some(id));
        }
        let c = extract(&mut self.resolver, node)?;
        if let Some(class) = self.compiler.registry.lookup(&c) {
            info!("{}: mapped to {class}, no class generated", c.location);
            return Ok(None);
        }
        let shape = classify(&mut self.resolver, node, &c)?;
        if !shape.is_class() {
            info!("{}: does not describe a class, skipped", c.location);
            return Ok(None);
        }

        let name = self.root_name(target, &c);
        let path = self.root_path(target);
        let taken: Vec<String> = self
            .roots
            .iter()
            .map(|id| &self.classes[id.0])
            .filter(|class| class.path.namespace == path.namespace)
            .map(|class| class.class_name().to_lowercase())
            .collect();
        let name = self.disambiguate(name, &taken, &c.location)?;
        let id = self.push_class(name, path, c.location.clone());
        self.roots.push(id);
        self.by_identity.insert(node, id);
        self.pending.insert(id, (node, id));
        Ok(Some(id))
    }

    /// Fill every declared root and assemble the model.
    pub fn finish(mut self) -> Result<ClassModel, BuildError> {
        for root in self.roots.clone() {
            self.ensure_filled(root)?;
        }
        if let Some(stuck) = self.waiting.values().flatten().map(|w| w.id).min() {
            let location = self.classes[stuck.0].source.clone();
            return Err(BuildError::invalid(&location, "inheritance cycle"));
        }
        match self.compiler.config.examples {
            ExamplesMode::Off => {}
            ExamplesMode::Warn => {
                for failure in &self.failures {
                    warn!("{failure}");
                }
            }
            ExamplesMode::Block => {
                if !self.failures.is_empty() {
                    return Err(BuildError::ExamplesInvalid(self.failures));
                }
            }
        }
        Ok(ClassModel {
            profile: self.compiler.config.profile,
            classes: self.classes,
            roots: self.roots,
        })
    }

    fn root_name(&mut self, target: &CompileTarget, c: &Constraints) -> Name {
        let text = target
            .name
            .clone()
            .or_else(|| self.compiler.registry.class_name_for(&c.location).map(str::to_string))
            .or_else(|| c.location.last_segment())
            .or_else(|| c.title.clone())
            .unwrap_or_else(|| document_stem(&c.location.uri));
        self.names.name(&text)
    }

    fn root_path(&self, target: &CompileTarget) -> QualifiedPath {
        let config = &self.compiler.config;
        let mut segments: Vec<String> = config
            .namespace
            .iter()
            .flat_map(|ns| ns.split('.'))
            .map(str::to_string)
            .collect();
        if config.derive_namespace_from_structure {
            segments.extend(target.sub_directories.iter().filter_map(|d| namespace_segment(d)));
        }
        let directories = if config.profile.namespaced_directories() {
            segments.clone()
        } else {
            target.sub_directories.clone()
        };
        QualifiedPath {
            namespace: (!segments.is_empty()).then(|| segments.join(".")),
            enclosing: Vec::new(),
            directories,
        }
    }

    fn push_class(&mut self, name: Name, path: QualifiedPath, source: SchemaLocation) -> ClassId {
        let id = ClassId(self.classes.len());
        self.classes.push(ClassDescriptor {
            id,
            name,
            path,
            kind: ClassKind::Value,
            parent: None,
            interfaces: Vec::new(),
            properties: Vec::new(),
            nested: Vec::new(),
            source,
            description: None,
            strict: false,
        });
        id
    }

    fn push_nested(
        &mut self,
        name: Name,
        owner: ClassId,
        source: SchemaLocation,
    ) -> Result<ClassId, BuildError> {
        let owner_class = &self.classes[owner.0];
        let mut taken: Vec<String> = owner_class
            .nested
            .iter()
            .map(|id| self.classes[id.0].class_name().to_lowercase())
            .collect();
        taken.push(owner_class.class_name().to_lowercase());
        let mut enclosing = owner_class.path.enclosing.clone();
        enclosing.push(owner_class.class_name());
        let path = QualifiedPath {
            namespace: owner_class.path.namespace.clone(),
            enclosing,
            directories: owner_class.path.directories.clone(),
        };

        let name = self.disambiguate(name, &taken, &source)?;
        let id = self.push_class(name, path, source);
        self.classes[owner.0].nested.push(id);
        Ok(id)
    }

    fn disambiguate(
        &self,
        name: Name,
        taken: &[String],
        location: &SchemaLocation,
    ) -> Result<Name, BuildError> {
        let free = |n: &Name| !taken.contains(&n.upper_camel_case().to_lowercase());
        if free(&name) {
            return Ok(name);
        }
        let collision = || BuildError::NameCollision {
            name: name.upper_camel_case(),
            location: location.clone(),
        };
        if self.compiler.config.strict_naming {
            return Err(collision());
        }
        for suffix in 2..=MAX_NAME_SUFFIX + 1 {
            let candidate = name.with_suffix(suffix);
            if free(&candidate) {
                warn!(
                    "{location}: class name {} already taken, using {}",
                    name.upper_camel_case(),
                    candidate.upper_camel_case()
                );
                return Ok(candidate);
            }
        }
        Err(collision())
    }

    fn nested_name(&mut self, seed: &NameSeed, c: &Constraints) -> Name {
        let compiler = self.compiler;
        if let Some(name) = compiler.registry.class_name_for(&c.location) {
            return self.names.name(name);
        }
        let ordered = match compiler.config.nested_class_naming {
            NestedClassNaming::Property => [&seed.property, &seed.reference],
            NestedClassNaming::RefSchema => [&seed.reference, &seed.property],
        };
        let text = ordered
            .into_iter()
            .chain([&c.title, &seed.fallback])
            .flatten()
            .find(|text| !Name::new(text).is_empty())
            .cloned()
            .unwrap_or_default();
        self.names.name(&text)
    }

    /// The class for `raw`, created on first sight. Nodes reached by
    /// reference are shared by identity; inline nodes also by structure.
    pub fn class_for_node(
        &mut self,
        raw: NodeId,
        seed: &NameSeed,
        owner: ClassId,
    ) -> Result<ClassId, BuildError> {
        let node = self.resolver.canonical(raw)?;
        if let Some(&id) = self.by_identity.get(&node) {
            self.ensure_filled(id)?;
            return Ok(id);
        }
        let inline = raw == node;
        let key = inline.then(|| self.structural_key(node));
        if let Some(key) = &key
            && let Some(&id) = self.by_structure.get(key)
        {
            self.by_identity.insert(node, id);
            self.ensure_filled(id)?;
            return Ok(id);
        }

        let c = extract(&mut self.resolver, node)?;
        let mut seed = seed.clone();
        if !inline && seed.reference.is_none() {
            seed.reference = Some(location_name(&c.location));
        }
        let name = self.nested_name(&seed, &c);
        let id = self.push_nested(name, owner, c.location.clone())?;
        self.by_identity.insert(node, id);
        if let Some(key) = key {
            self.by_structure.insert(key, id);
        }
        self.pending.insert(id, (node, owner));
        self.ensure_filled(id)?;
        Ok(id)
    }

    fn structural_key(&self, node: NodeId) -> (String, String) {
        let node = self.resolver.node(node);
        (node.base.to_string(), sorted_json(&node.value).to_string())
    }

    fn ensure_filled(&mut self, id: ClassId) -> Result<(), BuildError> {
        match self.pending.remove(&id) {
            Some((node, owner)) => self.fill_class(id, node, owner),
            None => Ok(()),
        }
    }

    fn fill_class(&mut self, id: ClassId, node: NodeId, owner: ClassId) -> Result<(), BuildError> {
        if !self.started.insert(id) {
            return Ok(());
        }
        self.unfinished.insert(id);
        let c = extract(&mut self.resolver, node)?;
        self.check_examples(node)?;
        self.classes[id.0].description = c.description.clone();

        let mut ready = true;
        match classify(&mut self.resolver, node, &c)? {
            Shape::Enum => {
                let shape = self.enum_shape(&c);
                self.classes[id.0].kind = ClassKind::Enum(shape);
            }
            Shape::Polymorphic {
                composition, branches, ..
            } => {
                polymorphism::build_group(self, id, node, &c, composition, &branches, owner)?;
            }
            Shape::Derived {
                base_ref,
                base,
                extensions,
            } => {
                ready = self.build_derived(id, node, &c, (base_ref, base), extensions, owner)?;
            }
            Shape::Object => {
                let merged = self.merge_object(node, &c, true)?;
                self.build_object(id, &merged, owner)?;
            }
            Shape::Empty => {}
            Shape::Never | Shape::Union { .. } | Shape::Array | Shape::Scalar => {
                return Err(BuildError::invalid(&c.location, "schema does not describe a class"));
            }
        }

        if let Some(marker) = &self.compiler.marker {
            self.classes[id.0].interfaces.push(InterfaceRef::External(marker.clone()));
        }
        if ready {
            self.complete(id)?;
        }
        Ok(())
    }

    /// Mark `id` as fully built and build the derived classes waiting on it.
    fn complete(&mut self, id: ClassId) -> Result<(), BuildError> {
        self.unfinished.remove(&id);
        for waiter in self.waiting.remove(&id).unwrap_or_default() {
            debug!("{}: base complete, building members", self.classes[waiter.id.0].source);
            self.derive_members(waiter.id, waiter.node, &waiter.extensions, waiter.owner)?;
            self.complete(waiter.id)?;
        }
        Ok(())
    }

    fn check_examples(&mut self, node: NodeId) -> Result<(), BuildError> {
        if self.compiler.config.examples == ExamplesMode::Off
            || !self.examples_checked.insert(node)
        {
            return Ok(());
        }
        let failures = InstanceValidator::new(&mut self.resolver, &self.compiler.formats)
            .check_examples(node)?;
        self.failures.extend(failures);
        Ok(())
    }

    /// The type a property (or item, or entry) of this schema resolves to.
    /// `None` when no value is allowed.
    pub fn resolve_type(
        &mut self,
        raw: NodeId,
        seed: &NameSeed,
        owner: ClassId,
    ) -> Result<Option<TypeSpec>, BuildError> {
        let node = self.resolver.canonical(raw)?;
        let c = extract(&mut self.resolver, node)?;
        self.check_examples(node)?;
        if let Some(class) = self.compiler.registry.lookup(&c) {
            let spec = TypeSpec::new(ResolvedType::External(class.clone()));
            return Ok(Some(spec.nullable(c.nullable)));
        }

        let spec = match classify(&mut self.resolver, node, &c)? {
            Shape::Never => return Ok(None),
            Shape::Enum => {
                let id = self.class_for_node(raw, seed, owner)?;
                let with_null = c.enum_values.iter().flatten().any(Value::is_null);
                TypeSpec::new(ResolvedType::Class(id)).nullable(c.nullable || with_null)
            }
            Shape::Polymorphic { nullable, .. } => {
                let id = self.class_for_node(raw, seed, owner)?;
                TypeSpec::new(ResolvedType::Class(id)).nullable(c.nullable || nullable)
            }
            Shape::Derived { .. } => {
                let id = self.class_for_node(raw, seed, owner)?;
                TypeSpec::new(ResolvedType::Class(id)).nullable(c.nullable)
            }
            Shape::Object if self.is_free_form(&c) => TypeSpec::any().nullable(c.nullable),
            Shape::Object => {
                let id = self.class_for_node(raw, seed, owner)?;
                TypeSpec::new(ResolvedType::Class(id)).nullable(c.nullable)
            }
            Shape::Union { branches, nullable } => {
                return self.union_type(&branches, nullable || c.nullable, seed, owner);
            }
            Shape::Array => {
                let item = match c.items {
                    Some(items) => self.resolve_type(items, &seed.singular(), owner)?,
                    None => None,
                };
                TypeSpec::new(ResolvedType::Array(Box::new(item.unwrap_or_else(TypeSpec::any))))
                    .nullable(c.nullable)
                    .with_validations(array_validations(&c))
            }
            Shape::Scalar => self.scalar_type(&c)?,
            Shape::Empty => TypeSpec::any().nullable(true),
        };
        Ok(Some(spec))
    }

    /// An object that carries no structure of its own becomes `Any`.
    fn is_free_form(&self, c: &Constraints) -> bool {
        let map_keywords = !c.pattern_properties.is_empty()
            || matches!(
                c.additional_properties,
                AdditionalProperties::Allowed(false) | AdditionalProperties::Schema(_)
            )
            || c.min_properties.is_some()
            || c.max_properties.is_some();
        let ignored =
            self.compiler.config.additional_properties == AdditionalPropertiesMode::Ignore;
        c.properties.is_empty()
            && c.required.is_empty()
            && c.all_of.is_empty()
            && c.reference.is_none()
            && (!map_keywords || ignored)
    }

    fn union_type(
        &mut self,
        branches: &[NodeId],
        nullable: bool,
        seed: &NameSeed,
        owner: ClassId,
    ) -> Result<Option<TypeSpec>, BuildError> {
        let mut variants: Vec<TypeSpec> = Vec::new();
        for (index, raw) in branches.iter().enumerate() {
            let mut variant_seed = if branches.len() == 1 {
                seed.clone()
            } else {
                seed.variant(index)
            };
            if self.resolver.node(*raw).is_pure_ref() {
                variant_seed.property = None;
            }
            if let Some(spec) = self.resolve_type(*raw, &variant_seed, owner)?
                && !variants.contains(&spec)
            {
                variants.push(spec);
            }
        }
        Ok(match variants.len() {
            0 if branches.is_empty() => Some(TypeSpec::any().nullable(true)),
            0 => None,
            1 => variants.pop().map(|spec| {
                let nullable = spec.nullable || nullable;
                spec.nullable(nullable)
            }),
            _ => Some(TypeSpec::new(ResolvedType::Union(variants)).nullable(nullable)),
        })
    }

    fn scalar_type(&mut self, c: &Constraints) -> Result<TypeSpec, BuildError> {
        let formats = &self.compiler.formats;
        let types = effective_types(c);
        if types.len() > 1 {
            let variants = types
                .iter()
                .filter_map(|t| scalar_for(c, *t))
                .map(|s| {
                    TypeSpec::new(ResolvedType::Scalar(s))
                        .with_validations(scalar_validations(c, s, formats))
                })
                .collect();
            return Ok(TypeSpec::new(ResolvedType::Union(variants)).nullable(c.nullable));
        }

        let Some(scalar) = infer_scalar(c) else {
            let mut checks = Vec::new();
            if let Some(value) = &c.const_value {
                checks.push(Validation::Const(value.clone()));
            }
            if let Some(values) = &c.enum_values {
                checks.push(Validation::Enum(values.clone()));
            }
            return Ok(TypeSpec::any().nullable(c.nullable).with_validations(checks));
        };

        let mut spec = TypeSpec::new(ResolvedType::Scalar(scalar))
            .nullable(c.nullable)
            .with_validations(scalar_validations(c, scalar, formats));
        for raw in &c.all_of {
            let branch = self.resolver.canonical(*raw)?;
            let bc = extract(&mut self.resolver, branch)?;
            spec.add_validations(scalar_validations(&bc, scalar, formats));
        }
        Ok(spec)
    }

    /// Gather the object keywords of `node`, its `allOf` branches and, when
    /// `follow_refs` is set, the target of a `$ref` with siblings.
    pub fn merge_object(
        &mut self,
        node: NodeId,
        c: &Constraints,
        follow_refs: bool,
    ) -> Result<MergedObject, BuildError> {
        let mut merged = MergedObject::default();
        merged.absorb(c);
        let mut stack = vec![node];
        let branches = c.all_of.iter().chain(c.reference.iter().filter(|_| follow_refs));
        for raw in branches.copied().collect::<Vec<_>>() {
            self.absorb_branch(&mut merged, raw, &mut stack)?;
        }
        Ok(merged)
    }

    fn absorb_branch(
        &mut self,
        merged: &mut MergedObject,
        raw: NodeId,
        stack: &mut Vec<NodeId>,
    ) -> Result<(), BuildError> {
        let node = self.resolver.canonical(raw)?;
        if stack.contains(&node) {
            let location = self.resolver.node(node).location.clone();
            return Err(ResolveError::ReferenceCycle(location).into());
        }
        let c = extract(&mut self.resolver, node)?;
        if !c.one_of.is_empty() || !c.any_of.is_empty() {
            debug!("{}: oneOf/anyOf inside allOf only constrains instances", c.location);
        }
        merged.absorb(&c);
        stack.push(node);
        for branch in c.all_of.iter().chain(c.reference.iter()) {
            self.absorb_branch(merged, *branch, stack)?;
        }
        stack.pop();
        Ok(())
    }

    /// Properties of an object node, in declaration order.
    pub fn build_properties(
        &mut self,
        merged: &MergedObject,
        owner: ClassId,
    ) -> Result<Vec<PropertyDescriptor>, BuildError> {
        let mut properties = Vec::new();
        for (key, nodes) in &merged.properties {
            let required = merged.is_required(key);
            if let Some(property) = self.build_property(key, nodes, required, owner)? {
                properties.push(property);
            }
        }
        Ok(properties)
    }

    fn build_property(
        &mut self,
        key: &str,
        nodes: &[NodeId],
        required: bool,
        owner: ClassId,
    ) -> Result<Option<PropertyDescriptor>, BuildError> {
        let Some((&first, rest)) = nodes.split_first() else {
            return Ok(None);
        };
        let Some(mut spec) = self.resolve_type(first, &NameSeed::property(key), owner)? else {
            let location = &self.resolver.node(first).location;
            debug!("{location}: property {key} allows no value, omitted");
            return Ok(None);
        };
        for raw in rest {
            let node = self.resolver.canonical(*raw)?;
            let c = extract(&mut self.resolver, node)?;
            match &spec.resolved_type {
                ResolvedType::Scalar(scalar) => {
                    spec.add_validations(scalar_validations(&c, *scalar, &self.compiler.formats))
                }
                ResolvedType::Array(_) => spec.add_validations(array_validations(&c)),
                _ => {}
            }
        }

        let description = self
            .annotation(first, "description")?
            .and_then(|v| v.as_str().map(str::to_string));
        let default = self.annotation(first, "default")?;
        let nullable = spec.nullable || (!required && default.is_none());
        Ok(Some(PropertyDescriptor {
            key: key.to_string(),
            name: self.names.name(key),
            resolved_type: spec.resolved_type,
            nullable,
            required,
            default,
            validations: spec.validations,
            description,
            origin: PropertyOrigin::Declared,
        }))
    }

    /// An annotation keyword, read from the referencing node first.
    fn annotation(&mut self, raw: NodeId, keyword: &str) -> Result<Option<Value>, BuildError> {
        if let Some(value) = self.resolver.node(raw).keyword(keyword) {
            return Ok(Some(value.clone()));
        }
        let node = self.resolver.canonical(raw)?;
        Ok(self.resolver.node(node).keyword(keyword).cloned())
    }

    fn build_object(
        &mut self,
        id: ClassId,
        merged: &MergedObject,
        owner: ClassId,
    ) -> Result<(), BuildError> {
        let properties = self.build_properties(merged, owner)?;
        let location = self.classes[id.0].source.clone();
        if self.compiler.config.additional_properties == AdditionalPropertiesMode::Ignore {
            if merged.has_map_keywords() {
                debug!("{location}: additionalProperties and patternProperties ignored");
            }
            self.classes[id.0].properties = properties;
            return Ok(());
        }

        let mapped = !merged.patterns.is_empty()
            || matches!(
                merged.additional,
                Some(AdditionalProperties::Allowed(true) | AdditionalProperties::Schema(_))
            )
            || merged.min_properties.is_some()
            || merged.max_properties.is_some();
        if !mapped {
            self.classes[id.0].properties = properties;
            self.classes[id.0].strict =
                merged.additional == Some(AdditionalProperties::Allowed(false));
            return Ok(());
        }

        let class_name = self.classes[id.0].class_name();
        let mut patterns = Vec::new();
        for (index, (pattern, raw)) in merged.patterns.iter().enumerate() {
            let seed = NameSeed::fallback(format!("{class_name}Pattern{}", index + 1));
            let rule = self.entry_rule(*raw, &seed, owner)?;
            patterns.push(PatternEntry {
                pattern: pattern.clone(),
                rule,
            });
        }
        let additional = match merged.additional {
            None
            | Some(AdditionalProperties::Absent)
            | Some(AdditionalProperties::Allowed(true)) => EntryRule::Any,
            Some(AdditionalProperties::Allowed(false)) => EntryRule::Forbidden,
            Some(AdditionalProperties::Schema(raw)) => {
                self.entry_rule(raw, &NameSeed::fallback(format!("{class_name}Value")), owner)?
            }
        };
        if additional != EntryRule::Forbidden && properties.iter().any(|p| !p.required) {
            warn!(
                "{location}: optional named properties overlap the map entries; \
                 named keys take precedence"
            );
        }

        let class = &mut self.classes[id.0];
        class.properties = properties;
        class.strict = additional == EntryRule::Forbidden;
        class.kind = ClassKind::MapBacked(MapShape {
            patterns,
            additional,
            cardinality: Cardinality {
                min: merged.min_properties,
                max: merged.max_properties,
            },
        });
        Ok(())
    }

    fn entry_rule(
        &mut self,
        raw: NodeId,
        seed: &NameSeed,
        owner: ClassId,
    ) -> Result<EntryRule, BuildError> {
        Ok(match self.resolve_type(raw, seed, owner)? {
            None => EntryRule::Forbidden,
            Some(spec)
                if spec.resolved_type == ResolvedType::Any && spec.validations.is_empty() =>
            {
                EntryRule::Any
            }
            Some(spec) => EntryRule::Typed(spec),
        })
    }

    fn enum_shape(&mut self, c: &Constraints) -> EnumShape {
        let values: Vec<&Value> = c.enum_values.iter().flatten().filter(|v| !v.is_null()).collect();
        let base = if values.iter().all(|v| v.is_string()) {
            EnumBase::String
        } else {
            EnumBase::Integer
        };
        let mut taken = HashSet::new();
        let mut members = Vec::with_capacity(values.len());
        for value in values {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let base_name = self.names.name(&text).upper_snake_case();
            let mut name = base_name.clone();
            let mut suffix = 2;
            while !taken.insert(name.clone()) {
                name = format!("{base_name}_{suffix}");
                suffix += 1;
            }
            members.push(EnumMember {
                name,
                value: value.clone(),
            });
        }
        EnumShape { base, members }
    }

    /// Link `id` to its base and build its members. Returns `false` when the
    /// base is still being filled; the members are then built by
    /// [`Self::complete`] once it is done.
    fn build_derived(
        &mut self,
        id: ClassId,
        node: NodeId,
        c: &Constraints,
        (base_ref, base): (NodeId, NodeId),
        extensions: Vec<NodeId>,
        owner: ClassId,
    ) -> Result<bool, BuildError> {
        let base_location = self.resolver.node(base).location.clone();
        let seed = NameSeed {
            reference: Some(location_name(&base_location)),
            fallback: Some(format!("{}Base", self.classes[id.0].class_name())),
            ..NameSeed::default()
        };
        let base_id = self.class_for_node(base_ref, &seed, owner)?;
        if base_id == id {
            return Err(BuildError::invalid(&c.location, "schema extends itself"));
        }
        self.classes[id.0].parent = Some(base_id);
        self.classes[id.0].kind = ClassKind::Derived(DerivedShape::default());
        if self.unfinished.contains(&base_id) {
            debug!("{}: base {base_location} is still being built", c.location);
            self.waiting.entry(base_id).or_default().push(WaitingDerived {
                id,
                node,
                extensions,
                owner,
            });
            return Ok(false);
        }
        self.derive_members(id, node, &extensions, owner)?;
        Ok(true)
    }

    /// Own properties and overrides of a derived class whose ancestors are
    /// complete.
    fn derive_members(
        &mut self,
        id: ClassId,
        node: NodeId,
        extensions: &[NodeId],
        owner: ClassId,
    ) -> Result<(), BuildError> {
        let c = extract(&mut self.resolver, node)?;
        let inherited = self.inherited_properties(id);

        let mut merged = MergedObject::default();
        merged.absorb(&c);
        let mut stack = vec![node];
        for raw in extensions {
            self.absorb_branch(&mut merged, *raw, &mut stack)?;
        }
        if merged.has_map_keywords() {
            debug!("{}: map keywords on a derived class ignored", c.location);
        }

        let mut own = Vec::new();
        let mut overrides = Vec::new();
        for (key, nodes) in &merged.properties {
            let required = merged.is_required(key);
            match inherited.iter().find(|p| p.key == *key) {
                Some(parent) => {
                    if let Some(tightened) = self.tighten(parent, nodes, required)? {
                        overrides.push(tightened);
                    }
                }
                None => {
                    if let Some(property) = self.build_property(key, nodes, required, owner)? {
                        own.push(property);
                    }
                }
            }
        }
        for key in &merged.required {
            if merged.properties.contains_key(key) {
                continue;
            }
            if let Some(parent) = inherited.iter().find(|p| p.key == *key)
                && !parent.required
            {
                overrides.push(PropertyOverride {
                    key: key.clone(),
                    required: true,
                    nullable: false,
                    validations: Vec::new(),
                });
            }
        }

        let class = &mut self.classes[id.0];
        class.properties = own;
        class.kind = ClassKind::Derived(DerivedShape { overrides });
        Ok(())
    }

    fn tighten(
        &mut self,
        parent: &PropertyDescriptor,
        nodes: &[NodeId],
        required: bool,
    ) -> Result<Option<PropertyOverride>, BuildError> {
        let mut extra: Vec<Validation> = Vec::new();
        for raw in nodes {
            let node = self.resolver.canonical(*raw)?;
            let c = extract(&mut self.resolver, node)?;
            let checks = match &parent.resolved_type {
                ResolvedType::Scalar(scalar) => {
                    scalar_validations(&c, *scalar, &self.compiler.formats)
                }
                ResolvedType::Array(_) => array_validations(&c),
                _ => Vec::new(),
            };
            for check in checks {
                if !parent.validations.contains(&check) && !extra.contains(&check) {
                    extra.push(check);
                }
            }
        }
        let newly_required = required && !parent.required;
        if !newly_required && extra.is_empty() {
            return Ok(None);
        }
        Ok(Some(PropertyOverride {
            key: parent.key.clone(),
            required: required || parent.required,
            nullable: if newly_required { false } else { parent.nullable },
            validations: extra,
        }))
    }

    /// Properties `id` inherits, outermost ancestor first.
    fn inherited_properties(&self, id: ClassId) -> Vec<PropertyDescriptor> {
        let mut chain = Vec::new();
        let mut current = self.classes[id.0].parent;
        while let Some(parent) = current {
            if parent == id || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.classes[parent.0].parent;
        }
        chain
            .iter()
            .rev()
            .flat_map(|c| self.classes[c.0].properties.iter().cloned())
            .collect()
    }

    /// Inherited and own properties of `id`.
    pub fn all_properties(&self, id: ClassId) -> Vec<PropertyDescriptor> {
        let mut properties = self.inherited_properties(id);
        properties.extend(self.classes[id.0].properties.iter().cloned());
        properties
    }
}

/// A name for the schema at `location`: its last pointer segment, or the
/// document's file stem for a root.
pub(crate) fn location_name(location: &SchemaLocation) -> String {
    location
        .last_segment()
        .unwrap_or_else(|| document_stem(&location.uri))
}

/// `https://x.io/schemas/order.schema.json` -> `order`.
pub(crate) fn document_stem(uri: &str) -> String {
    let file = Url::parse(uri)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| uri.to_string());
    match file.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file,
    }
}

fn namespace_segment(directory: &str) -> Option<String> {
    let segment: String = directory
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    if segment.is_empty() {
        None
    } else if segment.starts_with(|c: char| c.is_ascii_digit()) {
        Some(format!("{NUMBER_PREFIX}{segment}"))
    } else {
        Some(segment)
    }
}

/// `value` with object keys sorted, so equal schemas print equally.
fn sorted_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sorted_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_json).collect()),
        other => other.clone(),
    }
}
