use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::types::{ClassRef, ResolvedType, TypeSpec, Validation};
use crate::config::TargetProfile;
use crate::parse::document::SchemaLocation;
use crate::transform::name::Name;

/// Index of a descriptor in [`ClassModel::classes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassId(pub usize);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The compiled forest: every class descriptor plus the ordered roots.
#[derive(Debug, Clone, Serialize)]
pub struct ClassModel {
    pub profile: TargetProfile,
    pub classes: Vec<ClassDescriptor>,
    pub roots: Vec<ClassId>,
}

impl ClassModel {
    pub fn class(&self, id: ClassId) -> &ClassDescriptor {
        &self.classes[id.0]
    }

    /// First class whose rendered name is `name`.
    pub fn find(&self, name: &str) -> Option<&ClassDescriptor> {
        self.classes.iter().find(|c| c.class_name() == name)
    }

    pub fn root(&self, name: &str) -> Option<&ClassDescriptor> {
        self.roots
            .iter()
            .map(|id| self.class(*id))
            .find(|c| c.class_name() == name)
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut current = self.class(id).parent;
        while let Some(parent) = current {
            if chain.contains(&parent) || parent == id {
                break;
            }
            chain.push(parent);
            current = self.class(parent).parent;
        }
        chain
    }

    /// Inherited properties (outermost ancestor first) followed by own ones.
    pub fn all_properties(&self, id: ClassId) -> Vec<&PropertyDescriptor> {
        let mut chain = self.ancestors(id);
        chain.reverse();
        chain.push(id);
        chain
            .into_iter()
            .flat_map(|c| self.class(c).properties.iter())
            .collect()
    }

    /// Qualified name of a class: namespace, enclosing classes, then name.
    pub fn qualified_name(&self, id: ClassId) -> String {
        let class = self.class(id);
        let mut parts: Vec<String> = class.path.namespace.iter().cloned().collect();
        parts.extend(class.path.enclosing.iter().cloned());
        parts.push(class.class_name());
        parts.join(".")
    }

    /// One output unit per root class.
    pub fn output_units(&self) -> Vec<OutputUnit> {
        self.roots
            .iter()
            .map(|id| {
                let class = self.class(*id);
                OutputUnit {
                    class: *id,
                    qualified_name: self.qualified_name(*id),
                    directories: class.path.directories.clone(),
                    file_name: format!("{}.{}", class.class_name(), self.profile.extension()),
                }
            })
            .collect()
    }
}

/// Where a root class is written and how it is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputUnit {
    pub class: ClassId,
    pub qualified_name: String,
    pub directories: Vec<String>,
    pub file_name: String,
}

impl OutputUnit {
    pub fn path(&self) -> String {
        let mut segments = self.directories.clone();
        segments.push(self.file_name.clone());
        segments.join("/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualifiedPath {
    pub namespace: Option<String>,
    /// Names of enclosing classes, outermost first. Empty for roots.
    pub enclosing: Vec<String>,
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassDescriptor {
    pub id: ClassId,
    pub name: Name,
    pub path: QualifiedPath,
    pub kind: ClassKind,
    pub parent: Option<ClassId>,
    pub interfaces: Vec<InterfaceRef>,
    pub properties: Vec<PropertyDescriptor>,
    pub nested: Vec<ClassId>,
    pub source: SchemaLocation,
    pub description: Option<String>,
    /// Keys that are neither named nor matched by a pattern are rejected.
    pub strict: bool,
}

impl ClassDescriptor {
    pub fn class_name(&self) -> String {
        self.name.upper_camel_case()
    }

    pub fn property(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.key == key)
    }

    pub fn is_nested(&self) -> bool {
        !self.path.enclosing.is_empty()
    }

    pub fn implements(&self, interface: ClassId) -> bool {
        self.interfaces
            .iter()
            .any(|i| matches!(i, InterfaceRef::Generated(id) if *id == interface))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceRef {
    Generated(ClassId),
    External(ClassRef),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassKind {
    Value,
    MapBacked(MapShape),
    Enum(EnumShape),
    Interface(InterfaceShape),
    Derived(DerivedShape),
}

impl ClassKind {
    pub fn label(&self) -> &'static str {
        match self {
            ClassKind::Value => "value",
            ClassKind::MapBacked(_) => "map",
            ClassKind::Enum(_) => "enum",
            ClassKind::Interface(_) => "interface",
            ClassKind::Derived(_) => "derived",
        }
    }
}

/// How keys outside the named properties are treated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRule {
    Any,
    Forbidden,
    Typed(TypeSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternEntry {
    pub pattern: String,
    pub rule: EntryRule,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Cardinality {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl Cardinality {
    /// The exact entry count, when minimum and maximum agree.
    pub fn exact(&self) -> Option<u64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => Some(min),
            _ => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapShape {
    pub patterns: Vec<PatternEntry>,
    pub additional: EntryRule,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumBase {
    String,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumShape {
    pub base: EnumBase,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    OneOf,
    AnyOf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceShape {
    pub composition: Composition,
    pub implementations: Vec<ClassId>,
    pub discriminator: Option<String>,
}

/// An inherited property the derived schema tightens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyOverride {
    pub key: String,
    pub required: bool,
    pub nullable: bool,
    pub validations: Vec<Validation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedShape {
    pub overrides: Vec<PropertyOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOrigin {
    Declared,
    /// Shared by every implementation of a group and lifted onto its interface.
    Hoisted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescriptor {
    pub key: String,
    pub name: Name,
    pub resolved_type: ResolvedType,
    pub nullable: bool,
    pub required: bool,
    pub default: Option<Value>,
    pub validations: Vec<Validation>,
    pub description: Option<String>,
    pub origin: PropertyOrigin,
}

impl PropertyDescriptor {
    pub fn type_spec(&self) -> TypeSpec {
        TypeSpec {
            resolved_type: self.resolved_type.clone(),
            nullable: self.nullable,
            validations: self.validations.clone(),
        }
    }

    /// The `const` literal this property is pinned to, if any.
    pub fn const_value(&self) -> Option<&Value> {
        self.validations.iter().find_map(|v| match v {
            Validation::Const(value) => Some(value),
            _ => None,
        })
    }
}

/// Where a JSON key of an instance lands in a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRoute {
    Named,
    /// Indices into [`MapShape::patterns`] of every pattern the key matches.
    /// The value must satisfy each of their rules.
    Pattern(Vec<usize>),
    Additional,
    Rejected,
}

/// Routes instance keys with named properties first, then every matching
/// pattern, then the additional-properties rule. A key matching a pattern
/// whose rule forbids values is rejected even when other patterns accept it,
/// which is how instance validation treats `patternProperties`.
#[derive(Debug)]
pub struct KeyRouter {
    named: Vec<String>,
    patterns: Vec<(Regex, bool)>,
    additional: bool,
}

impl KeyRouter {
    pub fn new(model: &ClassModel, id: ClassId) -> Result<Self, regex::Error> {
        let class = model.class(id);
        let named = model
            .all_properties(id)
            .into_iter()
            .map(|p| p.key.clone())
            .collect();
        let (patterns, additional) = match &class.kind {
            ClassKind::MapBacked(shape) => {
                let patterns = shape
                    .patterns
                    .iter()
                    .map(|entry| {
                        Ok((
                            Regex::new(&entry.pattern)?,
                            entry.rule != EntryRule::Forbidden,
                        ))
                    })
                    .collect::<Result<Vec<_>, regex::Error>>()?;
                (patterns, shape.additional != EntryRule::Forbidden)
            }
            _ => (Vec::new(), !class.strict),
        };
        Ok(Self {
            named,
            patterns,
            additional,
        })
    }

    pub fn route(&self, key: &str) -> KeyRoute {
        if self.named.iter().any(|n| n == key) {
            return KeyRoute::Named;
        }
        let matched: Vec<usize> = self
            .patterns
            .iter()
            .enumerate()
            .filter(|(_, (re, _))| re.is_match(key))
            .map(|(index, _)| index)
            .collect();
        if !matched.is_empty() {
            return if matched.iter().all(|&index| self.patterns[index].1) {
                KeyRoute::Pattern(matched)
            } else {
                KeyRoute::Rejected
            };
        }
        if self.additional {
            KeyRoute::Additional
        } else {
            KeyRoute::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_exact() {
        let exact = Cardinality {
            min: Some(2),
            max: Some(2),
        };
        assert_eq!(exact.exact(), Some(2));
        let range = Cardinality {
            min: Some(1),
            max: Some(3),
        };
        assert_eq!(range.exact(), None);
        assert!(Cardinality::default().is_unbounded());
    }

    #[test]
    fn test_output_unit_path() {
        let unit = OutputUnit {
            class: ClassId(0),
            qualified_name: "com.example.Widget".into(),
            directories: vec!["com".into(), "example".into()],
            file_name: "Widget.kt".into(),
        };
        assert_eq!(unit.path(), "com/example/Widget.kt");
    }
}
