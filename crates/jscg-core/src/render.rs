//! A plain-text rendering of a class model, one file per root class.

use std::convert::Infallible;
use std::fmt::Write;

use crate::GeneratedFile;
use crate::ModelRenderer;
use crate::ir::*;

/// Renders each root class and its nested classes as an indented outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineRenderer;

impl ModelRenderer for OutlineRenderer {
    type Error = Infallible;

    fn render(&self, model: &ClassModel) -> Result<Vec<GeneratedFile>, Self::Error> {
        Ok(model
            .output_units()
            .into_iter()
            .map(|unit| {
                let mut content = String::new();
                write_class(&mut content, model, unit.class, 0);
                GeneratedFile {
                    path: format!("{}.outline", unit.path()),
                    content,
                }
            })
            .collect())
    }
}

/// The whole model as one outline, roots in order.
pub fn outline(model: &ClassModel) -> String {
    let mut out = String::new();
    for root in &model.roots {
        write_class(&mut out, model, *root, 0);
    }
    out
}

/// Display form of a resolved type.
pub fn type_name(model: &ClassModel, resolved: &ResolvedType) -> String {
    match resolved {
        ResolvedType::Scalar(scalar) => scalar.to_string(),
        ResolvedType::Array(item) => format!("array<{}>", spec_name(model, item)),
        ResolvedType::Union(variants) => variants
            .iter()
            .map(|v| spec_name(model, v))
            .collect::<Vec<_>>()
            .join(" | "),
        ResolvedType::Class(id) => model.qualified_name(*id),
        ResolvedType::External(class) => class.qualified_name(),
        ResolvedType::Any => "any".to_string(),
    }
}

fn spec_name(model: &ClassModel, spec: &TypeSpec) -> String {
    let mut name = type_name(model, &spec.resolved_type);
    if spec.nullable {
        name.push('?');
    }
    if !spec.validations.is_empty() {
        let checks: Vec<String> = spec.validations.iter().map(ToString::to_string).collect();
        let _ = write!(name, " [{}]", checks.join(", "));
    }
    name
}

fn write_class(out: &mut String, model: &ClassModel, id: ClassId, depth: usize) {
    let class = model.class(id);
    let pad = "  ".repeat(depth);
    let _ = write!(out, "{pad}{} {}", class.kind.label(), model.qualified_name(id));
    if let Some(parent) = class.parent {
        let _ = write!(out, " extends {}", model.qualified_name(parent));
    }
    if !class.interfaces.is_empty() {
        let names: Vec<String> = class
            .interfaces
            .iter()
            .map(|i| match i {
                InterfaceRef::Generated(id) => model.qualified_name(*id),
                InterfaceRef::External(class) => class.qualified_name(),
            })
            .collect();
        let _ = write!(out, " implements {}", names.join(", "));
    }
    if class.strict {
        out.push_str(" strict");
    }
    out.push('\n');

    for property in &class.properties {
        let mut flags = Vec::new();
        if property.required {
            flags.push("required".to_string());
        }
        if property.origin == PropertyOrigin::Hoisted {
            flags.push("hoisted".to_string());
        }
        if let Some(default) = &property.default {
            flags.push(format!("default {default}"));
        }
        flags.extend(property.validations.iter().map(ToString::to_string));
        let _ = write!(
            out,
            "{pad}  {}: {}{}",
            property.key,
            type_name(model, &property.resolved_type),
            if property.nullable { "?" } else { "" }
        );
        if !flags.is_empty() {
            let _ = write!(out, " [{}]", flags.join(", "));
        }
        out.push('\n');
    }

    match &class.kind {
        ClassKind::Value => {}
        ClassKind::MapBacked(shape) => {
            for entry in &shape.patterns {
                let rule = rule_name(model, &entry.rule);
                let _ = writeln!(out, "{pad}  /{}/: {rule}", entry.pattern);
            }
            let _ = writeln!(out, "{pad}  *: {}", rule_name(model, &shape.additional));
            if !shape.cardinality.is_unbounded() {
                let bound = |b: Option<u64>| b.map(|n| n.to_string()).unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{pad}  count {}..{}",
                    bound(shape.cardinality.min),
                    bound(shape.cardinality.max)
                );
            }
        }
        ClassKind::Enum(shape) => {
            for member in &shape.members {
                let _ = writeln!(out, "{pad}  {} = {}", member.name, member.value);
            }
        }
        ClassKind::Interface(shape) => {
            let names: Vec<String> = shape
                .implementations
                .iter()
                .map(|id| model.qualified_name(*id))
                .collect();
            let _ = write!(out, "{pad}  one of {}", names.join(", "));
            if let Some(key) = &shape.discriminator {
                let _ = write!(out, " by {key}");
            }
            out.push('\n');
        }
        ClassKind::Derived(shape) => {
            for o in &shape.overrides {
                let mut flags = Vec::new();
                if o.required {
                    flags.push("required".to_string());
                }
                flags.extend(o.validations.iter().map(ToString::to_string));
                let _ = writeln!(out, "{pad}  override {}: [{}]", o.key, flags.join(", "));
            }
        }
    }

    for nested in &class.nested {
        write_class(out, model, *nested, depth + 1);
    }
}

fn rule_name(model: &ClassModel, rule: &EntryRule) -> String {
    match rule {
        EntryRule::Any => "any".to_string(),
        EntryRule::Forbidden => "forbidden".to_string(),
        EntryRule::Typed(spec) => spec_name(model, spec),
    }
}
