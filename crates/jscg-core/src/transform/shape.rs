use super::constraints::{Constraints, extract};
use super::resolver::{NodeId, SchemaResolver};
use super::type_infer::effective_types;
use crate::error::BuildError;
use crate::ir::Composition;
use crate::parse::schema::SchemaType;

/// What a schema node turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// The `false` schema.
    Never,
    /// `enum` of strings or of integers.
    Enum,
    /// `oneOf`/`anyOf` over two or more object-shaped branches (raw nodes,
    /// null branches removed).
    Polymorphic {
        composition: Composition,
        branches: Vec<NodeId>,
        nullable: bool,
    },
    /// `oneOf`/`anyOf` that is not polymorphic. `nullable` is set when a
    /// null branch was removed.
    Union { branches: Vec<NodeId>, nullable: bool },
    /// Extends one referenced object schema. `base_ref` is the raw branch
    /// that referenced it; `extensions` are the remaining `allOf` branches.
    Derived {
        base_ref: NodeId,
        base: NodeId,
        extensions: Vec<NodeId>,
    },
    Object,
    Array,
    Scalar,
    Empty,
}

impl Shape {
    /// Shapes that produce a class descriptor of their own.
    pub fn is_class(&self) -> bool {
        matches!(
            self,
            Shape::Enum
                | Shape::Polymorphic { .. }
                | Shape::Derived { .. }
                | Shape::Object
                | Shape::Empty
        )
    }
}

/// Classify a canonical node.
pub fn classify(
    resolver: &mut SchemaResolver,
    node: NodeId,
    c: &Constraints,
) -> Result<Shape, BuildError> {
    classify_guarded(resolver, node, c, &mut Vec::new())
}

fn classify_guarded(
    resolver: &mut SchemaResolver,
    node: NodeId,
    c: &Constraints,
    stack: &mut Vec<NodeId>,
) -> Result<Shape, BuildError> {
    if c.never {
        return Ok(Shape::Never);
    }
    if is_enum(c) {
        return Ok(Shape::Enum);
    }

    let (composition, group) = if !c.one_of.is_empty() {
        (Composition::OneOf, &c.one_of)
    } else {
        (Composition::AnyOf, &c.any_of)
    };
    if !group.is_empty() {
        stack.push(node);
        let shape = classify_group(resolver, c, composition, group, stack);
        stack.pop();
        let shape = shape?;
        if shape != Shape::Object {
            return Ok(shape);
        }
    }

    if !c.all_of.is_empty() || c.reference.is_some() {
        stack.push(node);
        let base = single_base(resolver, c, stack);
        stack.pop();
        if let Some((base_ref, base)) = base? {
            let extensions = c.all_of.iter().copied().filter(|b| *b != base_ref).collect();
            return Ok(Shape::Derived {
                base_ref,
                base,
                extensions,
            });
        }
        if c.is_object_like() || any_branch_object_like(resolver, c)? {
            return Ok(Shape::Object);
        }
    }

    if c.is_object_like() {
        Ok(Shape::Object)
    } else if c.is_array_like() {
        Ok(Shape::Array)
    } else if c.is_scalar_like() || !c.types.is_empty() || !c.all_of.is_empty() {
        Ok(Shape::Scalar)
    } else {
        Ok(Shape::Empty)
    }
}

fn is_enum(c: &Constraints) -> bool {
    let Some(values) = &c.enum_values else {
        return false;
    };
    let values: Vec<_> = values.iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return false;
    }
    match effective_types(c).as_slice() {
        [SchemaType::String] => values.iter().all(|v| v.is_string()),
        [SchemaType::Integer] => values.iter().all(|v| SchemaType::Integer.matches(v)),
        _ => false,
    }
}

fn classify_group(
    resolver: &mut SchemaResolver,
    c: &Constraints,
    composition: Composition,
    group: &[NodeId],
    stack: &mut Vec<NodeId>,
) -> Result<Shape, BuildError> {
    let mut branches = Vec::new();
    let mut nullable = false;
    let mut constraint_only = true;
    for raw in group {
        let branch = resolver.canonical(*raw)?;
        let bc = extract(resolver, branch)?;
        if bc.is_null_only() {
            nullable = true;
            continue;
        }
        constraint_only &= branch == *raw
            && bc.properties.is_empty()
            && bc.types.is_empty()
            && bc.all_of.is_empty()
            && bc.reference.is_none();
        branches.push(*raw);
    }

    // `oneOf: [{required: [a]}, {required: [b]}]` beside declared properties
    // only restricts which of them must be present.
    if constraint_only && !branches.is_empty() && !c.properties.is_empty() {
        return Ok(Shape::Object);
    }

    if branches.len() >= 2 {
        let mut all_objects = true;
        for raw in &branches {
            if !is_object_shaped(resolver, *raw, stack)? {
                all_objects = false;
                break;
            }
        }
        if all_objects {
            return Ok(Shape::Polymorphic {
                composition,
                branches,
                nullable,
            });
        }
    }
    Ok(Shape::Union { branches, nullable })
}

/// The one object-shaped schema this node extends by reference, if exactly
/// one exists.
fn single_base(
    resolver: &mut SchemaResolver,
    c: &Constraints,
    stack: &mut Vec<NodeId>,
) -> Result<Option<(NodeId, NodeId)>, BuildError> {
    let mut bases = Vec::new();
    if let Some(target) = c.reference
        && is_object_shaped(resolver, target, stack)?
    {
        let base = resolver.canonical(target)?;
        bases.push((target, base));
    }
    for raw in &c.all_of {
        if !resolver.node(*raw).is_pure_ref() {
            continue;
        }
        let target = resolver.canonical(*raw)?;
        if is_object_shaped(resolver, target, stack)? {
            bases.push((*raw, target));
        }
    }
    Ok(match bases.as_slice() {
        [only] => Some(*only),
        _ => None,
    })
}

fn any_branch_object_like(
    resolver: &mut SchemaResolver,
    c: &Constraints,
) -> Result<bool, BuildError> {
    for raw in c.all_of.iter().chain(c.reference.iter()) {
        let branch = resolver.canonical(*raw)?;
        let bc = extract(resolver, branch)?;
        if bc.is_object_like() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether `raw` describes an object with its own class. Nodes already on
/// the classification stack are treated as not object-shaped.
pub fn is_object_shaped(
    resolver: &mut SchemaResolver,
    raw: NodeId,
    stack: &mut Vec<NodeId>,
) -> Result<bool, BuildError> {
    let node = resolver.canonical(raw)?;
    if stack.contains(&node) {
        return Ok(false);
    }
    let c = extract(resolver, node)?;
    stack.push(node);
    let shape = classify_guarded(resolver, node, &c, stack);
    stack.pop();
    Ok(matches!(shape?, Shape::Object | Shape::Derived { .. }))
}
