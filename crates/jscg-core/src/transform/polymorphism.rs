use std::collections::HashSet;

use log::debug;
use serde_json::Value;

use super::builder::{BuildContext, NameSeed};
use super::constraints::{Constraints, extract};
use super::resolver::NodeId;
use crate::error::BuildError;
use crate::ir::*;

/// Turn class `interface` into the interface of a `oneOf`/`anyOf` group and
/// give every branch an implementation class.
pub(crate) fn build_group(
    cx: &mut BuildContext,
    interface: ClassId,
    node: NodeId,
    c: &Constraints,
    composition: Composition,
    branches: &[NodeId],
    owner: ClassId,
) -> Result<(), BuildError> {
    cx.classes[interface.0].kind = ClassKind::Interface(InterfaceShape {
        composition,
        implementations: Vec::new(),
        discriminator: None,
    });

    let merged = cx.merge_object(node, c, true)?;
    let own = cx.build_properties(&merged, owner)?;
    cx.classes[interface.0].properties = own;

    let interface_name = cx.classes[interface.0].class_name();
    let mut implementations: Vec<ClassId> = Vec::new();
    for (index, raw) in branches.iter().enumerate() {
        let seed = if cx.resolver.node(*raw).is_pure_ref() {
            NameSeed::fallback(format!("{interface_name}{}", index + 1))
        } else {
            let branch = cx.resolver.canonical(*raw)?;
            let bc = extract(&mut cx.resolver, branch)?;
            NameSeed {
                property: match bc.title.clone() {
                    Some(title) => Some(title),
                    None => const_hint(cx, &bc)?,
                },
                ..NameSeed::fallback(format!("{interface_name}{}", index + 1))
            }
        };
        let implementation = cx.class_for_node(*raw, &seed, owner)?;
        if implementation == interface {
            return Err(BuildError::IncompatibleBranches {
                location: c.location.clone(),
                reason: format!("branch {index} is the group itself"),
            });
        }
        if implementations.contains(&implementation) {
            debug!("{}: branch {index} repeats an earlier branch", c.location);
            continue;
        }
        if !cx.classes[implementation.0].implements(interface) {
            cx.classes[implementation.0]
                .interfaces
                .push(InterfaceRef::Generated(interface));
        }
        implementations.push(implementation);
    }

    let discriminator = find_discriminator(cx, &implementations, c)?;
    hoist_shared(cx, interface, &implementations);

    if let ClassKind::Interface(shape) = &mut cx.classes[interface.0].kind {
        shape.implementations = implementations;
        shape.discriminator = discriminator;
    }
    Ok(())
}

/// The first string `const` among an inline branch's properties.
fn const_hint(cx: &mut BuildContext, bc: &Constraints) -> Result<Option<String>, BuildError> {
    for (_, raw) in &bc.properties {
        let node = cx.resolver.canonical(*raw)?;
        let pc = extract(&mut cx.resolver, node)?;
        if let Some(Value::String(value)) = pc.const_value {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// A property pinned to a distinct `const` in every implementation.
fn find_discriminator(
    cx: &BuildContext,
    implementations: &[ClassId],
    c: &Constraints,
) -> Result<Option<String>, BuildError> {
    let Some((first, rest)) = implementations.split_first() else {
        return Ok(None);
    };
    for candidate in cx.all_properties(*first) {
        let Some(first_value) = candidate.const_value() else {
            continue;
        };
        let mut values = vec![first_value.clone()];
        for implementation in rest {
            let properties = cx.all_properties(*implementation);
            match properties
                .iter()
                .find(|p| p.key == candidate.key)
                .and_then(|p| p.const_value())
            {
                Some(value) => values.push(value.clone()),
                None => break,
            }
        }
        if values.len() != implementations.len() {
            continue;
        }

        let mut seen = HashSet::new();
        for value in &values {
            if !seen.insert(value.to_string()) {
                return Err(BuildError::IncompatibleBranches {
                    location: c.location.clone(),
                    reason: format!(
                        "discriminator {} has value {value} in more than one branch",
                        candidate.key
                    ),
                });
            }
        }
        return Ok(Some(candidate.key));
    }
    Ok(None)
}

/// Lift properties every implementation declares identically onto the
/// interface.
fn hoist_shared(cx: &mut BuildContext, interface: ClassId, implementations: &[ClassId]) {
    let Some((first, rest)) = implementations.split_first() else {
        return;
    };
    let views: Vec<Vec<PropertyDescriptor>> =
        rest.iter().map(|id| cx.all_properties(*id)).collect();

    let mut hoisted = Vec::new();
    for property in cx.all_properties(*first) {
        if cx.classes[interface.0].property(&property.key).is_some() {
            continue;
        }
        let mut common = property.validations.clone();
        let mut shared = true;
        for view in &views {
            match view.iter().find(|p| p.key == property.key) {
                Some(other)
                    if other.resolved_type == property.resolved_type
                        && other.required == property.required
                        && other.nullable == property.nullable =>
                {
                    common.retain(|v| other.validations.contains(v));
                }
                _ => {
                    shared = false;
                    break;
                }
            }
        }
        if !shared {
            continue;
        }
        common.retain(|v| !matches!(v, Validation::Const(_)));
        hoisted.push(PropertyDescriptor {
            validations: common,
            origin: PropertyOrigin::Hoisted,
            ..property
        });
    }

    for property in &hoisted {
        for implementation in implementations {
            if let Some(own) = cx.classes[implementation.0]
                .properties
                .iter_mut()
                .find(|p| p.key == property.key)
            {
                own.origin = PropertyOrigin::Hoisted;
            }
        }
    }
    cx.classes[interface.0].properties.extend(hoisted);
}
