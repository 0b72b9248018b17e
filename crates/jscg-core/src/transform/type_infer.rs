use serde_json::Value;

use super::constraints::Constraints;
use super::formats::FormatRegistry;
use crate::ir::{NumberValue, NumericClass, ScalarType, StandardFormat, Validation};
use crate::parse::schema::SchemaType;

/// Declared non-null types, or, when `type` is absent, the types implied by
/// the node's literals and facets.
pub fn effective_types(c: &Constraints) -> Vec<SchemaType> {
    if !c.types.is_empty() || c.type_declared {
        return c.types.clone();
    }

    let literals: Vec<&Value> = c
        .const_value
        .iter()
        .chain(c.enum_values.iter().flatten())
        .filter(|v| !v.is_null())
        .collect();
    if !literals.is_empty() {
        return if literals.iter().all(|v| v.is_string()) {
            vec![SchemaType::String]
        } else if literals.iter().all(|v| SchemaType::Integer.matches(v)) {
            vec![SchemaType::Integer]
        } else if literals.iter().all(|v| v.is_number()) {
            vec![SchemaType::Number]
        } else if literals.iter().all(|v| v.is_boolean()) {
            vec![SchemaType::Boolean]
        } else {
            Vec::new()
        };
    }

    if c.format.is_some() || c.pattern.is_some() || c.min_length.is_some() || c.max_length.is_some()
    {
        vec![SchemaType::String]
    } else if c.minimum.is_some()
        || c.maximum.is_some()
        || c.exclusive_minimum.is_some()
        || c.exclusive_maximum.is_some()
        || c.multiple_of.is_some()
    {
        vec![SchemaType::Number]
    } else {
        Vec::new()
    }
}

/// The numeric class of an integer or number node; `None` otherwise.
pub fn classify_number(c: &Constraints) -> Option<NumericClass> {
    match effective_types(c).as_slice() {
        [SchemaType::Integer] => Some(classify_integer(c)),
        [SchemaType::Number] => Some(NumericClass::Decimal),
        _ => None,
    }
}

fn classify_integer(c: &Constraints) -> NumericClass {
    if has_decimal_evidence(c) {
        return NumericClass::Decimal;
    }
    if range_implies_int(c) || const_implies_int(c) || enum_implies_int(c) {
        NumericClass::Int32
    } else {
        NumericClass::Int64
    }
}

fn numeric_literals(c: &Constraints) -> impl Iterator<Item = NumberValue> + '_ {
    [
        &c.minimum,
        &c.maximum,
        &c.exclusive_minimum,
        &c.exclusive_maximum,
    ]
    .into_iter()
    .flatten()
    .cloned()
    .chain(c.const_value.iter().filter_map(NumberValue::from_value))
    .chain(
        c.enum_values
            .iter()
            .flatten()
            .filter_map(NumberValue::from_value),
    )
}

fn has_decimal_evidence(c: &Constraints) -> bool {
    numeric_literals(c).any(|n| n.class() == NumericClass::Decimal)
}

/// Both bounds present and inside the 32-bit range once exclusive bounds
/// are folded into inclusive ones.
fn range_implies_int(c: &Constraints) -> bool {
    let lower = [
        c.minimum.as_ref().and_then(NumberValue::as_i64),
        c.exclusive_minimum
            .as_ref()
            .and_then(NumberValue::as_i64)
            .and_then(|v| v.checked_add(1)),
    ]
    .into_iter()
    .flatten()
    .max();
    let upper = [
        c.maximum.as_ref().and_then(NumberValue::as_i64),
        c.exclusive_maximum
            .as_ref()
            .and_then(NumberValue::as_i64)
            .and_then(|v| v.checked_sub(1)),
    ]
    .into_iter()
    .flatten()
    .min();
    match (lower, upper) {
        (Some(lower), Some(upper)) => {
            lower >= i64::from(i32::MIN) && upper <= i64::from(i32::MAX)
        }
        _ => false,
    }
}

fn fits_i32(value: &Value) -> bool {
    matches!(NumberValue::from_value(value), Some(NumberValue::Int32(_)))
}

fn const_implies_int(c: &Constraints) -> bool {
    c.const_value.as_ref().is_some_and(fits_i32)
}

fn enum_implies_int(c: &Constraints) -> bool {
    c.enum_values.as_ref().is_some_and(|values| {
        let mut numbers = values.iter().filter(|v| !v.is_null()).peekable();
        numbers.peek().is_some() && numbers.all(fits_i32)
    })
}

/// Scalar representation of a node whose only effective type is `t`.
pub fn scalar_for(c: &Constraints, t: SchemaType) -> Option<ScalarType> {
    match t {
        SchemaType::String => Some(
            c.format
                .as_deref()
                .and_then(StandardFormat::from_keyword)
                .and_then(StandardFormat::system_type)
                .unwrap_or(ScalarType::String),
        ),
        SchemaType::Integer => Some(match classify_integer(c) {
            NumericClass::Int32 => ScalarType::Int32,
            NumericClass::Int64 => ScalarType::Int64,
            NumericClass::Decimal => ScalarType::Decimal,
        }),
        SchemaType::Number => Some(ScalarType::Decimal),
        SchemaType::Boolean => Some(ScalarType::Boolean),
        SchemaType::Array | SchemaType::Object | SchemaType::Null => None,
    }
}

/// The narrowest scalar for a single-typed scalar node.
pub fn infer_scalar(c: &Constraints) -> Option<ScalarType> {
    match effective_types(c).as_slice() {
        [t] => scalar_for(c, *t),
        _ => None,
    }
}

fn numeric_class(scalar: ScalarType) -> Option<NumericClass> {
    match scalar {
        ScalarType::Int32 => Some(NumericClass::Int32),
        ScalarType::Int64 => Some(NumericClass::Int64),
        ScalarType::Decimal => Some(NumericClass::Decimal),
        _ => None,
    }
}

fn is_string_like(scalar: ScalarType) -> bool {
    matches!(
        scalar,
        ScalarType::String
            | ScalarType::DateTime
            | ScalarType::Date
            | ScalarType::Time
            | ScalarType::Duration
            | ScalarType::Uuid
            | ScalarType::Uri
    )
}

/// Runtime checks for a scalar property, in keyword order.
pub fn scalar_validations(
    c: &Constraints,
    scalar: ScalarType,
    formats: &FormatRegistry,
) -> Vec<Validation> {
    let mut checks = Vec::new();

    if let Some(class) = numeric_class(scalar) {
        let typed = |n: &NumberValue| n.retyped(class);
        if let Some(n) = &c.minimum {
            checks.push(Validation::Minimum(typed(n)));
        }
        if let Some(n) = &c.exclusive_minimum {
            checks.push(Validation::ExclusiveMinimum(typed(n)));
        }
        if let Some(n) = &c.maximum {
            checks.push(Validation::Maximum(typed(n)));
        }
        if let Some(n) = &c.exclusive_maximum {
            checks.push(Validation::ExclusiveMaximum(typed(n)));
        }
        if let Some(n) = &c.multiple_of
            && !(n.is_one() && class != NumericClass::Decimal)
        {
            checks.push(Validation::MultipleOf(typed(n)));
        }
    }

    if is_string_like(scalar) {
        if let Some(n) = c.min_length
            && n > 0
        {
            checks.push(Validation::MinLength(n));
        }
        if let Some(n) = c.max_length {
            checks.push(Validation::MaxLength(n));
        }
        if let Some(pattern) = &c.pattern {
            checks.push(Validation::Pattern(pattern.clone()));
        }
        if let Some(format) = &c.format {
            match formats.check_for(format) {
                Some(check) => checks.push(Validation::Format(check)),
                None => log::debug!("{}: unknown format {format} ignored", c.location),
            }
        }
    }

    if let Some(value) = &c.const_value {
        checks.push(Validation::Const(value.clone()));
    }
    if let Some(values) = &c.enum_values {
        checks.push(Validation::Enum(values.clone()));
    }
    checks
}

/// Item-count and uniqueness checks for an array property.
pub fn array_validations(c: &Constraints) -> Vec<Validation> {
    let mut checks = Vec::new();
    if let Some(n) = c.min_items
        && n > 0
    {
        checks.push(Validation::MinItems(n));
    }
    if let Some(n) = c.max_items {
        checks.push(Validation::MaxItems(n));
    }
    if c.unique_items {
        checks.push(Validation::UniqueItems);
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::store::DocumentStore;
    use crate::transform::constraints::extract;
    use crate::transform::resolver::SchemaResolver;
    use serde_json::json;

    fn constraints(schema: Value) -> Constraints {
        let mut store = DocumentStore::new();
        store.add_value("file:///s.json", schema).unwrap();
        let mut resolver = SchemaResolver::new(&store);
        let root = resolver.resolve("file:///s.json", "").unwrap();
        extract(&mut resolver, root).unwrap()
    }

    fn class_of(schema: Value) -> Option<NumericClass> {
        classify_number(&constraints(schema))
    }

    #[test]
    fn test_integer_bounds_at_32_bit_limits() {
        assert_eq!(
            class_of(json!({ "type": "integer", "minimum": -2147483648, "maximum": 2147483647 })),
            Some(NumericClass::Int32)
        );
        assert_eq!(
            class_of(json!({ "type": "integer", "minimum": 0, "maximum": 2147483648_i64 })),
            Some(NumericClass::Int64)
        );
    }

    #[test]
    fn test_range_needs_both_bounds() {
        assert_eq!(
            class_of(json!({ "type": "integer", "minimum": 0 })),
            Some(NumericClass::Int64)
        );
        assert_eq!(
            class_of(json!({ "type": "integer", "maximum": 10 })),
            Some(NumericClass::Int64)
        );
        assert_eq!(class_of(json!({ "type": "integer" })), Some(NumericClass::Int64));
    }

    #[test]
    fn test_exclusive_bounds_are_folded() {
        assert_eq!(
            class_of(json!({
                "type": "integer",
                "exclusiveMinimum": -2147483649_i64,
                "exclusiveMaximum": 2147483648_i64
            })),
            Some(NumericClass::Int32)
        );
        assert_eq!(
            class_of(json!({
                "type": "integer",
                "minimum": 0,
                "exclusiveMaximum": 2147483649_i64
            })),
            Some(NumericClass::Int64)
        );
    }

    #[test]
    fn test_const_and_enum_imply_int() {
        assert_eq!(
            class_of(json!({ "type": "integer", "const": 7 })),
            Some(NumericClass::Int32)
        );
        assert_eq!(
            class_of(json!({ "type": "integer", "const": 4294967296_i64 })),
            Some(NumericClass::Int64)
        );
        assert_eq!(
            class_of(json!({ "type": "integer", "enum": [1, 2, 3] })),
            Some(NumericClass::Int32)
        );
        assert_eq!(
            class_of(json!({ "type": "integer", "enum": [1, 4294967296_i64] })),
            Some(NumericClass::Int64)
        );
    }

    #[test]
    fn test_decimal_evidence() {
        assert_eq!(
            class_of(json!({ "type": "integer", "minimum": 0.5, "maximum": 10 })),
            Some(NumericClass::Decimal)
        );
        assert_eq!(
            class_of(json!({ "type": "integer", "maximum": 18446744073709551615_u64 })),
            Some(NumericClass::Decimal)
        );
        assert_eq!(class_of(json!({ "type": "number" })), Some(NumericClass::Decimal));
        assert_eq!(
            class_of(json!({ "type": "number", "minimum": 0, "maximum": 10 })),
            Some(NumericClass::Decimal)
        );
        assert_eq!(class_of(json!({ "type": "string" })), None);
        assert_eq!(class_of(json!({ "type": ["integer", "string"] })), None);
    }

    #[test]
    fn test_types_inferred_from_literals() {
        assert_eq!(
            infer_scalar(&constraints(json!({ "const": "fixed" }))),
            Some(ScalarType::String)
        );
        assert_eq!(
            infer_scalar(&constraints(json!({ "enum": [1, 2] }))),
            Some(ScalarType::Int32)
        );
        assert_eq!(
            infer_scalar(&constraints(json!({ "enum": [1, 2.5] }))),
            Some(ScalarType::Decimal)
        );
        assert_eq!(
            infer_scalar(&constraints(json!({ "const": true }))),
            Some(ScalarType::Boolean)
        );
        assert_eq!(infer_scalar(&constraints(json!({ "enum": [1, "a"] }))), None);
    }

    #[test]
    fn test_format_refines_string() {
        for (format, expected) in [
            ("date-time", ScalarType::DateTime),
            ("date", ScalarType::Date),
            ("time", ScalarType::Time),
            ("duration", ScalarType::Duration),
            ("uuid", ScalarType::Uuid),
            ("uri", ScalarType::Uri),
            ("email", ScalarType::String),
            ("made-up", ScalarType::String),
        ] {
            let c = constraints(json!({ "type": "string", "format": format }));
            assert_eq!(infer_scalar(&c), Some(expected), "{format}");
        }
    }

    #[test]
    fn test_numeric_validations_are_typed() {
        let c = constraints(json!({
            "type": "integer", "minimum": 0, "maximum": 100, "multipleOf": 1
        }));
        let scalar = infer_scalar(&c).unwrap();
        assert_eq!(scalar, ScalarType::Int32);
        assert_eq!(
            scalar_validations(&c, scalar, &FormatRegistry::new()),
            vec![
                Validation::Minimum(NumberValue::Int32(0)),
                Validation::Maximum(NumberValue::Int32(100)),
            ]
        );

        let c = constraints(json!({ "type": "integer", "minimum": 0, "multipleOf": 5 }));
        assert_eq!(
            scalar_validations(&c, ScalarType::Int64, &FormatRegistry::new()),
            vec![
                Validation::Minimum(NumberValue::Int64(0)),
                Validation::MultipleOf(NumberValue::Int64(5)),
            ]
        );
    }

    #[test]
    fn test_string_validations() {
        let c = constraints(json!({
            "type": "string", "minLength": 0, "maxLength": 30, "pattern": "^[a-z]+$",
            "format": "email"
        }));
        assert_eq!(
            scalar_validations(&c, ScalarType::String, &FormatRegistry::new()),
            vec![
                Validation::MaxLength(30),
                Validation::Pattern("^[a-z]+$".into()),
                Validation::Format(crate::ir::FormatCheck::Standard(StandardFormat::Email)),
            ]
        );

        let c = constraints(json!({ "type": "string", "format": "not-registered" }));
        assert!(scalar_validations(&c, ScalarType::String, &FormatRegistry::new()).is_empty());
    }

    #[test]
    fn test_array_validations() {
        let c = constraints(json!({
            "type": "array", "minItems": 0, "maxItems": 3, "uniqueItems": true
        }));
        assert_eq!(
            array_validations(&c),
            vec![Validation::MaxItems(3), Validation::UniqueItems]
        );
    }
}
