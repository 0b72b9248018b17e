use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Number, Value};
use url::Url;

use super::constraints::{AdditionalProperties, extract};
use super::formats::FormatRegistry;
use super::resolver::{NodeId, SchemaResolver};
use crate::error::BuildError;
use crate::ir::{FormatCheck, NumberValue, StandardFormat, TerminalCheck};
use crate::parse::document::{SchemaLocation, escape_segment};

/// Deepest instance nesting the checker walks before giving up on a branch.
const MAX_DEPTH: usize = 128;

/// One `examples` entry that does not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExampleFailure {
    pub location: SchemaLocation,
    pub index: usize,
    pub instance_path: String,
    pub message: String,
}

impl fmt::Display for ExampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: example {} at '{}': {}",
            self.location, self.index, self.instance_path, self.message
        )
    }
}

/// A violation found while checking one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub instance_path: String,
    pub message: String,
}

/// Checks instances against schema nodes, following references through the
/// resolver it borrows.
pub struct InstanceValidator<'r, 's> {
    resolver: &'r mut SchemaResolver<'s>,
    formats: &'r FormatRegistry,
}

impl<'r, 's> InstanceValidator<'r, 's> {
    pub fn new(resolver: &'r mut SchemaResolver<'s>, formats: &'r FormatRegistry) -> Self {
        Self { resolver, formats }
    }

    pub fn validate(
        &mut self,
        instance: &Value,
        node: NodeId,
    ) -> Result<Vec<Violation>, BuildError> {
        let mut violations = Vec::new();
        self.check(instance, node, "", 0, &mut violations)?;
        Ok(violations)
    }

    /// Check `node`'s own examples and report each failure.
    pub fn check_examples(&mut self, node: NodeId) -> Result<Vec<ExampleFailure>, BuildError> {
        let node = self.resolver.canonical(node)?;
        let c = extract(self.resolver, node)?;
        let mut failures = Vec::new();
        for (index, example) in c.examples.iter().enumerate() {
            for violation in self.validate(example, node)? {
                failures.push(ExampleFailure {
                    location: c.location.clone(),
                    index,
                    instance_path: violation.instance_path,
                    message: violation.message,
                });
            }
        }
        Ok(failures)
    }

    fn passes(
        &mut self,
        instance: &Value,
        node: NodeId,
        path: &str,
        depth: usize,
    ) -> Result<bool, BuildError> {
        let mut scratch = Vec::new();
        self.check(instance, node, path, depth, &mut scratch)?;
        Ok(scratch.is_empty())
    }

    fn check(
        &mut self,
        instance: &Value,
        raw: NodeId,
        path: &str,
        depth: usize,
        out: &mut Vec<Violation>,
    ) -> Result<(), BuildError> {
        if depth > MAX_DEPTH {
            return Ok(());
        }
        let node = self.resolver.canonical(raw)?;
        let c = extract(self.resolver, node)?;
        let mut fail = |message: String| {
            out.push(Violation {
                instance_path: path.to_string(),
                message,
            })
        };

        if c.never {
            fail("no value is allowed here".to_string());
            return Ok(());
        }

        if c.type_declared {
            let matches = c.types.iter().any(|t| t.matches(instance))
                || (c.nullable && instance.is_null());
            if !matches {
                let mut names: Vec<String> = c
                    .types
                    .iter()
                    .map(|t| format!("{t:?}").to_lowercase())
                    .collect();
                if c.nullable {
                    names.push("null".to_string());
                }
                fail(format!("expected {}, found {}", names.join(" or "), kind_of(instance)));
                return Ok(());
            }
        }

        if let Some(expected) = &c.const_value
            && !json_equal(expected, instance)
        {
            fail(format!("expected constant {expected}"));
        }
        if let Some(values) = &c.enum_values
            && !values.iter().any(|v| json_equal(v, instance))
        {
            fail(format!("{instance} is not one of the allowed values"));
        }

        if let Some(n) = instance.as_number() {
            if let Some(min) = &c.minimum
                && compare(n, min) == Some(Ordering::Less)
            {
                fail(format!("{n} is less than the minimum {min}"));
            }
            if let Some(min) = &c.exclusive_minimum
                && compare(n, min) != Some(Ordering::Greater)
            {
                fail(format!("{n} is not greater than {min}"));
            }
            if let Some(max) = &c.maximum
                && compare(n, max) == Some(Ordering::Greater)
            {
                fail(format!("{n} is greater than the maximum {max}"));
            }
            if let Some(max) = &c.exclusive_maximum
                && compare(n, max) != Some(Ordering::Less)
            {
                fail(format!("{n} is not less than {max}"));
            }
            if let Some(step) = &c.multiple_of
                && !is_multiple(n, step)
            {
                fail(format!("{n} is not a multiple of {step}"));
            }
        }

        if let Some(s) = instance.as_str() {
            let length = s.chars().count() as u64;
            if let Some(min) = c.min_length
                && length < min
            {
                fail(format!("length {length} is shorter than {min}"));
            }
            if let Some(max) = c.max_length
                && length > max
            {
                fail(format!("length {length} is longer than {max}"));
            }
            if let Some(pattern) = &c.pattern
                && let Ok(re) = Regex::new(pattern)
                && !re.is_match(s)
            {
                fail(format!("'{s}' does not match {pattern}"));
            }
            if let Some(format) = &c.format
                && let Some(check) = self.formats.check_for(format)
                && !format_holds(&check, s)
            {
                fail(format!("'{s}' is not a valid {format}"));
            }
        }

        if let Some(items) = instance.as_array() {
            let count = items.len() as u64;
            if let Some(min) = c.min_items
                && count < min
            {
                fail(format!("{count} items, expected at least {min}"));
            }
            if let Some(max) = c.max_items
                && count > max
            {
                fail(format!("{count} items, expected at most {max}"));
            }
            if c.unique_items {
                let duplicate = items
                    .iter()
                    .enumerate()
                    .any(|(i, a)| items[i + 1..].iter().any(|b| json_equal(a, b)));
                if duplicate {
                    fail("items are not unique".to_string());
                }
            }
            if let Some(schema) = c.items {
                for (i, item) in items.iter().enumerate() {
                    self.check(item, schema, &format!("{path}/{i}"), depth + 1, out)?;
                }
            }
        }

        if let Some(object) = instance.as_object() {
            for key in &c.required {
                if !object.contains_key(key) {
                    out.push(Violation {
                        instance_path: path.to_string(),
                        message: format!("missing required property {key}"),
                    });
                }
            }
            let count = object.len() as u64;
            if let Some(min) = c.min_properties
                && count < min
            {
                out.push(Violation {
                    instance_path: path.to_string(),
                    message: format!("{count} properties, expected at least {min}"),
                });
            }
            if let Some(max) = c.max_properties
                && count > max
            {
                out.push(Violation {
                    instance_path: path.to_string(),
                    message: format!("{count} properties, expected at most {max}"),
                });
            }

            let patterns: Vec<(Regex, NodeId)> = c
                .pattern_properties
                .iter()
                .filter_map(|(p, n)| Regex::new(p).ok().map(|re| (re, *n)))
                .collect();
            for (key, value) in object {
                let child_path = format!("{path}/{}", escape_segment(key));
                let mut matched = false;
                if let Some((_, schema)) = c.properties.iter().find(|(k, _)| k == key) {
                    matched = true;
                    self.check(value, *schema, &child_path, depth + 1, out)?;
                }
                for (re, schema) in &patterns {
                    if re.is_match(key) {
                        matched = true;
                        self.check(value, *schema, &child_path, depth + 1, out)?;
                    }
                }
                if matched {
                    continue;
                }
                match c.additional_properties {
                    AdditionalProperties::Allowed(false) => out.push(Violation {
                        instance_path: child_path,
                        message: format!("property {key} is not allowed"),
                    }),
                    AdditionalProperties::Schema(schema) => {
                        self.check(value, schema, &child_path, depth + 1, out)?;
                    }
                    AdditionalProperties::Absent | AdditionalProperties::Allowed(true) => {}
                }
            }
        }

        for branch in &c.all_of {
            self.check(instance, *branch, path, depth + 1, out)?;
        }
        if let Some(target) = c.reference {
            self.check(instance, target, path, depth + 1, out)?;
        }
        if !c.any_of.is_empty() {
            let mut any = false;
            for branch in &c.any_of {
                if self.passes(instance, *branch, path, depth + 1)? {
                    any = true;
                    break;
                }
            }
            if !any {
                out.push(Violation {
                    instance_path: path.to_string(),
                    message: "does not match any anyOf branch".to_string(),
                });
            }
        }
        if !c.one_of.is_empty() {
            let mut matching = 0;
            for branch in &c.one_of {
                if self.passes(instance, *branch, path, depth + 1)? {
                    matching += 1;
                }
            }
            if matching != 1 {
                out.push(Violation {
                    instance_path: path.to_string(),
                    message: format!("matches {matching} oneOf branches, expected exactly one"),
                });
            }
        }
        if let Some(negated) = c.not
            && self.passes(instance, negated, path, depth + 1)?
        {
            out.push(Violation {
                instance_path: path.to_string(),
                message: "matches a schema it must not match".to_string(),
            });
        }
        Ok(())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Orders an instance number against a keyword bound. Integers compare
/// exactly; anything else goes through `f64`.
fn compare(n: &Number, bound: &NumberValue) -> Option<Ordering> {
    match (n.as_i64(), bound.as_i64()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => n.as_f64()?.partial_cmp(&bound.as_f64()),
    }
}

fn is_multiple(n: &Number, step: &NumberValue) -> bool {
    if let (Some(a), Some(b)) = (n.as_i64(), step.as_i64())
        && b != 0
    {
        return a % b == 0;
    }
    let Some(value) = n.as_f64() else {
        return true;
    };
    let quotient = value / step.as_f64();
    (quotient - quotient.round()).abs() <= 1e-9
}

/// JSON equality where `1` and `1.0` are the same number.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}

fn format_holds(check: &FormatCheck, value: &str) -> bool {
    match check {
        FormatCheck::Standard(format) => standard_format_holds(*format, value),
        FormatCheck::Custom { check, .. } => match check {
            TerminalCheck::Pattern(pattern) => {
                Regex::new(pattern).is_ok_and(|re| re.is_match(value))
            }
            TerminalCheck::Format(format) => standard_format_holds(*format, value),
        },
    }
}

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid regex"));

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
        .expect("valid regex")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:\d+W|(?:\d+Y)?(?:\d+M)?(?:\d+D)?(?:T(?:\d+H)?(?:\d+M)?(?:\d+(?:\.\d+)?S)?)?)$")
        .expect("valid regex")
});

/// Whether `value` is a well-formed instance of `format`. Formats without a
/// practical check pass.
pub fn standard_format_holds(format: StandardFormat, value: &str) -> bool {
    match format {
        StandardFormat::DateTime => chrono::DateTime::parse_from_rfc3339(value).is_ok(),
        StandardFormat::Date => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        StandardFormat::Time => {
            chrono::DateTime::parse_from_rfc3339(&format!("1970-01-01T{value}")).is_ok()
        }
        StandardFormat::Duration => {
            value != "P" && !value.ends_with('T') && DURATION.is_match(value)
        }
        StandardFormat::Email | StandardFormat::IdnEmail => EMAIL.is_match(value),
        StandardFormat::Hostname => value.len() <= 253 && HOSTNAME.is_match(value),
        StandardFormat::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
        StandardFormat::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
        StandardFormat::Uri | StandardFormat::Iri => Url::parse(value).is_ok(),
        StandardFormat::UriReference | StandardFormat::IriReference => {
            Url::parse("http://reference.invalid/").is_ok_and(|base| base.join(value).is_ok())
        }
        StandardFormat::Uuid => value.len() == 36 && uuid::Uuid::parse_str(value).is_ok(),
        StandardFormat::JsonPointer => {
            value.is_empty() || (value.starts_with('/') && pointer_escapes_valid(value))
        }
        StandardFormat::RelativeJsonPointer => {
            let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
            let rest = &value[digits..];
            digits > 0
                && (rest.is_empty()
                    || rest == "#"
                    || (rest.starts_with('/') && pointer_escapes_valid(rest)))
        }
        StandardFormat::Regex => Regex::new(value).is_ok(),
        StandardFormat::IdnHostname | StandardFormat::UriTemplate => true,
    }
}

fn pointer_escapes_valid(pointer: &str) -> bool {
    let mut chars = pointer.chars();
    while let Some(c) = chars.next() {
        if c == '~' && !matches!(chars.next(), Some('0') | Some('1')) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::store::DocumentStore;
    use serde_json::json;

    fn violations(schema: Value, instance: Value) -> Vec<Violation> {
        let mut store = DocumentStore::new();
        store.add_value("file:///s.json", schema).unwrap();
        let mut resolver = SchemaResolver::new(&store);
        let node = resolver.resolve("file:///s.json", "").unwrap();
        let formats = FormatRegistry::new();
        InstanceValidator::new(&mut resolver, &formats)
            .validate(&instance, node)
            .unwrap()
    }

    fn valid(schema: Value, instance: Value) -> bool {
        violations(schema, instance).is_empty()
    }

    #[test]
    fn test_types_and_scalars() {
        assert!(valid(json!({ "type": "integer" }), json!(3)));
        assert!(valid(json!({ "type": "integer" }), json!(3.0)));
        assert!(!valid(json!({ "type": "integer" }), json!(3.5)));
        assert!(valid(json!({ "type": ["string", "null"] }), json!(null)));
        assert!(!valid(json!({ "type": "string", "minLength": 2 }), json!("a")));
        assert!(!valid(json!({ "maximum": 10 }), json!(11)));
        assert!(valid(json!({ "maximum": 10 }), json!("not a number")));
        assert!(!valid(json!({ "exclusiveMinimum": 0 }), json!(0)));
        assert!(valid(json!({ "multipleOf": 0.1 }), json!(0.3)));
        assert!(!valid(json!({ "multipleOf": 2 }), json!(3)));
        assert!(valid(json!({ "enum": [1, "a"] }), json!(1.0)));
        assert!(!valid(json!({ "const": "x" }), json!("y")));
        assert!(!valid(json!(false), json!(1)));
    }

    #[test]
    fn test_object_keys_route_through_patterns_before_additional() {
        let schema = json!({
            "properties": { "name": { "type": "string" } },
            "patternProperties": { "^x-": { "type": "integer" } },
            "additionalProperties": false
        });
        assert!(valid(schema.clone(), json!({ "name": "a", "x-count": 1 })));

        let found = violations(schema.clone(), json!({ "x-count": "one" }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_path, "/x-count");

        let found = violations(schema, json!({ "other": 1 }));
        assert_eq!(found[0].message, "property other is not allowed");
    }

    #[test]
    fn test_combinators_and_refs() {
        let schema = json!({
            "$defs": { "pos": { "type": "integer", "minimum": 1 } },
            "oneOf": [{ "$ref": "#/$defs/pos" }, { "type": "string" }]
        });
        assert!(valid(schema.clone(), json!(5)));
        assert!(valid(schema.clone(), json!("s")));
        assert!(!valid(schema, json!(0)));

        let numbers = json!([{ "type": "integer" }, { "type": "number" }]);
        assert!(!valid(json!({ "oneOf": numbers.clone() }), json!(1)));
        assert!(valid(json!({ "anyOf": numbers }), json!(1)));
        assert!(!valid(json!({ "not": { "type": "string" } }), json!("s")));
        assert!(!valid(json!({ "allOf": [{ "minimum": 2 }, { "maximum": 3 }] }), json!(4)));
    }

    #[test]
    fn test_recursive_schema_is_bounded_by_the_instance() {
        let schema = json!({
            "type": "object",
            "properties": { "next": { "$ref": "#" }, "value": { "type": "integer" } }
        });
        let instance = json!({ "value": 1, "next": { "value": 2, "next": { "value": "x" } } });
        let found = violations(schema, instance);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_path, "/next/next/value");
    }

    #[test]
    fn test_large_integer_bounds_are_exact() {
        let schema = json!({ "maximum": 9007199254740993_i64 });
        assert!(valid(schema.clone(), json!(9007199254740993_i64)));
        assert!(!valid(schema, json!(9007199254740994_i64)));
        let schema = json!({ "exclusiveMinimum": 9007199254740993_i64 });
        assert!(!valid(schema.clone(), json!(9007199254740993_i64)));
        assert!(valid(schema, json!(9007199254740994_i64)));
        assert!(!valid(json!({ "multipleOf": 2 }), json!(9007199254740993_i64)));
        assert!(valid(json!({ "maximum": 1.5 }), json!(1)));
    }

    #[test]
    fn test_arrays() {
        let schema = json!({ "items": { "type": "string" }, "uniqueItems": true, "maxItems": 2 });
        assert!(valid(schema.clone(), json!(["a", "b"])));
        assert!(!valid(schema.clone(), json!(["a", "a"])));
        assert!(!valid(schema.clone(), json!(["a", "b", "c"])));
        let found = violations(schema, json!(["a", 1]));
        assert_eq!(found[0].instance_path, "/1");
    }

    #[test]
    fn test_standard_formats() {
        use StandardFormat::*;
        assert!(standard_format_holds(DateTime, "2024-02-29T12:00:00Z"));
        assert!(!standard_format_holds(DateTime, "2024-02-30T12:00:00Z"));
        assert!(standard_format_holds(Date, "2024-02-29"));
        assert!(!standard_format_holds(Date, "2023-02-29"));
        assert!(standard_format_holds(Time, "08:30:00+02:00"));
        assert!(!standard_format_holds(Time, "25:00:00Z"));
        assert!(standard_format_holds(Duration, "P3DT4H"));
        assert!(!standard_format_holds(Duration, "P"));
        assert!(standard_format_holds(Email, "a@b.io"));
        assert!(!standard_format_holds(Email, "a.b.io"));
        assert!(standard_format_holds(Hostname, "api.example.com"));
        assert!(!standard_format_holds(Hostname, "-bad.example"));
        assert!(standard_format_holds(Ipv4, "10.0.0.1"));
        assert!(!standard_format_holds(Ipv4, "10.0.0.256"));
        assert!(standard_format_holds(Ipv6, "::1"));
        assert!(standard_format_holds(Uri, "https://example.com/a"));
        assert!(!standard_format_holds(Uri, "/relative"));
        assert!(standard_format_holds(UriReference, "/relative"));
        assert!(standard_format_holds(Uuid, "123e4567-e89b-12d3-a456-426614174000"));
        assert!(!standard_format_holds(Uuid, "123e4567e89b12d3a456426614174000"));
        assert!(standard_format_holds(JsonPointer, "/a~1b"));
        assert!(!standard_format_holds(JsonPointer, "/a~2"));
        assert!(standard_format_holds(RelativeJsonPointer, "1/a"));
        assert!(!standard_format_holds(Regex, "("));
    }

    #[test]
    fn test_custom_format_checks() {
        let check = FormatCheck::Custom {
            name: "currency".into(),
            check: TerminalCheck::Pattern("^[A-Z]{3}$".into()),
        };
        assert!(format_holds(&check, "EUR"));
        assert!(!format_holds(&check, "euro"));
    }

    #[test]
    fn test_check_examples_reports_each_failure() {
        let mut store = DocumentStore::new();
        store
            .add_value(
                "file:///s.json",
                json!({ "type": "integer", "minimum": 0, "examples": [1, -1, "x"] }),
            )
            .unwrap();
        let mut resolver = SchemaResolver::new(&store);
        let node = resolver.resolve("file:///s.json", "").unwrap();
        let formats = FormatRegistry::new();
        let failures = InstanceValidator::new(&mut resolver, &formats)
            .check_examples(node)
            .unwrap();
        assert_eq!(
            failures.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            failures[0].to_string(),
            "file:///s.json#: example 1 at '': -1 is less than the minimum 0"
        );
    }
}
