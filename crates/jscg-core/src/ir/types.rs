use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::model::ClassId;
use super::values::NumberValue;

/// The scalar kinds a renderer maps onto target-language types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Boolean,
    Int32,
    Int64,
    Decimal,
    String,
    DateTime,
    Date,
    Time,
    Duration,
    Uuid,
    Uri,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Boolean => "boolean",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Decimal => "decimal",
            ScalarType::String => "string",
            ScalarType::DateTime => "date_time",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::Duration => "duration",
            ScalarType::Uuid => "uuid",
            ScalarType::Uri => "uri",
        };
        f.write_str(name)
    }
}

/// Formats defined by the JSON Schema vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StandardFormat {
    DateTime,
    Date,
    Time,
    Duration,
    Email,
    IdnEmail,
    Hostname,
    IdnHostname,
    Ipv4,
    Ipv6,
    Uri,
    UriReference,
    Iri,
    IriReference,
    Uuid,
    UriTemplate,
    JsonPointer,
    RelativeJsonPointer,
    Regex,
}

impl StandardFormat {
    pub const ALL: [StandardFormat; 19] = [
        StandardFormat::DateTime,
        StandardFormat::Date,
        StandardFormat::Time,
        StandardFormat::Duration,
        StandardFormat::Email,
        StandardFormat::IdnEmail,
        StandardFormat::Hostname,
        StandardFormat::IdnHostname,
        StandardFormat::Ipv4,
        StandardFormat::Ipv6,
        StandardFormat::Uri,
        StandardFormat::UriReference,
        StandardFormat::Iri,
        StandardFormat::IriReference,
        StandardFormat::Uuid,
        StandardFormat::UriTemplate,
        StandardFormat::JsonPointer,
        StandardFormat::RelativeJsonPointer,
        StandardFormat::Regex,
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StandardFormat::DateTime => "date-time",
            StandardFormat::Date => "date",
            StandardFormat::Time => "time",
            StandardFormat::Duration => "duration",
            StandardFormat::Email => "email",
            StandardFormat::IdnEmail => "idn-email",
            StandardFormat::Hostname => "hostname",
            StandardFormat::IdnHostname => "idn-hostname",
            StandardFormat::Ipv4 => "ipv4",
            StandardFormat::Ipv6 => "ipv6",
            StandardFormat::Uri => "uri",
            StandardFormat::UriReference => "uri-reference",
            StandardFormat::Iri => "iri",
            StandardFormat::IriReference => "iri-reference",
            StandardFormat::Uuid => "uuid",
            StandardFormat::UriTemplate => "uri-template",
            StandardFormat::JsonPointer => "json-pointer",
            StandardFormat::RelativeJsonPointer => "relative-json-pointer",
            StandardFormat::Regex => "regex",
        }
    }

    /// The system type a string with this format is represented as, if any.
    pub fn system_type(self) -> Option<ScalarType> {
        match self {
            StandardFormat::DateTime => Some(ScalarType::DateTime),
            StandardFormat::Date => Some(ScalarType::Date),
            StandardFormat::Time => Some(ScalarType::Time),
            StandardFormat::Duration => Some(ScalarType::Duration),
            StandardFormat::Uuid => Some(ScalarType::Uuid),
            StandardFormat::Uri | StandardFormat::UriReference => Some(ScalarType::Uri),
            _ => None,
        }
    }
}

impl fmt::Display for StandardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A check that needs no further lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalCheck {
    Pattern(String),
    Format(StandardFormat),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCheck {
    Standard(StandardFormat),
    /// A non-standard format, resolved to its terminal check.
    Custom { name: String, check: TerminalCheck },
}

/// One runtime check attached to a property, array item, or map value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    Minimum(NumberValue),
    ExclusiveMinimum(NumberValue),
    Maximum(NumberValue),
    ExclusiveMaximum(NumberValue),
    MultipleOf(NumberValue),
    MinLength(u64),
    MaxLength(u64),
    Pattern(String),
    Format(FormatCheck),
    MinItems(u64),
    MaxItems(u64),
    UniqueItems,
    Const(Value),
    Enum(Vec<Value>),
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Minimum(v) => write!(f, "minimum {v}"),
            Validation::ExclusiveMinimum(v) => write!(f, "exclusive_minimum {v}"),
            Validation::Maximum(v) => write!(f, "maximum {v}"),
            Validation::ExclusiveMaximum(v) => write!(f, "exclusive_maximum {v}"),
            Validation::MultipleOf(v) => write!(f, "multiple_of {v}"),
            Validation::MinLength(n) => write!(f, "min_length {n}"),
            Validation::MaxLength(n) => write!(f, "max_length {n}"),
            Validation::Pattern(p) => write!(f, "pattern {p}"),
            Validation::Format(FormatCheck::Standard(format)) => write!(f, "format {format}"),
            Validation::Format(FormatCheck::Custom { name, check }) => match check {
                TerminalCheck::Pattern(p) => write!(f, "format {name} (pattern {p})"),
                TerminalCheck::Format(format) => write!(f, "format {name} (as {format})"),
            },
            Validation::MinItems(n) => write!(f, "min_items {n}"),
            Validation::MaxItems(n) => write!(f, "max_items {n}"),
            Validation::UniqueItems => f.write_str("unique_items"),
            Validation::Const(v) => write!(f, "const {v}"),
            Validation::Enum(vs) => write!(f, "enum {}", Value::Array(vs.clone())),
        }
    }
}

/// A user-supplied class that replaces synthesis for a schema node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClassRef {
    pub name: String,
    pub namespace: Option<String>,
}

impl ClassRef {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()),
        }
    }

    /// Split a fully-qualified name at its last `.`.
    pub fn parse(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((namespace, name)) => Self::new(name, Some(namespace.to_string())),
            None => Self::new(qualified, None),
        }
    }

    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl From<&str> for ClassRef {
    fn from(qualified: &str) -> Self {
        ClassRef::parse(qualified)
    }
}

impl From<(&str, &str)> for ClassRef {
    fn from((name, namespace): (&str, &str)) -> Self {
        ClassRef::new(name, Some(namespace.to_string()))
    }
}

/// A fully resolved type reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedType {
    Scalar(ScalarType),
    Array(Box<TypeSpec>),
    Union(Vec<TypeSpec>),
    Class(ClassId),
    External(ClassRef),
    Any,
}

/// A resolved type together with its nullability and runtime checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSpec {
    pub resolved_type: ResolvedType,
    pub nullable: bool,
    pub validations: Vec<Validation>,
}

impl TypeSpec {
    pub fn new(resolved_type: ResolvedType) -> Self {
        Self {
            resolved_type,
            nullable: false,
            validations: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self::new(ResolvedType::Any)
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_validations(mut self, validations: Vec<Validation>) -> Self {
        self.validations = validations;
        self
    }

    /// Append checks not already present.
    pub fn add_validations(&mut self, validations: impl IntoIterator<Item = Validation>) {
        for v in validations {
            if !self.validations.contains(&v) {
                self.validations.push(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ref_parse() {
        let r = ClassRef::parse("com.example.Money");
        assert_eq!(r.name, "Money");
        assert_eq!(r.namespace.as_deref(), Some("com.example"));
        assert_eq!(r.qualified_name(), "com.example.Money");

        let bare = ClassRef::from("Money");
        assert_eq!(bare.namespace, None);
        assert_eq!(ClassRef::from(("Money", "")).namespace, None);
    }

    #[test]
    fn test_standard_format_lookup() {
        assert_eq!(
            StandardFormat::from_keyword("date-time"),
            Some(StandardFormat::DateTime)
        );
        assert_eq!(StandardFormat::from_keyword("money"), None);
        for format in StandardFormat::ALL {
            assert_eq!(StandardFormat::from_keyword(format.as_str()), Some(format));
        }
        assert_eq!(
            StandardFormat::UriReference.system_type(),
            Some(ScalarType::Uri)
        );
        assert_eq!(StandardFormat::Email.system_type(), None);
    }

    #[test]
    fn test_add_validations_dedups() {
        let mut spec = TypeSpec::new(ResolvedType::Scalar(ScalarType::String));
        spec.add_validations([Validation::MinLength(1), Validation::MinLength(1)]);
        assert_eq!(spec.validations, vec![Validation::MinLength(1)]);
    }
}
