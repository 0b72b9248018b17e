use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transform::formats::FormatHandler;

/// Top-level compiler configuration loaded from `.jscg.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Schema document compiled when the CLI is given no input.
    pub input: String,
    /// Pointer whose entries are compiled as a batch, e.g. `/$defs`.
    pub definitions: Option<String>,
    pub namespace: Option<String>,
    pub profile: TargetProfile,
    pub additional_properties: AdditionalPropertiesMode,
    pub nested_class_naming: NestedClassNaming,
    /// Treat a name collision as an error instead of adding a suffix.
    pub strict_naming: bool,
    /// Fully-qualified interface every generated class implements.
    pub marker_interface: Option<String>,
    pub examples: ExamplesMode,
    /// Append each target's sub-directories to the namespace.
    pub derive_namespace_from_structure: bool,
    pub custom_classes: CustomClassesConfig,
    /// Map from schema URI (`document#pointer`) to class name.
    pub class_names: IndexMap<String, String>,
    pub non_standard_formats: IndexMap<String, FormatHandler>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            input: "schema.json".to_string(),
            definitions: None,
            namespace: None,
            profile: TargetProfile::ValueClass,
            additional_properties: AdditionalPropertiesMode::Strict,
            nested_class_naming: NestedClassNaming::RefSchema,
            strict_naming: false,
            marker_interface: None,
            examples: ExamplesMode::Off,
            derive_namespace_from_structure: false,
            custom_classes: CustomClassesConfig::default(),
            class_names: IndexMap::new(),
            non_standard_formats: IndexMap::new(),
        }
    }
}

impl CompilerConfig {
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        let config: CompilerConfig = serde_yaml_ng::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(namespace) = &self.namespace
            && !is_namespace(namespace)
        {
            return Err(ConfigError::InvalidNamespace(namespace.clone()));
        }
        if let Some(marker) = &self.marker_interface
            && !is_namespace(marker)
        {
            return Err(ConfigError::InvalidOverride {
                key: "marker_interface".to_string(),
                reason: format!("{marker} is not a qualified class name"),
            });
        }
        let class_tables = [
            ("uri", &self.custom_classes.uri),
            ("format", &self.custom_classes.format),
        ];
        for (table, entries) in class_tables {
            for (key, class) in entries {
                check_class_name(&format!("custom_classes.{table}.{key}"), class)?;
            }
        }
        for (keyword, values) in &self.custom_classes.extension {
            if !keyword.starts_with("x-") {
                return Err(ConfigError::InvalidOverride {
                    key: format!("custom_classes.extension.{keyword}"),
                    reason: "extension keywords start with x-".to_string(),
                });
            }
            for (value, class) in values {
                check_class_name(&format!("custom_classes.extension.{keyword}.{value}"), class)?;
            }
        }
        for (uri, name) in &self.class_names {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidOverride {
                    key: format!("class_names.{uri}"),
                    reason: "empty class name".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn check_class_name(key: &str, class: &str) -> Result<(), ConfigError> {
    if is_namespace(class) {
        Ok(())
    } else {
        Err(ConfigError::InvalidOverride {
            key: key.to_string(),
            reason: format!("{class} is not a qualified class name"),
        })
    }
}

/// Dot-separated identifiers, none starting with a digit.
fn is_namespace(text: &str) -> bool {
    !text.is_empty()
        && text.split('.').all(|segment| {
            !segment.is_empty()
                && !segment.starts_with(|c: char| c.is_ascii_digit())
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// The family of class shapes a renderer produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetProfile {
    /// Immutable value classes with constructor validation.
    #[default]
    ValueClass,
    /// Classes with getters and a builder.
    GetterBuilder,
    /// Structural interfaces with no runtime checks of their own.
    StructuralInterface,
}

impl TargetProfile {
    pub fn extension(self) -> &'static str {
        match self {
            TargetProfile::ValueClass => "kt",
            TargetProfile::GetterBuilder => "java",
            TargetProfile::StructuralInterface => "ts",
        }
    }

    /// Whether output directories follow the namespace.
    pub fn namespaced_directories(self) -> bool {
        !matches!(self, TargetProfile::StructuralInterface)
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetProfile::ValueClass => "value_class",
            TargetProfile::GetterBuilder => "getter_builder",
            TargetProfile::StructuralInterface => "structural_interface",
        })
    }
}

/// Whether `additionalProperties` and `patternProperties` shape the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalPropertiesMode {
    /// Ignore both keywords; objects become plain value classes.
    Ignore,
    /// Synthesize map-backed classes and reject forbidden keys.
    #[default]
    Strict,
}

/// Where nested class names come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedClassNaming {
    /// The property that holds the nested object.
    Property,
    /// The referenced schema's own name, falling back to the property.
    #[default]
    RefSchema,
}

/// What happens when a schema's `examples` do not validate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamplesMode {
    #[default]
    Off,
    Warn,
    Block,
}

/// Tables mapping schema nodes to existing classes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CustomClassesConfig {
    /// Schema URI (`document#pointer`) to qualified class name.
    pub uri: IndexMap<String, String>,
    /// `format` value to qualified class name.
    pub format: IndexMap<String, String>,
    /// Extension keyword to (value to qualified class name).
    pub extension: IndexMap<String, IndexMap<String, String>>,
}

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = ".jscg.yaml";

/// Load config from a YAML file. Returns `None` if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Option<CompilerConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    CompilerConfig::from_yaml(&content).map(Some)
}

/// Generate the default config file content.
pub fn default_config_content() -> &'static str {
    r#"# jscg configuration
input: schema.json
# definitions: /$defs          # compile every entry under this pointer
# namespace: com.example.model

profile: value_class            # value_class | getter_builder | structural_interface
additional_properties: strict   # strict | ignore
nested_class_naming: ref_schema # ref_schema | property
strict_naming: false            # fail on class name collisions instead of suffixing
# marker_interface: com.example.Model
examples: off                   # off | warn | block
derive_namespace_from_structure: false

custom_classes:
  uri: {}
    # "https://example.com/schema/money.json": com.example.Money
  format: {}
    # money: com.example.Money
  extension: {}
    # x-type:
    #   decimal: java.math.BigDecimal

class_names: {}
  # "https://example.com/schema/order.json#/$defs/item": LineItem

non_standard_formats: {}
  # currency-code:
  #   pattern: "^[A-Z]{3}$"
  # timestamp:
  #   format: date-time
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.input, "schema.json");
        assert_eq!(config.profile, TargetProfile::ValueClass);
        assert_eq!(
            config.additional_properties,
            AdditionalPropertiesMode::Strict
        );
        assert_eq!(config.nested_class_naming, NestedClassNaming::RefSchema);
        assert_eq!(config.examples, ExamplesMode::Off);
        assert!(!config.strict_naming);
        assert!(config.custom_classes.uri.is_empty());
    }

    #[test]
    fn test_default_content_parses() {
        let config = CompilerConfig::from_yaml(default_config_content()).unwrap();
        assert_eq!(config.input, "schema.json");
        assert_eq!(config.examples, ExamplesMode::Off);
        assert!(config.non_standard_formats.is_empty());
    }

    #[test]
    fn test_parse_config_yaml() {
        let yaml = r#"
input: order.yaml
definitions: /$defs
namespace: com.example.orders
profile: getter_builder
additional_properties: ignore
nested_class_naming: property
strict_naming: true
marker_interface: com.example.Model
examples: block
custom_classes:
  uri:
    "https://example.com/money.json": com.example.Money
  format:
    money: com.example.Money
  extension:
    x-type:
      decimal: java.math.BigDecimal
class_names:
  "https://example.com/order.json#/$defs/item": LineItem
non_standard_formats:
  currency-code:
    pattern: "^[A-Z]{3}$"
  timestamp:
    format: date-time
"#;
        let config = CompilerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.definitions.as_deref(), Some("/$defs"));
        assert_eq!(config.namespace.as_deref(), Some("com.example.orders"));
        assert_eq!(config.profile, TargetProfile::GetterBuilder);
        assert_eq!(
            config.additional_properties,
            AdditionalPropertiesMode::Ignore
        );
        assert_eq!(config.nested_class_naming, NestedClassNaming::Property);
        assert!(config.strict_naming);
        assert_eq!(config.examples, ExamplesMode::Block);
        assert_eq!(
            config.custom_classes.extension["x-type"]["decimal"],
            "java.math.BigDecimal"
        );
        assert_eq!(
            config.non_standard_formats["currency-code"],
            FormatHandler::Pattern("^[A-Z]{3}$".into())
        );
        assert_eq!(
            config.non_standard_formats["timestamp"],
            FormatHandler::Format("date-time".into())
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            CompilerConfig::from_yaml("namespace: com.1bad\n"),
            Err(ConfigError::InvalidNamespace(_))
        ));
        assert!(matches!(
            CompilerConfig::from_yaml("custom_classes:\n  format:\n    money: \"not a class\"\n"),
            Err(ConfigError::InvalidOverride { .. })
        ));
        assert!(matches!(
            CompilerConfig::from_yaml("custom_classes:\n  extension:\n    kind:\n      a: B\n"),
            Err(ConfigError::InvalidOverride { .. })
        ));
        assert!(matches!(
            CompilerConfig::from_yaml("custom_classes:\n  mystery: {}\n"),
            Err(ConfigError::Yaml(_))
        ));
        assert!(matches!(
            CompilerConfig::from_yaml("profile: swing_gui\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(load_config(&path).unwrap().is_none());

        fs::write(&path, "namespace: com.example\nexamples: warn\n").unwrap();
        let config = load_config(&path).unwrap().unwrap();
        assert_eq!(config.namespace.as_deref(), Some("com.example"));
        assert_eq!(config.examples, ExamplesMode::Warn);
        assert_eq!(config.profile, TargetProfile::ValueClass);
    }
}
