use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ir::{FormatCheck, StandardFormat, TerminalCheck};

/// How a non-standard `format` value is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatHandler {
    /// Match the value against a regular expression.
    Pattern(String),
    /// Check the value as another format, standard or registered.
    Format(String),
}

/// Non-standard formats, each resolved to a terminal check when registered.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    checks: IndexMap<String, TerminalCheck>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: FormatHandler) -> Result<(), ConfigError> {
        let mut pending = IndexMap::new();
        pending.insert(name.to_string(), handler);
        self.register_all(&pending)
    }

    /// Register a batch whose entries may delegate to each other in any order.
    pub fn register_all(
        &mut self,
        handlers: &IndexMap<String, FormatHandler>,
    ) -> Result<(), ConfigError> {
        let mut resolved = Vec::with_capacity(handlers.len());
        for name in handlers.keys() {
            if StandardFormat::from_keyword(name).is_some() {
                return Err(invalid(name, "shadows a standard format"));
            }
            resolved.push((name.clone(), self.resolve(name, handlers)?));
        }
        for (name, check) in resolved {
            if let Some(previous) = self.checks.insert(name.clone(), check) {
                log::debug!("format {name} replaced (was {previous:?})");
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        name: &str,
        handlers: &IndexMap<String, FormatHandler>,
    ) -> Result<TerminalCheck, ConfigError> {
        let mut chain = vec![name.to_string()];
        let mut current = name.to_string();
        loop {
            let Some(handler) = handlers.get(&current) else {
                return self
                    .checks
                    .get(&current)
                    .cloned()
                    .ok_or_else(|| invalid(name, &format!("unknown format {current}")));
            };
            match handler {
                FormatHandler::Pattern(pattern) => {
                    Regex::new(pattern)
                        .map_err(|e| invalid(&current, &format!("invalid regex: {e}")))?;
                    return Ok(TerminalCheck::Pattern(pattern.clone()));
                }
                FormatHandler::Format(target) => {
                    if let Some(standard) = StandardFormat::from_keyword(target) {
                        return Ok(TerminalCheck::Format(standard));
                    }
                    if chain.contains(target) {
                        return Err(invalid(
                            name,
                            &format!("delegation cycle through {}", chain.join(" -> ")),
                        ));
                    }
                    chain.push(target.clone());
                    current = target.clone();
                }
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    /// The runtime check for a `format` keyword value, or `None` when the
    /// format is unknown and therefore only an annotation.
    pub fn check_for(&self, format: &str) -> Option<FormatCheck> {
        if let Some(standard) = StandardFormat::from_keyword(format) {
            return Some(FormatCheck::Standard(standard));
        }
        self.checks.get(format).map(|check| FormatCheck::Custom {
            name: format.to_string(),
            check: check.clone(),
        })
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidFormat {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_handler() {
        let mut formats = FormatRegistry::new();
        formats
            .register("currency-code", FormatHandler::Pattern("^[A-Z]{3}$".into()))
            .unwrap();
        assert_eq!(
            formats.check_for("currency-code"),
            Some(FormatCheck::Custom {
                name: "currency-code".into(),
                check: TerminalCheck::Pattern("^[A-Z]{3}$".into()),
            })
        );
    }

    #[test]
    fn test_delegation_resolves_to_terminal() {
        let mut formats = FormatRegistry::new();
        let mut batch = IndexMap::new();
        batch.insert("timestamp".to_string(), FormatHandler::Format("instant".into()));
        batch.insert("instant".to_string(), FormatHandler::Format("date-time".into()));
        formats.register_all(&batch).unwrap();
        assert_eq!(
            formats.check_for("timestamp"),
            Some(FormatCheck::Custom {
                name: "timestamp".into(),
                check: TerminalCheck::Format(StandardFormat::DateTime),
            })
        );

        formats
            .register("moment", FormatHandler::Format("timestamp".into()))
            .unwrap();
        assert!(formats.is_registered("moment"));
    }

    #[test]
    fn test_configuration_errors() {
        let mut formats = FormatRegistry::new();
        assert!(formats
            .register("me", FormatHandler::Format("me".into()))
            .is_err());
        assert!(formats
            .register("orphan", FormatHandler::Format("nowhere".into()))
            .is_err());
        assert!(formats
            .register("broken", FormatHandler::Pattern("(".into()))
            .is_err());
        assert!(formats
            .register("email", FormatHandler::Pattern(".*".into()))
            .is_err());

        let mut cycle = IndexMap::new();
        cycle.insert("a".to_string(), FormatHandler::Format("b".into()));
        cycle.insert("b".to_string(), FormatHandler::Format("a".into()));
        let err = formats.register_all(&cycle).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat { .. }));
        assert!(!formats.is_registered("a"));
    }

    #[test]
    fn test_unknown_and_standard_formats() {
        let formats = FormatRegistry::new();
        assert_eq!(formats.check_for("something-else"), None);
        assert_eq!(
            formats.check_for("uuid"),
            Some(FormatCheck::Standard(StandardFormat::Uuid))
        );
    }
}
