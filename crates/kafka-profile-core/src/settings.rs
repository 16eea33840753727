//! Hierarchical settings addressed by dotted paths.
//!
//! Profiles are read through the [`ConfigSource`] trait so the builder does
//! not care where settings come from. [`Settings`] is the YAML-backed
//! implementation used by the CLI and the tests:
//!
//! ```yaml
//! client-profile:
//!   prod:
//!     kafka-version: "2.8.0"
//!     tls: prod
//!     sasl: scram
//! tls:
//!   prod:
//!     cafile: /etc/kafka/ca.pem
//! sasl:
//!   scram:
//!     mechanism: SCRAM-SHA-512
//!     handshake-first: true
//!     username: burrow
//!     password: secret
//! ```
//!
//! Version strings must be quoted: YAML reads `0.10` as a float.

use std::path::Path;

use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

/// Read-only access to hierarchical configuration.
///
/// Missing keys read as empty strings and `false`; [`is_set`] tells a
/// missing key apart from a falsy one.
///
/// [`is_set`]: ConfigSource::is_set
pub trait ConfigSource {
    /// Whether the key exists and is not null.
    fn is_set(&self, path: &str) -> bool;

    /// The value as a string, or `""` when missing.
    fn get_string(&self, path: &str) -> String;

    /// The value as a boolean, or `false` when missing.
    fn get_bool(&self, path: &str) -> bool;

    /// The value as an integer, `None` when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is present but not an integer.
    fn get_int(&self, path: &str) -> ConfigResult<Option<i64>>;
}

/// YAML-backed settings tree.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    root: Value,
}

impl Settings {
    /// Wrap an already parsed YAML document.
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content)
    }

    /// Load settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        Ok(Self { root })
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.split('.') {
            node = node.as_mapping()?.get(segment)?;
        }
        (!node.is_null()).then_some(node)
    }
}

impl ConfigSource for Settings {
    fn is_set(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    fn get_string(&self, path: &str) -> String {
        match self.lookup(path) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    fn get_bool(&self, path: &str) -> bool {
        match self.lookup(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1"),
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            _ => false,
        }
    }

    fn get_int(&self, path: &str) -> ConfigResult<Option<i64>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };

        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        parsed.map(Some).ok_or_else(|| ConfigError::InvalidValue {
            key: path.to_string(),
            message: format!("expected an integer, got {value:?}"),
        })
    }
}
