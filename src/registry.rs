//! Live, validated settings for a single pipeline stage.
//!
//! A [`ConfigRegistry`] pairs a stage's declared schema with its current
//! values. Every mutation is validated against the schema; an invalid set is
//! rejected and leaves the prior value untouched. Reads hand out clones so a
//! stage sees a consistent snapshot for the duration of one turn.

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::config::{ConfigEntry, ConfigError, ConfigKind, ConfigValue};

/// Schema plus current values for one perceptor or sink.
#[derive(Clone, Debug, Default)]
pub struct ConfigRegistry {
    entries: Vec<ConfigEntry>,
    values: FxHashMap<String, ConfigValue>,
}

impl ConfigRegistry {
    /// Build a registry seeded with each entry's default value.
    #[must_use]
    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        let values = entries
            .iter()
            .map(|e| (e.name.clone(), e.default_value.clone()))
            .collect();
        Self { entries, values }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current value of a setting, if it exists in the schema.
    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(ConfigValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ConfigValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(ConfigValue::Float(x)) => Some(*x),
            Some(ConfigValue::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ConfigValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Replace a setting's value after validating it against the schema kind.
    ///
    /// On success the accepted (possibly coerced) value is stored and returned
    /// so the owner can notify the stage synchronously. On failure the prior
    /// value stands.
    pub fn set(&mut self, name: &str, value: ConfigValue) -> Result<ConfigValue, ConfigError> {
        let entry = self.entry(name)?;
        let accepted = value.conform_to(entry.kind)?;
        self.values.insert(name.to_string(), accepted.clone());
        Ok(accepted)
    }

    /// JSON intake path used by the control surface. Applies the same
    /// kind-directed conversion as [`ConfigValue::from_json`].
    pub fn set_json(&mut self, name: &str, raw: &Value) -> Result<ConfigValue, ConfigError> {
        let kind = self.entry(name)?.kind;
        let accepted = ConfigValue::from_json(kind, raw)?;
        self.values.insert(name.to_string(), accepted.clone());
        Ok(accepted)
    }

    fn entry(&self, name: &str) -> Result<&ConfigEntry, ConfigError> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ConfigError::UnknownSetting {
                name: name.to_string(),
            })
    }

    /// Current value plus schema entry for each setting, in schema order.
    pub fn entries(&self) -> impl Iterator<Item = (&ConfigValue, &ConfigEntry)> {
        self.entries.iter().map(|e| {
            // Seeded at construction and never removed.
            let value = self.values.get(&e.name).unwrap_or(&e.default_value);
            (value, e)
        })
    }

    /// Flat report of every setting, in schema order.
    #[must_use]
    pub fn reports(&self) -> Vec<ConfigReport> {
        self.entries()
            .map(|(value, entry)| ConfigReport {
                name: entry.name.clone(),
                label: entry.label.clone(),
                kind: entry.kind,
                value: value.to_json(),
                default_value: entry.default_value.to_json(),
                description: entry.description.clone(),
            })
            .collect()
    }
}

/// One setting as surfaced to control clients: the live value alongside its
/// schema metadata.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigReport {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ConfigKind,
    pub value: Value,
    pub default_value: Value,
    pub description: String,
}
