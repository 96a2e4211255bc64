//! Typed configuration primitives for perceptors and sinks.
//!
//! Every configurable stage publishes a schema of [`ConfigEntry`] items; the
//! engine keeps live values for each entry and validates every mutation
//! against the declared [`ConfigKind`]. Values are exchanged with the outside
//! world as JSON, with kind-directed conversion on the way in (notably color
//! strings, which may arrive as `"#rrggbb"`, a symbolic name, or `"r,g,b"`).
//!
//! # Examples
//!
//! ```
//! use pulseline::config::{ConfigEntry, ConfigKind, ConfigValue, Rgb};
//!
//! let entry = ConfigEntry::new(
//!     "threshold",
//!     "Detection threshold",
//!     ConfigKind::Float,
//!     ConfigValue::Float(0.5),
//!     "Minimum confidence before a detection is reported",
//! ).unwrap();
//!
//! assert_eq!(entry.kind, ConfigKind::Float);
//!
//! let teal = Rgb::parse("0,128,128").unwrap();
//! assert_eq!(teal.to_hex(), "#008080");
//! ```

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Kinds and values
// ============================================================================

/// The type of a configuration setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    Int,
    Float,
    Bool,
    Str,
    Color,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::Str => write!(f, "string"),
            Self::Color => write!(f, "color"),
        }
    }
}

/// A validated configuration value.
///
/// The variant always matches the [`ConfigKind`] of the entry it belongs to;
/// [`ConfigValue::from_json`] performs the kind-directed conversion and is the
/// only intake path, so a stored value never disagrees with its schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Color(Rgb),
}

impl ConfigValue {
    #[must_use]
    pub fn kind(&self) -> ConfigKind {
        match self {
            Self::Int(_) => ConfigKind::Int,
            Self::Float(_) => ConfigKind::Float,
            Self::Bool(_) => ConfigKind::Bool,
            Self::Str(_) => ConfigKind::Str,
            Self::Color(_) => ConfigKind::Color,
        }
    }

    /// Convert a JSON value into a `ConfigValue` of the requested kind.
    ///
    /// Coercions mirror the setting semantics rather than strict JSON typing:
    /// a float setting accepts an integer literal, and a color setting accepts
    /// any of the string spellings [`Rgb::parse`] understands. An integer
    /// setting does *not* accept a float.
    pub fn from_json(kind: ConfigKind, raw: &Value) -> Result<Self, ConfigError> {
        let mismatch = || ConfigError::KindMismatch {
            expected: kind,
            got: describe_json(raw),
        };
        match kind {
            ConfigKind::Int => raw.as_i64().map(Self::Int).ok_or_else(mismatch),
            ConfigKind::Float => raw.as_f64().map(Self::Float).ok_or_else(mismatch),
            ConfigKind::Bool => raw.as_bool().map(Self::Bool).ok_or_else(mismatch),
            ConfigKind::Str => raw.as_str().map(|s| Self::Str(s.to_string())).ok_or_else(mismatch),
            ConfigKind::Color => {
                let text = raw.as_str().ok_or_else(mismatch)?;
                Rgb::parse(text).map(Self::Color)
            }
        }
    }

    /// Check that this value is acceptable for a setting of `kind`, coercing
    /// where the kind allows it. Returns the (possibly coerced) value.
    pub fn conform_to(self, kind: ConfigKind) -> Result<Self, ConfigError> {
        match (kind, self) {
            (ConfigKind::Float, Self::Int(i)) => Ok(Self::Float(i as f64)),
            (ConfigKind::Color, Self::Str(s)) => Rgb::parse(&s).map(Self::Color),
            (kind, value) if value.kind() == kind => Ok(value),
            (kind, value) => Err(ConfigError::KindMismatch {
                expected: kind,
                got: value.kind().to_string(),
            }),
        }
    }

    /// JSON representation as surfaced in reports and sink payloads.
    /// Colors serialize as `"#rrggbb"` strings.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Bool(b) => Value::from(*b),
            Self::Str(s) => Value::from(s.clone()),
            Self::Color(c) => Value::from(c.to_hex()),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Color(c) => write!(f, "{}", c.to_hex()),
        }
    }
}

fn describe_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => "int".to_string(),
        Value::Number(_) => "float".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

// ============================================================================
// Colors
// ============================================================================

/// An RGB color setting.
///
/// Serializes as a `"#rrggbb"` hex string on the wire; parses from hex, a
/// small symbolic palette, or a `"r,g,b"` triplet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb { r: 0, g: 0, b: 0 }),
    ("white", Rgb { r: 255, g: 255, b: 255 }),
    ("red", Rgb { r: 255, g: 0, b: 0 }),
    ("green", Rgb { r: 0, g: 255, b: 0 }),
    ("blue", Rgb { r: 0, g: 0, b: 255 }),
    ("yellow", Rgb { r: 255, g: 255, b: 0 }),
    ("cyan", Rgb { r: 0, g: 255, b: 255 }),
    ("magenta", Rgb { r: 255, g: 0, b: 255 }),
];

impl Rgb {
    #[must_use]
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse any of the accepted spellings: `"#rrggbb"`, a symbolic name
    /// (e.g. `"red"`), or a decimal `"r,g,b"` triplet.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let trimmed = text.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            return Self::from_hex_digits(hex, trimmed);
        }
        if trimmed.contains(',') {
            return Self::from_csv(trimmed);
        }
        Self::from_named(trimmed)
    }

    pub fn from_hex_str(text: &str) -> Result<Self, ConfigError> {
        let hex = text.strip_prefix('#').ok_or_else(|| ConfigError::BadColor {
            input: text.to_string(),
            reason: "hex colors start with '#'".to_string(),
        })?;
        Self::from_hex_digits(hex, text)
    }

    fn from_hex_digits(hex: &str, original: &str) -> Result<Self, ConfigError> {
        if hex.len() != 6 {
            return Err(ConfigError::BadColor {
                input: original.to_string(),
                reason: "expected 6 hex digits".to_string(),
            });
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ConfigError::BadColor {
                input: original.to_string(),
                reason: "invalid hex digit".to_string(),
            })
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn from_csv(text: &str) -> Result<Self, ConfigError> {
        let mut channels = text.split(',').map(|part| {
            part.trim().parse::<u8>().map_err(|_| ConfigError::BadColor {
                input: text.to_string(),
                reason: "channels must be integers in 0..=255".to_string(),
            })
        });
        let (r, g, b) = match (channels.next(), channels.next(), channels.next(), channels.next()) {
            (Some(r), Some(g), Some(b), None) => (r?, g?, b?),
            _ => {
                return Err(ConfigError::BadColor {
                    input: text.to_string(),
                    reason: "expected exactly three channels".to_string(),
                });
            }
        };
        Ok(Self { r, g, b })
    }

    pub fn from_named(name: &str) -> Result<Self, ConfigError> {
        let lowered = name.to_ascii_lowercase();
        NAMED_COLORS
            .iter()
            .find(|(known, _)| *known == lowered)
            .map(|(_, color)| *color)
            .ok_or_else(|| ConfigError::BadColor {
                input: name.to_string(),
                reason: "unknown color name".to_string(),
            })
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for Rgb {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

// ============================================================================
// Schema entries
// ============================================================================

/// One setting in a stage's configuration schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Identifier used in mutation requests and reports.
    pub name: String,
    /// Human-readable label for control surfaces.
    pub label: String,
    pub kind: ConfigKind,
    pub default_value: ConfigValue,
    pub description: String,
}

impl ConfigEntry {
    /// Create a schema entry, checking that the default satisfies the kind.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        kind: ConfigKind,
        default_value: ConfigValue,
        description: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let default_value = default_value
            .conform_to(kind)
            .map_err(|source| ConfigError::BadDefault {
                name: name.clone(),
                source: Box::new(source),
            })?;
        Ok(Self {
            name,
            label: label.into(),
            kind,
            default_value,
            description: description.into(),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Validation errors for configuration intake.
///
/// These are always local: a failed set leaves the prior value in place and
/// never terminates the pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// Value type does not match the setting's declared kind.
    #[error("expected a {expected} value, got {got}")]
    #[diagnostic(
        code(pulseline::config::kind_mismatch),
        help("Check the setting's schema; float settings accept ints, the reverse does not hold.")
    )]
    KindMismatch { expected: ConfigKind, got: String },

    /// No setting with this name exists in the schema.
    #[error("unknown setting: {name}")]
    #[diagnostic(code(pulseline::config::unknown_setting))]
    UnknownSetting { name: String },

    /// Color string could not be interpreted.
    #[error("invalid color {input:?}: {reason}")]
    #[diagnostic(
        code(pulseline::config::bad_color),
        help("Colors accept \"#rrggbb\", a symbolic name such as \"red\", or \"r,g,b\".")
    )]
    BadColor { input: String, reason: String },

    /// Schema entry declared a default that does not satisfy its own kind.
    #[error("default for setting {name} does not match its kind")]
    #[diagnostic(code(pulseline::config::bad_default))]
    BadDefault {
        name: String,
        #[source]
        source: Box<ConfigError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn float_setting_accepts_int_json() {
        let v = ConfigValue::from_json(ConfigKind::Float, &json!(3)).unwrap();
        assert_eq!(v, ConfigValue::Float(3.0));
    }

    #[test]
    fn int_setting_rejects_float_json() {
        let err = ConfigValue::from_json(ConfigKind::Int, &json!(3.5)).unwrap_err();
        assert!(matches!(err, ConfigError::KindMismatch { .. }));
    }

    #[test]
    fn color_parses_all_spellings() {
        assert_eq!(Rgb::parse("#ff0080").unwrap(), Rgb::new(255, 0, 128));
        assert_eq!(Rgb::parse("red").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::parse(" 12, 34, 56 ").unwrap(), Rgb::new(12, 34, 56));
    }

    #[test]
    fn color_rejects_malformed_input() {
        assert!(Rgb::parse("#ff00").is_err());
        assert!(Rgb::parse("fuchsia-ish").is_err());
        assert!(Rgb::parse("1,2").is_err());
        assert!(Rgb::parse("1,2,300").is_err());
    }

    #[test]
    fn color_round_trips_through_hex() {
        let c = Rgb::new(1, 2, 3);
        assert_eq!(Rgb::from_hex_str(&c.to_hex()).unwrap(), c);
    }

    #[test]
    fn entry_rejects_mismatched_default() {
        let err = ConfigEntry::new(
            "limit",
            "Limit",
            ConfigKind::Int,
            ConfigValue::Str("ten".into()),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::BadDefault { .. }));
    }

    #[test]
    fn entry_coerces_int_default_for_float_kind() {
        let entry = ConfigEntry::new(
            "scale",
            "Scale",
            ConfigKind::Float,
            ConfigValue::Int(2),
            "",
        )
        .unwrap();
        assert_eq!(entry.default_value, ConfigValue::Float(2.0));
    }
}
