//! Field types and per-field constraint declarations

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a schema field.
///
/// Values arrive as JSON, so each variant maps to the JSON shape a
/// conforming value must have. `DateTime` values are RFC 3339 strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "array")]
    Array,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "date-time")]
    DateTime,
}

impl FieldType {
    /// Check whether a JSON value conforms to this type.
    ///
    /// Null is never a type mismatch; required-ness is checked separately.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::DateTime => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        }
    }

    /// The name used in schema documents and the metadata endpoint.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::DateTime => "date-time",
        }
    }
}

/// Declarative constraint set for a single entity field.
///
/// Loaded once at startup as part of the schema document. The optional
/// `pattern` is compiled by the registry at load time; a schema with an
/// invalid pattern is rejected before the server starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraint {
    /// Declared value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether the field must be present (and non-null) on create.
    #[serde(default)]
    pub required: bool,

    /// Minimum string length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Maximum string length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Numeric lower bound (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Numeric upper bound (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    /// Allowed values for string fields.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,

    /// Regex the value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Human-readable message reported when `pattern` is violated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_message: Option<String>,

    /// Compare this field case-insensitively in filters and uniqueness checks.
    #[serde(default)]
    pub case_insensitive: bool,

    /// Compiled form of `pattern`, populated by the registry at load time.
    #[serde(skip)]
    pub pattern_regex: Option<Regex>,
}

impl FieldConstraint {
    /// A bare constraint of the given type with no extra rules.
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            allowed: None,
            pattern: None,
            pattern_message: None,
            case_insensitive: false,
            pattern_regex: None,
        }
    }

    /// Compile the declared pattern, if any.
    ///
    /// Idempotent; returns the regex error text on an invalid pattern.
    pub fn compile_pattern(&mut self) -> Result<(), String> {
        if let Some(pattern) = &self.pattern
            && self.pattern_regex.is_none()
        {
            let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
            self.pattern_regex = Some(regex);
        }
        Ok(())
    }
}
