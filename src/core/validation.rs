//! Field constraint validation and notifications
//!
//! The same constraint catalog drives two passes with different outcomes:
//! the write-time pass blocks the write on any violation, while the
//! read-time pass only annotates the response. Constraints can tighten over
//! a deployment's lifetime, so already-persisted data that no longer
//! conforms is returned as-is with informational notifications, never
//! repaired or rejected on read.

use crate::core::field::FieldConstraint;
use crate::core::record::Record;
use crate::core::schema::{EntityDefinition, SYSTEM_FIELDS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Violation rule codes carried on notifications.
pub mod rules {
    pub const REQUIRED: &str = "REQUIRED";
    pub const TYPE: &str = "TYPE";
    pub const MIN_LENGTH: &str = "MIN_LENGTH";
    pub const MAX_LENGTH: &str = "MAX_LENGTH";
    pub const MINIMUM: &str = "MINIMUM";
    pub const MAXIMUM: &str = "MAXIMUM";
    pub const ENUM: &str = "ENUM";
    pub const PATTERN: &str = "PATTERN";
    pub const UNKNOWN: &str = "UNKNOWN_FIELD";
    pub const READ_ONLY: &str = "READ_ONLY";
    pub const UNIQUE: &str = "UNIQUE";
}

/// Whether a notification blocks a write or merely informs a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Blocking,
}

/// A structured validation message attached to a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub severity: Severity,

    /// Violated rule code (`REQUIRED`, `PATTERN`, `UNIQUE`, ...).
    #[serde(rename = "type")]
    pub rule: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub message: String,

    /// For `UNIQUE`: the offending field-group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    /// For `UNIQUE`: the values that collided.
    #[serde(
        default,
        rename = "conflictingValues",
        skip_serializing_if = "Option::is_none"
    )]
    pub conflicting_values: Option<Map<String, Value>>,

    /// Set on list reads so page-level notifications stay attributable.
    #[serde(default, rename = "recordId", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
}

impl Notification {
    /// A write-blocking field violation.
    pub fn blocking(field: &str, rule: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Blocking,
            rule: rule.to_string(),
            field: Some(field.to_string()),
            message: message.into(),
            fields: None,
            conflicting_values: None,
            record_id: None,
        }
    }

    /// An informational field violation discovered on read.
    pub fn info(field: &str, rule: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::blocking(field, rule, message)
        }
    }

    /// A uniqueness conflict on a field-group.
    pub fn unique(fields: Vec<String>, values: Map<String, Value>) -> Self {
        let message = format!(
            "values for unique field-group [{}] already exist",
            fields.join(", ")
        );
        Self {
            severity: Severity::Blocking,
            rule: rules::UNIQUE.to_string(),
            field: None,
            message,
            fields: Some(fields),
            conflicting_values: Some(values),
            record_id: None,
        }
    }
}

/// Run the constraint checks for one field against a present, non-null
/// value. Returns one notification per violated rule.
fn check_value(field: &str, constraint: &FieldConstraint, value: &Value) -> Vec<Notification> {
    let mut violations = Vec::new();

    if !constraint.field_type.matches(value) {
        violations.push(Notification::blocking(
            field,
            rules::TYPE,
            format!("'{field}' must be of type {}", constraint.field_type.name()),
        ));
        // Remaining rules assume a type-conforming value.
        return violations;
    }

    if let Some(s) = value.as_str() {
        // Character count, not byte length.
        let length = s.chars().count();
        if let Some(min) = constraint.min_length
            && length < min
        {
            violations.push(Notification::blocking(
                field,
                rules::MIN_LENGTH,
                format!("'{field}' must be at least {min} characters (got {length})"),
            ));
        }
        if let Some(max) = constraint.max_length
            && length > max
        {
            violations.push(Notification::blocking(
                field,
                rules::MAX_LENGTH,
                format!("'{field}' must be at most {max} characters (got {length})"),
            ));
        }
        if let Some(allowed) = &constraint.allowed
            && !allowed.iter().any(|a| a == s)
        {
            violations.push(Notification::blocking(
                field,
                rules::ENUM,
                format!("'{field}' must be one of {allowed:?} (got '{s}')"),
            ));
        }
        if let Some(regex) = &constraint.pattern_regex
            && !regex.is_match(s)
        {
            let message = constraint
                .pattern_message
                .clone()
                .unwrap_or_else(|| format!("'{field}' does not match the required pattern"));
            violations.push(Notification::blocking(field, rules::PATTERN, message));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = constraint.minimum
            && number < minimum
        {
            violations.push(Notification::blocking(
                field,
                rules::MINIMUM,
                format!("'{field}' must be >= {minimum} (got {number})"),
            ));
        }
        if let Some(maximum) = constraint.maximum
            && number > maximum
        {
            violations.push(Notification::blocking(
                field,
                rules::MAXIMUM,
                format!("'{field}' must be <= {maximum} (got {number})"),
            ));
        }
    }

    violations
}

/// Write-time (hard) validation of a payload.
///
/// `partial` relaxes required-field checks for updates: a required field may
/// be absent from the patch, but may not be explicitly nulled. Returns every
/// violation at once so the caller never sees a partial picture.
pub fn validate_write(
    definition: &EntityDefinition,
    payload: &Map<String, Value>,
    partial: bool,
) -> Vec<Notification> {
    let mut violations = Vec::new();

    if !partial {
        for (field, constraint) in &definition.fields {
            if constraint.required && payload.get(field).is_none_or(Value::is_null) {
                violations.push(Notification::blocking(
                    field,
                    rules::REQUIRED,
                    format!("'{field}' is required"),
                ));
            }
        }
    }

    for (field, value) in payload {
        if SYSTEM_FIELDS.contains(&field.as_str()) {
            violations.push(Notification::blocking(
                field,
                rules::READ_ONLY,
                format!("'{field}' is system-managed and cannot be written"),
            ));
            continue;
        }

        let Some(constraint) = definition.field(field) else {
            violations.push(Notification::blocking(
                field,
                rules::UNKNOWN,
                format!("'{field}' is not a declared field"),
            ));
            continue;
        };

        if value.is_null() {
            if partial && constraint.required {
                violations.push(Notification::blocking(
                    field,
                    rules::REQUIRED,
                    format!("'{field}' is required and cannot be cleared"),
                ));
            }
            continue;
        }

        violations.extend(check_value(field, constraint, value));
    }

    violations
}

/// Read-time (soft) validation of an already-persisted record.
///
/// Re-runs the same constraint catalog and downgrades every violation to an
/// informational notification tagged with the record id. The record itself
/// is returned unmodified by the caller.
pub fn annotate_read(definition: &EntityDefinition, record: &Record) -> Vec<Notification> {
    let mut notifications = Vec::new();

    for (field, constraint) in &definition.fields {
        match record.fields.get(field) {
            None | Some(Value::Null) => {
                if constraint.required {
                    notifications.push(Notification::info(
                        field,
                        rules::REQUIRED,
                        format!("'{field}' is required"),
                    ));
                }
            }
            Some(value) => {
                notifications.extend(check_value(field, constraint, value).into_iter().map(
                    |mut n| {
                        n.severity = Severity::Info;
                        n
                    },
                ));
            }
        }
    }

    for notification in &mut notifications {
        notification.record_id = Some(record.id);
    }
    notifications
}
