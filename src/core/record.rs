//! Generic persisted record
//!
//! One `Record` type serves every entity; the shape of its field map is
//! interpreted against the metadata registry rather than through generated
//! per-entity structs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single persisted instance of an entity.
///
/// `id` is assigned once at creation and never reassigned; `createdAt` is set
/// once; `updatedAt` changes on every successful write and is always at
/// least `createdAt`. All schema-declared fields live in the flattened map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: Uuid,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a fresh record from a validated payload. `createdAt` and
    /// `updatedAt` start equal.
    pub fn new(fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    /// Read a value by field name, resolving system fields as well.
    ///
    /// Returns an owned value because system fields are materialized from
    /// typed struct members. Absent fields yield `None`.
    pub fn value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::String(self.id.to_string())),
            "createdAt" => Some(Value::String(self.created_at.to_rfc3339())),
            "updatedAt" => Some(Value::String(self.updated_at.to_rfc3339())),
            _ => self.fields.get(field).cloned(),
        }
    }

    /// Merge a partial payload into the field map and bump `updatedAt`.
    ///
    /// Explicit nulls clear the field.
    pub fn apply_patch(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            if value.is_null() {
                self.fields.remove(&key);
            } else {
                self.fields.insert(key, value);
            }
        }
        self.touch();
    }

    /// Advance `updatedAt`, keeping it strictly greater than its previous
    /// value even when the clock is too coarse to distinguish two writes.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }
}
