//! Shared test harness for storage backend testing
//!
//! Provides record/filter/sort helpers and the `entity_store_tests!` macro,
//! which generates a conformance suite validating any `EntityStore`
//! implementation against the same reference semantics.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//! ```
//!
//! All conformance tests operate on the `user` entity of the bundled
//! schema, so search-index backends with explicit mappings work unchanged.

#![allow(dead_code)]

use corral::core::query::{FilterClause, FilterOp, FilterSpec, SortKey, SortSpec};
use corral::core::record::Record;
use serde_json::{Map, Value, json};

mod entity_store_tests;

/// Build a record from a JSON object literal.
pub fn record(fields: Value) -> Record {
    let map: Map<String, Value> = fields.as_object().cloned().unwrap_or_default();
    Record::new(map)
}

/// A user record with the bundled schema's required fields filled in.
pub fn user(username: &str, email: &str) -> Record {
    record(json!({
        "username": username,
        "email": email,
        "accountId": "11111111-1111-1111-1111-111111111111",
    }))
}

/// Single equality clause, case-sensitive.
pub fn filter_eq(field: &str, value: Value) -> FilterSpec {
    FilterSpec {
        clauses: vec![FilterClause {
            field: field.to_string(),
            op: FilterOp::Eq,
            value,
            case_insensitive: false,
        }],
    }
}

/// Single equality clause, case-insensitive.
pub fn filter_eq_ci(field: &str, value: Value) -> FilterSpec {
    FilterSpec {
        clauses: vec![FilterClause {
            field: field.to_string(),
            op: FilterOp::Eq,
            value,
            case_insensitive: true,
        }],
    }
}

/// Sort on one field, with the implicit id tie-break.
pub fn sort_by(field: &str, descending: bool) -> SortSpec {
    SortSpec::with_tiebreak(vec![SortKey {
        field: field.to_string(),
        descending,
    }])
}
