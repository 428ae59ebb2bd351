//! Query translation: request tokens into backend-agnostic specs
//!
//! The translator parses filter/sort/pagination tokens against an entity
//! definition and produces structures every storage adapter interprets with
//! identical result semantics. Every referenced field must exist on the
//! entity; unknown fields are a BadRequest, never silently ignored. The
//! reference semantics (`FilterSpec::matches`, `SortSpec::compare`) live
//! here so the in-memory adapter and the translator tests share one truth,
//! and the backend adapters are checked against it.

use crate::core::error::{EngineError, EngineResult};
use crate::core::field::FieldType;
use crate::core::record::Record;
use crate::core::schema::EntityDefinition;
use serde_json::Value;
use std::cmp::Ordering;

/// Default page size when the request omits or mangles `pageSize`.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Filter comparison operator.
///
/// Request tokens only produce `Eq`; `Ne` exists for the uniqueness
/// pre-flight check, which must exclude the record's own id on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// A single `(field, operator, value)` filter triple.
///
/// `case_insensitive` is resolved from the field constraint at translation
/// time so adapters apply it mechanically without consulting the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
    pub case_insensitive: bool,
}

/// Conjunctive filter: every clause must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub clauses: Vec<FilterClause>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Reference matching semantics, used by the in-memory adapter.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| {
            let value = record.value(&clause.field).unwrap_or(Value::Null);
            let equal = values_equal(&value, &clause.value, clause.case_insensitive);
            match clause.op {
                FilterOp::Eq => equal,
                FilterOp::Ne => !equal,
            }
        })
    }
}

/// One sort key; ascending unless the token carried a `-` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Multi-field sort evaluated left-to-right; the record id is always the
/// final, ascending tie-break so pagination never duplicates or skips a
/// record.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::with_tiebreak(Vec::new())
    }
}

impl SortSpec {
    /// Build a spec from explicit keys, appending the id tie-break unless
    /// the caller already sorts on id.
    pub fn with_tiebreak(mut keys: Vec<SortKey>) -> Self {
        if !keys.iter().any(|k| k.field == "id") {
            keys.push(SortKey {
                field: "id".to_string(),
                descending: false,
            });
        }
        Self { keys }
    }

    /// Reference ordering semantics, used by the in-memory adapter.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for key in &self.keys {
            let left = a.value(&key.field).unwrap_or(Value::Null);
            let right = b.value(&key.field).unwrap_or(Value::Null);
            let ordering = compare_values(&left, &right);
            if ordering != Ordering::Equal {
                return if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
            }
        }
        Ordering::Equal
    }
}

/// Validated pagination: 1-based page and a positive page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub page: u64,
    pub page_size: u64,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageSpec {
    /// Out-of-range or missing values fall back to the defaults.
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: match page {
                Some(p) if p >= 1 => p as u64,
                _ => 1,
            },
            page_size: match page_size {
                Some(s) if s >= 1 => s as u64,
                _ => DEFAULT_PAGE_SIZE,
            },
        }
    }

    /// Saturates instead of overflowing for absurd but syntactically
    /// valid page numbers.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

/// Raw query parameters of the read endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub page: Option<i64>,

    pub page_size: Option<i64>,

    /// Comma-separated field list, `-field` for descending.
    pub sort: Option<String>,

    /// `field:value` tokens, comma-joined, combined with AND.
    pub filter: Option<String>,

    /// URL-encoded JSON object: relation name -> projected field names.
    pub view: Option<String>,
}

impl ListParams {
    /// Build from the raw query pairs of a request.
    ///
    /// `filter` may repeat; occurrences are comma-joined and combined
    /// with AND, equivalent to a single joined parameter. For every other
    /// parameter the last occurrence wins. Unknown parameters are
    /// ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> EngineResult<Self> {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "page" => params.page = Some(parse_int_param("page", value)?),
                "pageSize" => params.page_size = Some(parse_int_param("pageSize", value)?),
                "sort" => params.sort = Some(value.clone()),
                "view" => params.view = Some(value.clone()),
                "filter" => {
                    params.filter = Some(match params.filter.take() {
                        Some(joined) => format!("{joined},{value}"),
                        None => value.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(params)
    }
}

fn parse_int_param(name: &str, raw: &str) -> EngineResult<i64> {
    raw.trim().parse().map_err(|_| {
        EngineError::bad_request(format!("'{name}' must be an integer (got '{raw}')"))
    })
}

/// Parse a raw filter parameter against the entity definition.
pub fn parse_filter(definition: &EntityDefinition, raw: &str) -> EngineResult<FilterSpec> {
    let mut clauses = Vec::new();

    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Some((field, value)) = token.split_once(':') else {
            return Err(EngineError::bad_request(format!(
                "malformed filter token '{token}': expected field:value"
            )));
        };

        if !definition.has_field(field) {
            return Err(EngineError::bad_request(format!(
                "unknown filter field '{field}'"
            )));
        }

        let constraint = definition.field(field);
        let coerced = coerce_filter_value(
            field,
            value,
            constraint.map(|c| c.field_type).unwrap_or(FieldType::String),
        )?;

        clauses.push(FilterClause {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: coerced,
            case_insensitive: constraint.is_some_and(|c| c.case_insensitive),
        });
    }

    Ok(FilterSpec { clauses })
}

/// Parse a raw sort parameter against the entity definition.
pub fn parse_sort(definition: &EntityDefinition, raw: &str) -> EngineResult<SortSpec> {
    let mut keys = Vec::new();

    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (field, descending) = match token.strip_prefix('-') {
            Some(field) => (field, true),
            None => (token, false),
        };

        if !definition.has_field(field) {
            return Err(EngineError::bad_request(format!(
                "unknown sort field '{field}'"
            )));
        }

        keys.push(SortKey {
            field: field.to_string(),
            descending,
        });
    }

    Ok(SortSpec::with_tiebreak(keys))
}

/// Coerce a raw filter token value into the field's declared type.
fn coerce_filter_value(field: &str, raw: &str, field_type: FieldType) -> EngineResult<Value> {
    match field_type {
        FieldType::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| {
            EngineError::bad_request(format!("filter value for '{field}' must be an integer"))
        }),
        FieldType::Number => raw.parse::<f64>().map(Value::from).map_err(|_| {
            EngineError::bad_request(format!("filter value for '{field}' must be a number"))
        }),
        FieldType::Boolean => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(EngineError::bad_request(format!(
                "filter value for '{field}' must be true or false"
            ))),
        },
        // Strings, dates, ids; array/object fields are not filterable by
        // token, so the raw text is compared as-is.
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Equality with optional case folding for strings.
fn values_equal(left: &Value, right: &Value, case_insensitive: bool) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) if case_insensitive => {
            a.to_lowercase() == b.to_lowercase()
        }
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Total order over JSON values: null < boolean < number < string.
///
/// Fields are homogeneously typed per the schema, so cross-type comparison
/// only decides where absent values land (first, under ascending order).
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(left).cmp(&rank(right)),
    }
}
