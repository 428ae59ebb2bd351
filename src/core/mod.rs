//! Core module containing the schema registry, query translation,
//! validation and the entity service

pub mod error;
pub mod field;
pub mod query;
pub mod record;
pub mod schema;
pub mod service;
pub mod validation;
pub mod view;

pub use error::{EngineError, EngineResult};
pub use field::{FieldConstraint, FieldType};
pub use query::{FilterSpec, ListParams, PageSpec, SortSpec};
pub use record::Record;
pub use schema::{EntityDefinition, Relation, SchemaRegistry, SYSTEM_FIELDS};
pub use service::{EntityService, ListOutcome};
pub use validation::{Notification, Severity};
pub use view::ViewSpec;
