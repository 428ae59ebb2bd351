//! # Corral
//!
//! A schema-driven entity CRUD and query engine over heterogeneous storage
//! backends, exposed as a RESTful API.
//!
//! ## Features
//!
//! - **Schema registry**: entity shapes declared once in YAML, loaded at
//!   startup, optionally deep-merged with an override document
//! - **Uniform storage contract**: one `EntityStore` trait; in-memory,
//!   document-store (MongoDB) and search-index (Elasticsearch) adapters
//!   with identical query semantics
//! - **Query translation**: `field:value` filters, `-field` descending
//!   sorts, stable pagination with an id tie-break
//! - **Two-tier validation**: hard write-blocking constraints and soft
//!   read-time notifications from the same constraint catalog
//! - **Uniqueness pre-flight**: unique field-groups checked before every
//!   write, excluding the record itself on update
//! - **Foreign-key views**: batched relation resolution with
//!   `{exists, ...}` fragments that never fail the request
//! - **Automatic timestamps**: `createdAt` and `updatedAt` managed by the
//!   engine, `updatedAt` strictly monotonic per record
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corral::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init_tracing();
//!
//!     let config = AppConfig::from_yaml_file("corral.yaml")?.apply_env()?;
//!     ServerBuilder::from_config(config).serve().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    pub use crate::config::{AppConfig, BackendKind, GetValidationMode};
    pub use crate::core::{
        EngineError, EngineResult, EntityDefinition, EntityService, FieldConstraint, FieldType,
        FilterSpec, ListOutcome, ListParams, Notification, PageSpec, Record, Relation,
        SchemaRegistry, Severity, SortSpec, ViewSpec,
    };
    pub use crate::server::{AppState, ServerBuilder, build_routes, init_tracing};
    pub use crate::storage::EntityStore;

    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryStore;
}
