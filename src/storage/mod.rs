//! Storage adapters
//!
//! One `EntityStore` trait, one concrete implementation per backend
//! technology, selected once at startup by configuration. Every
//! implementation must honor the reference filter/sort semantics defined in
//! [`crate::core::query`]: case-sensitive string comparison unless the field
//! is marked case-insensitive, stable multi-field ordering evaluated
//! left-to-right, and the record id as the final tie-break.

use crate::config::{AppConfig, BackendKind};
use crate::core::error::{EngineError, EngineResult};
use crate::core::query::{FilterSpec, SortSpec};
use crate::core::record::Record;
use crate::core::schema::SchemaRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "elasticsearch_backend")]
pub mod elastic;
#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongo;

#[cfg(feature = "elasticsearch_backend")]
pub use elastic::ElasticStore;
#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryStore;
#[cfg(feature = "mongodb_backend")]
pub use mongo::MongoStore;

/// Uniform find/count/insert/update contract over a storage backend.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch one page of matching records plus the total match count.
    async fn find(
        &self,
        entity: &str,
        filter: &FilterSpec,
        sort: &SortSpec,
        offset: u64,
        limit: u64,
    ) -> EngineResult<(Vec<Record>, u64)>;

    /// Fetch a record by id; `None` when absent.
    async fn find_by_id(&self, entity: &str, id: &Uuid) -> EngineResult<Option<Record>>;

    /// Batched lookup keyed by id. Ids with no record are simply absent from
    /// the result; this is the FK resolver's workhorse.
    async fn find_by_ids(&self, entity: &str, ids: &[Uuid])
    -> EngineResult<HashMap<Uuid, Record>>;

    /// Persist a new record and return the stored version.
    async fn insert(&self, entity: &str, record: Record) -> EngineResult<Record>;

    /// Replace an existing record; `None` when no record matched the id.
    async fn update(
        &self,
        entity: &str,
        id: &Uuid,
        record: Record,
    ) -> EngineResult<Option<Record>>;

    /// Count records matching a filter, used by the uniqueness pre-check.
    async fn count_matching(&self, entity: &str, filter: &FilterSpec) -> EngineResult<u64>;
}

/// Connect the store selected by configuration.
///
/// Called once at startup; the resulting handle is shared across all
/// requests (backend drivers pool their connections internally). The
/// search-index backend needs the registry to derive index mappings.
#[cfg_attr(
    not(feature = "elasticsearch_backend"),
    allow(unused_variables)
)]
pub async fn connect(
    config: &AppConfig,
    registry: &Arc<SchemaRegistry>,
) -> EngineResult<Arc<dyn EntityStore>> {
    match config.backend {
        #[cfg(feature = "in-memory")]
        BackendKind::Memory => Ok(Arc::new(InMemoryStore::new())),

        #[cfg(feature = "mongodb_backend")]
        BackendKind::Mongodb => {
            let uri = config.uri.as_deref().ok_or_else(|| {
                EngineError::bad_request("mongodb backend requires a connection uri")
            })?;
            let store = MongoStore::connect(uri, &config.namespace).await?;
            Ok(Arc::new(store))
        }

        #[cfg(feature = "elasticsearch_backend")]
        BackendKind::Elasticsearch => {
            let uri = config.uri.as_deref().ok_or_else(|| {
                EngineError::bad_request("elasticsearch backend requires a connection uri")
            })?;
            let store = ElasticStore::connect(uri, &config.namespace, Arc::clone(registry))?;
            store.ensure_indices().await?;
            Ok(Arc::new(store))
        }

        #[allow(unreachable_patterns)]
        other => Err(EngineError::bad_request(format!(
            "backend '{other:?}' is not enabled in this build"
        ))),
    }
}
