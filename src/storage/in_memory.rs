//! In-memory implementation of EntityStore for testing and development
//!
//! Applies the reference filter/sort semantics from `core::query` directly,
//! which makes it the executable specification the backend adapters are
//! checked against. Uses RwLock for thread-safe access.

use crate::core::error::{EngineError, EngineResult};
use crate::core::query::{FilterSpec, SortSpec};
use crate::core::record::Record;
use crate::storage::EntityStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type EntityMap = HashMap<String, BTreeMap<Uuid, Record>>;

/// In-memory entity store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<EntityMap>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, EntityMap>> {
        self.data
            .read()
            .map_err(|e| EngineError::internal(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, EntityMap>> {
        self.data
            .write()
            .map_err(|e| EngineError::internal(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn find(
        &self,
        entity: &str,
        filter: &FilterSpec,
        sort: &SortSpec,
        offset: u64,
        limit: u64,
    ) -> EngineResult<(Vec<Record>, u64)> {
        let data = self.read()?;

        let mut matching: Vec<Record> = data
            .get(entity)
            .map(|records| {
                records
                    .values()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matching.sort_by(|a, b| sort.compare(a, b));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn find_by_id(&self, entity: &str, id: &Uuid) -> EngineResult<Option<Record>> {
        let data = self.read()?;
        Ok(data.get(entity).and_then(|records| records.get(id)).cloned())
    }

    async fn find_by_ids(
        &self,
        entity: &str,
        ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, Record>> {
        let data = self.read()?;
        let Some(records) = data.get(entity) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (*id, r.clone())))
            .collect())
    }

    async fn insert(&self, entity: &str, record: Record) -> EngineResult<Record> {
        let mut data = self.write()?;
        data.entry(entity.to_string())
            .or_default()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        entity: &str,
        id: &Uuid,
        record: Record,
    ) -> EngineResult<Option<Record>> {
        let mut data = self.write()?;
        let Some(records) = data.get_mut(entity) else {
            return Ok(None);
        };
        if !records.contains_key(id) {
            return Ok(None);
        }
        records.insert(*id, record.clone());
        Ok(Some(record))
    }

    async fn count_matching(&self, entity: &str, filter: &FilterSpec) -> EngineResult<u64> {
        let data = self.read()?;
        Ok(data
            .get(entity)
            .map(|records| records.values().filter(|r| filter.matches(r)).count() as u64)
            .unwrap_or(0))
    }
}
