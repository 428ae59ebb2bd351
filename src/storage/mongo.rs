//! Document-store backend using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! corral = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! Collection-per-entity: each entity type gets its own collection, named
//! after the entity, inside the database named by the configured namespace.
//!
//! # Serialization strategy
//!
//! Records are serialized via `serde_json::Value` as an intermediate format,
//! then converted to BSON documents. UUIDs and timestamps are stored as
//! strings (RFC 3339 for timestamps, so lexicographic order is
//! chronological). The `id` field is mapped to MongoDB's `_id` convention.

use crate::core::error::{EngineError, EngineResult};
use crate::core::query::{FilterClause, FilterOp, FilterSpec, SortSpec};
use crate::core::record::Record;
use crate::storage::EntityStore;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::{Client, Database};
use std::collections::HashMap;
use uuid::Uuid;

/// Field name translation: the engine's `id` is MongoDB's `_id`.
fn mongo_field(field: &str) -> &str {
    if field == "id" { "_id" } else { field }
}

fn backend_err(context: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::backend("mongodb", format!("{context}: {error}"))
}

/// Convert a record into a BSON document, renaming `id` → `_id`.
fn record_to_document(record: &Record) -> EngineResult<Document> {
    let json = serde_json::to_value(record)
        .map_err(|e| EngineError::internal(format!("failed to serialize record: {e}")))?;

    let bson = mongodb::bson::to_bson(&json)
        .map_err(|e| EngineError::internal(format!("failed to convert record to BSON: {e}")))?;

    let Bson::Document(mut doc) = bson else {
        return Err(EngineError::internal("record did not serialize to a document"));
    };

    if let Some(id) = doc.remove("id") {
        doc.insert("_id", id);
    }

    Ok(doc)
}

/// Convert a BSON document back into a record, renaming `_id` → `id`.
fn document_to_record(mut doc: Document) -> EngineResult<Record> {
    if let Some(id) = doc.remove("_id") {
        doc.insert("id", id);
    }

    let json = Bson::Document(doc).into_relaxed_extjson();
    serde_json::from_value(json)
        .map_err(|e| EngineError::internal(format!("malformed stored record: {e}")))
}

/// Build the MongoDB filter document for a translated filter.
///
/// Case-insensitive equality uses an anchored, escaped regex with the `i`
/// option; everything else compares the coerced BSON value directly.
fn filter_document(filter: &FilterSpec) -> EngineResult<Document> {
    let mut doc = Document::new();
    for clause in &filter.clauses {
        doc.insert(mongo_field(&clause.field), clause_condition(clause)?);
    }
    Ok(doc)
}

fn clause_condition(clause: &FilterClause) -> EngineResult<Bson> {
    let value = mongodb::bson::to_bson(&clause.value)
        .map_err(|e| EngineError::internal(format!("failed to convert filter value: {e}")))?;

    match clause.op {
        FilterOp::Eq if clause.case_insensitive => {
            let Bson::String(text) = &value else {
                return Ok(value);
            };
            let pattern = format!("^{}$", regex::escape(text));
            Ok(Bson::Document(
                doc! { "$regex": pattern, "$options": "i" },
            ))
        }
        FilterOp::Eq => Ok(value),
        FilterOp::Ne => Ok(Bson::Document(doc! { "$ne": value })),
    }
}

/// Build the MongoDB sort document for a translated sort.
fn sort_document(sort: &SortSpec) -> Document {
    let mut doc = Document::new();
    for key in &sort.keys {
        doc.insert(mongo_field(&key.field), if key.descending { -1 } else { 1 });
    }
    doc
}

/// Document-store implementation of [`EntityStore`].
#[derive(Clone, Debug)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connect to a MongoDB deployment; `namespace` names the database.
    pub async fn connect(uri: &str, namespace: &str) -> EngineResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| backend_err("failed to connect", e))?;
        Ok(Self {
            database: client.database(namespace),
        })
    }

    /// Wrap an already-connected database handle.
    pub fn with_database(database: Database) -> Self {
        Self { database }
    }

    fn collection(&self, entity: &str) -> mongodb::Collection<Document> {
        self.database.collection(entity)
    }
}

#[async_trait]
impl EntityStore for MongoStore {
    async fn find(
        &self,
        entity: &str,
        filter: &FilterSpec,
        sort: &SortSpec,
        offset: u64,
        limit: u64,
    ) -> EngineResult<(Vec<Record>, u64)> {
        let collection = self.collection(entity);
        let filter_doc = filter_document(filter)?;

        let total = collection
            .count_documents(filter_doc.clone())
            .await
            .map_err(|e| backend_err("failed to count records", e))?;

        let cursor = collection
            .find(filter_doc)
            .sort(sort_document(sort))
            .skip(offset)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|e| backend_err("failed to query records", e))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| backend_err("failed to collect records", e))?;

        let records = docs
            .into_iter()
            .map(document_to_record)
            .collect::<EngineResult<Vec<_>>>()?;

        Ok((records, total))
    }

    async fn find_by_id(&self, entity: &str, id: &Uuid) -> EngineResult<Option<Record>> {
        let doc = self
            .collection(entity)
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(|e| backend_err("failed to fetch record", e))?;

        doc.map(document_to_record).transpose()
    }

    async fn find_by_ids(
        &self,
        entity: &str,
        ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, Record>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let id_strings: Vec<Bson> = ids
            .iter()
            .map(|id| Bson::String(id.to_string()))
            .collect();

        let cursor = self
            .collection(entity)
            .find(doc! { "_id": { "$in": id_strings } })
            .await
            .map_err(|e| backend_err("failed to fetch records by id", e))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| backend_err("failed to collect records", e))?;

        docs.into_iter()
            .map(|doc| {
                let record = document_to_record(doc)?;
                Ok((record.id, record))
            })
            .collect()
    }

    async fn insert(&self, entity: &str, record: Record) -> EngineResult<Record> {
        let doc = record_to_document(&record)?;
        self.collection(entity)
            .insert_one(doc)
            .await
            .map_err(|e| backend_err("failed to insert record", e))?;
        Ok(record)
    }

    async fn update(
        &self,
        entity: &str,
        id: &Uuid,
        record: Record,
    ) -> EngineResult<Option<Record>> {
        let doc = record_to_document(&record)?;
        let result = self
            .collection(entity)
            .replace_one(doc! { "_id": id.to_string() }, doc)
            .await
            .map_err(|e| backend_err("failed to update record", e))?;

        if result.matched_count == 0 {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn count_matching(&self, entity: &str, filter: &FilterSpec) -> EngineResult<u64> {
        self.collection(entity)
            .count_documents(filter_document(filter)?)
            .await
            .map_err(|e| backend_err("failed to count records", e))
    }
}
