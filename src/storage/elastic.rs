//! Search-index backend using the official Elasticsearch client.
//!
//! # Feature flag
//!
//! This module is gated behind the `elasticsearch_backend` feature flag:
//! ```toml
//! [dependencies]
//! corral = { version = "0.1", features = ["elasticsearch_backend"] }
//! ```
//!
//! # Storage model
//!
//! Index-per-entity: `<namespace>-<entity>` (lowercased; Elasticsearch
//! forbids uppercase index names). At connect time every index is created
//! with an explicit mapping derived from the entity definition: string
//! fields are mapped as `keyword`, never analyzed `text`, so term filters
//! and sorts behave exactly like the reference semantics instead of
//! matching on analyzed tokens. Case-insensitive equality rides the term
//! query's `case_insensitive` flag.
//!
//! Writes use `refresh=wait_for` so a record is searchable as soon as its
//! write response returns; read-after-write is part of the store contract.

use crate::core::error::{EngineError, EngineResult};
use crate::core::field::FieldType;
use crate::core::query::{FilterClause, FilterOp, FilterSpec, SortSpec};
use crate::core::record::Record;
use crate::core::schema::SchemaRegistry;
use crate::storage::EntityStore;
use async_trait::async_trait;
use elasticsearch::http::transport::Transport;
use elasticsearch::indices::IndicesCreateParts;
use elasticsearch::params::Refresh;
use elasticsearch::{CountParts, Elasticsearch, GetParts, IndexParts, SearchParts};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn backend_err(context: &str, error: impl std::fmt::Display) -> EngineError {
    EngineError::backend("elasticsearch", format!("{context}: {error}"))
}

/// Elasticsearch mapping for a declared field type.
fn mapping_for(field_type: FieldType) -> Value {
    match field_type {
        FieldType::String => json!({ "type": "keyword" }),
        FieldType::Integer => json!({ "type": "long" }),
        FieldType::Number => json!({ "type": "double" }),
        FieldType::Boolean => json!({ "type": "boolean" }),
        FieldType::DateTime => json!({ "type": "date" }),
        FieldType::Object => json!({ "type": "object", "dynamic": true }),
        // Elasticsearch has no dedicated array mapping; element mappings
        // are dynamic.
        FieldType::Array => json!({ "type": "object", "dynamic": true }),
    }
}

/// One term clause of the bool query.
fn term_clause(clause: &FilterClause) -> Value {
    let mut term = json!({ "value": clause.value });
    if clause.case_insensitive && clause.value.is_string() {
        term["case_insensitive"] = json!(true);
    }
    json!({ "term": { (clause.field.as_str()): term } })
}

/// Build the query body for a translated filter.
fn query_body(filter: &FilterSpec) -> Value {
    if filter.is_empty() {
        return json!({ "match_all": {} });
    }

    let mut must = Vec::new();
    let mut must_not = Vec::new();
    for clause in &filter.clauses {
        match clause.op {
            FilterOp::Eq => must.push(term_clause(clause)),
            FilterOp::Ne => must_not.push(term_clause(clause)),
        }
    }
    json!({ "bool": { "must": must, "must_not": must_not } })
}

/// Build the sort body for a translated sort.
///
/// Records missing the sort field rank lowest, like the other backends;
/// Elasticsearch's own default would put them last regardless of order.
fn sort_body(sort: &SortSpec) -> Value {
    Value::Array(
        sort.keys
            .iter()
            .map(|key| {
                let (order, missing) = if key.descending {
                    ("desc", "_last")
                } else {
                    ("asc", "_first")
                };
                json!({ (key.field.as_str()): { "order": order, "missing": missing } })
            })
            .collect(),
    )
}

fn parse_record(source: Value) -> EngineResult<Record> {
    serde_json::from_value(source)
        .map_err(|e| EngineError::internal(format!("malformed stored record: {e}")))
}

/// Search-index implementation of [`EntityStore`].
pub struct ElasticStore {
    client: Elasticsearch,
    prefix: String,
    registry: Arc<SchemaRegistry>,
}

impl ElasticStore {
    /// Build a client against a single node; indices are created lazily by
    /// [`ElasticStore::ensure_indices`].
    pub fn connect(
        uri: &str,
        namespace: &str,
        registry: Arc<SchemaRegistry>,
    ) -> EngineResult<Self> {
        let transport =
            Transport::single_node(uri).map_err(|e| backend_err("failed to connect", e))?;
        Ok(Self {
            client: Elasticsearch::new(transport),
            prefix: namespace.to_lowercase(),
            registry,
        })
    }

    fn index(&self, entity: &str) -> String {
        format!("{}-{}", self.prefix, entity.to_lowercase())
    }

    /// Create one index per registered entity with an explicit mapping.
    ///
    /// Idempotent: an index that already exists is left untouched.
    pub async fn ensure_indices(&self) -> EngineResult<()> {
        for entity in self.registry.entity_names() {
            let Some(fields) = self.registry.fields(entity) else {
                continue;
            };

            let mut properties = serde_json::Map::new();
            properties.insert("id".to_string(), json!({ "type": "keyword" }));
            properties.insert("createdAt".to_string(), json!({ "type": "date" }));
            properties.insert("updatedAt".to_string(), json!({ "type": "date" }));
            for (name, constraint) in fields {
                properties.insert(name.clone(), mapping_for(constraint.field_type));
            }

            let response = self
                .client
                .indices()
                .create(IndicesCreateParts::Index(&self.index(entity)))
                .body(json!({ "mappings": { "properties": properties } }))
                .send()
                .await
                .map_err(|e| backend_err("failed to create index", e))?;

            // 400 resource_already_exists is fine on restart.
            let status = response.status_code().as_u16();
            if !response.status_code().is_success() && status != 400 {
                let detail = response.text().await.unwrap_or_default();
                return Err(backend_err(
                    "failed to create index",
                    format!("status {status}: {detail}"),
                ));
            }
        }
        Ok(())
    }

    async fn search(&self, entity: &str, body: Value) -> EngineResult<Value> {
        let index = self.index(entity);
        let response = self
            .client
            .search(SearchParts::Index(&[&index]))
            .body(body)
            .send()
            .await
            .map_err(|e| backend_err("search failed", e))?;

        // An index with no writes yet may not exist.
        if response.status_code().as_u16() == 404 {
            return Ok(json!({ "hits": { "hits": [], "total": { "value": 0 } } }));
        }
        if !response.status_code().is_success() {
            let status = response.status_code().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(backend_err(
                "search failed",
                format!("status {status}: {detail}"),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| backend_err("malformed search response", e))
    }

    fn hits(response: &Value) -> EngineResult<(Vec<Record>, u64)> {
        let total = response["hits"]["total"]["value"].as_u64().unwrap_or(0);
        let hits = response["hits"]["hits"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let records = hits
            .into_iter()
            .map(|mut hit| parse_record(hit["_source"].take()))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok((records, total))
    }
}

#[async_trait]
impl EntityStore for ElasticStore {
    async fn find(
        &self,
        entity: &str,
        filter: &FilterSpec,
        sort: &SortSpec,
        offset: u64,
        limit: u64,
    ) -> EngineResult<(Vec<Record>, u64)> {
        let body = json!({
            "query": query_body(filter),
            "sort": sort_body(sort),
            "from": offset,
            "size": limit,
            "track_total_hits": true,
        });
        let response = self.search(entity, body).await?;
        Self::hits(&response)
    }

    async fn find_by_id(&self, entity: &str, id: &Uuid) -> EngineResult<Option<Record>> {
        let index = self.index(entity);
        let response = self
            .client
            .get(GetParts::IndexId(&index, &id.to_string()))
            .send()
            .await
            .map_err(|e| backend_err("failed to fetch record", e))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            let status = response.status_code().as_u16();
            return Err(backend_err("failed to fetch record", format!("status {status}")));
        }

        let mut body = response
            .json::<Value>()
            .await
            .map_err(|e| backend_err("malformed get response", e))?;
        Ok(Some(parse_record(body["_source"].take())?))
    }

    async fn find_by_ids(
        &self,
        entity: &str,
        ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, Record>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let values: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let body = json!({
            "query": { "ids": { "values": values } },
            "size": ids.len(),
        });
        let response = self.search(entity, body).await?;
        let (records, _) = Self::hits(&response)?;

        Ok(records.into_iter().map(|r| (r.id, r)).collect())
    }

    async fn insert(&self, entity: &str, record: Record) -> EngineResult<Record> {
        let index = self.index(entity);
        let response = self
            .client
            .index(IndexParts::IndexId(&index, &record.id.to_string()))
            .refresh(Refresh::WaitFor)
            .body(&record)
            .send()
            .await
            .map_err(|e| backend_err("failed to insert record", e))?;

        if !response.status_code().is_success() {
            let status = response.status_code().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(backend_err(
                "failed to insert record",
                format!("status {status}: {detail}"),
            ));
        }
        Ok(record)
    }

    async fn update(
        &self,
        entity: &str,
        id: &Uuid,
        record: Record,
    ) -> EngineResult<Option<Record>> {
        // Index is a full replace; check existence first so an update of an
        // absent record does not silently create it.
        if self.find_by_id(entity, id).await?.is_none() {
            return Ok(None);
        }
        let stored = self.insert(entity, record).await?;
        Ok(Some(stored))
    }

    async fn count_matching(&self, entity: &str, filter: &FilterSpec) -> EngineResult<u64> {
        let index = self.index(entity);
        let response = self
            .client
            .count(CountParts::Index(&[&index]))
            .body(json!({ "query": query_body(filter) }))
            .send()
            .await
            .map_err(|e| backend_err("count failed", e))?;

        if response.status_code().as_u16() == 404 {
            return Ok(0);
        }
        if !response.status_code().is_success() {
            let status = response.status_code().as_u16();
            return Err(backend_err("count failed", format!("status {status}")));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| backend_err("malformed count response", e))?;
        Ok(body["count"].as_u64().unwrap_or(0))
    }
}
