//! Foreign-key view resolution
//!
//! A view request asks for fields of related records to be embedded in the
//! response. Resolution is batched by referenced entity: one `find_by_ids`
//! call per target entity for the whole page, never one call per record,
//! so list endpoints stay bounded in round-trip count regardless of page
//! size. Lookups for distinct entities are independent and run concurrently.

use crate::core::error::{EngineError, EngineResult};
use crate::core::record::Record;
use crate::core::schema::{EntityDefinition, SchemaRegistry};
use crate::storage::EntityStore;
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// A requested view: relation name -> fields to project from the referenced
/// entity. An empty projection checks existence only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSpec {
    pub relations: IndexMap<String, Vec<String>>,
}

impl ViewSpec {
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// An existence-only view over every relation of the entity, used when
    /// the get-validation mode forces FK checking without a view request.
    pub fn existence_only(definition: &EntityDefinition) -> Self {
        Self {
            relations: definition
                .relations
                .keys()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
        }
    }
}

/// Parse a raw `view` parameter (URL-decoded JSON object) against the
/// entity definition and the registry.
///
/// Unknown relation names and projected fields the target entity does not
/// have are BadRequest.
pub fn parse_view(
    registry: &SchemaRegistry,
    definition: &EntityDefinition,
    raw: &str,
) -> EngineResult<ViewSpec> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::bad_request(format!("malformed view parameter: {e}")))?;

    let Some(object) = parsed.as_object() else {
        return Err(EngineError::bad_request(
            "view parameter must be a JSON object of relation name to field list",
        ));
    };

    let mut relations = IndexMap::new();
    for (relation_name, fields_value) in object {
        let Some(relation) = definition.relations.get(relation_name) else {
            return Err(EngineError::bad_request(format!(
                "unknown view relation '{relation_name}'"
            )));
        };

        let Some(field_values) = fields_value.as_array() else {
            return Err(EngineError::bad_request(format!(
                "view relation '{relation_name}' must map to an array of field names"
            )));
        };

        // The relation target is validated at registry load time.
        let target = registry
            .definition(&relation.entity)
            .ok_or_else(|| EngineError::internal("relation targets unregistered entity"))?;

        let mut fields = Vec::with_capacity(field_values.len());
        for field_value in field_values {
            let Some(field) = field_value.as_str() else {
                return Err(EngineError::bad_request(format!(
                    "view relation '{relation_name}' contains a non-string field name"
                )));
            };
            if !target.has_field(field) {
                return Err(EngineError::bad_request(format!(
                    "view field '{field}' does not exist on entity '{}'",
                    relation.entity
                )));
            }
            fields.push(field.to_string());
        }

        relations.insert(relation_name.clone(), fields);
    }

    Ok(ViewSpec { relations })
}

/// Resolve a view over a batch of records, attaching a fragment
/// `{exists: bool, <projected fields>...}` under each relation name.
///
/// A missing, null or unparsable foreign key, or one with no matching
/// target record, yields `{exists: false}` with no other keys. Never an
/// error.
pub async fn resolve_views(
    store: &Arc<dyn EntityStore>,
    definition: &EntityDefinition,
    records: &mut [Record],
    view: &ViewSpec,
) -> EngineResult<()> {
    if view.is_empty() || records.is_empty() {
        return Ok(());
    }

    // Group the distinct foreign keys of the whole batch by referenced
    // entity; relations pointing at the same entity share one lookup.
    let mut ids_by_entity: HashMap<&str, HashSet<Uuid>> = HashMap::new();
    for relation_name in view.relations.keys() {
        let Some(relation) = definition.relations.get(relation_name) else {
            continue;
        };
        let ids = ids_by_entity.entry(relation.entity.as_str()).or_default();
        for record in records.iter() {
            if let Some(id) = foreign_key(record, &relation.field) {
                ids.insert(id);
            }
        }
    }

    let lookups = ids_by_entity.into_iter().map(|(entity, ids)| {
        let store = Arc::clone(store);
        let ids: Vec<Uuid> = ids.into_iter().collect();
        async move {
            let found = store.find_by_ids(entity, &ids).await?;
            Ok::<_, EngineError>((entity.to_string(), found))
        }
    });

    let resolved: HashMap<String, HashMap<Uuid, Record>> =
        try_join_all(lookups).await?.into_iter().collect();

    for record in records.iter_mut() {
        let mut fragments: Vec<(String, Value)> = Vec::with_capacity(view.relations.len());
        for (relation_name, projection) in &view.relations {
            let Some(relation) = definition.relations.get(relation_name) else {
                continue;
            };
            let target = foreign_key(record, &relation.field)
                .and_then(|id| resolved.get(relation.entity.as_str())?.get(&id));
            fragments.push((relation_name.clone(), fragment(target, projection)));
        }
        for (name, value) in fragments {
            record.fields.insert(name, value);
        }
    }

    Ok(())
}

/// Read and parse a foreign-key field from a record.
fn foreign_key(record: &Record, field: &str) -> Option<Uuid> {
    record
        .fields
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Build the resolved fragment for one relation of one record.
fn fragment(target: Option<&Record>, projection: &[String]) -> Value {
    match target {
        None => json!({ "exists": false }),
        Some(record) => {
            let mut object = Map::new();
            object.insert("exists".to_string(), Value::Bool(true));
            for field in projection {
                object.insert(
                    field.clone(),
                    record.value(field).unwrap_or(Value::Null),
                );
            }
            Value::Object(object)
        }
    }
}
