//! HTTP handlers and route table
//!
//! Routes are generic and work for every registered entity:
//! - `GET /{entity}` - list with filter/sort/pagination/view
//! - `POST /{entity}` - create
//! - `GET /{entity}/{id}` - fetch one record
//! - `PUT /{entity}/{id}` - partial update
//! - `GET /meta` - all entity definitions
//! - `GET /meta/{entity}` - one entity definition
//! - `GET /health` - liveness probe
//!
//! Handlers stay thin: parse the path, hand the raw parameters to the
//! service, wrap the outcome in the response envelope. All domain rules
//! live in `core`.

use crate::core::error::{EngineError, EngineResult};
use crate::core::query::ListParams;
use crate::core::service::EntityService;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EntityService>,
}

/// Build the full route table.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/meta", get(meta_all))
        .route("/meta/{entity}", get(meta_entity))
        .route("/{entity}", get(list_records).post(create_record))
        .route(
            "/{entity}/{id}",
            get(get_record).put(update_record).patch(update_record),
        )
        .with_state(state)
}

/// Parse a path id, mapping garbage to a 400 instead of axum's default
/// rejection so every error wears the same envelope.
fn parse_id(raw: &str) -> EngineResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| EngineError::bad_request(format!("malformed id '{raw}'")))
}

/// Request bodies must be JSON objects; arrays and scalars have no field
/// semantics.
fn require_object(body: Value) -> EngineResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(EngineError::bad_request("request body must be a JSON object")),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn meta_all(State(state): State<AppState>) -> Json<Value> {
    let registry = state.service.registry();
    let entities: Map<String, Value> = registry
        .entity_names()
        .into_iter()
        .filter_map(|name| {
            let definition = registry.definition(name)?;
            let value = serde_json::to_value(definition).ok()?;
            Some((name.to_string(), value))
        })
        .collect();
    Json(json!({ "entities": entities }))
}

async fn meta_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let definition = state
        .service
        .registry()
        .definition(&entity)
        .ok_or_else(|| EngineError::unknown_entity(&entity))?;
    let value = serde_json::to_value(definition)
        .map_err(|e| EngineError::internal(format!("failed to serialize definition: {e}")))?;
    Ok(Json(value))
}

async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, EngineError> {
    let params = ListParams::from_pairs(&pairs)?;
    let outcome = state.service.list(&entity, &params).await?;
    Ok(Json(json!({
        "data": outcome.records,
        "notifications": outcome.notifications,
        "pagination": {
            "page": outcome.page,
            "pageSize": outcome.page_size,
            "total": outcome.total,
        },
    })))
}

async fn get_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, EngineError> {
    let id = parse_id(&id)?;
    let params = ListParams::from_pairs(&pairs)?;
    let (record, notifications) = state
        .service
        .get(&entity, id, params.view.as_deref())
        .await?;
    Ok(Json(json!({
        "data": record,
        "notifications": notifications,
    })))
}

async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, EngineError> {
    let payload = require_object(body)?;
    let record = state.service.create(&entity, payload).await?;
    let envelope = json!({
        "data": record,
        "notifications": [],
    });
    Ok((StatusCode::CREATED, Json(envelope)).into_response())
}

async fn update_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, EngineError> {
    let id = parse_id(&id)?;
    let patch = require_object(body)?;
    let record = state.service.update(&entity, id, patch).await?;
    Ok(Json(json!({
        "data": record,
        "notifications": [],
    })))
}
