//! Entity service orchestration
//!
//! One service instance drives the whole request pipeline for every entity:
//! payload validation, uniqueness pre-flight, persistence, soft read-time
//! annotation and foreign-key view resolution. Handlers stay thin; every
//! rule lives here or below.

use crate::config::GetValidationMode;
use crate::core::error::{EngineError, EngineResult};
use crate::core::query::{
    FilterClause, FilterOp, FilterSpec, ListParams, PageSpec, SortSpec, parse_filter, parse_sort,
};
use crate::core::record::Record;
use crate::core::schema::{EntityDefinition, SchemaRegistry};
use crate::core::validation::{self, Notification};
use crate::core::view::{self, ViewSpec};
use crate::storage::EntityStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a list operation: one page of records plus everything the
/// response envelope needs.
#[derive(Debug)]
pub struct ListOutcome {
    pub records: Vec<Record>,
    pub notifications: Vec<Notification>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

/// Backend-agnostic CRUD and query service over schema-defined entities.
pub struct EntityService {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn EntityStore>,
    unique_check: bool,
    get_validation: GetValidationMode,
}

impl EntityService {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn EntityStore>,
        unique_check: bool,
        get_validation: GetValidationMode,
    ) -> Self {
        Self {
            registry,
            store,
            unique_check,
            get_validation,
        }
    }

    /// The schema registry this service answers for.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn definition(&self, entity: &str) -> EngineResult<&EntityDefinition> {
        self.registry
            .definition(entity)
            .ok_or_else(|| EngineError::unknown_entity(entity))
    }

    /// Create a record from a full payload.
    ///
    /// Hard validation runs first and reports every violation at once; the
    /// uniqueness pre-flight only runs on an otherwise valid payload, so a
    /// conflict response always refers to values that would actually be
    /// stored.
    pub async fn create(&self, entity: &str, payload: Map<String, Value>) -> EngineResult<Record> {
        let definition = self.definition(entity)?;

        let violations = validation::validate_write(definition, &payload, false);
        if !violations.is_empty() {
            return Err(EngineError::ValidationFailed {
                notifications: violations,
            });
        }

        let record = Record::new(payload);
        self.ensure_unique(entity, definition, &record, None).await?;

        self.store.insert(entity, record).await
    }

    /// Partially update a record.
    ///
    /// The patch is validated in partial mode (absent required fields are
    /// fine, explicitly nulled ones are not), merged over the stored record,
    /// and the merged candidate is what the uniqueness pre-flight sees,
    /// excluding the record itself.
    pub async fn update(
        &self,
        entity: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> EngineResult<Record> {
        let definition = self.definition(entity)?;

        let existing = self
            .store
            .find_by_id(entity, &id)
            .await?
            .ok_or_else(|| EngineError::not_found(entity, id))?;

        let violations = validation::validate_write(definition, &patch, true);
        if !violations.is_empty() {
            return Err(EngineError::ValidationFailed {
                notifications: violations,
            });
        }

        let mut candidate = existing;
        candidate.apply_patch(patch);
        self.ensure_unique(entity, definition, &candidate, Some(id))
            .await?;

        self.store
            .update(entity, &id, candidate)
            .await?
            .ok_or_else(|| EngineError::not_found(entity, id))
    }

    /// Fetch a single record with soft read-time annotation; views resolve
    /// on request, or unconditionally (existence-only) per the configured
    /// get-validation mode.
    pub async fn get(
        &self,
        entity: &str,
        id: Uuid,
        view_param: Option<&str>,
    ) -> EngineResult<(Record, Vec<Notification>)> {
        let definition = self.definition(entity)?;

        let mut record = self
            .store
            .find_by_id(entity, &id)
            .await?
            .ok_or_else(|| EngineError::not_found(entity, id))?;

        let notifications = validation::annotate_read(definition, &record);

        let force_view = !matches!(self.get_validation, GetValidationMode::Off);
        let view = self.effective_view(definition, view_param, force_view)?;
        if !view.is_empty() {
            let batch = std::slice::from_mut(&mut record);
            view::resolve_views(&self.store, definition, batch, &view).await?;
        }

        Ok((record, notifications))
    }

    /// Fetch one page of records matching the raw query parameters.
    pub async fn list(&self, entity: &str, params: &ListParams) -> EngineResult<ListOutcome> {
        let definition = self.definition(entity)?;

        let filter = match params.filter.as_deref() {
            Some(raw) => parse_filter(definition, raw)?,
            None => FilterSpec::default(),
        };
        let sort = match params.sort.as_deref() {
            Some(raw) => parse_sort(definition, raw)?,
            None => SortSpec::with_tiebreak(Vec::new()),
        };
        let page = PageSpec::new(params.page, params.page_size);

        let (mut records, total) = self
            .store
            .find(entity, &filter, &sort, page.offset(), page.limit())
            .await?;

        let mut notifications = Vec::new();
        for record in &records {
            notifications.extend(validation::annotate_read(definition, record));
        }

        let force_view = matches!(self.get_validation, GetValidationMode::GetAll);
        let view = self.effective_view(definition, params.view.as_deref(), force_view)?;
        if !view.is_empty() {
            view::resolve_views(&self.store, definition, &mut records, &view).await?;
        }

        Ok(ListOutcome {
            records,
            notifications,
            page: page.page,
            page_size: page.page_size,
            total,
        })
    }

    /// The view to resolve: the explicit parameter when present, an
    /// existence-only view over every relation when the get-validation
    /// mode forces FK checking, otherwise nothing.
    fn effective_view(
        &self,
        definition: &EntityDefinition,
        view_param: Option<&str>,
        forced: bool,
    ) -> EngineResult<ViewSpec> {
        match view_param {
            Some(raw) => view::parse_view(&self.registry, definition, raw),
            None if forced => Ok(ViewSpec::existence_only(definition)),
            None => Ok(ViewSpec::default()),
        }
    }

    /// Pre-flight uniqueness check over every unique field-group.
    ///
    /// A group with any missing or null value is skipped; partially filled
    /// groups cannot conflict. On update the stored record excludes itself
    /// via an id inequality clause.
    async fn ensure_unique(
        &self,
        entity: &str,
        definition: &EntityDefinition,
        candidate: &Record,
        exclude: Option<Uuid>,
    ) -> EngineResult<()> {
        if !self.unique_check {
            return Ok(());
        }

        for group in &definition.unique {
            let mut clauses = Vec::with_capacity(group.len() + 1);
            let mut values = Map::new();

            let complete = group.iter().all(|field| {
                match candidate.fields.get(field) {
                    Some(value) if !value.is_null() => {
                        values.insert(field.clone(), value.clone());
                        clauses.push(FilterClause {
                            field: field.clone(),
                            op: FilterOp::Eq,
                            value: value.clone(),
                            case_insensitive: definition
                                .field(field)
                                .is_some_and(|c| c.case_insensitive),
                        });
                        true
                    }
                    _ => false,
                }
            });
            if !complete {
                continue;
            }

            if let Some(id) = exclude {
                clauses.push(FilterClause {
                    field: "id".to_string(),
                    op: FilterOp::Ne,
                    value: Value::String(id.to_string()),
                    case_insensitive: false,
                });
            }

            let conflicts = self
                .store
                .count_matching(entity, &FilterSpec { clauses })
                .await?;
            if conflicts > 0 {
                return Err(EngineError::UniqueViolation {
                    fields: group.clone(),
                    values,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::{Severity, rules};
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn service(unique_check: bool, get_validation: GetValidationMode) -> EntityService {
        EntityService::new(
            Arc::new(SchemaRegistry::default_schema()),
            Arc::new(InMemoryStore::new()),
            unique_check,
            get_validation,
        )
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn user_payload(username: &str, email: &str) -> Map<String, Value> {
        payload(json!({
            "username": username,
            "email": email,
            "accountId": Uuid::new_v4().to_string(),
        }))
    }

    // --- create ---

    #[tokio::test]
    async fn test_create_valid_user() {
        let service = service(true, GetValidationMode::Off);
        let record = service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        assert_eq!(record.fields["username"], json!("alice"));
        assert_eq!(record.created_at, record.updated_at);
    }

    #[tokio::test]
    async fn test_create_unknown_entity_is_bad_request() {
        let service = service(true, GetValidationMode::Off);
        let err = service.create("widget", Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_create_missing_required_fields() {
        let service = service(true, GetValidationMode::Off);
        let err = service
            .create("user", payload(json!({"username": "alice"})))
            .await
            .unwrap_err();
        let EngineError::ValidationFailed { notifications } = err else {
            panic!("expected validation failure");
        };
        let fields: Vec<&str> = notifications
            .iter()
            .filter_map(|n| n.field.as_deref())
            .collect();
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"accountId"));
        assert!(notifications.iter().all(|n| n.severity == Severity::Blocking));
    }

    #[tokio::test]
    async fn test_create_reports_all_violations_at_once() {
        let service = service(true, GetValidationMode::Off);
        let err = service
            .create(
                "user",
                payload(json!({
                    "username": "X",
                    "email": "not-an-email",
                    "accountId": "a",
                    "bogus": 1,
                })),
            )
            .await
            .unwrap_err();
        let EngineError::ValidationFailed { notifications } = err else {
            panic!("expected validation failure");
        };
        let rules_hit: Vec<&str> = notifications.iter().map(|n| n.rule.as_str()).collect();
        assert!(rules_hit.contains(&rules::PATTERN));
        assert!(rules_hit.contains(&rules::MIN_LENGTH));
        assert!(rules_hit.contains(&rules::UNKNOWN));
    }

    #[tokio::test]
    async fn test_create_rejects_system_fields() {
        let service = service(true, GetValidationMode::Off);
        let mut body = user_payload("alice", "alice@example.com");
        body.insert("id".to_string(), json!("custom-id"));
        let err = service.create("user", body).await.unwrap_err();
        let EngineError::ValidationFailed { notifications } = err else {
            panic!("expected validation failure");
        };
        assert_eq!(notifications[0].rule, rules::READ_ONLY);
    }

    // --- uniqueness ---

    #[tokio::test]
    async fn test_create_unique_conflict() {
        let service = service(true, GetValidationMode::Off);
        service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        let err = service
            .create("user", user_payload("alice", "other@example.com"))
            .await
            .unwrap_err();
        let EngineError::UniqueViolation { fields, values } = err else {
            panic!("expected unique violation");
        };
        assert_eq!(fields, vec!["username"]);
        assert_eq!(values["username"], json!("alice"));
    }

    #[tokio::test]
    async fn test_unique_email_is_case_insensitive() {
        let service = service(true, GetValidationMode::Off);
        service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        let err = service
            .create("user", user_payload("alicia", "Alice@Example.COM"))
            .await
            .unwrap_err();
        let EngineError::UniqueViolation { fields, .. } = err else {
            panic!("expected unique violation");
        };
        assert_eq!(fields, vec!["email"]);
    }

    #[tokio::test]
    async fn test_unique_check_can_be_disabled() {
        let service = service(false, GetValidationMode::Off);
        service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_composite_unique_group() {
        let service = service(true, GetValidationMode::Off);
        let user_id = Uuid::new_v4().to_string();
        let affinity =
            |tag: &str| payload(json!({"userId": user_id, "tag": tag, "affinity": 0.5}));

        service.create("tagAffinity", affinity("rust")).await.unwrap();
        // Same user, different tag: fine.
        service.create("tagAffinity", affinity("jazz")).await.unwrap();

        let err = service
            .create("tagAffinity", affinity("rust"))
            .await
            .unwrap_err();
        let EngineError::UniqueViolation { fields, .. } = err else {
            panic!("expected unique violation");
        };
        assert_eq!(fields, vec!["userId", "tag"]);
    }

    #[tokio::test]
    async fn test_unique_group_with_missing_value_is_skipped() {
        let schema = r#"
entities:
  device:
    fields:
      serial:
        type: string
    unique:
      - [serial]
"#;
        let service = EntityService::new(
            Arc::new(SchemaRegistry::from_yaml_str(schema).unwrap()),
            Arc::new(InMemoryStore::new()),
            true,
            GetValidationMode::Off,
        );

        // No serial on either record: the group is incomplete, no conflict.
        service.create("device", Map::new()).await.unwrap();
        service.create("device", Map::new()).await.unwrap();

        service
            .create("device", payload(json!({"serial": "abc"})))
            .await
            .unwrap();
        let err = service
            .create("device", payload(json!({"serial": "abc"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueViolation { .. }));
    }

    // --- update ---

    #[tokio::test]
    async fn test_update_merges_patch() {
        let service = service(true, GetValidationMode::Off);
        let created = service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();

        let updated = service
            .update("user", created.id, payload(json!({"firstName": "Alice"})))
            .await
            .unwrap();

        assert_eq!(updated.fields["firstName"], json!("Alice"));
        assert_eq!(updated.fields["username"], json!("alice"));
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn test_update_absent_record_is_not_found() {
        let service = service(true, GetValidationMode::Off);
        let err = service
            .update("user", Uuid::new_v4(), Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_cannot_null_required_field() {
        let service = service(true, GetValidationMode::Off);
        let created = service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        let err = service
            .update("user", created.id, payload(json!({"email": null})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn test_update_null_clears_optional_field() {
        let service = service(true, GetValidationMode::Off);
        let mut body = user_payload("alice", "alice@example.com");
        body.insert("firstName".to_string(), json!("Alice"));
        let created = service.create("user", body).await.unwrap();

        let updated = service
            .update("user", created.id, payload(json!({"firstName": null})))
            .await
            .unwrap();
        assert!(!updated.fields.contains_key("firstName"));
    }

    #[tokio::test]
    async fn test_update_excludes_self_from_unique_check() {
        let service = service(true, GetValidationMode::Off);
        let created = service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();

        // Re-asserting the record's own unique values must not conflict.
        service
            .update("user", created.id, payload(json!({"username": "alice"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_into_taken_value_conflicts() {
        let service = service(true, GetValidationMode::Off);
        service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        let bob = service
            .create("user", user_payload("bob", "bob@example.com"))
            .await
            .unwrap();

        let err = service
            .update("user", bob.id, payload(json!({"username": "alice"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UniqueViolation { .. }));
    }

    // --- get ---

    #[tokio::test]
    async fn test_get_absent_record_is_not_found() {
        let service = service(true, GetValidationMode::Off);
        let err = service
            .get("user", Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_valid_record_has_no_notifications() {
        let service = service(true, GetValidationMode::Off);
        let created = service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();
        let (record, notifications) = service.get("user", created.id, None).await.unwrap();
        assert!(notifications.is_empty());
        // Off mode: no forced existence view either.
        assert!(!record.fields.contains_key("account"));
    }

    #[tokio::test]
    async fn test_get_annotates_stored_violations() {
        let registry = Arc::new(SchemaRegistry::default_schema());
        let store = Arc::new(InMemoryStore::new());
        // Seed a record bypassing write validation, as if persisted before a
        // schema tightening.
        let stored = store
            .insert(
                "user",
                Record::new(
                    payload(json!({
                        "username": "alice",
                        "accountId": "a",
                        "netWorth": -5,
                    })),
                ),
            )
            .await
            .unwrap();

        // Annotation happens regardless of the get-validation mode.
        let service = EntityService::new(registry, store, true, GetValidationMode::Off);
        let (record, notifications) = service.get("user", stored.id, None).await.unwrap();

        assert_eq!(record.fields["netWorth"], json!(-5));
        assert!(notifications
            .iter()
            .all(|n| n.severity == Severity::Info && n.record_id == Some(stored.id)));
        let rules_hit: Vec<&str> = notifications.iter().map(|n| n.rule.as_str()).collect();
        assert!(rules_hit.contains(&rules::MINIMUM));
        assert!(rules_hit.contains(&rules::REQUIRED));
    }

    #[tokio::test]
    async fn test_get_with_view_embeds_fragment() {
        let service = service(true, GetValidationMode::Off);
        let account = service
            .create("account", payload(json!({"name": "acme"})))
            .await
            .unwrap();
        let mut body = user_payload("alice", "alice@example.com");
        body.insert("accountId".to_string(), json!(account.id.to_string()));
        let created = service.create("user", body).await.unwrap();

        let (record, _) = service
            .get("user", created.id, Some(r#"{"account": ["name"]}"#))
            .await
            .unwrap();
        assert_eq!(
            record.fields["account"],
            json!({"exists": true, "name": "acme"})
        );
    }

    #[tokio::test]
    async fn test_get_mode_forces_existence_view() {
        let service = service(true, GetValidationMode::Get);
        let created = service
            .create("user", user_payload("alice", "alice@example.com"))
            .await
            .unwrap();

        // accountId points nowhere; the forced existence-only view says so.
        let (record, _) = service.get("user", created.id, None).await.unwrap();
        assert_eq!(record.fields["account"], json!({"exists": false}));
    }

    // --- list ---

    async fn seed_users(service: &EntityService, count: usize) {
        for i in 0..count {
            service
                .create(
                    "user",
                    user_payload(&format!("user_{i:02}"), &format!("u{i}@example.com")),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_defaults() {
        let service = service(true, GetValidationMode::Off);
        seed_users(&service, 3).await;

        let outcome = service
            .list("user", &ListParams::default())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.page, 1);
        assert_eq!(outcome.page_size, 50);
        assert!(outcome.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_list_paginates_without_overlap() {
        let service = service(true, GetValidationMode::Off);
        seed_users(&service, 5).await;

        let params = |page| ListParams {
            page: Some(page),
            page_size: Some(2),
            sort: Some("username".to_string()),
            ..Default::default()
        };

        let mut seen = Vec::new();
        for page in 1..=3 {
            let outcome = service.list("user", &params(page)).await.unwrap();
            assert_eq!(outcome.total, 5);
            seen.extend(
                outcome
                    .records
                    .iter()
                    .map(|r| r.fields["username"].clone()),
            );
        }
        let mut expected: Vec<Value> =
            (0..5).map(|i| json!(format!("user_{i:02}"))).collect();
        expected.sort_by_key(|v| v.as_str().map(str::to_string));
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_list_filter_and_sort() {
        let service = service(true, GetValidationMode::Off);
        for (name, gender) in [("alice", "female"), ("bob", "male"), ("carol", "female")] {
            let mut body = user_payload(name, &format!("{name}@example.com"));
            body.insert("gender".to_string(), json!(gender));
            service.create("user", body).await.unwrap();
        }

        let outcome = service
            .list(
                "user",
                &ListParams {
                    filter: Some("gender:female".to_string()),
                    sort: Some("-username".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let names: Vec<Value> = outcome
            .records
            .iter()
            .map(|r| r.fields["username"].clone())
            .collect();
        assert_eq!(names, vec![json!("carol"), json!("alice")]);
    }

    #[tokio::test]
    async fn test_list_bad_filter_field_is_bad_request() {
        let service = service(true, GetValidationMode::Off);
        let err = service
            .list(
                "user",
                &ListParams {
                    filter: Some("ghost:1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_list_annotations_and_get_all_existence_view() {
        let registry = Arc::new(SchemaRegistry::default_schema());
        let store = Arc::new(InMemoryStore::new());
        let stored = store
            .insert("user", Record::new(payload(json!({"username": "alice"}))))
            .await
            .unwrap();

        let service = EntityService::new(registry, store, true, GetValidationMode::GetAll);
        let outcome = service
            .list("user", &ListParams::default())
            .await
            .unwrap();

        assert!(!outcome.notifications.is_empty());
        assert!(outcome
            .notifications
            .iter()
            .all(|n| n.record_id == Some(stored.id)));
        // GetAll also forces the existence-only view.
        assert_eq!(outcome.records[0].fields["account"], json!({"exists": false}));
    }
}
