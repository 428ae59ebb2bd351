//! Macro-generated conformance suite for `EntityStore` implementations.
//!
//! Every backend must behave identically for the same translated query:
//! same matches, same order, same totals. The suite pins that contract so
//! a backend quirk (analyzed text fields, BSON type coercion) surfaces as
//! a failing test instead of a pagination bug in production.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//!
//! use storage_harness::*;
//!
//! entity_store_tests!(fresh_store().await);
//! ```
//!
//! `$factory` is pasted into each async test body, so it may `.await`; it
//! must yield an isolated, empty store every time.

/// Generate an `EntityStore` conformance test suite.
#[macro_export]
macro_rules! entity_store_tests {
    ($factory:expr) => {
        mod entity_store_contract_tests {
            use super::*;
            use corral::core::query::{FilterSpec, SortSpec};
            use corral::storage::EntityStore;
            use serde_json::{Value, json};
            use uuid::Uuid;

            // ==============================================================
            // Insert & fetch
            // ==============================================================

            #[tokio::test]
            async fn test_insert_and_find_by_id() {
                let store = $factory;
                let created = store.insert("user", user("alice", "alice@test.com")).await.unwrap();

                let fetched = store.find_by_id("user", &created.id).await.unwrap().unwrap();
                assert_eq!(fetched.id, created.id);
                assert_eq!(fetched.fields["username"], json!("alice"));
                assert_eq!(fetched.created_at, created.created_at);
            }

            #[tokio::test]
            async fn test_find_by_id_absent() {
                let store = $factory;
                let fetched = store.find_by_id("user", &Uuid::new_v4()).await.unwrap();
                assert!(fetched.is_none());
            }

            #[tokio::test]
            async fn test_find_by_ids_partial_hit() {
                let store = $factory;
                let a = store.insert("user", user("a", "a@test.com")).await.unwrap();
                let b = store.insert("user", user("b", "b@test.com")).await.unwrap();

                let found = store
                    .find_by_ids("user", &[a.id, b.id, Uuid::new_v4()])
                    .await
                    .unwrap();
                assert_eq!(found.len(), 2);
                assert_eq!(found[&a.id].fields["username"], json!("a"));
            }

            #[tokio::test]
            async fn test_find_by_ids_empty_input() {
                let store = $factory;
                let found = store.find_by_ids("user", &[]).await.unwrap();
                assert!(found.is_empty());
            }

            // ==============================================================
            // Filtering
            // ==============================================================

            #[tokio::test]
            async fn test_filter_equality_is_case_sensitive_by_default() {
                let store = $factory;
                store.insert("user", user("Alice", "a@test.com")).await.unwrap();

                let (hit, _) = store
                    .find("user", &filter_eq("username", json!("Alice")), &SortSpec::default(), 0, 10)
                    .await
                    .unwrap();
                assert_eq!(hit.len(), 1);

                let (miss, _) = store
                    .find("user", &filter_eq("username", json!("alice")), &SortSpec::default(), 0, 10)
                    .await
                    .unwrap();
                assert!(miss.is_empty());
            }

            #[tokio::test]
            async fn test_case_insensitive_filter_folds_case() {
                let store = $factory;
                store.insert("user", user("alice", "Alice@Test.com")).await.unwrap();

                let (hit, _) = store
                    .find(
                        "user",
                        &filter_eq_ci("email", json!("alice@test.COM")),
                        &SortSpec::default(),
                        0,
                        10,
                    )
                    .await
                    .unwrap();
                assert_eq!(hit.len(), 1);
            }

            #[tokio::test]
            async fn test_numeric_filter_matches_stored_number() {
                let store = $factory;
                let mut alice = user("alice", "a@test.com");
                alice.fields.insert("netWorth".to_string(), json!(100));
                store.insert("user", alice).await.unwrap();

                let count = store
                    .count_matching("user", &filter_eq("netWorth", json!(100)))
                    .await
                    .unwrap();
                assert_eq!(count, 1);
            }

            #[tokio::test]
            async fn test_conjunction_with_self_exclusion() {
                let store = $factory;
                let kept = store.insert("user", user("alice", "a@test.com")).await.unwrap();
                store.insert("user", user("alice", "b@test.com")).await.unwrap();

                let mut filter = filter_eq("username", json!("alice"));
                filter.clauses.push(corral::core::query::FilterClause {
                    field: "id".to_string(),
                    op: corral::core::query::FilterOp::Ne,
                    value: json!(kept.id.to_string()),
                    case_insensitive: false,
                });

                assert_eq!(store.count_matching("user", &filter).await.unwrap(), 1);
            }

            // ==============================================================
            // Sorting & pagination
            // ==============================================================

            #[tokio::test]
            async fn test_descending_sort() {
                let store = $factory;
                for name in ["bob", "alice", "carol"] {
                    store
                        .insert("user", user(name, &format!("{name}@test.com")))
                        .await
                        .unwrap();
                }

                let (page, total) = store
                    .find("user", &FilterSpec::default(), &sort_by("username", true), 0, 10)
                    .await
                    .unwrap();
                assert_eq!(total, 3);
                let names: Vec<Value> =
                    page.iter().map(|r| r.fields["username"].clone()).collect();
                assert_eq!(names, vec![json!("carol"), json!("bob"), json!("alice")]);
            }

            #[tokio::test]
            async fn test_pagination_covers_every_record_once() {
                let store = $factory;
                let mut expected = Vec::new();
                for i in 0..7 {
                    let name = format!("user_{i}");
                    store
                        .insert("user", user(&name, &format!("{name}@test.com")))
                        .await
                        .unwrap();
                    expected.push(json!(name));
                }
                expected.sort_by_key(|v| v.as_str().map(str::to_string));

                let sort = sort_by("username", false);
                let mut seen = Vec::new();
                for page in 0..3 {
                    let (records, total) = store
                        .find("user", &FilterSpec::default(), &sort, page * 3, 3)
                        .await
                        .unwrap();
                    assert_eq!(total, 7);
                    seen.extend(records.iter().map(|r| r.fields["username"].clone()));
                }
                assert_eq!(seen, expected);
            }

            #[tokio::test]
            async fn test_id_tiebreak_keeps_tied_pages_stable() {
                let store = $factory;
                // Five records with the same gender; ordering must still be
                // deterministic across paged reads.
                let mut ids = Vec::new();
                for i in 0..5 {
                    let mut r = user(&format!("u{i}"), &format!("u{i}@test.com"));
                    r.fields.insert("gender".to_string(), json!("other"));
                    ids.push(store.insert("user", r).await.unwrap().id);
                }

                let sort = sort_by("gender", false);
                let mut seen = Vec::new();
                for page in 0..5 {
                    let (records, _) = store
                        .find("user", &FilterSpec::default(), &sort, page, 1)
                        .await
                        .unwrap();
                    seen.push(records[0].id);
                }

                ids.sort_by_key(|id| id.to_string());
                assert_eq!(seen, ids);
            }

            // ==============================================================
            // Update
            // ==============================================================

            #[tokio::test]
            async fn test_update_replaces_record() {
                let store = $factory;
                let mut created = store.insert("user", user("alice", "a@test.com")).await.unwrap();

                created.fields.insert("firstName".to_string(), json!("Alice"));
                let updated = store
                    .update("user", &created.id, created.clone())
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(updated.fields["firstName"], json!("Alice"));

                let fetched = store.find_by_id("user", &created.id).await.unwrap().unwrap();
                assert_eq!(fetched.fields["firstName"], json!("Alice"));
            }

            #[tokio::test]
            async fn test_update_absent_record_is_none() {
                let store = $factory;
                let result = store
                    .update("user", &Uuid::new_v4(), user("ghost", "g@test.com"))
                    .await
                    .unwrap();
                assert!(result.is_none());
            }
        }
    };
}
