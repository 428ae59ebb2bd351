//! Entity metadata registry
//!
//! The registry is the single source of truth for entity shapes: field
//! constraints, unique field-groups and foreign-key relations. It is loaded
//! once at process start from a YAML schema document, optionally deep-merged
//! with an override document, and is read-only afterwards. A reload requires
//! a restart; nothing re-reads schema files per request.

use crate::core::field::FieldConstraint;
use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field names managed by the engine itself. They exist on every record and
/// may not be declared in a schema document.
pub const SYSTEM_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// A foreign-key relation: a local field holding the id of a record in
/// another entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    /// Local field carrying the foreign key (e.g. `accountId`).
    pub field: String,

    /// Name of the referenced entity (e.g. `account`).
    pub entity: String,
}

/// Complete definition of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Ordered field catalog.
    pub fields: IndexMap<String, FieldConstraint>,

    /// Unique field-groups: each inner list is a set of fields whose combined
    /// value must be distinct across all records of the entity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<Vec<String>>,

    /// Foreign-key relations keyed by relation name (the key a view request
    /// uses, e.g. `account`).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relations: IndexMap<String, Relation>,
}

impl EntityDefinition {
    /// Look up a field constraint, `None` for unknown and system fields.
    pub fn field(&self, name: &str) -> Option<&FieldConstraint> {
        self.fields.get(name)
    }

    /// Whether `name` is addressable in filters and sorts: a declared field
    /// or a system-managed one.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name) || SYSTEM_FIELDS.contains(&name)
    }
}

/// Raw schema document shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDocument {
    entities: IndexMap<String, EntityDefinition>,
}

/// Immutable registry of entity definitions, shared across all requests.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: IndexMap<String, EntityDefinition>,
}

impl SchemaRegistry {
    /// Load the registry from a YAML schema string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let document: SchemaDocument =
            serde_yaml::from_str(yaml).context("failed to parse schema document")?;
        Self::from_document(document)
    }

    /// Load the registry from a YAML file, optionally deep-merging an
    /// override file on top (override values win, nested objects merge
    /// key-by-key, non-object values replace).
    pub fn from_yaml_file(path: &str, override_path: Option<&str>) -> Result<Self> {
        let base = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file '{path}'"))?;

        let Some(override_path) = override_path else {
            return Self::from_yaml_str(&base);
        };

        let overlay = std::fs::read_to_string(override_path)
            .with_context(|| format!("failed to read schema override file '{override_path}'"))?;

        let mut base_value: Value =
            serde_yaml::from_str(&base).context("failed to parse schema document")?;
        let overlay_value: Value =
            serde_yaml::from_str(&overlay).context("failed to parse schema override document")?;

        deep_merge(&mut base_value, overlay_value);

        let document: SchemaDocument = serde_json::from_value(base_value)
            .context("merged schema document has an invalid shape")?;
        Self::from_document(document)
    }

    /// The default schema shipped with the crate.
    pub fn default_schema() -> Self {
        Self::from_yaml_str(include_str!("../../config/entities.yaml"))
            .expect("bundled schema document must be valid")
    }

    /// Validate the document and build the registry: compile every pattern,
    /// reject system-field declarations, and check that unique groups and
    /// relations only reference declared fields.
    fn from_document(document: SchemaDocument) -> Result<Self> {
        let mut entities = document.entities;

        for (entity_name, definition) in entities.iter_mut() {
            for system in SYSTEM_FIELDS {
                if definition.fields.contains_key(system) {
                    return Err(anyhow!(
                        "entity '{entity_name}' declares system-managed field '{system}'"
                    ));
                }
            }

            for (field_name, constraint) in definition.fields.iter_mut() {
                constraint.compile_pattern().map_err(|e| {
                    anyhow!("invalid pattern on '{entity_name}.{field_name}': {e}")
                })?;
            }

            for group in &definition.unique {
                if group.is_empty() {
                    return Err(anyhow!("entity '{entity_name}' has an empty unique group"));
                }
                for field in group {
                    if !definition.fields.contains_key(field) {
                        return Err(anyhow!(
                            "unique group on '{entity_name}' references unknown field '{field}'"
                        ));
                    }
                }
            }

            for (relation_name, relation) in &definition.relations {
                if !definition.fields.contains_key(&relation.field) {
                    return Err(anyhow!(
                        "relation '{relation_name}' on '{entity_name}' references unknown field '{}'",
                        relation.field
                    ));
                }
            }
        }

        // Relation targets must themselves be registered entities.
        let names: Vec<String> = entities.keys().cloned().collect();
        for (entity_name, definition) in &entities {
            for (relation_name, relation) in &definition.relations {
                if !names.contains(&relation.entity) {
                    return Err(anyhow!(
                        "relation '{relation_name}' on '{entity_name}' targets unknown entity '{}'",
                        relation.entity
                    ));
                }
            }
        }

        Ok(Self { entities })
    }

    /// Look up an entity definition by name.
    pub fn definition(&self, entity: &str) -> Option<&EntityDefinition> {
        self.entities.get(entity)
    }

    /// All registered entity names, in document order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    /// Ordered field catalog of an entity.
    pub fn fields(&self, entity: &str) -> Option<&IndexMap<String, FieldConstraint>> {
        self.entities.get(entity).map(|d| &d.fields)
    }

    /// Unique field-groups of an entity.
    pub fn unique_groups(&self, entity: &str) -> Option<&[Vec<String>]> {
        self.entities.get(entity).map(|d| d.unique.as_slice())
    }

    /// Foreign-key relations of an entity.
    pub fn relations(&self, entity: &str) -> Option<&IndexMap<String, Relation>> {
        self.entities.get(entity).map(|d| &d.relations)
    }
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key-by-key; any other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}
