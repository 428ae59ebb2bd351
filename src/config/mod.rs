//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory store for development and tests.
    #[default]
    Memory,
    /// Document store (MongoDB).
    Mongodb,
    /// Search-index store (Elasticsearch).
    Elasticsearch,
}

/// When to force FK-existence checks on reads without an explicit view
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GetValidationMode {
    /// Never, unless a view parameter is present.
    #[default]
    Off,
    /// On single-record reads only.
    Get,
    /// On every read, including lists.
    GetAll,
}

/// Process configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AppConfig {
    /// Which storage adapter to use.
    pub backend: BackendKind,

    /// Backend connection URI (not needed for the in-memory backend).
    pub uri: Option<String>,

    /// Database name (document store) or index prefix (search-index store).
    pub namespace: String,

    /// Whether the uniqueness pre-flight check runs before writes.
    pub unique_check: bool,

    /// FK-existence checking on reads without a view parameter.
    pub get_validation: GetValidationMode,

    /// Address the HTTP server binds to.
    pub listen_addr: String,

    /// Path to the entity schema document; the bundled schema is used when
    /// absent.
    pub schema_path: Option<String>,

    /// Optional schema override document, deep-merged over the base schema
    /// at startup.
    pub schema_override_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            uri: None,
            namespace: "corral".to_string(),
            unique_check: true,
            get_validation: GetValidationMode::Off,
            listen_addr: "127.0.0.1:3000".to_string(),
            schema_path: None,
            schema_override_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("failed to parse config")
    }

    /// Apply `CORRAL_*` environment overrides on top of the loaded values.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(backend) = std::env::var("CORRAL_BACKEND") {
            self.backend = serde_yaml::from_str(&backend)
                .with_context(|| format!("invalid CORRAL_BACKEND '{backend}'"))?;
        }
        if let Ok(uri) = std::env::var("CORRAL_URI") {
            self.uri = Some(uri);
        }
        if let Ok(namespace) = std::env::var("CORRAL_NAMESPACE") {
            self.namespace = namespace;
        }
        if let Ok(unique_check) = std::env::var("CORRAL_UNIQUE_CHECK") {
            self.unique_check = unique_check == "true" || unique_check == "1";
        }
        if let Ok(mode) = std::env::var("CORRAL_GET_VALIDATION") {
            self.get_validation = serde_yaml::from_str(&mode)
                .with_context(|| format!("invalid CORRAL_GET_VALIDATION '{mode}'"))?;
        }
        if let Ok(listen_addr) = std::env::var("CORRAL_LISTEN_ADDR") {
            self.listen_addr = listen_addr;
        }
        Ok(self)
    }
}
