//! ServerBuilder for fluent API to build HTTP servers

use crate::config::AppConfig;
use crate::core::schema::SchemaRegistry;
use crate::core::service::EntityService;
use crate::server::routes::{AppState, build_routes};
use crate::storage::{self, EntityStore};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builder wiring configuration, schema registry and store into a
/// ready-to-serve router.
///
/// # Example
///
/// ```ignore
/// let config = AppConfig::from_yaml_file("corral.yaml")?.apply_env()?;
/// ServerBuilder::from_config(config).serve().await?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    registry: Option<Arc<SchemaRegistry>>,
    store: Option<Arc<dyn EntityStore>>,
}

impl ServerBuilder {
    /// Create a builder with default configuration (in-memory backend,
    /// bundled schema).
    pub fn new() -> Self {
        Self::from_config(AppConfig::default())
    }

    /// Create a builder from loaded configuration.
    pub fn from_config(config: AppConfig) -> Self {
        Self {
            config,
            registry: None,
            store: None,
        }
    }

    /// Use an explicit schema registry instead of loading one from the
    /// configured schema files.
    pub fn with_schema_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Use an explicit store instead of connecting the configured backend.
    pub fn with_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn load_registry(&self) -> Result<Arc<SchemaRegistry>> {
        if let Some(registry) = &self.registry {
            return Ok(Arc::clone(registry));
        }
        let registry = match self.config.schema_path.as_deref() {
            Some(path) => SchemaRegistry::from_yaml_file(
                path,
                self.config.schema_override_path.as_deref(),
            )?,
            None => SchemaRegistry::default_schema(),
        };
        Ok(Arc::new(registry))
    }

    /// Build the router: load the schema, connect the backend, wire the
    /// service and the route table with trace and CORS layers.
    pub async fn build(self) -> Result<Router> {
        let registry = self.load_registry()?;
        tracing::info!(
            entities = registry.entity_names().len(),
            backend = ?self.config.backend,
            "schema registry loaded"
        );

        let store = match self.store {
            Some(store) => store,
            None => storage::connect(&self.config, &registry).await?,
        };

        let service = Arc::new(EntityService::new(
            registry,
            store,
            self.config.unique_check,
            self.config.get_validation,
        ));

        let router = build_routes(AppState { service })
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());
        Ok(router)
    }

    /// Serve the application with graceful shutdown.
    ///
    /// Binds to the configured listen address and handles SIGTERM and
    /// Ctrl+C.
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.listen_addr.clone();
        let app = self.build().await?;
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the default tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
