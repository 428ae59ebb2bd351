//! HTTP server: route table, handler state and the fluent builder

pub mod builder;
pub mod routes;

pub use builder::{ServerBuilder, init_tracing};
pub use routes::{AppState, build_routes};
