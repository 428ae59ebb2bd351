//! Minimal server demo: bundled schema, in-memory backend.
//!
//! ```sh
//! cargo run --example server
//! curl -s -X POST localhost:3000/account -d '{"name": "acme"}' \
//!   -H 'content-type: application/json'
//! curl -s 'localhost:3000/account?sort=-name&pageSize=10'
//! ```
//!
//! Point it at a real backend with environment overrides:
//!
//! ```sh
//! CORRAL_BACKEND=mongodb CORRAL_URI=mongodb://localhost:27017 \
//!   cargo run --example server --features mongodb_backend
//! ```

use corral::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::default().apply_env()?;
    ServerBuilder::from_config(config).serve().await
}
