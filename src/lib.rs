pub mod auth;
pub mod config;
pub mod core;
pub mod follow;
pub mod forms;
pub mod models;
pub mod posts;
pub mod router;
#[cfg(not(target_arch = "wasm32"))]
pub mod server;
pub mod session;
pub mod static_server;
pub mod telemetry;
pub mod templates;
pub mod users;

use crate::config::Config;
use crate::core::store::KvStore;

/// Everything a request handler needs besides the request itself.
pub struct AppState<S> {
    pub store: S,
    pub config: Config,
}

impl<S: KvStore> AppState<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
fn handle(req: spin_sdk::http::Request) -> anyhow::Result<impl spin_sdk::http::IntoResponse> {
    telemetry::init();

    let store = crate::core::store::SpinStore::open_default()?;
    let state = AppState::new(store, Config::from_env());
    if state.config.seed_demo_data {
        if let Err(e) = crate::core::db::seed_demo_data(&state.store) {
            tracing::warn!(error = %e, "demo data seeding failed");
        }
    }

    Ok(router::handle(&state, &req))
}
