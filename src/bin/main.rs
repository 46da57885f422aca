#[cfg(not(target_arch = "wasm32"))]
mod native {
    use murmur::config::Config;
    use murmur::core::db::seed_demo_data;
    use murmur::core::store::MemoryStore;
    use murmur::AppState;
    use tracing::{info, warn};

    pub async fn run() -> std::io::Result<()> {
        murmur::telemetry::init();

        let config = Config::from_env();
        let state = AppState::new(MemoryStore::new(), config.clone());
        if config.seed_demo_data {
            if let Err(e) = seed_demo_data(&state.store) {
                warn!(error = %e, "demo data seeding failed");
            }
        }

        let (server, addrs) = murmur::server::listen(state, &config.bind_address)?;
        for addr in addrs {
            info!("Server listening on http://{}", addr);
        }
        server.await
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
