use axum_helpers::server::{ShutdownCoordinator, create_production_app, health_router};
use core_config::tracing::{init_tracing, install_color_eyre};
use tracing::info;

mod api;
mod config;
mod openapi;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;

    init_tracing(&config.environment);

    info!(
        provider = %config.provider,
        session_ttl_secs = config.sessions.ttl.as_secs(),
        max_sessions = config.sessions.max_entries,
        "Starting vision API"
    );

    let state = AppState::new(config);

    // The sweeper holds the receiver created with the coordinator, so it
    // cannot miss the broadcast.
    let (coordinator, shutdown_rx) = ShutdownCoordinator::new();
    let sweeper = state.sessions.spawn_sweeper(shutdown_rx);

    let api_routes = api::routes(&state);
    let router = axum_helpers::create_router::<openapi::ApiDoc>(api_routes)?;
    let app = router.merge(health_router(state.config.app));

    create_production_app(app, &state.config.server, coordinator, async move {
        match sweeper.await {
            Ok(()) => info!("Session sweeper joined"),
            Err(e) => tracing::error!("Session sweeper failed: {}", e),
        }
    })
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Vision API shutdown complete");
    Ok(())
}
