//! API routes module

use axum::Router;

use crate::state::AppState;

/// Creates the API routes without the `/api` prefix, which `create_router` adds.
pub fn routes(state: &AppState) -> Router {
    Router::new().nest("/vision", domain_vision::handlers::router(state.vision.clone()))
}
