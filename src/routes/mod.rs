use axum::routing::{get, post};
use axum::Router;

pub mod districts;
pub mod health;
pub mod predict;

use predict::AppState;

/// API routes without documentation or middleware layers.
pub fn api_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/api/v1/health", get(health::health_check))
        .with_state(state.models.clone());

    let prediction_routes = Router::new()
        .route("/api/v1/districts", get(districts::list_districts))
        .route("/api/v1/predictions", post(predict::predict_yield))
        .with_state(state);

    Router::new().merge(health_routes).merge(prediction_routes)
}
