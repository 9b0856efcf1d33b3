use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::model::{District, ModelRegistry};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when every district model is loaded, "degraded" otherwise)
    pub status: String,
    /// API version
    pub version: String,
    /// Number of district models held in memory
    pub models_loaded: usize,
}

/// Health check endpoint.
///
/// Does not call the weather or imagery services; it only reports
/// whether the model registry is fully populated.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(models): State<Arc<ModelRegistry>>) -> Json<HealthResponse> {
    let models_loaded = models.len();
    let status = if models_loaded == District::ALL.len() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        models_loaded,
    })
}
