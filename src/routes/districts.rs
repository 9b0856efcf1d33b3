use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::model::District;

/// Districts a yield model exists for.
#[derive(Debug, Serialize, ToSchema)]
pub struct DistrictListResponse {
    /// Exact names accepted by the prediction endpoint
    pub districts: Vec<String>,
}

/// List supported districts.
#[utoipa::path(
    get,
    path = "/api/v1/districts",
    tag = "Predictions",
    responses(
        (status = 200, description = "Supported district names", body = DistrictListResponse),
    )
)]
pub async fn list_districts() -> Json<DistrictListResponse> {
    Json(DistrictListResponse {
        districts: District::ALL.iter().map(|d| d.name().to_string()).collect(),
    })
}
