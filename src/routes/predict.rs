//! Yield prediction endpoint.
//!
//! - POST /api/v1/predictions

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, ErrorResponse};
use crate::helpers::{round_4dp, sq_m_to_acres, sq_m_to_hectares};
use crate::services::features::{FeatureAssembler, FeatureVector, MonthlyFeatures};
use crate::services::geometry::{compute_area, FieldPolygon};
use crate::services::model::{predict_mean_yield, District, ModelRegistry};
use crate::services::month::DateMonth;

/// First year with Sentinel-2 coverage.
const MIN_YEAR: i32 = 2015;

/// Latest accepted year.
const MAX_YEAR: i32 = 2100;

/// Per-request limits.
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_range_months: u32,
    pub deadline: Duration,
}

/// Shared application state for the prediction endpoint.
#[derive(Clone)]
pub struct AppState {
    pub assembler: FeatureAssembler,
    pub models: Arc<ModelRegistry>,
    pub limits: RequestLimits,
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct PredictionRequest {
    pub start_year: i32,
    /// 1 = January
    pub start_month: u32,
    pub end_year: i32,
    pub end_month: u32,
    /// One of the names listed by `GET /api/v1/districts`
    pub district: String,
    /// Field boundary as `[longitude, latitude]` pairs in decimal degrees
    pub coordinates: Vec<[f64; 2]>,
}

/// Monthly feature values; `null` where a value could not be computed.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeatureValues {
    /// Mean daily average temperature (°C)
    pub temp: Option<f64>,
    /// Mean daily average humidity (%)
    pub humid: Option<f64>,
    /// Total precipitation (mm)
    pub precip: Option<f64>,
    /// Mean daily maximum wind speed (km/h)
    pub wind_speed: Option<f64>,
    /// Mean daylight duration (hours)
    pub sunshine: Option<f64>,
    pub ndvi: Option<f64>,
    pub gndvi: Option<f64>,
    pub ndmi: Option<f64>,
    pub savi: Option<f64>,
    pub ndre: Option<f64>,
}

impl From<&FeatureVector> for FeatureValues {
    fn from(fv: &FeatureVector) -> Self {
        let [temp, humid, precip, wind_speed, sunshine, ndvi, gndvi, ndmi, savi, ndre] = fv.0;
        Self {
            temp,
            humid,
            precip,
            wind_speed,
            sunshine,
            ndvi,
            gndvi,
            ndmi,
            savi,
            ndre,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MonthFeaturesResponse {
    pub year: i32,
    pub month: u32,
    /// Whether the month had every feature and was used for the prediction
    pub complete: bool,
    pub features: FeatureValues,
}

impl From<&MonthlyFeatures> for MonthFeaturesResponse {
    fn from(row: &MonthlyFeatures) -> Self {
        Self {
            year: row.month.year,
            month: row.month.month,
            complete: row.features.complete().is_some(),
            features: FeatureValues::from(&row.features),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PredictionResponse {
    pub prediction_id: Uuid,
    pub district: String,
    /// Mean of the monthly predictions, 4 decimal places
    pub predicted_yield_in_tonnes_per_hectare: f64,
    pub area_in_sq_m: f64,
    pub area_in_hectares: f64,
    pub area_in_acres: f64,
    pub months_requested: usize,
    pub months_used: usize,
    pub months: Vec<MonthFeaturesResponse>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A request that passed every structural check.
#[derive(Debug)]
struct ValidatedRequest {
    start: DateMonth,
    end: DateMonth,
    district: District,
    polygon: FieldPolygon,
}

fn checked_month(year: i32, month: u32, which: &str) -> Result<DateMonth, AppError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(AppError::BadRequest(format!(
            "{} year must be between {} and {}, got {}",
            which, MIN_YEAR, MAX_YEAR, year
        )));
    }
    DateMonth::new(year, month).map_err(|e| match e {
        AppError::BadRequest(msg) => AppError::BadRequest(format!("{}: {}", which, msg)),
        other => other,
    })
}

impl PredictionRequest {
    fn validate(&self, max_range_months: u32) -> Result<ValidatedRequest, AppError> {
        let district: District = self.district.parse()?;
        let start = checked_month(self.start_year, self.start_month, "start")?;
        let end = checked_month(self.end_year, self.end_month, "end")?;
        if end < start {
            return Err(AppError::BadRequest(format!(
                "end month {} is before start month {}",
                end, start
            )));
        }
        let span = start.months_through(&end);
        if span > max_range_months {
            return Err(AppError::BadRequest(format!(
                "date range covers {} months, at most {} allowed",
                span, max_range_months
            )));
        }
        let polygon = FieldPolygon::new(&self.coordinates)?;
        Ok(ValidatedRequest {
            start,
            end,
            district,
            polygon,
        })
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Predict the mean yield of a field over a range of months.
///
/// Input is validated before any external call. Months whose weather or
/// imagery could not be fully computed are reported but left out of the mean.
#[utoipa::path(
    post,
    path = "/api/v1/predictions",
    tag = "Predictions",
    request_body = PredictionRequest,
    responses(
        (status = 200, description = "Predicted yield for the field", body = PredictionResponse),
        (status = 400, description = "Invalid date range or unknown district", body = ErrorResponse),
        (status = 422, description = "Degenerate field geometry, or no month had complete data", body = ErrorResponse),
        (status = 504, description = "Request deadline exceeded", body = ErrorResponse),
    )
)]
pub async fn predict_yield(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionResponse>, AppError> {
    let ValidatedRequest {
        start,
        end,
        district,
        polygon,
    } = request.validate(state.limits.max_range_months)?;
    let model = state.models.get(district)?;

    let prediction_id = Uuid::new_v4();
    let span = tracing::info_span!("prediction", %prediction_id, district = district.name());

    async move {
        let area_sq_m = compute_area(&polygon);
        tracing::info!(%start, %end, area_sq_m, "Prediction requested");

        let deadline = state.limits.deadline;
        let table = tokio::time::timeout(deadline, state.assembler.assemble(&polygon, start, end))
            .await
            .map_err(|_| AppError::DeadlineExceeded(deadline.as_secs()))??;

        let estimate = predict_mean_yield(model.as_ref(), &table)?;
        tracing::info!(
            yield_t_ha = estimate.tonnes_per_hectare,
            months_used = estimate.months_used,
            months_requested = table.len(),
            "Prediction complete"
        );

        Ok::<_, AppError>(Json(PredictionResponse {
            prediction_id,
            district: district.name().to_string(),
            predicted_yield_in_tonnes_per_hectare: round_4dp(estimate.tonnes_per_hectare),
            area_in_sq_m: area_sq_m,
            area_in_hectares: round_4dp(sq_m_to_hectares(area_sq_m)),
            area_in_acres: round_4dp(sq_m_to_acres(area_sq_m)),
            months_requested: table.len(),
            months_used: estimate.months_used,
            months: table.iter().map(MonthFeaturesResponse::from).collect(),
        }))
    }
    .instrument(span)
    .await
}
