//! Monthly feature assembly.
//!
//! For every month in an inclusive range, weather statistics and vegetation
//! indices are computed and concatenated into one fixed-order feature vector.
//! Months are independent; they are fanned out with bounded concurrency and
//! collected back in chronological order. Within a month the weather and
//! imagery lookups run concurrently.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::errors::AppError;
use crate::services::geometry::{mean_coordinate, FieldPolygon, LatLon};
use crate::services::indices::{calculate_indices, ImageryPlatform, MonthlyIndexStats};
use crate::services::month::DateMonth;
use crate::services::weather::{aggregate_month, MissingFieldPolicy, MonthlyWeatherStats};
use crate::services::weather_api::WeatherSource;

/// Column names of the feature vector, in model order.
pub const FEATURE_COLUMNS: [&str; 10] = [
    "temp",
    "humid",
    "precip",
    "wind_speed",
    "sunshine",
    "ndvi",
    "gndvi",
    "ndmi",
    "savi",
    "ndre",
];

/// `weather ++ indices`, positionally ordered as `FEATURE_COLUMNS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [Option<f64>; 10]);

impl FeatureVector {
    pub fn new(weather: &MonthlyWeatherStats, indices: &MonthlyIndexStats) -> Self {
        let mut values = [None; 10];
        values[..5].copy_from_slice(&weather.to_array());
        values[5..].copy_from_slice(&indices.to_array());
        Self(values)
    }

    /// All ten values, or `None` if any is missing.
    pub fn complete(&self) -> Option<[f64; 10]> {
        let mut out = [0.0; 10];
        for (slot, value) in out.iter_mut().zip(self.0.iter()) {
            *slot = (*value)?;
        }
        Some(out)
    }

    pub fn missing_columns(&self) -> Vec<&'static str> {
        FEATURE_COLUMNS
            .iter()
            .zip(self.0.iter())
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect()
    }
}

/// One row of the prediction table.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyFeatures {
    pub month: DateMonth,
    pub features: FeatureVector,
}

/// Tuning for the monthly fan-out.
#[derive(Debug, Clone, Copy)]
pub struct AssemblySettings {
    pub max_concurrent_months: usize,
    pub max_concurrent_days: usize,
    pub missing_field_policy: MissingFieldPolicy,
}

/// Drives the monthly loop against injected weather and imagery services.
#[derive(Clone)]
pub struct FeatureAssembler {
    weather: Arc<dyn WeatherSource>,
    imagery: Arc<dyn ImageryPlatform>,
    settings: AssemblySettings,
}

impl FeatureAssembler {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        imagery: Arc<dyn ImageryPlatform>,
        settings: AssemblySettings,
    ) -> Self {
        Self {
            weather,
            imagery,
            settings,
        }
    }

    /// Build the prediction table for `start..=end`, one row per month in
    /// chronological order.
    pub async fn assemble(
        &self,
        polygon: &FieldPolygon,
        start: DateMonth,
        end: DateMonth,
    ) -> Result<Vec<MonthlyFeatures>, AppError> {
        if end < start {
            return Err(AppError::BadRequest(format!(
                "end month {} is before start month {}",
                end, start
            )));
        }
        let location = mean_coordinate(polygon.points())?;
        tracing::info!(
            %start,
            %end,
            lat = location.lat,
            lon = location.lon,
            "Assembling monthly features"
        );

        let table: Vec<MonthlyFeatures> = stream::iter(start.through(end))
            .map(|month| self.month_features(polygon, location, month))
            .buffered(self.settings.max_concurrent_months.max(1))
            .collect()
            .await;
        Ok(table)
    }

    async fn month_features(
        &self,
        polygon: &FieldPolygon,
        location: LatLon,
        month: DateMonth,
    ) -> MonthlyFeatures {
        tracing::info!(%month, "Fetching weather data and calculating indices");
        let (weather, indices) = tokio::join!(
            aggregate_month(
                self.weather.as_ref(),
                &location,
                month,
                self.settings.missing_field_policy,
                self.settings.max_concurrent_days,
            ),
            calculate_indices(self.imagery.as_ref(), polygon, month),
        );
        MonthlyFeatures {
            month,
            features: FeatureVector::new(&weather, &indices),
        }
    }
}
