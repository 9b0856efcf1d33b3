//! District yield models and the mean-yield predictor.
//!
//! Each district has a pretrained linear regressor stored as a JSON artifact
//! (`intercept` plus one coefficient per feature column). Artifacts are loaded
//! once at startup into an immutable `ModelRegistry` that request handlers
//! share without locking.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::AppError;
use crate::services::features::{MonthlyFeatures, FEATURE_COLUMNS};

/// The districts a yield model exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum District {
    NaushahroFerozeSindh,
    RahimYarKhanPunjab,
}

impl District {
    pub const ALL: [District; 2] = [District::NaushahroFerozeSindh, District::RahimYarKhanPunjab];

    pub fn name(&self) -> &'static str {
        match self {
            District::NaushahroFerozeSindh => "Naushahro Feroze, Sindh",
            District::RahimYarKhanPunjab => "Rahim Yar Khan, Punjab",
        }
    }

    /// Artifact file name inside the model directory.
    pub fn artifact_file(&self) -> &'static str {
        match self {
            District::NaushahroFerozeSindh => "linear_regression_sindh.json",
            District::RahimYarKhanPunjab => "linear_regression_punjab.json",
        }
    }
}

impl FromStr for District {
    type Err = AppError;

    /// Exact match against the district names; anything else is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        District::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| AppError::UnknownDistrict(s.to_string()))
    }
}

/// A regressor mapping one complete feature vector to a yield in tonnes/hectare.
pub trait YieldModel: Send + Sync {
    fn predict(&self, features: &[f64; 10]) -> f64;
}

#[derive(Debug, Deserialize)]
struct LinearModelArtifact {
    columns: Vec<String>,
    intercept: f64,
    coefficients: Vec<f64>,
}

/// Ordinary least-squares linear model.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearYieldModel {
    intercept: f64,
    coefficients: [f64; 10],
}

impl LinearYieldModel {
    pub fn new(intercept: f64, coefficients: [f64; 10]) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }

    /// Parse and validate a JSON artifact. The column list must equal the
    /// feature schema exactly, in order.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let artifact: LinearModelArtifact = serde_json::from_str(raw)
            .map_err(|e| AppError::ModelArtifact(format!("invalid model JSON: {}", e)))?;

        if artifact.columns != FEATURE_COLUMNS {
            return Err(AppError::ModelArtifact(format!(
                "model columns {:?} do not match feature schema {:?}",
                artifact.columns, FEATURE_COLUMNS
            )));
        }
        let coefficients: [f64; 10] = artifact.coefficients.as_slice().try_into().map_err(|_| {
            AppError::ModelArtifact(format!(
                "expected 10 coefficients, got {}",
                artifact.coefficients.len()
            ))
        })?;
        if !artifact.intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(AppError::ModelArtifact(
                "model parameters must be finite".to_string(),
            ));
        }
        Ok(Self::new(artifact.intercept, coefficients))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ModelArtifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            AppError::ModelArtifact(msg) => {
                AppError::ModelArtifact(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }
}

impl YieldModel for LinearYieldModel {
    fn predict(&self, features: &[f64; 10]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.iter())
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

/// Read-only set of district models.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<District, Arc<dyn YieldModel>>,
}

impl ModelRegistry {
    /// Load every district's artifact from `dir`. Fails if any is missing or invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self, AppError> {
        let mut registry = Self::default();
        for district in District::ALL {
            let model = LinearYieldModel::load(&dir.join(district.artifact_file()))?;
            tracing::info!(district = district.name(), "Loaded yield model");
            registry = registry.with_model(district, Arc::new(model));
        }
        Ok(registry)
    }

    pub fn with_model(mut self, district: District, model: Arc<dyn YieldModel>) -> Self {
        self.models.insert(district, model);
        self
    }

    pub fn get(&self, district: District) -> Result<Arc<dyn YieldModel>, AppError> {
        self.models.get(&district).cloned().ok_or_else(|| {
            AppError::ModelArtifact(format!("no model loaded for {}", district.name()))
        })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Mean yield over the usable months of a prediction table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldEstimate {
    pub tonnes_per_hectare: f64,
    pub months_used: usize,
}

/// Predict each complete month and average the predictions.
///
/// A month with any missing feature is dropped entirely. If no month
/// survives, the error names every dropped month and its missing columns.
pub fn predict_mean_yield(
    model: &dyn YieldModel,
    table: &[MonthlyFeatures],
) -> Result<YieldEstimate, AppError> {
    let mut predictions = Vec::with_capacity(table.len());
    let mut dropped = Vec::new();

    for row in table {
        match row.features.complete() {
            Some(values) => predictions.push(model.predict(&values)),
            None => {
                let missing = row.features.missing_columns().join(", ");
                tracing::debug!(month = %row.month, %missing, "Dropping incomplete month");
                dropped.push(format!("{} (missing {})", row.month, missing));
            }
        }
    }

    if predictions.is_empty() {
        let detail = if dropped.is_empty() {
            "no months in range".to_string()
        } else {
            dropped.join("; ")
        };
        return Err(AppError::NoValidData(detail));
    }

    Ok(YieldEstimate {
        tonnes_per_hectare: predictions.iter().sum::<f64>() / predictions.len() as f64,
        months_used: predictions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::features::FeatureVector;
    use crate::services::month::DateMonth;

    fn artifact_json(columns: &[&str], coefficients: &[f64]) -> String {
        serde_json::json!({
            "columns": columns,
            "intercept": 1.0,
            "coefficients": coefficients,
        })
        .to_string()
    }

    fn row(month: u32, values: [Option<f64>; 10]) -> MonthlyFeatures {
        MonthlyFeatures {
            month: DateMonth::new(2024, month).unwrap(),
            features: FeatureVector(values),
        }
    }

    /// Predicts the first feature value.
    struct FirstFeature;

    impl YieldModel for FirstFeature {
        fn predict(&self, features: &[f64; 10]) -> f64 {
            features[0]
        }
    }

    #[test]
    fn test_district_exact_match() {
        assert_eq!(
            "Naushahro Feroze, Sindh".parse::<District>().unwrap(),
            District::NaushahroFerozeSindh
        );
        assert_eq!(
            "Rahim Yar Khan, Punjab".parse::<District>().unwrap(),
            District::RahimYarKhanPunjab
        );
    }

    #[test]
    fn test_unknown_district_is_error() {
        for input in ["Lahore, Punjab", "rahim yar khan, punjab", "Naushahro Feroze", ""] {
            assert!(matches!(
                input.parse::<District>(),
                Err(AppError::UnknownDistrict(_))
            ));
        }
    }

    #[test]
    fn test_linear_prediction() {
        let mut coefficients = [0.0; 10];
        coefficients[0] = 0.1;
        coefficients[5] = 2.0;
        let model = LinearYieldModel::new(1.5, coefficients);
        let mut x = [0.0; 10];
        x[0] = 20.0;
        x[5] = 0.5;
        assert!((model.predict(&x) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_artifact_parses() {
        let raw = artifact_json(&FEATURE_COLUMNS, &[0.5; 10]);
        let model = LinearYieldModel::from_json(&raw).unwrap();
        assert!((model.predict(&[1.0; 10]) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_artifact_column_order_must_match() {
        let mut columns = FEATURE_COLUMNS;
        columns.swap(0, 1);
        let err = LinearYieldModel::from_json(&artifact_json(&columns, &[0.5; 10])).unwrap_err();
        assert!(matches!(err, AppError::ModelArtifact(_)));
    }

    #[test]
    fn test_artifact_coefficient_count_must_match() {
        let err =
            LinearYieldModel::from_json(&artifact_json(&FEATURE_COLUMNS, &[0.5; 9])).unwrap_err();
        assert!(err.to_string().contains("expected 10 coefficients"));
    }

    #[test]
    fn test_registry_loads_both_districts() {
        let dir = tempfile::tempdir().unwrap();
        for district in District::ALL {
            std::fs::write(
                dir.path().join(district.artifact_file()),
                artifact_json(&FEATURE_COLUMNS, &[0.1; 10]),
            )
            .unwrap();
        }
        let registry = ModelRegistry::load_from_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(District::RahimYarKhanPunjab).is_ok());
    }

    #[test]
    fn test_registry_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(District::NaushahroFerozeSindh.artifact_file()),
            artifact_json(&FEATURE_COLUMNS, &[0.1; 10]),
        )
        .unwrap();
        let err = match ModelRegistry::load_from_dir(dir.path()) {
            Err(e) => e,
            Ok(_) => panic!("expected missing punjab artifact to fail"),
        };
        assert!(err.to_string().contains("linear_regression_punjab.json"));
    }

    #[test]
    fn test_incomplete_months_are_dropped() {
        let mut partial = [Some(100.0); 10];
        partial[9] = None;
        let table = vec![
            row(1, [Some(2.0); 10]),
            row(2, partial),
            row(3, [Some(4.0); 10]),
        ];
        let estimate = predict_mean_yield(&FirstFeature, &table).unwrap();
        assert_eq!(estimate.months_used, 2);
        assert_eq!(estimate.tonnes_per_hectare, 3.0);
    }

    #[test]
    fn test_no_valid_months_is_error_not_nan() {
        let mut partial = [Some(1.0); 10];
        partial[5] = None;
        let err = predict_mean_yield(&FirstFeature, &[row(1, partial)]).unwrap_err();
        match err {
            AppError::NoValidData(msg) => {
                assert!(msg.contains("2024-01"));
                assert!(msg.contains("ndvi"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_table_is_error() {
        assert!(matches!(
            predict_mean_yield(&FirstFeature, &[]),
            Err(AppError::NoValidData(_))
        ));
    }
}
