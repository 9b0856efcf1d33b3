//! Monthly vegetation indices over a field.
//!
//! Each index is a small band-math expression over Sentinel-2 surface
//! reflectance bands. The imagery platform evaluates the expressions on a
//! cloud-filtered monthly median composite and returns the spatial mean of
//! each over the field. Any failure for a month degrades all five values to
//! missing; nothing is raised to the caller.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::services::geometry::FieldPolygon;
use crate::services::month::DateMonth;

/// Scenes with a cloudy pixel percentage at or above this are excluded.
pub const MAX_CLOUD_PCT: f64 = 20.0;

/// Sampling resolution of the spatial mean, in metres.
pub const REDUCTION_SCALE_M: f64 = 30.0;

/// SAVI soil brightness correction factor.
const SAVI_L: f64 = 0.5;

/// Sentinel-2 spectral bands used by the indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Green,
    Red,
    RedEdge,
    Nir,
    Swir,
}

impl Band {
    /// Sentinel-2 MSI band identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Band::Green => "B3",
            Band::Red => "B4",
            Band::RedEdge => "B5",
            Band::Nir => "B8",
            Band::Swir => "B11",
        }
    }
}

/// Per-pixel band arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub enum BandExpr {
    Band(Band),
    Constant(f64),
    Add(Box<BandExpr>, Box<BandExpr>),
    Subtract(Box<BandExpr>, Box<BandExpr>),
    Multiply(Box<BandExpr>, Box<BandExpr>),
    Divide(Box<BandExpr>, Box<BandExpr>),
    /// `(a - b) / (a + b)`
    NormalizedDifference(Band, Band),
}

/// Reflectance of one pixel; `None` for a masked band.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pixel {
    pub green: Option<f64>,
    pub red: Option<f64>,
    pub red_edge: Option<f64>,
    pub nir: Option<f64>,
    pub swir: Option<f64>,
}

impl Pixel {
    fn band(&self, band: Band) -> Option<f64> {
        match band {
            Band::Green => self.green,
            Band::Red => self.red,
            Band::RedEdge => self.red_edge,
            Band::Nir => self.nir,
            Band::Swir => self.swir,
        }
    }
}

fn divide(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

impl BandExpr {
    fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Evaluate on one pixel. A masked input band or a zero denominator
    /// yields `None`, which the platform excludes from the mean.
    pub fn evaluate(&self, pixel: &Pixel) -> Option<f64> {
        match self {
            BandExpr::Band(b) => pixel.band(*b),
            BandExpr::Constant(v) => Some(*v),
            BandExpr::Add(a, b) => Some(a.evaluate(pixel)? + b.evaluate(pixel)?),
            BandExpr::Subtract(a, b) => Some(a.evaluate(pixel)? - b.evaluate(pixel)?),
            BandExpr::Multiply(a, b) => Some(a.evaluate(pixel)? * b.evaluate(pixel)?),
            BandExpr::Divide(a, b) => divide(a.evaluate(pixel)?, b.evaluate(pixel)?),
            BandExpr::NormalizedDifference(a, b) => {
                let (a, b) = (pixel.band(*a)?, pixel.band(*b)?);
                divide(a - b, a + b)
            }
        }
    }
}

/// The five vegetation indices, in feature order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralIndex {
    Ndvi,
    Gndvi,
    Ndmi,
    Savi,
    Ndre,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 5] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Gndvi,
        SpectralIndex::Ndmi,
        SpectralIndex::Savi,
        SpectralIndex::Ndre,
    ];

    /// Band name of the index in the reduction result.
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Gndvi => "GNDVI",
            SpectralIndex::Ndmi => "NDMI",
            SpectralIndex::Savi => "SAVI",
            SpectralIndex::Ndre => "NDRE",
        }
    }

    pub fn expression(&self) -> BandExpr {
        match self {
            SpectralIndex::Ndvi => BandExpr::NormalizedDifference(Band::Nir, Band::Red),
            SpectralIndex::Gndvi => BandExpr::NormalizedDifference(Band::Nir, Band::Green),
            SpectralIndex::Ndmi => BandExpr::NormalizedDifference(Band::Nir, Band::Swir),
            SpectralIndex::Ndre => BandExpr::NormalizedDifference(Band::Nir, Band::RedEdge),
            // (1 + L) * (NIR - RED) / (NIR + RED + L)
            SpectralIndex::Savi => {
                let nir = || BandExpr::Band(Band::Nir).boxed();
                let red = || BandExpr::Band(Band::Red).boxed();
                let numerator = BandExpr::Subtract(nir(), red());
                let denominator = BandExpr::Add(
                    BandExpr::Add(nir(), red()).boxed(),
                    BandExpr::Constant(SAVI_L).boxed(),
                );
                BandExpr::Multiply(
                    BandExpr::Divide(numerator.boxed(), denominator.boxed()).boxed(),
                    BandExpr::Constant(1.0 + SAVI_L).boxed(),
                )
            }
        }
    }
}

/// One monthly composite reduction to run on the imagery platform.
#[derive(Debug, Clone)]
pub struct CompositeRequest<'a> {
    pub polygon: &'a FieldPolygon,
    pub month: DateMonth,
    pub max_cloud_pct: f64,
    pub scale_m: f64,
    pub indices: &'a [SpectralIndex],
}

/// Imagery platform able to composite, evaluate band math and reduce.
#[async_trait]
pub trait ImageryPlatform: Send + Sync {
    /// Mean of each requested index over the polygon, keyed by index name.
    /// An index with no valid pixels maps to `None` or is absent.
    async fn region_means(
        &self,
        request: &CompositeRequest<'_>,
    ) -> Result<HashMap<String, Option<f64>>, AppError>;
}

/// Five monthly index means, in feature order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthlyIndexStats {
    pub ndvi: Option<f64>,
    pub gndvi: Option<f64>,
    pub ndmi: Option<f64>,
    pub savi: Option<f64>,
    pub ndre: Option<f64>,
}

impl MonthlyIndexStats {
    /// `[ndvi, gndvi, ndmi, savi, ndre]`
    pub fn to_array(&self) -> [Option<f64>; 5] {
        [self.ndvi, self.gndvi, self.ndmi, self.savi, self.ndre]
    }

    fn from_means(means: &HashMap<String, Option<f64>>) -> Self {
        let get = |index: SpectralIndex| {
            means
                .get(index.name())
                .copied()
                .flatten()
                .filter(|v| v.is_finite())
        };
        Self {
            ndvi: get(SpectralIndex::Ndvi),
            gndvi: get(SpectralIndex::Gndvi),
            ndmi: get(SpectralIndex::Ndmi),
            savi: get(SpectralIndex::Savi),
            ndre: get(SpectralIndex::Ndre),
        }
    }
}

/// Compute the five index means for `month` over `polygon`.
///
/// Never fails: a platform error is logged and every index comes back missing.
pub async fn calculate_indices(
    platform: &dyn ImageryPlatform,
    polygon: &FieldPolygon,
    month: DateMonth,
) -> MonthlyIndexStats {
    let request = CompositeRequest {
        polygon,
        month,
        max_cloud_pct: MAX_CLOUD_PCT,
        scale_m: REDUCTION_SCALE_M,
        indices: &SpectralIndex::ALL,
    };

    match platform.region_means(&request).await {
        Ok(means) => {
            let stats = MonthlyIndexStats::from_means(&means);
            tracing::debug!(%month, ?stats, "Indices calculated");
            stats
        }
        Err(e) => {
            tracing::warn!(%month, error = %e, "Indices were not calculated");
            MonthlyIndexStats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(nir: f64, red: f64) -> Pixel {
        Pixel {
            nir: Some(nir),
            red: Some(red),
            ..Pixel::default()
        }
    }

    #[test]
    fn test_normalized_difference_of_equal_bands_is_zero() {
        let ndvi = SpectralIndex::Ndvi.expression();
        for a in [0.01, 0.3, 1.0, 2500.0, -0.2] {
            assert_eq!(ndvi.evaluate(&pixel(a, a)), Some(0.0));
        }
    }

    #[test]
    fn test_ndvi_value() {
        let v = SpectralIndex::Ndvi.expression().evaluate(&pixel(0.5, 0.1)).unwrap();
        assert!((v - 0.4 / 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_savi_value() {
        let v = SpectralIndex::Savi.expression().evaluate(&pixel(0.5, 0.1)).unwrap();
        assert!((v - 1.5 * 0.4 / 1.1).abs() < 1e-12);
        assert!((v - 0.5455).abs() < 1e-4);
    }

    #[test]
    fn test_zero_denominator_is_masked() {
        let ndvi = SpectralIndex::Ndvi.expression();
        assert_eq!(ndvi.evaluate(&pixel(0.0, 0.0)), None);
    }

    #[test]
    fn test_missing_band_is_masked() {
        let ndmi = SpectralIndex::Ndmi.expression();
        // no SWIR reflectance
        assert_eq!(ndmi.evaluate(&pixel(0.5, 0.1)), None);
    }

    #[test]
    fn test_index_bands() {
        assert_eq!(
            SpectralIndex::Gndvi.expression(),
            BandExpr::NormalizedDifference(Band::Nir, Band::Green)
        );
        assert_eq!(
            SpectralIndex::Ndre.expression(),
            BandExpr::NormalizedDifference(Band::Nir, Band::RedEdge)
        );
        assert_eq!(Band::Swir.id(), "B11");
    }

    #[test]
    fn test_feature_order() {
        let names: Vec<&str> = SpectralIndex::ALL.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["NDVI", "GNDVI", "NDMI", "SAVI", "NDRE"]);
    }

    struct FixedPlatform(Result<HashMap<String, Option<f64>>, ()>);

    #[async_trait]
    impl ImageryPlatform for FixedPlatform {
        async fn region_means(
            &self,
            request: &CompositeRequest<'_>,
        ) -> Result<HashMap<String, Option<f64>>, AppError> {
            assert_eq!(request.max_cloud_pct, 20.0);
            assert_eq!(request.scale_m, 30.0);
            assert_eq!(request.indices.len(), 5);
            self.0
                .clone()
                .map_err(|_| AppError::ExternalServiceError("quota exceeded".into()))
        }
    }

    fn polygon() -> FieldPolygon {
        FieldPolygon::new(&[[68.10, 26.90], [68.11, 26.90], [68.11, 26.91]]).unwrap()
    }

    #[tokio::test]
    async fn test_platform_failure_degrades_whole_month() {
        let platform = FixedPlatform(Err(()));
        let month = DateMonth::new(2024, 1).unwrap();
        let stats = calculate_indices(&platform, &polygon(), month).await;
        assert_eq!(stats.to_array(), [None; 5]);
    }

    #[tokio::test]
    async fn test_partial_result_keeps_available_indices() {
        let means = HashMap::from([
            ("NDVI".to_string(), Some(0.42)),
            ("GNDVI".to_string(), Some(0.31)),
            ("NDMI".to_string(), None),
            ("SAVI".to_string(), Some(0.6)),
        ]);
        let platform = FixedPlatform(Ok(means));
        let month = DateMonth::new(2024, 1).unwrap();
        let stats = calculate_indices(&platform, &polygon(), month).await;
        assert_eq!(
            stats.to_array(),
            [Some(0.42), Some(0.31), None, Some(0.6), None]
        );
    }
}
