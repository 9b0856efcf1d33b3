//! Shared helpers for presenting numbers in API responses.
//!
//! Yields and derived areas are reported at 4 decimal places. Rounding goes
//! through `Decimal` so that values like 1.00005 round half away from zero
//! instead of picking up binary float artefacts.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Square metres per hectare.
pub(crate) const SQ_M_PER_HECTARE: f64 = 10_000.0;

/// Square metres per acre, as used by the field reports.
pub(crate) const SQ_M_PER_ACRE: f64 = 4047.0;

/// Round an f64 to 4 decimal places.
///
/// Non-finite input is returned unchanged; callers never produce it, but a
/// NaN must not silently become 0.
pub(crate) fn round_4dp(v: f64) -> f64 {
    if !v.is_finite() {
        tracing::warn!("round_4dp received non-finite value {}", v);
        return v;
    }
    Decimal::from_f64(v)
        .map(|d| d.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(v)
}

pub(crate) fn sq_m_to_hectares(area_sq_m: f64) -> f64 {
    round_4dp(area_sq_m / SQ_M_PER_HECTARE)
}

pub(crate) fn sq_m_to_acres(area_sq_m: f64) -> f64 {
    round_4dp(area_sq_m / SQ_M_PER_ACRE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_4dp() {
        assert_eq!(round_4dp(3.14159265), 3.1416);
        assert_eq!(round_4dp(-2.71828), -2.7183);
        assert_eq!(round_4dp(5.0), 5.0);
    }

    #[test]
    fn test_round_4dp_passes_nan_through() {
        assert!(round_4dp(f64::NAN).is_nan());
    }

    #[test]
    fn test_area_conversions() {
        assert_eq!(sq_m_to_hectares(12_345.0), 1.2345);
        assert_eq!(sq_m_to_acres(4047.0), 1.0);
        assert_eq!(sq_m_to_acres(0.0), 0.0);
    }
}
