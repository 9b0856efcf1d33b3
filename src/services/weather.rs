//! Monthly weather aggregation.
//!
//! Issues one history lookup per calendar day and reduces the successful days
//! to five monthly statistics. A failed day contributes nothing; the month is
//! never aborted because of it.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};

use crate::errors::AppError;
use crate::services::geometry::LatLon;
use crate::services::month::DateMonth;
use crate::services::weather_api::{DailyWeather, WeatherSource};

/// What an absent daily temperature, humidity or wind value means on a day
/// whose lookup otherwise succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingFieldPolicy {
    /// Count the day with a value of 0.
    Zero,
    /// Leave the day out of that statistic's average.
    Skip,
}

/// Five monthly weather statistics, in feature order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthlyWeatherStats {
    pub avg_temp_c: Option<f64>,
    pub avg_humidity_pct: Option<f64>,
    /// Sum over successful days; 0 when none succeeded.
    pub total_precip_mm: f64,
    pub avg_max_wind_kph: Option<f64>,
    pub avg_sunshine_hours: Option<f64>,
}

impl MonthlyWeatherStats {
    /// `[temp, humid, precip, wind_speed, sunshine]`
    pub fn to_array(&self) -> [Option<f64>; 5] {
        [
            self.avg_temp_c,
            self.avg_humidity_pct,
            Some(self.total_precip_mm),
            self.avg_max_wind_kph,
            self.avg_sunshine_hours,
        ]
    }
}

#[derive(Debug, Default)]
struct MonthAccumulator {
    temps: Vec<f64>,
    humidities: Vec<f64>,
    winds: Vec<f64>,
    sunshine: Vec<f64>,
    precip_total: f64,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl MonthAccumulator {
    fn add(&mut self, day: &DailyWeather, policy: MissingFieldPolicy) {
        let push = |list: &mut Vec<f64>, value: Option<f64>| match (value, policy) {
            (Some(v), _) => list.push(v),
            (None, MissingFieldPolicy::Zero) => list.push(0.0),
            (None, MissingFieldPolicy::Skip) => {}
        };
        push(&mut self.temps, day.avg_temp_c);
        push(&mut self.humidities, day.avg_humidity_pct);
        push(&mut self.winds, day.max_wind_kph);
        self.sunshine.push(day.sunshine_hours);
        self.precip_total += day.total_precip_mm.unwrap_or(0.0);
    }

    fn finish(&self) -> MonthlyWeatherStats {
        MonthlyWeatherStats {
            avg_temp_c: mean(&self.temps),
            avg_humidity_pct: mean(&self.humidities),
            total_precip_mm: self.precip_total,
            avg_max_wind_kph: mean(&self.winds),
            avg_sunshine_hours: mean(&self.sunshine),
        }
    }
}

/// Aggregate daily history lookups for every day of `month` at `location`.
///
/// Up to `max_concurrent_days` lookups are in flight at once. Days are folded
/// in calendar order whatever order they complete in.
pub async fn aggregate_month(
    source: &dyn WeatherSource,
    location: &LatLon,
    month: DateMonth,
    policy: MissingFieldPolicy,
    max_concurrent_days: usize,
) -> MonthlyWeatherStats {
    let results: Vec<(NaiveDate, Result<DailyWeather, AppError>)> = stream::iter(month.days())
        .map(|date| async move { (date, source.fetch_day(location, date).await) })
        .buffered(max_concurrent_days.max(1))
        .collect()
        .await;

    let mut acc = MonthAccumulator::default();
    let mut failed_days = 0usize;
    for (date, result) in results {
        match result {
            Ok(day) => acc.add(&day, policy),
            Err(e) => {
                failed_days += 1;
                tracing::warn!(%month, %date, error = %e, "Weather lookup failed, skipping day");
            }
        }
    }

    let stats = acc.finish();
    tracing::debug!(
        %month,
        days = month.day_count(),
        failed_days,
        "Weather aggregated"
    );
    stats
}
