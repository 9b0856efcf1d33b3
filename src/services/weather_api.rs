//! WeatherAPI.com history client.
//!
//! One request per (location, day). See: https://www.weatherapi.com/docs/
//! (`history.json`, parameters `key`, `q`, `dt`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::geometry::LatLon;
use crate::services::retry::{CallError, RetryPolicy};

const SERVICE_NAME: &str = "weather service";

/// Daily values as reported upstream. Absent fields stay `None`; the
/// aggregator decides what an absent field means.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyWeather {
    pub avg_temp_c: Option<f64>,
    pub avg_humidity_pct: Option<f64>,
    pub total_precip_mm: Option<f64>,
    pub max_wind_kph: Option<f64>,
    /// Sunset minus sunrise in hours; 0 when either time is not reported.
    pub sunshine_hours: f64,
}

/// Source of historical daily weather.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_day(&self, location: &LatLon, date: NaiveDate) -> Result<DailyWeather, AppError>;
}

/// Client for the WeatherAPI.com history endpoint.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

// --- WeatherAPI JSON response types ---

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    forecast: Option<HistoryForecast>,
}

#[derive(Debug, Deserialize)]
struct HistoryForecast {
    #[serde(default)]
    forecastday: Vec<HistoryDay>,
}

#[derive(Debug, Deserialize)]
struct HistoryDay {
    #[serde(default)]
    day: DaySummary,
    #[serde(default)]
    astro: Astro,
}

#[derive(Debug, Default, Deserialize)]
struct DaySummary {
    avgtemp_c: Option<f64>,
    maxwind_kph: Option<f64>,
    totalprecip_mm: Option<f64>,
    avghumidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Astro {
    sunrise: Option<String>,
    sunset: Option<String>,
}

impl WeatherApiClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            retry,
        })
    }

    async fn fetch_history(&self, location: &str, date: &str) -> Result<HistoryResponse, CallError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("key", self.api_key.as_str()), ("q", location), ("dt", date)])
            .send()
            .await
            // the URL carries the API key
            .map_err(|e| CallError::from_reqwest(SERVICE_NAME, e.without_url()))?;

        if !response.status().is_success() {
            return Err(CallError::from_status(SERVICE_NAME, response.status()));
        }

        response
            .json::<HistoryResponse>()
            .await
            .map_err(|e| CallError::Fatal(format!("weather JSON parse error: {}", e.without_url())))
    }
}

#[async_trait]
impl WeatherSource for WeatherApiClient {
    async fn fetch_day(&self, location: &LatLon, date: NaiveDate) -> Result<DailyWeather, AppError> {
        let q = location.to_query();
        let dt = date.format("%Y-%m-%d").to_string();
        let body = self
            .retry
            .run("weather history", || self.fetch_history(&q, &dt))
            .await?;
        extract_daily(body)
    }
}

/// Pull the first forecast day out of a history response.
fn extract_daily(body: HistoryResponse) -> Result<DailyWeather, AppError> {
    let first = body
        .forecast
        .and_then(|f| f.forecastday.into_iter().next())
        .ok_or_else(|| {
            AppError::ExternalServiceError("weather response has no forecast day".to_string())
        })?;

    let sunrise = first.astro.sunrise.filter(|s| !s.trim().is_empty());
    let sunset = first.astro.sunset.filter(|s| !s.trim().is_empty());
    let sunshine_hours = match (sunrise, sunset) {
        (Some(rise), Some(set)) => sunshine_hours(&rise, &set)?,
        _ => 0.0,
    };

    Ok(DailyWeather {
        avg_temp_c: first.day.avgtemp_c,
        avg_humidity_pct: first.day.avghumidity,
        total_precip_mm: first.day.totalprecip_mm,
        max_wind_kph: first.day.maxwind_kph,
        sunshine_hours,
    })
}

/// Parse a 12-hour clock time such as `"06:12 AM"`.
fn parse_clock_time(s: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(s.trim(), "%I:%M %p").map_err(|e| {
        AppError::ExternalServiceError(format!("unparseable clock time '{}': {}", s, e))
    })
}

/// Hours between sunrise and sunset, both 12-hour clock strings of the same day.
pub fn sunshine_hours(sunrise: &str, sunset: &str) -> Result<f64, AppError> {
    let rise = parse_clock_time(sunrise)?;
    let set = parse_clock_time(sunset)?;
    Ok((set - rise).num_seconds() as f64 / 3600.0)
}
