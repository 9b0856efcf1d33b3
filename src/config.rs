use std::path::PathBuf;
use std::time::Duration;

use crate::services::weather::MissingFieldPolicy;

const DEFAULT_WEATHER_API_URL: &str = "http://api.weatherapi.com/v1/history.json";
const DEFAULT_EE_API_URL: &str = "https://earthengine.googleapis.com";
const DEFAULT_EE_COLLECTION: &str = "COPERNICUS/S2";

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub weather_api_key: String,
    pub weather_api_url: String,
    /// Cloud project that Earth Engine computations are billed to.
    pub ee_project: String,
    /// OAuth bearer token. Obtaining it is the deployment's job.
    pub ee_access_token: String,
    pub ee_api_url: String,
    pub ee_collection: String,
    /// Directory containing the district model artifacts.
    pub model_dir: PathBuf,
    pub http_timeout: Duration,
    pub request_deadline: Duration,
    pub max_concurrent_months: usize,
    pub max_concurrent_days: usize,
    pub max_retries: u32,
    pub max_range_months: u32,
    pub weather_missing_fields: MissingFieldPolicy,
    pub json_logs: bool,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let weather_missing_fields = match env_or("WEATHER_MISSING_FIELDS", "zero").as_str() {
            "zero" => MissingFieldPolicy::Zero,
            "skip" => MissingFieldPolicy::Skip,
            other => panic!(
                "WEATHER_MISSING_FIELDS must be 'zero' or 'skip', got '{}'",
                other
            ),
        };

        Self {
            port: env_parse("PORT", 8080),
            weather_api_key: std::env::var("WEATHER_API_KEY")
                .expect("WEATHER_API_KEY must be set"),
            weather_api_url: env_or("WEATHER_API_URL", DEFAULT_WEATHER_API_URL),
            ee_project: std::env::var("EE_PROJECT").expect("EE_PROJECT must be set"),
            ee_access_token: std::env::var("EE_ACCESS_TOKEN")
                .expect("EE_ACCESS_TOKEN must be set"),
            ee_api_url: env_or("EE_API_URL", DEFAULT_EE_API_URL),
            ee_collection: env_or("EE_COLLECTION", DEFAULT_EE_COLLECTION),
            model_dir: PathBuf::from(env_or("MODEL_DIR", "./models")),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30)),
            request_deadline: Duration::from_secs(env_parse("REQUEST_DEADLINE_SECS", 600)),
            max_concurrent_months: env_parse::<usize>("MAX_CONCURRENT_MONTHS", 4).max(1),
            max_concurrent_days: env_parse::<usize>("MAX_CONCURRENT_DAYS", 8).max(1),
            max_retries: env_parse("MAX_RETRIES", 2),
            max_range_months: env_parse("MAX_RANGE_MONTHS", 36),
            weather_missing_fields,
            json_logs: env_or("LOG_FORMAT", "pretty") == "json",
        }
    }
}
