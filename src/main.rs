// Crop Yield API v0.1
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crop_yield_api::config::AppConfig;
use crop_yield_api::errors;
use crop_yield_api::routes::{self, predict::AppState, predict::RequestLimits};
use crop_yield_api::services::earth_engine::EarthEngineClient;
use crop_yield_api::services::features::{AssemblySettings, FeatureAssembler};
use crop_yield_api::services::model::ModelRegistry;
use crop_yield_api::services::retry::RetryPolicy;
use crop_yield_api::services::weather_api::WeatherApiClient;

/// OpenAPI document for the Crop Yield API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crop Yield API",
        version = "0.1.0",
        description = "Field-level crop yield estimation. For each month in a requested range, \
            fetches daily weather history at the field's mean coordinate and computes \
            Sentinel-2 vegetation indices over the field polygon, then averages a \
            district-specific linear model's monthly predictions.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Predictions", description = "Yield prediction and supported districts"),
    ),
    paths(
        routes::health::health_check,
        routes::districts::list_districts,
        routes::predict::predict_yield,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::districts::DistrictListResponse,
            routes::predict::PredictionRequest,
            routes::predict::PredictionResponse,
            routes::predict::MonthFeaturesResponse,
            routes::predict::FeatureValues,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crop_yield_api=debug,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(config.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // Load district models once; a missing artifact is fatal at startup
    let models = ModelRegistry::load_from_dir(&config.model_dir).unwrap_or_else(|e| {
        panic!(
            "Failed to load models from {}: {}",
            config.model_dir.display(),
            e
        )
    });
    tracing::info!("Loaded {} district models", models.len());

    let retry = RetryPolicy::new(config.max_retries);
    let weather = WeatherApiClient::new(
        &config.weather_api_key,
        &config.weather_api_url,
        config.http_timeout,
        retry,
    )
    .expect("Failed to build weather API client");
    let imagery = EarthEngineClient::new(
        &config.ee_api_url,
        &config.ee_project,
        &config.ee_access_token,
        &config.ee_collection,
        config.http_timeout,
        retry,
    )
    .expect("Failed to build Earth Engine client");

    let assembler = FeatureAssembler::new(
        Arc::new(weather),
        Arc::new(imagery),
        AssemblySettings {
            max_concurrent_months: config.max_concurrent_months,
            max_concurrent_days: config.max_concurrent_days,
            missing_field_policy: config.weather_missing_fields,
        },
    );

    let app_state = AppState {
        assembler,
        models: Arc::new(models),
        limits: RequestLimits {
            max_range_months: config.max_range_months,
            deadline: config.request_deadline,
        },
    };

    // CORS: predictions are POSTed, everything else is read-only
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::api_router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
