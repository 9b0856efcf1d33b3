//! Earth Engine REST client.
//!
//! Sends a single `value:compute` request per month: the whole composite,
//! band math and reduction pipeline is encoded as an expression graph and
//! evaluated server-side.
//! See: https://developers.google.com/earth-engine/reference/rest/v1/projects.value/compute

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::services::indices::{BandExpr, CompositeRequest, ImageryPlatform};
use crate::services::retry::{CallError, RetryPolicy};

const SERVICE_NAME: &str = "Earth Engine";

/// Property holding the scene-level cloud percentage on Sentinel-2 assets.
const CLOUD_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";

/// Suffix Earth Engine appends to band names after a median reduction.
const MEDIAN_SUFFIX: &str = "_median";

/// Client for the Earth Engine REST API.
#[derive(Debug, Clone)]
pub struct EarthEngineClient {
    client: reqwest::Client,
    compute_url: String,
    collection: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ComputeResponse {
    result: Option<HashMap<String, Option<f64>>>,
}

impl EarthEngineClient {
    pub fn new(
        base_url: &str,
        project: &str,
        access_token: &str,
        collection: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|e| AppError::InternalError(format!("Invalid Earth Engine token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            compute_url: format!(
                "{}/v1/projects/{}/value:compute",
                base_url.trim_end_matches('/'),
                project
            ),
            collection: collection.to_string(),
            retry,
        })
    }

    async fn compute(&self, body: &Value) -> Result<ComputeResponse, CallError> {
        let response = self
            .client
            .post(&self.compute_url)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::from_reqwest(SERVICE_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let err = CallError::from_status(SERVICE_NAME, status);
            return Err(match err {
                CallError::Transient(msg) => CallError::Transient(msg),
                CallError::Fatal(msg) => CallError::Fatal(format!("{}: {}", msg, detail.trim())),
            });
        }

        response
            .json::<ComputeResponse>()
            .await
            .map_err(|e| CallError::Fatal(format!("Earth Engine JSON parse error: {}", e)))
    }
}

#[async_trait]
impl ImageryPlatform for EarthEngineClient {
    async fn region_means(
        &self,
        request: &CompositeRequest<'_>,
    ) -> Result<HashMap<String, Option<f64>>, AppError> {
        let body = build_compute_body(&self.collection, request);
        let response = self
            .retry
            .run("earth engine compute", || self.compute(&body))
            .await?;
        response.result.ok_or_else(|| {
            AppError::ExternalServiceError("Earth Engine returned no result".to_string())
        })
    }
}

// --- Expression graph encoding ---

fn constant(value: impl Into<Value>) -> Value {
    json!({ "constantValue": value.into() })
}

fn reference(name: &str) -> Value {
    json!({ "valueReference": name })
}

fn invoke(function: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

fn filter_collection(collection: Value, filter: Value) -> Value {
    invoke(
        "Collection.filter",
        json!({ "collection": collection, "filter": filter }),
    )
}

fn composite_band(band: &str) -> String {
    format!("{}{}", band, MEDIAN_SUFFIX)
}

/// Encode a band-math expression against the composite image.
fn encode_band_expr(expr: &BandExpr) -> Value {
    let binary = |function: &str, a: &BandExpr, b: &BandExpr| {
        invoke(
            function,
            json!({ "image1": encode_band_expr(a), "image2": encode_band_expr(b) }),
        )
    };
    match expr {
        BandExpr::Band(band) => invoke(
            "Image.select",
            json!({
                "input": reference("composite"),
                "bandSelectors": constant(vec![composite_band(band.id())]),
            }),
        ),
        BandExpr::Constant(v) => invoke("Image.constant", json!({ "value": constant(*v) })),
        BandExpr::Add(a, b) => binary("Image.add", a, b),
        BandExpr::Subtract(a, b) => binary("Image.subtract", a, b),
        BandExpr::Multiply(a, b) => binary("Image.multiply", a, b),
        BandExpr::Divide(a, b) => binary("Image.divide", a, b),
        BandExpr::NormalizedDifference(a, b) => invoke(
            "Image.normalizedDifference",
            json!({
                "input": reference("composite"),
                "bandNames": constant(vec![composite_band(a.id()), composite_band(b.id())]),
            }),
        ),
    }
}

/// Build the `value:compute` request body for one monthly reduction.
///
/// Date window: first day of the month inclusive, first day of the next
/// month exclusive.
pub fn build_compute_body(collection: &str, request: &CompositeRequest<'_>) -> Value {
    let start = request.month.first_day().format("%Y-%m-%d").to_string();
    let end = request.month.next().first_day().format("%Y-%m-%d").to_string();

    let geometry = invoke(
        "GeometryConstructors.Polygon",
        json!({ "coordinates": constant(json!([request.polygon.closed_ring()])) }),
    );

    let scenes = invoke("ImageCollection.load", json!({ "id": constant(collection) }));
    let scenes = filter_collection(
        scenes,
        invoke(
            "Filter.intersects",
            json!({ "leftField": constant(".all"), "rightValue": reference("geometry") }),
        ),
    );
    let scenes = filter_collection(
        scenes,
        invoke(
            "Filter.dateRangeContains",
            json!({
                "leftValue": invoke("DateRange", json!({ "start": constant(start), "end": constant(end) })),
                "rightField": constant("system:time_start"),
            }),
        ),
    );
    let scenes = filter_collection(
        scenes,
        invoke(
            "Filter.lessThan",
            json!({ "leftField": constant(CLOUD_PROPERTY), "rightValue": constant(request.max_cloud_pct) }),
        ),
    );

    let median = invoke(
        "ImageCollection.reduce",
        json!({ "collection": scenes, "reducer": invoke("Reducer.median", json!({})) }),
    );
    let composite = invoke(
        "Image.clip",
        json!({ "input": median, "geometry": reference("geometry") }),
    );

    let index_images = request.indices.iter().map(|index| {
        invoke(
            "Image.rename",
            json!({
                "input": encode_band_expr(&index.expression()),
                "names": constant(vec![index.name()]),
            }),
        )
    });
    let stacked = index_images
        .reduce(|acc, next| invoke("Image.addBands", json!({ "dstImg": acc, "srcImg": next })))
        .unwrap_or_else(|| reference("composite"));

    let reduced = invoke(
        "Image.reduceRegion",
        json!({
            "image": stacked,
            "reducer": invoke("Reducer.mean", json!({})),
            "geometry": reference("geometry"),
            "scale": constant(request.scale_m),
        }),
    );

    json!({
        "expression": {
            "result": "0",
            "values": {
                "geometry": geometry,
                "composite": composite,
                "0": reduced,
            }
        }
    })
}
