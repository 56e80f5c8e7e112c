//! Telemetry core of the pizza service.
//!
//! Counts requests and authentication attempts, tracks live session tokens
//! and periodically pushes everything, plus host usage, to an
//! OpenTelemetry collector as OTLP/JSON.
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod exporter;
pub mod metrics;
pub mod otlp;
mod router;
pub mod system;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

pub use exporter::Exporter;
pub use metrics::Metrics;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub metrics: Metrics,
}

/// Create router.
///
/// `api` holds the service routes (auth, franchise, order, user); every
/// request going through them is tracked.
pub fn app(state: AppState, api: Router<AppState>) -> Router {
    let middleware = ServiceBuilder::new()
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .merge(api)
        .with_state(state.clone())
        .layer(middleware)
        // Outside the timeout: timed-out requests are tracked as well.
        .layer(AxumMiddleware::from_fn_with_state(state, telemetry::track))
}

/// Initialize the application state.
pub fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;

    Ok(AppState {
        config,
        metrics: Metrics::new(),
    })
}

/// Start pushing metrics if a collector is configured.
pub fn start_exporter(state: &AppState) -> Option<tokio::task::JoinHandle<()>> {
    let Some(collector) = &state.config.metrics else {
        tracing::warn!("missing `metrics` entry on `config.yaml` file, metrics are not exported");
        return None;
    };

    let Some(exporter) = Exporter::from_config(collector) else {
        tracing::warn!(
            env = config::API_KEY_ENV,
            "missing collector API key, metrics are not exported"
        );
        return None;
    };

    Some(exporter.spawn(state.metrics.clone(), crate::exporter::DEFAULT_INTERVAL))
}
