//! Telemetry logic.
//! Support request tracking and logging.
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::IntoResponse;
use tracing_subscriber::EnvFilter;

use crate::metrics::Metrics;

/// Install the `tracing` subscriber.
/// Filter is read from `RUST_LOG`, default is `info`.
pub fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Track every request into the metrics aggregator.
/// The response goes through untouched.
pub async fn track(
    State(metrics): State<Metrics>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    metrics.on_request_start(method.as_str(), &path);

    let response = next.run(req).await;

    metrics.on_request_finish(method.as_str(), &path, response.status().as_u16());

    response
}
