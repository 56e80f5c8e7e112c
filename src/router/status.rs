//! Public service status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Structured status.
#[derive(Debug, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub version: String,
    /// Whether metrics are pushed to a collector.
    pub metrics: bool,
}

/// Public server status.
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: config.name.clone(),
        version: env!("CARGO_PKG_VERSION").into(),
        metrics: config
            .metrics
            .as_ref()
            .is_some_and(|collector| collector.api_key.is_some()),
    })
}
