//! Error handler for pizza-metrics.

use thiserror::Error;

/// Errors that may occur while loading `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised while pushing a batch to the collector.
///
/// They never leave the exporter task: each one is logged and the batch is
/// dropped.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("collector unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector answered with {status} status")]
    Rejected {
        status: u16,
        /// Response body, as sent by the collector.
        body: String,
        /// Serialized batch that was refused.
        payload: String,
    },
}
