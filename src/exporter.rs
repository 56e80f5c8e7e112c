//! Periodic push of metrics to the collector.
//!
//! Delivery is at most once: a refused or lost batch is logged and never
//! resent, the next tick carries the current cumulative values anyway.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::http::header;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Collector;
use crate::error::ExportError;
use crate::metrics::Metrics;
use crate::otlp::{self, ExportMetricsRequest};
use crate::system::SystemSampler;

/// Time between two flushes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes metric batches over HTTP.
#[derive(Clone, Debug)]
pub struct Exporter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    source: String,
    in_flight: Arc<AtomicBool>,
}

/// Marks an export as pending; cleared on drop, even if the send task panics.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Exporter {
    /// Create a new [`Exporter`] for the collector at `url`.
    pub fn new(url: &str, api_key: &str, source: &str) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.to_owned(),
            api_key: api_key.to_owned(),
            source: source.to_owned(),
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build from configuration.
    /// `None` without an API key or when the HTTP client cannot be built.
    pub fn from_config(config: &Collector) -> Option<Self> {
        let api_key = config.api_key.as_deref()?;

        match Self::new(&config.url, api_key, &config.source) {
            Ok(exporter) => Some(exporter),
            Err(err) => {
                tracing::error!(error = %err, "cannot build metrics HTTP client");
                None
            },
        }
    }

    /// Whether a batch is still being sent.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sample the host and the counters into a batch.
    pub fn batch(&self, metrics: &Metrics, sampler: &mut SystemSampler) -> ExportMetricsRequest {
        let usage = sampler.sample();
        let snapshot = metrics.snapshot();

        ExportMetricsRequest::new(otlp::build_metrics(&snapshot, &usage, &self.source))
    }

    /// Send one batch, waiting for the collector answer.
    pub async fn export(&self, batch: &ExportMetricsRequest) -> Result<(), ExportError> {
        let payload = serde_json::to_string(batch)?;

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Rejected {
                status: status.as_u16(),
                body,
                payload,
            });
        }

        Ok(())
    }

    /// Run one flush cycle: sweep expired tokens, build a batch and send it
    /// in the background.
    ///
    /// At most one batch is in flight; while the previous send is pending
    /// the cycle is skipped and `false` is returned.
    pub fn flush(&self, metrics: &Metrics, sampler: &mut SystemSampler) -> bool {
        let active_tokens = metrics.sweep_expired_tokens();

        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("previous export still in flight, skipping tick");
            return false;
        }
        let guard = InFlight(Arc::clone(&self.in_flight));

        let batch = self.batch(metrics, sampler);
        tracing::trace!(active_tokens, metrics = batch.metrics().count(), "flushing metrics");

        let exporter = self.clone();
        tokio::spawn(async move {
            let _guard = guard;

            match exporter.export(&batch).await {
                Ok(()) => tracing::trace!(url = %exporter.url, "metrics pushed"),
                Err(ExportError::Rejected {
                    status,
                    body,
                    payload,
                }) => {
                    tracing::error!(status, %body, %payload, "failed to push metrics data to collector")
                },
                Err(err) => tracing::error!(error = %err, "error pushing metrics"),
            }
        });

        true
    }

    /// Flush every `interval` until the runtime shuts down.
    pub fn spawn(self, metrics: Metrics, interval: Duration) -> JoinHandle<()> {
        tracing::info!(url = %self.url, ?interval, "metrics exporter started");

        tokio::spawn(async move {
            let mut sampler = SystemSampler::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.flush(&metrics, &mut sampler);
            }
        })
    }
}
