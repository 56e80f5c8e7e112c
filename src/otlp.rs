//! OpenTelemetry metrics, JSON encoding.
//!
//! Only the subset of the OTLP/HTTP JSON schema the collector needs: one
//! resource, one scope, gauge and sum metrics with a single data point each.

use serde::Serialize;

use crate::metrics::{HttpMethod, Snapshot};
use crate::system::SystemUsage;

/// Temporality of every sum we export.
pub const CUMULATIVE: &str = "AGGREGATION_TEMPORALITY_CUMULATIVE";
/// Attribute identifying the emitting service on each data point.
pub const SOURCE_ATTRIBUTE: &str = "source";

const UNIT_COUNT: &str = "1";
const UNIT_PERCENT: &str = "%";

/// Body of the export request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetricsRequest {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl ExportMetricsRequest {
    /// Wrap `metrics` in a single resource and scope.
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics { metrics }],
            }],
        }
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|resource| &resource.scope_metrics)
            .flat_map(|scope| &scope.metrics)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeMetrics {
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub name: String,
    pub unit: String,
    #[serde(flatten)]
    pub data: MetricData,
}

/// Serialized under the `gauge` or `sum` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricData {
    Gauge(Gauge),
    Sum(Sum),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sum {
    pub data_points: Vec<DataPoint>,
    pub aggregation_temporality: String,
    pub is_monotonic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(flatten)]
    pub value: NumberValue,
    pub time_unix_nano: u64,
    pub attributes: Vec<KeyValue>,
}

/// Serialized as `asDouble` or `asInt`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberValue {
    AsDouble(f64),
    AsInt(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

/// Value of a metric, which also picks its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Sum(u64),
}

fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

impl Metric {
    /// Build a metric with one data point stamped with the current time.
    pub fn new(name: &str, unit: &str, value: MetricValue, source: &str) -> Self {
        let point = |value| DataPoint {
            value,
            time_unix_nano: now_nanos(),
            attributes: vec![KeyValue {
                key: SOURCE_ATTRIBUTE.to_owned(),
                value: AnyValue {
                    string_value: source.to_owned(),
                },
            }],
        };

        let data = match value {
            MetricValue::Gauge(value) => MetricData::Gauge(Gauge {
                data_points: vec![point(NumberValue::AsDouble(value))],
            }),
            MetricValue::Sum(value) => MetricData::Sum(Sum {
                data_points: vec![point(NumberValue::AsInt(value))],
                aggregation_temporality: CUMULATIVE.to_owned(),
                is_monotonic: true,
            }),
        };

        Self {
            name: name.to_owned(),
            unit: unit.to_owned(),
            data,
        }
    }

    pub fn gauge(name: &str, unit: &str, value: f64, source: &str) -> Self {
        Self::new(name, unit, MetricValue::Gauge(value), source)
    }

    pub fn sum(name: &str, unit: &str, value: u64, source: &str) -> Self {
        Self::new(name, unit, MetricValue::Sum(value), source)
    }

    pub fn data_points(&self) -> &[DataPoint] {
        match &self.data {
            MetricData::Gauge(gauge) => &gauge.data_points,
            MetricData::Sum(sum) => &sum.data_points,
        }
    }
}

/// Every metric sent on a flush, in a fixed order.
pub fn build_metrics(snapshot: &Snapshot, usage: &SystemUsage, source: &str) -> Vec<Metric> {
    let requests = &snapshot.requests;
    let pizza = &snapshot.pizza;

    let mut metrics = vec![
        Metric::gauge("cpu_usage", UNIT_PERCENT, usage.cpu, source),
        Metric::gauge("memory_usage", UNIT_PERCENT, usage.memory, source),
        Metric::sum("requests_total", UNIT_COUNT, requests.total, source),
    ];

    metrics.extend(HttpMethod::ALL.iter().map(|method| {
        Metric::sum(
            &format!("requests_{}", method.as_str()),
            UNIT_COUNT,
            requests.method(*method),
            source,
        )
    }));

    metrics.extend([
        Metric::sum("auth_success_count", UNIT_COUNT, requests.auth_success, source),
        Metric::sum("auth_failure_count", UNIT_COUNT, requests.auth_failure, source),
        Metric::gauge(
            "active_tokens_count",
            UNIT_COUNT,
            snapshot.active_tokens as f64,
            source,
        ),
        Metric::sum("pizzas_sold", UNIT_COUNT, pizza.sold, source),
        Metric::sum("pizza_failures", UNIT_COUNT, pizza.failures, source),
        Metric::gauge("revenue", "BTC", pizza.revenue, source),
        Metric::gauge("pizza_latency", "ms", pizza.latency_ms, source),
    ]);

    metrics
}
