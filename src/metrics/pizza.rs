//! Pizza factory purchase metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of an order sent to the pizza factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Success,
    Failure,
}

/// Purchase counters. Floating point values are stored as raw `f64` bits.
#[derive(Debug, Default)]
pub struct PizzaCounters {
    sold: AtomicU64,
    failures: AtomicU64,
    revenue: AtomicU64,
    latency: AtomicU64,
}

/// Point-in-time copy of [`PizzaCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PizzaSnapshot {
    pub sold: u64,
    pub failures: u64,
    /// Running total, in BTC.
    pub revenue: f64,
    /// Latency of the last factory call, in milliseconds.
    pub latency_ms: f64,
}

impl PizzaCounters {
    pub fn record(&self, outcome: PurchaseOutcome, latency: Duration, count: u64, price: f64) {
        match outcome {
            PurchaseOutcome::Success => {
                self.sold.fetch_add(count, Ordering::Relaxed);
                let _ = self
                    .revenue
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                        Some((f64::from_bits(bits) + price).to_bits())
                    });
            },
            PurchaseOutcome::Failure => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            },
        }

        self.latency
            .store((latency.as_secs_f64() * 1000.0).to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PizzaSnapshot {
        PizzaSnapshot {
            sold: self.sold.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            revenue: f64::from_bits(self.revenue.load(Ordering::Relaxed)),
            latency_ms: f64::from_bits(self.latency.load(Ordering::Relaxed)),
        }
    }
}
