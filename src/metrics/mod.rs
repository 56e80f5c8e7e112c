//! In-process metric aggregation.
//!
//! [`Metrics`] is a cheap handle shared by the HTTP layer, the authentication
//! collaborator and the exporter task. Counters only ever grow; the exporter
//! reads them through [`Metrics::snapshot`].

mod counter;
mod pizza;
mod token;

pub use counter::{CounterStore, HttpMethod, RequestCounts};
pub use pizza::{PizzaCounters, PizzaSnapshot, PurchaseOutcome};
pub use token::{ActiveTokens, TOKEN_LIFETIME};

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use crate::AppState;

/// Path of the authentication endpoint (login, register).
pub const AUTH_ENDPOINT: &str = "/api/auth";

/// Everything read by the exporter on a flush.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub requests: RequestCounts,
    pub active_tokens: usize,
    pub pizza: PizzaSnapshot,
}

#[derive(Debug, Default)]
struct Inner {
    requests: CounterStore,
    tokens: ActiveTokens,
    pizza: PizzaCounters,
}

/// Shared metric aggregator.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    inner: Arc<Inner>,
}

impl FromRef<AppState> for Metrics {
    fn from_ref(state: &AppState) -> Metrics {
        state.metrics.clone()
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Metrics {
    /// Create a new [`Metrics`] with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a request comes in.
    pub fn on_request_start(&self, method: &str, path: &str) {
        match HttpMethod::parse(method) {
            Some(method) => self.inner.requests.record_request(method),
            None => tracing::trace!(%method, %path, "untracked method"),
        }
    }

    /// Called once the response status is known.
    /// Only `POST` and `PUT` on [`AUTH_ENDPOINT`] count as authentication attempts.
    pub fn on_request_finish(&self, method: &str, path: &str, status: u16) {
        if path != AUTH_ENDPOINT {
            return;
        }

        if let Some(HttpMethod::Post | HttpMethod::Put) = HttpMethod::parse(method) {
            self.inner
                .requests
                .record_auth((200..300).contains(&status));
        }
    }

    /// Track a freshly issued token for [`TOKEN_LIFETIME`].
    pub fn add_active_token(&self, token: &str) {
        self.add_active_token_at(token, now_millis());
    }

    /// Track a token issued at `now` (ms since epoch).
    pub fn add_active_token_at(&self, token: &str, now: i64) {
        self.inner.tokens.add_at(token, now);
    }

    /// Stop tracking a token, e.g. on logout.
    pub fn remove_active_token(&self, token: &str) {
        self.inner.tokens.remove(token);
    }

    /// Drop expired tokens, returning how many are left.
    pub fn sweep_expired_tokens(&self) -> usize {
        self.sweep_expired_tokens_at(now_millis())
    }

    /// Drop tokens expired before `now` (ms since epoch).
    pub fn sweep_expired_tokens_at(&self, now: i64) -> usize {
        self.inner.tokens.sweep_at(now)
    }

    /// Whether `token` is tracked, expired or not, until the next sweep.
    pub fn is_token_active(&self, token: &str) -> bool {
        self.inner.tokens.contains(token)
    }

    /// Record an order sent to the pizza factory.
    pub fn pizza_purchase(
        &self,
        outcome: PurchaseOutcome,
        latency: Duration,
        count: u64,
        price: f64,
    ) {
        self.inner.pizza.record(outcome, latency, count, price);
    }

    /// Read every counter without resetting anything.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            requests: self.inner.requests.snapshot(),
            active_tokens: self.inner.tokens.len(),
            pizza: self.inner.pizza.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_by_method() {
        let metrics = Metrics::new();

        for _ in 0..3 {
            metrics.on_request_start("GET", "/api/order/menu");
        }
        metrics.on_request_start("POST", "/api/order");
        metrics.on_request_start("PUT", "/api/auth");
        metrics.on_request_start("DELETE", "/api/franchise/1");
        metrics.on_request_start("OPTIONS", "/api/order");
        metrics.on_request_start("PATCH", "/api/user");

        let requests = metrics.snapshot().requests;
        assert_eq!(requests.total, 6);
        assert_eq!(requests.method(HttpMethod::Get), 3);
        assert_eq!(requests.method(HttpMethod::Post), 1);
        assert_eq!(requests.method(HttpMethod::Put), 1);
        assert_eq!(requests.method(HttpMethod::Delete), 1);
    }

    #[test]
    fn test_auth_attempts() {
        let metrics = Metrics::new();

        metrics.on_request_finish("POST", AUTH_ENDPOINT, 200);
        metrics.on_request_finish("PUT", AUTH_ENDPOINT, 204);
        metrics.on_request_finish("PUT", AUTH_ENDPOINT, 404);
        metrics.on_request_finish("POST", AUTH_ENDPOINT, 500);
        metrics.on_request_finish("POST", AUTH_ENDPOINT, 302);

        let requests = metrics.snapshot().requests;
        assert_eq!(requests.auth_success, 2);
        assert_eq!(requests.auth_failure, 3);
    }

    #[test]
    fn test_auth_ignores_other_methods_and_paths() {
        let metrics = Metrics::new();

        metrics.on_request_finish("GET", AUTH_ENDPOINT, 200);
        metrics.on_request_finish("DELETE", AUTH_ENDPOINT, 200);
        metrics.on_request_finish("DELETE", AUTH_ENDPOINT, 401);
        metrics.on_request_finish("POST", "/api/order", 200);
        metrics.on_request_finish("PUT", "/api/auth/", 401);
        metrics.on_request_finish("PATCH", AUTH_ENDPOINT, 200);

        let requests = metrics.snapshot().requests;
        assert_eq!(requests.auth_success, 0);
        assert_eq!(requests.auth_failure, 0);
    }

    #[test]
    fn test_request_scenario() {
        let metrics = Metrics::new();

        for _ in 0..3 {
            metrics.on_request_start("GET", "/api/order/menu");
            metrics.on_request_finish("GET", "/api/order/menu", 200);
        }
        metrics.on_request_start("POST", AUTH_ENDPOINT);
        metrics.on_request_finish("POST", AUTH_ENDPOINT, 200);
        metrics.on_request_start("POST", "/api/order");
        metrics.on_request_finish("POST", "/api/order", 200);

        let requests = metrics.snapshot().requests;
        assert_eq!(requests.total, 5);
        assert_eq!(requests.method(HttpMethod::Get), 3);
        assert_eq!(requests.method(HttpMethod::Post), 2);
        assert_eq!(requests.auth_success, 1);
        assert_eq!(requests.auth_failure, 0);
    }

    #[test]
    fn test_active_tokens() {
        let metrics = Metrics::new();
        let now = 1_700_000_000_000;

        metrics.add_active_token_at("a", now);
        metrics.add_active_token_at("b", now);
        assert_eq!(metrics.snapshot().active_tokens, 2);

        metrics.remove_active_token("a");
        assert!(!metrics.is_token_active("a"));
        assert_eq!(metrics.sweep_expired_tokens_at(now + 1), 1);
        assert_eq!(metrics.sweep_expired_tokens_at(now + TOKEN_LIFETIME + 1), 0);
        assert_eq!(metrics.snapshot().active_tokens, 0);
    }

    #[test]
    fn test_add_active_token_uses_clock() {
        let metrics = Metrics::new();
        metrics.add_active_token("jwt");

        assert_eq!(metrics.sweep_expired_tokens(), 1);
        assert!(metrics.is_token_active("jwt"));
    }

    #[test]
    fn test_clones_share_state() {
        let metrics = Metrics::new();
        let handle = metrics.clone();

        handle.on_request_start("GET", "/");
        handle.pizza_purchase(PurchaseOutcome::Success, Duration::from_millis(10), 1, 0.1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests.total, 1);
        assert_eq!(snapshot.pizza.sold, 1);
    }
}
