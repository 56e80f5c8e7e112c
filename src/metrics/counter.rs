//! Request and authentication counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// HTTP methods tracked by the request counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Every tracked method, in export order.
    pub const ALL: [HttpMethod; 4] =
        [HttpMethod::Get, HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete];

    /// Parse a method name, case insensitive.
    /// Untracked methods (`HEAD`, `OPTIONS`, ...) yield `None`.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Lowercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Get => 0,
            Self::Post => 1,
            Self::Put => 2,
            Self::Delete => 3,
        }
    }
}

/// Monotonic counters fed by the request observer.
/// Never reset for the lifetime of the process.
#[derive(Debug, Default)]
pub struct CounterStore {
    total: AtomicU64,
    by_method: [AtomicU64; 4],
    auth_success: AtomicU64,
    auth_failure: AtomicU64,
}

/// Point-in-time copy of a [`CounterStore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequestCounts {
    pub total: u64,
    by_method: [u64; 4],
    pub auth_success: u64,
    pub auth_failure: u64,
}

impl RequestCounts {
    /// Requests observed for `method`.
    pub fn method(&self, method: HttpMethod) -> u64 {
        self.by_method[method.index()]
    }
}

impl CounterStore {
    /// Count one incoming request.
    pub fn record_request(&self, method: HttpMethod) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.by_method[method.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Count one authentication attempt.
    pub fn record_auth(&self, success: bool) {
        if success {
            self.auth_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.auth_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Non-destructive read of every counter.
    pub fn snapshot(&self) -> RequestCounts {
        RequestCounts {
            total: self.total.load(Ordering::Relaxed),
            by_method: HttpMethod::ALL
                .map(|method| self.by_method[method.index()].load(Ordering::Relaxed)),
            auth_success: self.auth_success.load(Ordering::Relaxed),
            auth_failure: self.auth_failure.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!(HttpMethod::parse("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("Put"), Some(HttpMethod::Put));
        assert_eq!(HttpMethod::parse("DELETE"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("PATCH"), None);
        assert_eq!(HttpMethod::parse("OPTIONS"), None);
        assert_eq!(HttpMethod::parse(""), None);

        for method in HttpMethod::ALL {
            assert_eq!(HttpMethod::parse(method.as_str()), Some(method));
        }
    }

    #[test]
    fn test_record_requests() {
        let store = CounterStore::default();
        assert_eq!(store.snapshot(), RequestCounts::default());

        for _ in 0..3 {
            store.record_request(HttpMethod::Get);
        }
        store.record_request(HttpMethod::Delete);

        let counts = store.snapshot();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.method(HttpMethod::Get), 3);
        assert_eq!(counts.method(HttpMethod::Post), 0);
        assert_eq!(counts.method(HttpMethod::Put), 0);
        assert_eq!(counts.method(HttpMethod::Delete), 1);

        // reads never reset.
        assert_eq!(store.snapshot(), counts);
    }

    #[test]
    fn test_record_auth() {
        let store = CounterStore::default();
        store.record_auth(true);
        store.record_auth(false);
        store.record_auth(false);

        let counts = store.snapshot();
        assert_eq!(counts.auth_success, 1);
        assert_eq!(counts.auth_failure, 2);
        assert_eq!(counts.total, 0);
    }
}
