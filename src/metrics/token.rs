//! Active session tokens keyed by expiry.
//!
//! Expired entries are only dropped by [`ActiveTokens::sweep_at`], which the
//! exporter runs at the start of every flush.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifetime given to a token when it is added, in milliseconds.
pub const TOKEN_LIFETIME: i64 = 1000 * 60 * 60 * 2; // 2 hours.

/// Map from opaque token to absolute expiry (ms since epoch).
#[derive(Debug, Default)]
pub struct ActiveTokens {
    tokens: Mutex<HashMap<String, i64>>,
}

impl ActiveTokens {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `token`, or reset its expiry if already present.
    pub fn add_at(&self, token: &str, now: i64) {
        self.lock().insert(token.to_owned(), now + TOKEN_LIFETIME);
    }

    /// Forget `token`. Unknown tokens are ignored.
    pub fn remove(&self, token: &str) {
        self.lock().remove(token);
    }

    /// Drop every token whose expiry is strictly before `now`.
    /// Returns the number of tokens left.
    pub fn sweep_at(&self, now: i64) -> usize {
        let mut tokens = self.lock();
        tokens.retain(|_, expiry| *expiry >= now);
        tokens.len()
    }

    /// Number of tracked tokens, expired ones included until next sweep.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_sweep_keeps_live_tokens() {
        let tokens = ActiveTokens::default();
        tokens.add_at("abc", NOW);

        assert_eq!(tokens.sweep_at(NOW), 1);
        assert_eq!(tokens.sweep_at(NOW + TOKEN_LIFETIME - 1), 1);
        // expiry equal to now is not yet expired.
        assert_eq!(tokens.sweep_at(NOW + TOKEN_LIFETIME), 1);
        assert!(tokens.contains("abc"));
    }

    #[test]
    fn test_sweep_drops_expired_tokens() {
        let tokens = ActiveTokens::default();
        tokens.add_at("old", NOW);
        tokens.add_at("new", NOW + 1000 * 60 * 60);

        // still counted before the sweep runs.
        assert_eq!(tokens.len(), 2);

        assert_eq!(tokens.sweep_at(NOW + TOKEN_LIFETIME + 1), 1);
        assert!(!tokens.contains("old"));
        assert!(tokens.contains("new"));
    }

    #[test]
    fn test_add_resets_expiry() {
        let tokens = ActiveTokens::default();
        tokens.add_at("abc", NOW);
        tokens.add_at("abc", NOW + TOKEN_LIFETIME);

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens.sweep_at(NOW + TOKEN_LIFETIME + 1), 1);
    }

    #[test]
    fn test_remove() {
        let tokens = ActiveTokens::default();
        tokens.add_at("abc", NOW);
        tokens.remove("abc");
        tokens.remove("unknown");

        assert!(tokens.is_empty());
        assert_eq!(tokens.sweep_at(NOW), 0);
        assert!(!tokens.contains("abc"));
    }
}
