use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

/// Margin subtracted from a token's lifetime so we never hand out a token
/// that could expire mid-request chain.
const EXPIRY_MARGIN_SECS: i64 = 5 * 60;

/// Injectable time source so expiry behavior is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Thread-safe holder for the catalog bearer token.
///
/// `get` returns the token only while it stays valid past the safety margin;
/// otherwise the caller is expected to run a fresh exchange and `set` the
/// result. Absence of a token is not an error. Token acquisition never
/// happens under the lock.
pub struct TokenCache {
    token: RwLock<Option<CachedToken>>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            token: RwLock::new(None),
            clock,
        }
    }

    /// Returns the cached token if it remains valid for more than the safety
    /// margin beyond now. The exact boundary counts as expired.
    pub fn get(&self) -> Option<String> {
        let guard = self.token.read().unwrap();
        let cached = guard.as_ref()?;
        let remaining = cached.expires_at - self.clock.now();
        if remaining > Duration::seconds(EXPIRY_MARGIN_SECS) {
            Some(cached.value.clone())
        } else {
            None
        }
    }

    /// Overwrites the cached token unconditionally (last writer wins).
    pub fn set(&self, value: &str, expires_in_secs: i64) {
        let expires_at = self.clock.now() + Duration::seconds(expires_in_secs);
        let mut guard = self.token.write().unwrap();
        *guard = Some(CachedToken {
            value: value.to_string(),
            expires_at,
        });
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
