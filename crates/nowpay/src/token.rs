//! Bearer-token lifecycle.
//!
//! `/auth` issues a token valid for [`TOKEN_TTL`]. [`TokenManager`] keeps the
//! single active token together with its absolute expiry and is the only
//! place that mutates them. Token and expiry are always written together
//! under one lock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::constants::TOKEN_TTL;
use crate::error::NowPaymentsError;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used to simulate token expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Diagnostic view of the token state. `NoToken` and `Expired` both require
/// re-authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    NoToken,
    Valid,
    Expired,
}

#[derive(Default)]
struct TokenState {
    token: Option<String>,
    expires_at: Option<Instant>,
    /// Bumped on every store and on every clear that removed a token.
    generation: u64,
}

impl TokenState {
    fn usable_token(&self, now: Instant) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at => Some(token),
            _ => None,
        }
    }
}

/// Holds the active bearer token and its expiry.
///
/// Share it between call sites as `Arc<TokenManager>`; every method takes
/// `&self`.
pub struct TokenManager {
    state: Mutex<TokenState>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TokenState::default()),
            clock,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Record a freshly issued token. Expiry is `issued_at + 300s`.
    ///
    /// Bumps [`generation`](Self::generation) so anything caching
    /// authenticated transport state rebuilds it.
    pub fn store(&self, token: impl Into<String>, issued_at: Instant) {
        let mut state = self.lock();
        state.token = Some(token.into());
        state.expires_at = Some(issued_at + TOKEN_TTL);
        state.generation = state.generation.wrapping_add(1);
        tracing::debug!(generation = state.generation, "bearer token stored");
    }

    /// True when no token is stored or the stored one has reached expiry.
    pub fn is_expired(&self) -> bool {
        let now = self.clock.now();
        self.lock().usable_token(now).is_none()
    }

    /// `None` without a token, otherwise the time left (zero once expired).
    pub fn time_remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.lock();
        match (&state.token, state.expires_at) {
            (Some(_), Some(expires_at)) => Some(expires_at.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Drop the token. Idempotent.
    pub fn clear(&self) {
        let mut state = self.lock();
        if state.token.is_some() || state.expires_at.is_some() {
            state.token = None;
            state.expires_at = None;
            state.generation = state.generation.wrapping_add(1);
            tracing::debug!(generation = state.generation, "bearer token cleared");
        }
    }

    pub fn status(&self) -> TokenStatus {
        let now = self.clock.now();
        let state = self.lock();
        match (&state.token, state.expires_at) {
            (Some(_), Some(expires_at)) if now < expires_at => TokenStatus::Valid,
            (Some(_), Some(_)) => TokenStatus::Expired,
            _ => TokenStatus::NoToken,
        }
    }

    /// The token to attach to a protected call.
    ///
    /// Fails with `Authentication` when no usable token is held; callers must
    /// re-authenticate rather than proceed without one.
    pub fn bearer(&self) -> Result<String, NowPaymentsError> {
        self.bearer_with_generation().map(|(token, _)| token)
    }

    /// [`bearer`](Self::bearer) plus the generation it belongs to, read under
    /// one lock so the pair cannot straddle a concurrent `store`.
    pub fn bearer_with_generation(&self) -> Result<(String, u64), NowPaymentsError> {
        let now = self.clock.now();
        let state = self.lock();
        if let Some(token) = state.usable_token(now) {
            return Ok((token.to_string(), state.generation));
        }
        let message = if state.token.is_some() {
            "bearer token expired; re-authenticate"
        } else {
            "no bearer token; authenticate first"
        };
        Err(NowPaymentsError::Authentication {
            status: None,
            message: message.to_string(),
        })
    }

    /// Changes whenever the stored token changes.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("token state mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("status", &self.status())
            .field("time_remaining", &self.time_remaining())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (Arc<ManualClock>, TokenManager) {
        let clock = Arc::new(ManualClock::new());
        let manager = TokenManager::with_clock(clock.clone());
        (clock, manager)
    }

    #[test]
    fn starts_without_token() {
        let (_, tokens) = manual();
        assert!(tokens.is_expired());
        assert_eq!(tokens.time_remaining(), None);
        assert_eq!(tokens.status(), TokenStatus::NoToken);
        assert!(tokens.bearer().unwrap_err().is_authentication());
    }

    #[test]
    fn fresh_token_is_valid_for_five_minutes() {
        let (_, tokens) = manual();
        tokens.store("jwt-1", tokens.now());

        assert!(!tokens.is_expired());
        assert_eq!(tokens.time_remaining(), Some(Duration::from_secs(300)));
        assert_eq!(tokens.status(), TokenStatus::Valid);
        assert_eq!(tokens.bearer().unwrap(), "jwt-1");
    }

    #[test]
    fn token_expires_exactly_at_ttl() {
        let (clock, tokens) = manual();
        tokens.store("jwt-1", tokens.now());

        clock.advance(Duration::from_secs(299));
        assert!(!tokens.is_expired());
        assert_eq!(tokens.time_remaining(), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(1));
        assert!(tokens.is_expired());
        assert_eq!(tokens.time_remaining(), Some(Duration::ZERO));
        assert_eq!(tokens.status(), TokenStatus::Expired);
    }

    #[test]
    fn expired_token_reports_zero_remaining() {
        let (clock, tokens) = manual();
        tokens.store("jwt-1", tokens.now());
        clock.advance(Duration::from_secs(3600));

        assert!(tokens.is_expired());
        assert_eq!(tokens.time_remaining(), Some(Duration::ZERO));
        let err = tokens.bearer().unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn expiry_is_relative_to_issue_time() {
        let (clock, tokens) = manual();
        let issued = tokens.now();
        clock.advance(Duration::from_secs(100));
        tokens.store("late", issued);
        assert_eq!(tokens.time_remaining(), Some(Duration::from_secs(200)));
    }

    #[test]
    fn clear_removes_token_and_is_idempotent() {
        let (_, tokens) = manual();
        tokens.store("jwt-1", tokens.now());
        let before = tokens.generation();

        tokens.clear();
        assert!(tokens.is_expired());
        assert_eq!(tokens.time_remaining(), None);
        assert_eq!(tokens.status(), TokenStatus::NoToken);
        assert_eq!(tokens.generation(), before + 1);

        tokens.clear();
        assert_eq!(tokens.generation(), before + 1);
    }

    #[test]
    fn store_replaces_previous_token() {
        let (clock, tokens) = manual();
        tokens.store("old", tokens.now());
        clock.advance(Duration::from_secs(301));
        assert!(tokens.is_expired());

        let g = tokens.generation();
        tokens.store("new", tokens.now());
        assert_eq!(tokens.bearer().unwrap(), "new");
        assert_eq!(tokens.generation(), g + 1);
    }

    #[test]
    fn bearer_and_generation_are_read_together() {
        let (clock, tokens) = manual();
        assert!(tokens.bearer_with_generation().is_err());

        tokens.store("first", tokens.now());
        let (token, generation) = tokens.bearer_with_generation().unwrap();
        assert_eq!(token, "first");
        assert_eq!(generation, tokens.generation());

        tokens.store("second", tokens.now());
        let (token, next) = tokens.bearer_with_generation().unwrap();
        assert_eq!(token, "second");
        assert_eq!(next, generation + 1);

        clock.advance(Duration::from_secs(300));
        assert!(tokens.bearer_with_generation().unwrap_err().is_authentication());
    }

    #[test]
    fn debug_does_not_print_token() {
        let (_, tokens) = manual();
        tokens.store("very-secret-jwt", tokens.now());
        let dbg = format!("{tokens:?}");
        assert!(!dbg.contains("very-secret-jwt"));
        assert!(dbg.contains("Valid"));
    }

    #[test]
    fn concurrent_readers_see_whole_state() {
        let tokens = Arc::new(TokenManager::new());
        tokens.store("shared", tokens.now());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tokens = tokens.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        tokens.store(format!("t{i}"), tokens.now());
                    }
                    // Either a full token or none; never a token without expiry.
                    assert!(tokens.time_remaining().is_some());
                    assert!(tokens.bearer().is_ok());
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
