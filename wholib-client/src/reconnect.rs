//! Reconnection state machine with exponential backoff
//!
//! Recovery from transport failure is expressed as named transitions on an
//! explicit state machine rather than ad-hoc handler mutation, so illegal
//! moves (e.g. scheduling a retry while already terminal) cannot happen.
//!
//! ```text
//! Connected --failure--> Reconnecting --success--> Connected
//! Reconnecting --cap exceeded, fallback allowed--> Connected (polling)
//! Reconnecting --cap exceeded, no fallback-----> Error (terminal)
//! ```
//!
//! The `Error` state is terminal until an external `connect()` call resets
//! the machine.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Connection status of the live-update channel
///
/// Drives UI indicators only; no external side effects hang off these
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A transport is being established
    Connecting,
    /// A transport is up and delivering events
    Connected,
    /// No transport; nothing scheduled (initial state, or after disconnect)
    Disconnected,
    /// A transport failed; a retry is scheduled
    Reconnecting,
    /// Reconnect attempts exhausted with no polling fallback; terminal
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// What the transport loop should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule another connection attempt after this delay
    RetryAfter(Duration),
    /// Cap exceeded and polling is permitted: switch permanently to polling
    FallbackToPolling,
    /// Cap exceeded and no fallback: stop retrying until manual reconnect
    GiveUp,
}

/// Backoff parameters, taken from `ClientConfig`.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub polling_fallback: bool,
}

/// Tracks connection state, attempt count, and last-connected time.
pub struct ReconnectManager {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    last_connected: Option<DateTime<Utc>>,
}

impl ReconnectManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            last_connected: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_connected(&self) -> Option<DateTime<Utc>> {
        self.last_connected
    }

    /// Backoff delay for attempt `n` (1-based): `base * 2^(n-1)`.
    ///
    /// Saturates instead of overflowing. The exponent cap of 31 keeps the
    /// shift within u32; anything past it saturates the multiply anyway.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.policy
            .base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(Duration::MAX)
    }

    /// Transition: a connection attempt is starting.
    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Transition: a transport came up. Resets the attempt counter.
    pub fn on_connected(&mut self) {
        if self.attempts > 0 {
            info!("Live-update channel restored after {} attempts", self.attempts);
        }
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.last_connected = Some(Utc::now());
    }

    /// Transition: the active transport failed (or an attempt failed).
    ///
    /// Increments the attempt counter and decides what happens next. In the
    /// terminal `Error` state this is a no-op returning `GiveUp`.
    pub fn on_failure(&mut self) -> ReconnectDecision {
        if self.state == ConnectionState::Error {
            return ReconnectDecision::GiveUp;
        }

        self.attempts += 1;

        if self.attempts > self.policy.max_attempts {
            if self.policy.polling_fallback {
                warn!(
                    "Reconnect cap ({}) exceeded; switching permanently to polling",
                    self.policy.max_attempts
                );
                // Polling is a live channel: counter resets, state is Connected.
                self.state = ConnectionState::Connected;
                self.attempts = 0;
                self.last_connected = Some(Utc::now());
                ReconnectDecision::FallbackToPolling
            } else {
                warn!(
                    "Reconnect cap ({}) exceeded and polling fallback disabled; giving up",
                    self.policy.max_attempts
                );
                self.state = ConnectionState::Error;
                ReconnectDecision::GiveUp
            }
        } else {
            let delay = self.delay_for_attempt(self.attempts);
            self.state = ConnectionState::Reconnecting;
            info!(
                "Transport failure; reconnect attempt {}/{} in {:?}",
                self.attempts, self.policy.max_attempts, delay
            );
            ReconnectDecision::RetryAfter(delay)
        }
    }

    /// Transition: explicit disconnect. Clears retry bookkeeping.
    pub fn on_disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
    }

    /// Transition: external `connect()` call, also the manual escape from
    /// the terminal `Error` state.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, polling_fallback: bool) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            max_attempts,
            polling_fallback,
        }
    }

    #[test]
    fn test_backoff_doubles_exactly_per_attempt() {
        let mgr = ReconnectManager::new(policy(10, true));
        for n in 1..10 {
            let this = mgr.delay_for_attempt(n);
            let next = mgr.delay_for_attempt(n + 1);
            assert_eq!(next, this * 2, "attempt {} -> {}", n, n + 1);
        }
        assert_eq!(mgr.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(mgr.delay_for_attempt(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_large_attempt_numbers_saturate_without_panicking() {
        // A cap above 32 is a legal configuration; the shift must not
        // overflow for attempts past it.
        let mgr = ReconnectManager::new(policy(40, false));
        let at_cap = mgr.delay_for_attempt(32);
        assert_eq!(mgr.delay_for_attempt(33), at_cap);
        assert_eq!(mgr.delay_for_attempt(u32::MAX), at_cap);
        assert!(at_cap >= mgr.delay_for_attempt(31));
    }

    #[test]
    fn test_failure_schedules_retry_until_cap() {
        let mut mgr = ReconnectManager::new(policy(3, true));
        mgr.on_connected();

        for n in 1..=3u32 {
            match mgr.on_failure() {
                ReconnectDecision::RetryAfter(delay) => {
                    assert_eq!(delay, mgr.delay_for_attempt(n));
                    assert_eq!(mgr.state(), ConnectionState::Reconnecting);
                    assert_eq!(mgr.attempts(), n);
                }
                other => panic!("expected retry at attempt {}, got {:?}", n, other),
            }
        }
    }

    #[test]
    fn test_cap_exceeded_with_fallback_connects_via_polling() {
        let mut mgr = ReconnectManager::new(policy(2, true));
        assert!(matches!(mgr.on_failure(), ReconnectDecision::RetryAfter(_)));
        assert!(matches!(mgr.on_failure(), ReconnectDecision::RetryAfter(_)));
        assert_eq!(mgr.on_failure(), ReconnectDecision::FallbackToPolling);
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(mgr.attempts(), 0);
    }

    #[test]
    fn test_cap_exceeded_without_fallback_is_terminal() {
        let mut mgr = ReconnectManager::new(policy(2, false));
        mgr.on_failure();
        mgr.on_failure();
        assert_eq!(mgr.on_failure(), ReconnectDecision::GiveUp);
        assert_eq!(mgr.state(), ConnectionState::Error);

        // Further failures must not schedule anything.
        assert_eq!(mgr.on_failure(), ReconnectDecision::GiveUp);
        assert_eq!(mgr.state(), ConnectionState::Error);

        // Manual reconnect is the only way out.
        mgr.reset();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(matches!(mgr.on_failure(), ReconnectDecision::RetryAfter(_)));
    }

    #[test]
    fn test_success_resets_attempt_counter() {
        let mut mgr = ReconnectManager::new(policy(10, true));
        mgr.on_failure();
        mgr.on_failure();
        assert_eq!(mgr.attempts(), 2);

        mgr.on_connected();
        assert_eq!(mgr.attempts(), 0);
        assert!(mgr.last_connected().is_some());

        // Backoff restarts from the base delay.
        assert_eq!(
            mgr.on_failure(),
            ReconnectDecision::RetryAfter(Duration::from_millis(500))
        );
    }
}
