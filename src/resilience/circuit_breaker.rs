//! Per-category circuit breakers gating recovery attempts.
//!
//! # States
//! - Closed: failures are counted, recovery proceeds
//! - Open: recovery for the category is suspended until the deadline
//! - Half-Open: the deadline has passed, the next outcome decides
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures >= threshold
//! Open → Half-Open: observed on the first check after the deadline
//! Half-Open → Closed: probe succeeds, failures reset
//! Half-Open → Open: probe fails, deadline restarts
//! Closed + success: failures reset
//! ```
//!
//! # Design Decisions
//! - One breaker per error category (not global)
//! - Created lazily, lives for the process lifetime
//! - Check and transition happen under the category's map entry lock

use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::{Millis, SharedClock};
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::classify::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    fn gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Breaker {
    failures: u32,
    state: CircuitState,
    next_attempt_at: Millis,
}

/// Observed breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub category: ErrorCategory,
    pub state: CircuitState,
    pub failures: u32,
    pub is_open: bool,
    pub next_attempt_at: Option<Millis>,
    /// Estimated wait while open.
    pub retry_after: Option<Duration>,
}

/// A state change caused by [`CircuitBreakerRegistry::record_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub category: ErrorCategory,
    pub from: CircuitState,
    pub to: CircuitState,
}

#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<ErrorCategory, Breaker>,
    policy: ArcSwap<CircuitBreakerConfig>,
    clock: SharedClock,
}

fn snapshot(category: ErrorCategory, breaker: &Breaker, now: Millis) -> BreakerSnapshot {
    let is_open = breaker.state == CircuitState::Open;
    BreakerSnapshot {
        category,
        state: breaker.state,
        failures: breaker.failures,
        is_open,
        next_attempt_at: (breaker.state != CircuitState::Closed).then_some(breaker.next_attempt_at),
        retry_after: is_open
            .then(|| Duration::from_millis(breaker.next_attempt_at.saturating_sub(now))),
    }
}

fn promote_if_due(category: ErrorCategory, breaker: &mut Breaker, now: Millis) {
    if breaker.state == CircuitState::Open && now >= breaker.next_attempt_at {
        breaker.state = CircuitState::HalfOpen;
        metrics::record_circuit_state(category.as_str(), breaker.state.gauge());
        tracing::info!(category = %category, "Circuit half-open, next outcome decides");
    }
}

impl CircuitBreakerRegistry {
    pub fn new(policy: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            breakers: DashMap::new(),
            policy: ArcSwap::from_pointee(policy),
            clock,
        }
    }

    pub fn reload(&self, policy: CircuitBreakerConfig) {
        self.policy.store(Arc::new(policy));
    }

    /// Current state, moving an expired OPEN breaker to HALF_OPEN first.
    pub fn check_state(&self, category: ErrorCategory) -> BreakerSnapshot {
        let now = self.clock.now_ms();
        let mut breaker = self.breakers.entry(category).or_default();
        promote_if_due(category, &mut breaker, now);
        snapshot(category, &breaker, now)
    }

    /// Record the outcome of an attempt in `category`.
    pub fn record_outcome(&self, category: ErrorCategory, failed: bool) -> Option<Transition> {
        let now = self.clock.now_ms();
        let policy = self.policy.load();
        let mut breaker = self.breakers.entry(category).or_default();
        promote_if_due(category, &mut breaker, now);

        let from = breaker.state;
        if failed {
            breaker.failures = breaker.failures.saturating_add(1);
            let trip = match from {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => breaker.failures >= policy.failure_threshold,
                CircuitState::Open => false,
            };
            if trip {
                breaker.state = CircuitState::Open;
                breaker.next_attempt_at = now.saturating_add(policy.timeout().as_millis() as u64);
            }
        } else {
            match from {
                CircuitState::HalfOpen => {
                    breaker.state = CircuitState::Closed;
                    breaker.failures = 0;
                }
                CircuitState::Closed => breaker.failures = 0,
                CircuitState::Open => {}
            }
        }

        let to = breaker.state;
        let failures = breaker.failures;
        drop(breaker);

        if from == to {
            return None;
        }
        metrics::record_circuit_state(category.as_str(), to.gauge());
        match to {
            CircuitState::Open => tracing::warn!(
                category = %category,
                failures,
                timeout_secs = policy.timeout_secs,
                "Circuit opened"
            ),
            _ => tracing::info!(category = %category, "Circuit closed"),
        }
        Some(Transition { category, from, to })
    }

    /// Snapshots of every breaker created so far, by category.
    pub fn snapshot_all(&self) -> Vec<BreakerSnapshot> {
        let now = self.clock.now_ms();
        let mut all: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| snapshot(*entry.key(), entry.value(), now))
            .collect();
        all.sort_by_key(|s| s.category);
        all
    }

    /// Categories currently admitting a trial call.
    pub fn half_open(&self) -> Vec<ErrorCategory> {
        let now = self.clock.now_ms();
        let mut categories: Vec<ErrorCategory> = self
            .breakers
            .iter_mut()
            .filter_map(|mut entry| {
                let category = *entry.key();
                promote_if_due(category, entry.value_mut(), now);
                (entry.state == CircuitState::HalfOpen).then_some(category)
            })
            .collect();
        categories.sort();
        categories
    }

    pub fn reset(&self, category: ErrorCategory) {
        self.breakers.insert(category, Breaker::default());
        metrics::record_circuit_state(category.as_str(), CircuitState::Closed.gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> (Arc<ManualClock>, CircuitBreakerRegistry) {
        let clock = Arc::new(ManualClock::new(0));
        (
            clock.clone(),
            CircuitBreakerRegistry::new(CircuitBreakerConfig::default(), clock),
        )
    }

    #[test]
    fn test_opens_at_threshold() {
        let (clock, breakers) = registry();
        for _ in 0..4 {
            assert!(breakers.record_outcome(ErrorCategory::Network, true).is_none());
        }
        let transition = breakers.record_outcome(ErrorCategory::Network, true).unwrap();
        assert_eq!(transition.to, CircuitState::Open);

        clock.advance(Duration::from_secs(10));
        let state = breakers.check_state(ErrorCategory::Network);
        assert!(state.is_open);
        assert_eq!(state.failures, 5);
        assert_eq!(state.retry_after, Some(Duration::from_secs(50)));
    }

    #[test]
    fn test_half_open_then_close() {
        let (clock, breakers) = registry();
        for _ in 0..5 {
            breakers.record_outcome(ErrorCategory::Database, true);
        }

        clock.advance(Duration::from_secs(60));
        let state = breakers.check_state(ErrorCategory::Database);
        assert_eq!(state.state, CircuitState::HalfOpen);
        assert!(!state.is_open);

        let transition = breakers.record_outcome(ErrorCategory::Database, false).unwrap();
        assert_eq!(transition.from, CircuitState::HalfOpen);
        assert_eq!(transition.to, CircuitState::Closed);
        let state = breakers.check_state(ErrorCategory::Database);
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (clock, breakers) = registry();
        for _ in 0..5 {
            breakers.record_outcome(ErrorCategory::Transport, true);
        }
        clock.advance(Duration::from_secs(61));

        let transition = breakers.record_outcome(ErrorCategory::Transport, true).unwrap();
        assert_eq!(transition.from, CircuitState::HalfOpen);
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(
            breakers.check_state(ErrorCategory::Transport).retry_after,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_success_resets_closed_count() {
        let (_, breakers) = registry();
        for _ in 0..4 {
            breakers.record_outcome(ErrorCategory::Network, true);
        }
        breakers.record_outcome(ErrorCategory::Network, false);
        for _ in 0..4 {
            breakers.record_outcome(ErrorCategory::Network, true);
        }
        assert!(!breakers.check_state(ErrorCategory::Network).is_open);
    }

    #[test]
    fn test_categories_are_independent() {
        let (_, breakers) = registry();
        for _ in 0..5 {
            breakers.record_outcome(ErrorCategory::Network, true);
        }
        assert!(breakers.check_state(ErrorCategory::Network).is_open);
        assert!(!breakers.check_state(ErrorCategory::Database).is_open);
        assert_eq!(breakers.snapshot_all().len(), 2);
    }

    #[test]
    fn test_concurrent_failures_trip_once() {
        let (_, breakers) = registry();
        let opened = std::sync::atomic::AtomicU32::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10 {
                        let transition = breakers.record_outcome(ErrorCategory::Network, true);
                        if transition.is_some_and(|t| t.to == CircuitState::Open) {
                            opened.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(opened.load(std::sync::atomic::Ordering::Relaxed), 1);
        let state = breakers.check_state(ErrorCategory::Network);
        assert!(state.is_open);
        assert_eq!(state.failures, 80);
    }

    #[test]
    fn test_half_open_lists_due_breakers() {
        let (clock, breakers) = registry();
        for _ in 0..5 {
            breakers.record_outcome(ErrorCategory::Database, true);
            breakers.record_outcome(ErrorCategory::Network, true);
        }
        breakers.record_outcome(ErrorCategory::System, true);
        assert!(breakers.half_open().is_empty());

        clock.advance(Duration::from_secs(60));
        assert_eq!(
            breakers.half_open(),
            vec![ErrorCategory::Network, ErrorCategory::Database]
        );
    }
}
