//! Sliding-window rate limiting per (principal, action class).

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Millis, SharedClock};
use crate::config::{RateLimitConfig, RateRule};
use crate::observability::metrics;

/// Classes of inbound action, each with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    Command,
    Message,
    Registration,
    SubjectMutation,
}

impl ActionClass {
    pub const ALL: [ActionClass; 4] = [
        ActionClass::Command,
        ActionClass::Message,
        ActionClass::Registration,
        ActionClass::SubjectMutation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionClass::Command => "command",
            ActionClass::Message => "message",
            ActionClass::Registration => "registration",
            ActionClass::SubjectMutation => "subject_mutation",
        }
    }
}

impl std::fmt::Display for ActionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action class '{0}'")]
pub struct UnknownActionClass(pub String);

impl FromStr for ActionClass {
    type Err = UnknownActionClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| UnknownActionClass(s.to_string()))
    }
}

/// Point-in-time view of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: Duration,
}

/// Counters exported by [`RateLimiter::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub tracked_windows: usize,
    pub admitted_total: u64,
    pub limited_total: u64,
    pub fail_open_total: u64,
}

type WindowKey = (String, ActionClass);

/// Sliding-window limiter.
///
/// Each key's deque is mutated under its DashMap shard lock, so the
/// prune → compare → append sequence is atomic per key.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<WindowKey, VecDeque<Millis>>,
    config: ArcSwap<RateLimitConfig>,
    clock: SharedClock,
    admitted: AtomicU64,
    limited: AtomicU64,
    fail_open: AtomicU64,
}

fn prune(window: &mut VecDeque<Millis>, now: Millis, window_ms: u64) {
    while window
        .front()
        .is_some_and(|t| now.saturating_sub(*t) >= window_ms)
    {
        window.pop_front();
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            windows: DashMap::new(),
            config: ArcSwap::from_pointee(config),
            clock,
            admitted: AtomicU64::new(0),
            limited: AtomicU64::new(0),
            fail_open: AtomicU64::new(0),
        }
    }

    /// Replace the rule table. Existing windows are re-evaluated lazily.
    pub fn reload(&self, config: RateLimitConfig) {
        self.config.store(Arc::new(config));
        tracing::info!("Rate limit rules reloaded");
    }

    /// Look up a usable rule, or `None` to fail open.
    fn rule_for(&self, class: ActionClass) -> Option<RateRule> {
        let config = self.config.load();
        if !config.enabled {
            return None;
        }
        match config.rules.get(class.as_str()) {
            Some(rule) if rule.limit > 0 && rule.window_secs > 0 => Some(*rule),
            Some(rule) => {
                tracing::error!(action = %class, ?rule, "Unusable rate rule, failing open");
                self.fail_open.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                tracing::warn!(action = %class, "No rate rule configured, failing open");
                self.fail_open.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record a request. Returns `true` when the request is limited.
    ///
    /// Limited requests are not recorded.
    pub fn admit(&self, principal_id: &str, class: ActionClass) -> bool {
        let Some(rule) = self.rule_for(class) else {
            return false;
        };
        let now = self.clock.now_ms();
        let window_ms = rule.window_secs.saturating_mul(1000);

        let mut window = self
            .windows
            .entry((principal_id.to_string(), class))
            .or_default();
        prune(&mut window, now, window_ms);

        if window.len() >= rule.limit as usize {
            drop(window);
            self.limited.fetch_add(1, Ordering::Relaxed);
            metrics::record_rate_limited(class.as_str());
            tracing::debug!(
                principal = %principal_id,
                action = %class,
                limit = rule.limit,
                "Rate limit exceeded"
            );
            return true;
        }

        window.push_back(now);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Requests left in the current window.
    pub fn remaining(&self, principal_id: &str, class: ActionClass) -> u32 {
        self.status(principal_id, class).remaining
    }

    /// Time until the oldest recorded request leaves the window.
    pub fn reset_in(&self, principal_id: &str, class: ActionClass) -> Duration {
        self.status(principal_id, class).reset_in
    }

    /// Limit, remaining budget and reset time for one key.
    ///
    /// Keys without a usable rule report an unlimited budget.
    pub fn status(&self, principal_id: &str, class: ActionClass) -> RateStatus {
        let Some(rule) = self.rule_for(class) else {
            return RateStatus {
                limit: u32::MAX,
                remaining: u32::MAX,
                reset_in: Duration::ZERO,
            };
        };
        let now = self.clock.now_ms();
        let window_ms = rule.window_secs.saturating_mul(1000);

        let key = (principal_id.to_string(), class);
        let Some(mut window) = self.windows.get_mut(&key) else {
            return RateStatus {
                limit: rule.limit,
                remaining: rule.limit,
                reset_in: Duration::ZERO,
            };
        };
        prune(&mut window, now, window_ms);

        let used = window.len().min(rule.limit as usize) as u32;
        let reset_in = window
            .front()
            .map(|oldest| Duration::from_millis((oldest + window_ms).saturating_sub(now)))
            .unwrap_or(Duration::ZERO);

        RateStatus {
            limit: rule.limit,
            remaining: rule.limit - used,
            reset_in,
        }
    }

    /// Prune every window and drop the empty ones. Returns windows removed.
    pub fn prune_all(&self) -> usize {
        let config = self.config.load_full();
        let now = self.clock.now_ms();
        let before = self.windows.len();

        self.windows.retain(|(_, class), window| {
            if let Some(rule) = config.rules.get(class.as_str()) {
                prune(window, now, rule.window_secs.saturating_mul(1000));
            } else {
                window.clear();
            }
            !window.is_empty()
        });

        before.saturating_sub(self.windows.len())
    }

    /// Forget every window of a principal.
    pub fn reset_principal(&self, principal_id: &str) {
        self.windows.retain(|(principal, _), _| principal != principal_id);
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            tracked_windows: self.windows.len(),
            admitted_total: self.admitted.load(Ordering::Relaxed),
            limited_total: self.limited.load(Ordering::Relaxed),
            fail_open_total: self.fail_open.load(Ordering::Relaxed),
        }
    }
}
