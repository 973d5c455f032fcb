//! Recovery planning per error category.
//!
//! # Strategies
//! - NETWORK: exponential backoff, `base * 2^retry_count`
//! - DATABASE: reconnect on refused connections, sanitize-and-retry on
//!   constraint or validation failures, otherwise bounded retry
//! - TRANSPORT: reconnect on disconnects, fixed backoff when rate limited
//! - VALIDATION: sanitize-and-retry
//! - everything else: bounded retry
//!
//! Every strategy gives up once `retry_count` reaches `max_retry_attempts`,
//! and unrecoverable errors are never retried.

use std::time::Duration;
use serde::Serialize;

use crate::config::RecoveryConfig;
use crate::resilience::backoff::exponential_delay;
use crate::resilience::classify::{ErrorCategory, ErrorInfo, RATE_LIMIT_KEYWORDS};

const REFUSED_KEYWORDS: &[&str] = &["econnrefused", "connection refused"];
const DISCONNECT_KEYWORDS: &[&str] = &[
    "disconnected",
    "econnreset",
    "connection reset",
    "socket hang up",
    "closed",
];
const INPUT_KEYWORDS: &[&str] = &["constraint", "validation", "invalid", "malformed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    ExponentialBackoff,
    Reconnect,
    SanitizeAndRetry,
    FixedBackoff,
    BoundedRetry,
    GiveUp,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::ExponentialBackoff => "exponential_backoff",
            RecoveryStrategy::Reconnect => "reconnect",
            RecoveryStrategy::SanitizeAndRetry => "sanitize_and_retry",
            RecoveryStrategy::FixedBackoff => "fixed_backoff",
            RecoveryStrategy::BoundedRetry => "bounded_retry",
            RecoveryStrategy::GiveUp => "give_up",
        }
    }
}

/// What to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryPlan {
    pub strategy: RecoveryStrategy,
    /// Wait before the next attempt.
    pub delay: Duration,
    /// Retry count the next attempt will carry.
    pub next_retry: u32,
}

impl RecoveryPlan {
    pub fn give_up(retry_count: u32) -> Self {
        Self {
            strategy: RecoveryStrategy::GiveUp,
            delay: Duration::ZERO,
            next_retry: retry_count,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.strategy != RecoveryStrategy::GiveUp
    }
}

pub fn plan_recovery(info: &ErrorInfo, policy: &RecoveryConfig) -> RecoveryPlan {
    if !info.is_recoverable || info.retry_count >= policy.max_retry_attempts {
        return RecoveryPlan::give_up(info.retry_count);
    }

    let base = Duration::from_millis(policy.base_delay_ms);
    let (strategy, delay) = match info.category {
        ErrorCategory::Network => (
            RecoveryStrategy::ExponentialBackoff,
            exponential_delay(info.retry_count, policy.base_delay_ms, policy.max_delay_ms),
        ),
        ErrorCategory::Database if info.matches_any(REFUSED_KEYWORDS) => {
            (RecoveryStrategy::Reconnect, base)
        }
        ErrorCategory::Database if info.matches_any(INPUT_KEYWORDS) => {
            (RecoveryStrategy::SanitizeAndRetry, Duration::ZERO)
        }
        ErrorCategory::Transport if info.matches_any(RATE_LIMIT_KEYWORDS) => (
            RecoveryStrategy::FixedBackoff,
            Duration::from_millis(policy.transport_backoff_ms),
        ),
        ErrorCategory::Transport if info.matches_any(DISCONNECT_KEYWORDS) => {
            (RecoveryStrategy::Reconnect, base)
        }
        ErrorCategory::Validation => (RecoveryStrategy::SanitizeAndRetry, Duration::ZERO),
        _ => (RecoveryStrategy::BoundedRetry, base),
    };

    RecoveryPlan {
        strategy,
        delay,
        next_retry: info.retry_count + 1,
    }
}
