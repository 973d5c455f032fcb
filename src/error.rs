//! Gate decision and failure taxonomy.

use std::time::Duration;
use serde::Serialize;
use thiserror::Error;

use crate::gateway::messages::{self, Notice};
use crate::resilience::classify::ErrorCategory;

/// Why a session failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionInvalid {
    /// No session with that token exists.
    NotFound,
    /// The session belongs to a different principal.
    Mismatch,
    /// The session was expired earlier.
    Inactive,
    /// The session outlived the configured timeout.
    Expired,
}

impl SessionInvalid {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionInvalid::NotFound => "not_found",
            SessionInvalid::Mismatch => "mismatch",
            SessionInvalid::Inactive => "inactive",
            SessionInvalid::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionInvalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by admission and failure handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GateError {
    /// The principal exhausted the budget for an action class.
    #[error("rate limit exceeded for {action}, retry in {retry_after:?}")]
    RateLimitExceeded { action: String, retry_after: Duration },

    /// Payload was oversized, malformed or looked malicious.
    #[error("security violation: {}", warnings.join("; "))]
    SecurityViolation { warnings: Vec<String> },

    /// The asserted session failed validation.
    #[error("session invalid: {0}")]
    SessionInvalid(SessionInvalid),

    /// The principal is serving a block.
    #[error("principal blocked ({reason}), {remaining:?} remaining")]
    PrincipalBlocked { reason: String, remaining: Duration },

    /// Recovery for the category is suspended by its circuit breaker.
    #[error("circuit open for {category}, next attempt in {retry_after:?}")]
    CircuitOpen {
        category: ErrorCategory,
        retry_after: Duration,
    },

    /// Failure is retryable but the retry budget ran out.
    #[error("{category} failure not recovered after {attempts} attempts: {message}")]
    Recoverable {
        category: ErrorCategory,
        attempts: u32,
        message: String,
    },

    /// Failure that must not be retried.
    #[error("unrecoverable {category} failure: {message}")]
    Unrecoverable {
        category: ErrorCategory,
        message: String,
    },
}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// Denials that end processing of the current message without retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GateError::PrincipalBlocked { .. }
                | GateError::RateLimitExceeded { .. }
                | GateError::CircuitOpen { .. }
                | GateError::SecurityViolation { .. }
                | GateError::SessionInvalid(_)
                | GateError::Unrecoverable { .. }
        )
    }

    /// How long the caller should wait before trying again, when known.
    pub fn wait_hint(&self) -> Option<Duration> {
        match self {
            GateError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            GateError::PrincipalBlocked { remaining, .. } => Some(*remaining),
            GateError::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Short machine-readable kind, used for metrics labels and audit details.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            GateError::SecurityViolation { .. } => "security_violation",
            GateError::SessionInvalid(_) => "session_invalid",
            GateError::PrincipalBlocked { .. } => "principal_blocked",
            GateError::CircuitOpen { .. } => "circuit_open",
            GateError::Recoverable { .. } => "recoverable",
            GateError::Unrecoverable { .. } => "unrecoverable",
        }
    }

    /// Text safe to show the end user. Never carries error internals.
    pub fn user_message(&self) -> String {
        let notice = match self {
            GateError::RateLimitExceeded { .. } => Notice::RateLimited,
            GateError::SecurityViolation { .. } => Notice::Rejected,
            GateError::SessionInvalid(_) => Notice::SessionInvalid,
            GateError::PrincipalBlocked { .. } => Notice::Blocked,
            GateError::CircuitOpen { category, .. }
            | GateError::Recoverable { category, .. }
            | GateError::Unrecoverable { category, .. } => Notice::Failure(*category),
        };
        messages::render(notice, self.wait_hint())
    }
}
