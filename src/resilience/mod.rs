//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Downstream failure:
//!     → classify.rs (category, priority, recoverability)
//!     → stats.rs (bounded error log, counters)
//!     → circuit_breaker.rs (is recovery for this category suspended?)
//!     → recovery.rs (pick a strategy and delay)
//!     → backoff.rs (jitter applied only when actually sleeping)
//!     → circuit_breaker.rs (record the attempt's outcome)
//! ```
//!
//! # Design Decisions
//! - Keyword tables are static and matched in a fixed order
//! - Retry budgets are bounded; unrecoverable errors never retry
//! - Circuit breaker prevents retry storms against a failing dependency
//! - Planned delays are deterministic so callers can report them

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod recovery;
pub mod stats;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreakerRegistry, CircuitState, Transition};
pub use classify::{ErrorCategory, ErrorClassifier, ErrorContext, ErrorInfo, Priority, RawError};
pub use recovery::{plan_recovery, RecoveryPlan, RecoveryStrategy};
pub use stats::{ErrorLog, ErrorStats};
