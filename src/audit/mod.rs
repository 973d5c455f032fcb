//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! Registries and gateway decisions:
//!     → log.rs (append event, severity from severity.rs table)
//!     → FIFO eviction beyond max size
//!
//! Readers:
//!     → threat.rs (per-principal signals, system threat level)
//!     → report.rs (24h summary for export)
//!
//! Maintenance:
//!     → retention trim drops events older than the retention period
//! ```
//!
//! # Design Decisions
//! - One lock around the event deque; appends and reads are short
//! - Events are time-ordered, so window scans walk backwards and stop early
//! - Severity is never chosen by the caller, only by the action table

pub mod log;
pub mod report;
pub mod severity;
pub mod threat;

pub use log::{AuditEvent, AuditLog};
pub use report::{SecurityReport, SecurityMetrics};
pub use severity::{actions, severity_for, Severity, ThreatLevel};
pub use threat::{ThreatAnalyzer, ThreatFinding, ThreatKind};
