//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured log fields)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, compact/pretty/json)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Periodic SecurityReport (lifecycle::maintenance)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Principal ids appear in logs, never in metric labels
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
