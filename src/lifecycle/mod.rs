//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build gateway → Spawn maintenance → Serve
//!
//! Maintenance (maintenance.rs):
//!     interval tick → sweep / prune / trim / report
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → tasks exit → drain with deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then gateway, then tasks
//! - Shutdown has timeout: stragglers are abandoned after the grace period

pub mod maintenance;
pub mod shutdown;
pub mod signals;

pub use maintenance::{spawn_maintenance, MaintenanceTask};
pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
