//! Request gating for an attendance-tracking chat bot.
//!
//! Every inbound message passes through [`SecurityGateway::admit`] before any
//! business logic runs; downstream failures go through
//! [`SecurityGateway::handle_error`] or [`SecurityGateway::run_with_recovery`].

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::schema::GatewayConfig;
pub use error::{GateError, GateResult, SessionInvalid};
pub use gateway::{Admission, FailureOutcome, InboundMessage, SecurityGateway};
pub use lifecycle::Shutdown;
