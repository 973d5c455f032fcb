//! Shared utilities for integration testing.

use std::sync::Arc;
use std::time::Duration;
use message_gate::security::rate_limit::ActionClass;
use message_gate::{GatewayConfig, InboundMessage, ManualClock, SecurityGateway};

/// Fixed start time for the manual clock.
pub const START_MS: u64 = 1_700_000_000_000;

/// A gateway driven by a manual clock.
pub struct TestGateway {
    pub clock: Arc<ManualClock>,
    pub gateway: SecurityGateway,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let gateway = SecurityGateway::new(config, clock.clone());
        Self { clock, gateway }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Build an inbound message without a session.
pub fn message(principal: &str, action: ActionClass, payload: &str) -> InboundMessage {
    InboundMessage {
        principal_id: principal.to_string(),
        action,
        payload: payload.to_string(),
        session_id: None,
    }
}

/// Build an inbound message asserting a session.
#[allow(dead_code)]
pub fn message_with_session(principal: &str, session_id: &str, payload: &str) -> InboundMessage {
    InboundMessage {
        session_id: Some(session_id.to_string()),
        ..message(principal, ActionClass::Message, payload)
    }
}
