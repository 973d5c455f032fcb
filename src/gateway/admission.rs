//! Admission pipeline.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::severity::{actions, Severity};
use crate::error::{GateError, GateResult};
use crate::gateway::SecurityGateway;
use crate::observability::metrics;
use crate::security::block::{BlockRecord, BlockStatus};
use crate::security::rate_limit::ActionClass;
use crate::security::sanitizer::SecurityCheck;

/// Reason recorded when a payload check blocks the sender.
const VIOLATION_BLOCK_REASON: &str = "security_violation";
/// Reason recorded when threat analysis blocks the sender.
const THREAT_BLOCK_REASON: &str = "threat_detected";

/// A message awaiting admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub principal_id: String,
    pub action: ActionClass,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A message cleared to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub principal_id: String,
    pub action: ActionClass,
    pub sanitized_payload: String,
    /// Requests left in the current window for this action class.
    pub remaining: u32,
}

impl SecurityGateway {
    /// Decide whether a message may proceed.
    ///
    /// Checks run in order (block, rate limit, payload, session) and stop at
    /// the first denial.
    pub fn admit(&self, message: &InboundMessage) -> GateResult<Admission> {
        let result = self.run_checks(message);
        metrics::record_admission(match &result {
            Ok(_) => "admitted",
            Err(e) => e.kind(),
        });
        if let Err(e) = &result {
            tracing::warn!(
                principal = %message.principal_id,
                action = %message.action,
                denial = e.kind(),
                "Message denied"
            );
        }
        result
    }

    fn run_checks(&self, message: &InboundMessage) -> GateResult<Admission> {
        let principal_id = message.principal_id.as_str();

        self.check_block(principal_id, message.action)?;
        self.check_rate_limit(principal_id, message.action)?;
        let check = self.check_payload(principal_id, &message.payload)?;
        if let Some(session_id) = &message.session_id {
            self.check_session(principal_id, session_id)?;
        }

        Ok(Admission {
            principal_id: principal_id.to_string(),
            action: message.action,
            sanitized_payload: check.sanitized,
            remaining: self.registries.rate_limiter.remaining(principal_id, message.action),
        })
    }

    /// Block check on its own, for collaborators that gate other entry points.
    pub fn is_blocked(&self, principal_id: &str) -> BlockStatus {
        self.registries.blocks.is_blocked(principal_id)
    }

    /// Inspect a payload without running the rest of the pipeline.
    pub fn security_check(&self, raw: &str) -> SecurityCheck {
        self.registries.sanitizer.security_check(raw)
    }

    fn check_block(&self, principal_id: &str, action: ActionClass) -> GateResult<()> {
        match self.registries.blocks.is_blocked(principal_id) {
            BlockStatus::NotBlocked => Ok(()),
            BlockStatus::Blocked { reason, remaining } => {
                self.registries.audit.log_event(
                    principal_id,
                    actions::BLOCKED_ACCESS_ATTEMPT,
                    json!({
                        "action": action.as_str(),
                        "reason": reason,
                        "remaining_ms": remaining.as_millis() as u64,
                    }),
                );
                Err(GateError::PrincipalBlocked { reason, remaining })
            }
        }
    }

    fn check_rate_limit(&self, principal_id: &str, action: ActionClass) -> GateResult<()> {
        let limiter = &self.registries.rate_limiter;
        if !limiter.admit(principal_id, action) {
            return Ok(());
        }

        let retry_after = limiter.reset_in(principal_id, action);
        self.registries.audit.log_event(
            principal_id,
            actions::RATE_LIMIT_EXCEEDED,
            json!({ "action": action.as_str(), "retry_after_ms": retry_after.as_millis() as u64 }),
        );
        self.escalate_on_threat(principal_id);
        Err(GateError::RateLimitExceeded {
            action: action.as_str().to_string(),
            retry_after,
        })
    }

    fn check_payload(&self, principal_id: &str, payload: &str) -> GateResult<SecurityCheck> {
        let r = &self.registries;
        let check = r.sanitizer.security_check(payload);
        if check.is_secure {
            return Ok(check);
        }

        let action = if check.is_malicious() {
            actions::MALICIOUS_INPUT
        } else {
            actions::INVALID_INPUT
        };
        r.audit.log_event(
            principal_id,
            action,
            json!({ "findings": check.findings, "length": payload.chars().count() }),
        );

        if r.sanitizer.blocks_on_violation() {
            r.blocks.block(principal_id, VIOLATION_BLOCK_REASON, None);
        } else {
            self.escalate_on_threat(principal_id);
        }
        Err(GateError::SecurityViolation {
            warnings: check.warnings,
        })
    }

    fn check_session(&self, principal_id: &str, session_id: &str) -> GateResult<()> {
        self.registries
            .sessions
            .validate_session(session_id, principal_id)
            .map_err(|reason| {
                self.escalate_on_threat(principal_id);
                GateError::SessionInvalid(reason)
            })
    }

    /// Run threat analysis for a principal after a denial.
    ///
    /// MEDIUM or worse raises the threat level of the principal's sessions;
    /// HIGH or worse also blocks the principal unless it is already blocked.
    pub fn escalate_on_threat(&self, principal_id: &str) -> Option<BlockRecord> {
        let r = &self.registries;
        let findings = r.threats.analyze_threats(principal_id);
        let level = findings.iter().map(|f| f.severity).max()?;

        if level >= Severity::Medium {
            r.sessions.set_threat_level(principal_id, level);
        }
        if level < Severity::High || r.blocks.is_blocked(principal_id).is_blocked() {
            return None;
        }

        r.audit.log_event(
            principal_id,
            actions::THREAT_DETECTED,
            json!({ "findings": findings, "level": level }),
        );
        Some(r.blocks.block(principal_id, THREAT_BLOCK_REASON, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::GatewayConfig;
    use std::sync::Arc;

    fn message(principal: &str, action: ActionClass, payload: &str) -> InboundMessage {
        InboundMessage {
            principal_id: principal.to_string(),
            action,
            payload: payload.to_string(),
            session_id: None,
        }
    }

    fn gateway() -> SecurityGateway {
        SecurityGateway::new(GatewayConfig::default(), Arc::new(ManualClock::new(1_000_000)))
    }

    #[test]
    fn test_clean_message_admitted() {
        let gateway = gateway();
        let admission = gateway
            .admit(&message("u1", ActionClass::Command, "  /present physics "))
            .unwrap();
        assert_eq!(admission.sanitized_payload, "/present physics");
        assert_eq!(admission.remaining, 9);
    }

    #[test]
    fn test_blocked_principal_short_circuits() {
        let gateway = gateway();
        gateway.block_user("u1", "manual", Some(std::time::Duration::from_secs(60)));

        let err = gateway
            .admit(&message("u1", ActionClass::Command, "hi"))
            .unwrap_err();
        assert!(matches!(err, GateError::PrincipalBlocked { .. }));
        assert_eq!(
            gateway.rate_limiter().remaining("u1", ActionClass::Command),
            10
        );
    }

    #[test]
    fn test_violation_blocks_sender() {
        let gateway = gateway();
        let err = gateway
            .admit(&message("u1", ActionClass::Message, "<script>alert(1)</script>"))
            .unwrap_err();
        assert!(matches!(err, GateError::SecurityViolation { .. }));
        assert!(gateway.is_blocked("u1").is_blocked());
        assert_eq!(gateway.blocks().offence_count("u1"), 1);
    }

    #[test]
    fn test_repeated_session_failures_escalate() {
        let gateway = gateway();
        let mut msg = message("u1", ActionClass::Command, "hi");
        msg.session_id = Some("forged".into());

        for _ in 0..5 {
            assert!(matches!(
                gateway.admit(&msg),
                Err(GateError::SessionInvalid(_))
            ));
        }
        assert!(!gateway.is_blocked("u1").is_blocked());

        assert!(gateway.admit(&msg).is_err());
        match gateway.is_blocked("u1") {
            BlockStatus::Blocked { reason, .. } => assert_eq!(reason, THREAT_BLOCK_REASON),
            BlockStatus::NotBlocked => panic!("expected threat block"),
        }
    }
}
