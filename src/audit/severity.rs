//! Severity scale and the static action → severity table.
//!
//! Every audited action name lives in [`actions`]; [`severity_for`] resolves
//! its severity from [`SEVERITY_TABLE`]. Unknown actions are `Low`.

use serde::{Deserialize, Serialize};

/// Ordered severity scale, also used for threat levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Threat levels share the severity scale.
pub type ThreatLevel = Severity;

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Numeric form for gauges.
    pub fn as_gauge(&self) -> f64 {
        match self {
            Severity::Low => 0.0,
            Severity::Medium => 1.0,
            Severity::High => 2.0,
            Severity::Critical => 3.0,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audited action names.
pub mod actions {
    pub const SESSION_CREATED: &str = "session_created";
    pub const SESSION_ROTATED: &str = "session_rotated";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const SESSION_HIJACK_ATTEMPT: &str = "session_hijack_attempt";
    pub const INVALID_SESSION: &str = "invalid_session";

    pub const RATE_LIMIT_EXCEEDED: &str = "rate_limit_exceeded";

    pub const PRINCIPAL_BLOCKED: &str = "principal_blocked";
    pub const PRINCIPAL_UNBLOCKED: &str = "principal_unblocked";
    pub const BLOCKED_ACCESS_ATTEMPT: &str = "blocked_access_attempt";

    pub const MALICIOUS_INPUT: &str = "malicious_input";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const THREAT_DETECTED: &str = "threat_detected";

    pub const FAILED_DECRYPTION: &str = "failed_decryption";
    pub const ENCRYPTION_FAILURE: &str = "encryption_failure";

    pub const RECOVERABLE_ERROR: &str = "recoverable_error";
    pub const UNRECOVERABLE_ERROR: &str = "unrecoverable_error";
    pub const CRITICAL_ERROR: &str = "critical_error";
    pub const CIRCUIT_OPENED: &str = "circuit_opened";
    pub const CIRCUIT_CLOSED: &str = "circuit_closed";
}

/// Central action → severity mapping.
pub const SEVERITY_TABLE: &[(&str, Severity)] = &[
    (actions::SESSION_CREATED, Severity::Low),
    (actions::SESSION_ROTATED, Severity::Low),
    (actions::SESSION_EXPIRED, Severity::Low),
    (actions::SESSION_HIJACK_ATTEMPT, Severity::High),
    (actions::INVALID_SESSION, Severity::Medium),
    (actions::RATE_LIMIT_EXCEEDED, Severity::Medium),
    (actions::PRINCIPAL_BLOCKED, Severity::High),
    (actions::PRINCIPAL_UNBLOCKED, Severity::Low),
    (actions::BLOCKED_ACCESS_ATTEMPT, Severity::Medium),
    (actions::MALICIOUS_INPUT, Severity::High),
    (actions::INVALID_INPUT, Severity::Medium),
    (actions::THREAT_DETECTED, Severity::High),
    (actions::FAILED_DECRYPTION, Severity::High),
    (actions::ENCRYPTION_FAILURE, Severity::Medium),
    (actions::RECOVERABLE_ERROR, Severity::Low),
    (actions::UNRECOVERABLE_ERROR, Severity::Critical),
    (actions::CRITICAL_ERROR, Severity::Critical),
    (actions::CIRCUIT_OPENED, Severity::High),
    (actions::CIRCUIT_CLOSED, Severity::Low),
];

/// Resolve the severity of an action name.
pub fn severity_for(action: &str) -> Severity {
    SEVERITY_TABLE
        .iter()
        .find(|(name, _)| *name == action)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_has_no_duplicates() {
        let mut seen = HashSet::new();
        for (name, _) in SEVERITY_TABLE {
            assert!(seen.insert(*name), "duplicate entry {}", name);
        }
    }

    #[test]
    fn test_known_severities() {
        assert_eq!(severity_for(actions::SESSION_HIJACK_ATTEMPT), Severity::High);
        assert_eq!(severity_for(actions::UNRECOVERABLE_ERROR), Severity::Critical);
        assert_eq!(severity_for(actions::RATE_LIMIT_EXCEEDED), Severity::Medium);
        assert_eq!(severity_for(actions::SESSION_CREATED), Severity::Low);
    }

    #[test]
    fn test_unknown_action_defaults_low() {
        assert_eq!(severity_for("attendance_marked"), Severity::Low);
    }

    #[test]
    fn test_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
