//! Threat signals derived from audit history.
//!
//! # Signals (per principal, trailing 5 minutes)
//! - `RAPID_ACTIONS` (HIGH): the same action at least 10 times
//! - `MULTIPLE_FAILURES` (HIGH): `failed*`/`invalid*` actions above `max_failed_attempts`
//! - `SESSION_ANOMALY` (MEDIUM): more than 5 session-related events
//!
//! # System level (trailing hour)
//! HIGH+ events: <3 LOW, 3–5 MEDIUM, 6–10 HIGH, >10 CRITICAL

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;

use crate::audit::log::AuditLog;
use crate::audit::severity::{Severity, ThreatLevel};

/// Window inspected by per-principal analysis.
pub const ANALYSIS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Window inspected for the overall threat level.
pub const LEVEL_WINDOW: Duration = Duration::from_secs(3600);

const RAPID_ACTION_THRESHOLD: usize = 10;
const SESSION_EVENT_THRESHOLD: usize = 5;

/// Kinds of threat signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    RapidActions,
    MultipleFailures,
    SessionAnomaly,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::RapidActions => "RAPID_ACTIONS",
            ThreatKind::MultipleFailures => "MULTIPLE_FAILURES",
            ThreatKind::SessionAnomaly => "SESSION_ANOMALY",
        }
    }
}

/// One detected signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreatFinding {
    pub kind: ThreatKind,
    pub severity: Severity,
    /// The repeated action, for `RAPID_ACTIONS`.
    pub action: Option<String>,
    pub count: usize,
}

/// Reads the audit log and scores principals and the system.
#[derive(Debug)]
pub struct ThreatAnalyzer {
    audit: Arc<AuditLog>,
    max_failed_attempts: usize,
}

fn is_failure_action(action: &str) -> bool {
    action.starts_with("failed") || action.starts_with("invalid")
}

fn is_session_action(action: &str) -> bool {
    action.contains("session")
}

impl ThreatAnalyzer {
    pub fn new(audit: Arc<AuditLog>, max_failed_attempts: usize) -> Self {
        Self {
            audit,
            max_failed_attempts,
        }
    }

    /// Inspect the last five minutes of a principal's events.
    pub fn analyze_threats(&self, principal_id: &str) -> Vec<ThreatFinding> {
        let events = self.audit.recent_events(principal_id, ANALYSIS_WINDOW);
        let mut findings = Vec::new();

        let mut per_action: HashMap<&str, usize> = HashMap::new();
        for event in &events {
            *per_action.entry(event.action.as_str()).or_insert(0) += 1;
        }
        let mut rapid: Vec<(&str, usize)> = per_action
            .into_iter()
            .filter(|(_, count)| *count >= RAPID_ACTION_THRESHOLD)
            .collect();
        rapid.sort_unstable();
        for (action, count) in rapid {
            findings.push(ThreatFinding {
                kind: ThreatKind::RapidActions,
                severity: Severity::High,
                action: Some(action.to_string()),
                count,
            });
        }

        let failures = events.iter().filter(|e| is_failure_action(&e.action)).count();
        if failures > self.max_failed_attempts {
            findings.push(ThreatFinding {
                kind: ThreatKind::MultipleFailures,
                severity: Severity::High,
                action: None,
                count: failures,
            });
        }

        let session_events = events.iter().filter(|e| is_session_action(&e.action)).count();
        if session_events > SESSION_EVENT_THRESHOLD {
            findings.push(ThreatFinding {
                kind: ThreatKind::SessionAnomaly,
                severity: Severity::Medium,
                action: None,
                count: session_events,
            });
        }

        if !findings.is_empty() {
            tracing::warn!(
                principal = %principal_id,
                findings = ?findings.iter().map(|f| f.kind.as_str()).collect::<Vec<_>>(),
                "Threat signals detected"
            );
        }
        findings
    }

    /// Highest severity among a principal's current findings.
    pub fn principal_threat_level(&self, principal_id: &str) -> ThreatLevel {
        self.analyze_threats(principal_id)
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Low)
    }

    /// System-wide level from HIGH+ events in the last hour.
    pub fn overall_threat_level(&self) -> ThreatLevel {
        level_for_count(self.audit.count_at_least(Severity::High, LEVEL_WINDOW))
    }
}

/// Bucket a count of HIGH+ events into a threat level.
pub fn level_for_count(high_events: usize) -> ThreatLevel {
    match high_events {
        0..=2 => Severity::Low,
        3..=5 => Severity::Medium,
        6..=10 => Severity::High,
        _ => Severity::Critical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::severity::actions;
    use crate::clock::ManualClock;
    use crate::config::AuditConfig;
    use serde_json::json;

    fn setup() -> (Arc<ManualClock>, Arc<AuditLog>, ThreatAnalyzer) {
        let clock = Arc::new(ManualClock::new(10_000_000));
        let audit = Arc::new(AuditLog::new(&AuditConfig::default(), clock.clone()));
        let analyzer = ThreatAnalyzer::new(audit.clone(), 5);
        (clock, audit, analyzer)
    }

    #[test]
    fn test_rapid_actions() {
        let (_, audit, analyzer) = setup();
        for _ in 0..9 {
            audit.log_event("u1", actions::RATE_LIMIT_EXCEEDED, json!({}));
        }
        assert!(analyzer.analyze_threats("u1").is_empty());

        audit.log_event("u1", actions::RATE_LIMIT_EXCEEDED, json!({}));
        let findings = analyzer.analyze_threats("u1");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ThreatKind::RapidActions);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].action.as_deref(), Some(actions::RATE_LIMIT_EXCEEDED));
        assert_eq!(findings[0].count, 10);
    }

    #[test]
    fn test_multiple_failures_needs_more_than_limit() {
        let (_, audit, analyzer) = setup();
        for _ in 0..3 {
            audit.log_event("u1", actions::INVALID_INPUT, json!({}));
            audit.log_event("u1", actions::FAILED_DECRYPTION, json!({}));
        }
        let findings = analyzer.analyze_threats("u1");
        assert!(findings.iter().any(|f| f.kind == ThreatKind::MultipleFailures && f.count == 6));
    }

    #[test]
    fn test_failures_at_limit_are_tolerated() {
        let (_, audit, analyzer) = setup();
        for _ in 0..5 {
            audit.log_event("u1", actions::INVALID_INPUT, json!({}));
        }
        assert!(analyzer
            .analyze_threats("u1")
            .iter()
            .all(|f| f.kind != ThreatKind::MultipleFailures));
    }

    #[test]
    fn test_session_anomaly() {
        let (_, audit, analyzer) = setup();
        for _ in 0..3 {
            audit.log_event("u1", actions::SESSION_CREATED, json!({}));
            audit.log_event("u1", actions::SESSION_EXPIRED, json!({}));
        }
        let findings = analyzer.analyze_threats("u1");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ThreatKind::SessionAnomaly);
        assert_eq!(analyzer.principal_threat_level("u1"), Severity::Medium);
    }

    #[test]
    fn test_old_events_fall_out_of_window() {
        let (clock, audit, analyzer) = setup();
        for _ in 0..12 {
            audit.log_event("u1", "command", json!({}));
        }
        assert!(!analyzer.analyze_threats("u1").is_empty());

        clock.advance(ANALYSIS_WINDOW + Duration::from_secs(1));
        assert!(analyzer.analyze_threats("u1").is_empty());
    }

    #[test]
    fn test_overall_level_buckets() {
        assert_eq!(level_for_count(0), Severity::Low);
        assert_eq!(level_for_count(2), Severity::Low);
        assert_eq!(level_for_count(3), Severity::Medium);
        assert_eq!(level_for_count(5), Severity::Medium);
        assert_eq!(level_for_count(6), Severity::High);
        assert_eq!(level_for_count(10), Severity::High);
        assert_eq!(level_for_count(11), Severity::Critical);
    }

    #[test]
    fn test_overall_level_from_log() {
        let (clock, audit, analyzer) = setup();
        for _ in 0..4 {
            audit.log_event("u1", actions::MALICIOUS_INPUT, json!({}));
        }
        audit.log_event("u2", actions::SESSION_CREATED, json!({}));
        assert_eq!(analyzer.overall_threat_level(), Severity::Medium);

        clock.advance(LEVEL_WINDOW + Duration::from_secs(1));
        assert_eq!(analyzer.overall_threat_level(), Severity::Low);
    }
}
