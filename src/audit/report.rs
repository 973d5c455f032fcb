//! Security report for observability export.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use serde::Serialize;

use crate::audit::log::{AuditEvent, AuditLog};
use crate::audit::severity::{actions, Severity, ThreatLevel};
use crate::audit::threat::ThreatAnalyzer;
use crate::clock::Millis;

/// Trailing window summarized by the report.
pub const REPORT_WINDOW: Duration = Duration::from_secs(24 * 3600);

const TOP_N: usize = 10;

/// A named counter in a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked {
    pub name: String,
    pub count: usize,
}

/// Headline security counters over the report window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityMetrics {
    pub rate_limit_hits: usize,
    pub hijack_attempts: usize,
    pub malicious_inputs: usize,
    pub blocks_issued: usize,
    pub failed_attempts: usize,
    pub critical_events: usize,
}

/// Last-24h activity summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivitySummary {
    pub total_events: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub top_actions: Vec<Ranked>,
    pub top_principals: Vec<Ranked>,
    pub metrics: SecurityMetrics,
}

/// Point-in-time security report.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub generated_at: Millis,
    pub active_sessions: usize,
    pub blocked_principals: usize,
    pub threat_level: ThreatLevel,
    pub last_24h: ActivitySummary,
}

impl SecurityReport {
    /// Build a report from the audit log and live registry counts.
    pub fn generate(
        audit: &AuditLog,
        analyzer: &ThreatAnalyzer,
        active_sessions: usize,
        blocked_principals: usize,
    ) -> Self {
        let events = audit.events_within(REPORT_WINDOW);
        Self {
            generated_at: audit.now_ms(),
            active_sessions,
            blocked_principals,
            threat_level: analyzer.overall_threat_level(),
            last_24h: summarize(&events),
        }
    }
}

fn rank(counts: HashMap<&str, usize>) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = counts
        .into_iter()
        .map(|(name, count)| Ranked {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(TOP_N);
    ranked
}

fn summarize(events: &[AuditEvent]) -> ActivitySummary {
    let mut by_severity = BTreeMap::new();
    let mut by_action: HashMap<&str, usize> = HashMap::new();
    let mut by_principal: HashMap<&str, usize> = HashMap::new();
    let mut metrics = SecurityMetrics::default();

    for event in events {
        *by_severity.entry(event.severity).or_insert(0) += 1;
        *by_action.entry(event.action.as_str()).or_insert(0) += 1;
        *by_principal.entry(event.principal_id.as_str()).or_insert(0) += 1;

        match event.action.as_str() {
            actions::RATE_LIMIT_EXCEEDED => metrics.rate_limit_hits += 1,
            actions::SESSION_HIJACK_ATTEMPT => metrics.hijack_attempts += 1,
            actions::MALICIOUS_INPUT => metrics.malicious_inputs += 1,
            actions::PRINCIPAL_BLOCKED => metrics.blocks_issued += 1,
            _ => {}
        }
        if event.action.starts_with("failed") || event.action.starts_with("invalid") {
            metrics.failed_attempts += 1;
        }
        if event.severity == Severity::Critical {
            metrics.critical_events += 1;
        }
    }

    ActivitySummary {
        total_events: events.len(),
        by_severity,
        top_actions: rank(by_action),
        top_principals: rank(by_principal),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AuditConfig;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_report_aggregates_last_day() {
        let clock = Arc::new(ManualClock::new(100_000_000));
        let audit = Arc::new(AuditLog::new(&AuditConfig::default(), clock.clone()));
        let analyzer = ThreatAnalyzer::new(audit.clone(), 5);

        audit.log_event("stale", actions::MALICIOUS_INPUT, json!({}));
        clock.advance(REPORT_WINDOW + Duration::from_secs(1));

        for _ in 0..3 {
            audit.log_event("u1", actions::RATE_LIMIT_EXCEEDED, json!({}));
        }
        audit.log_event("u2", actions::SESSION_HIJACK_ATTEMPT, json!({}));
        audit.log_event("u2", actions::INVALID_SESSION, json!({}));

        let report = SecurityReport::generate(&audit, &analyzer, 7, 2);
        assert_eq!(report.active_sessions, 7);
        assert_eq!(report.blocked_principals, 2);
        assert_eq!(report.last_24h.total_events, 5);
        assert_eq!(
            report.last_24h.top_actions[0],
            Ranked {
                name: actions::RATE_LIMIT_EXCEEDED.into(),
                count: 3
            }
        );
        assert_eq!(report.last_24h.top_principals[0].name, "u1");
        assert_eq!(report.last_24h.metrics.rate_limit_hits, 3);
        assert_eq!(report.last_24h.metrics.hijack_attempts, 1);
        assert_eq!(report.last_24h.metrics.failed_attempts, 1);
        assert_eq!(report.last_24h.metrics.malicious_inputs, 0);
        assert_eq!(report.last_24h.by_severity[&Severity::Medium], 4);
    }

    #[test]
    fn test_report_serializes() {
        let clock = Arc::new(ManualClock::new(0));
        let audit = Arc::new(AuditLog::new(&AuditConfig::default(), clock));
        let analyzer = ThreatAnalyzer::new(audit.clone(), 5);
        audit.log_event("u1", actions::PRINCIPAL_BLOCKED, json!({ "reason": "spam" }));

        let report = SecurityReport::generate(&audit, &analyzer, 0, 1);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["threat_level"], "LOW");
        assert_eq!(value["last_24h"]["by_severity"]["HIGH"], 1);
    }
}
