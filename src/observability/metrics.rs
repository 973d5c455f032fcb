//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gate metrics (admissions, denials, blocks, errors, breakers)
//! - Expose Prometheus-compatible metrics endpoint
//! - Refresh gauges from the periodic threat report
//!
//! # Metrics
//! - `gate_admissions_total` (counter): decisions by outcome
//! - `gate_rate_limited_total` (counter): rate-limit hits by action class
//! - `gate_blocks_total` (counter): blocks issued by reason
//! - `gate_audit_events_total` (counter): audit events by severity
//! - `gate_errors_total` (counter): classified errors by category, priority
//! - `gate_config_reloads_total` (counter): reload attempts by outcome
//! - `gate_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gate_active_sessions` / `gate_blocked_principals` / `gate_threat_level` (gauges)
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so the library
//!   never requires the exporter
//! - Labels are small closed sets (never principal ids)

use std::net::SocketAddr;

use crate::audit::severity::Severity;

const COUNTER_ADMISSIONS: &str = "gate_admissions_total";
const COUNTER_RATE_LIMITED: &str = "gate_rate_limited_total";
const COUNTER_BLOCKS: &str = "gate_blocks_total";
const COUNTER_AUDIT_EVENTS: &str = "gate_audit_events_total";
const COUNTER_ERRORS: &str = "gate_errors_total";
const COUNTER_RECOVERY_ATTEMPTS: &str = "gate_recovery_attempts_total";
const COUNTER_CONFIG_RELOADS: &str = "gate_config_reloads_total";
const GAUGE_CIRCUIT_STATE: &str = "gate_circuit_state";
const GAUGE_ACTIVE_SESSIONS: &str = "gate_active_sessions";
const GAUGE_BLOCKED_PRINCIPALS: &str = "gate_blocked_principals";
const GAUGE_THREAT_LEVEL: &str = "gate_threat_level";

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Record an admission decision (`admitted` or a denial kind).
pub fn record_admission(outcome: &'static str) {
    metrics::counter!(COUNTER_ADMISSIONS, "outcome" => outcome).increment(1);
}

/// Record a rate-limit hit.
pub fn record_rate_limited(action_class: &'static str) {
    metrics::counter!(COUNTER_RATE_LIMITED, "action" => action_class).increment(1);
}

/// Record a block being issued.
pub fn record_block(reason: &str) {
    metrics::counter!(COUNTER_BLOCKS, "reason" => reason.to_string()).increment(1);
}

/// Record an audit event.
pub fn record_audit_event(severity: Severity) {
    metrics::counter!(COUNTER_AUDIT_EVENTS, "severity" => severity.as_str()).increment(1);
}

/// Record a classified error.
pub fn record_error(category: &'static str, priority: &'static str) {
    metrics::counter!(COUNTER_ERRORS, "category" => category, "priority" => priority).increment(1);
}

/// Record a recovery attempt and the chosen strategy.
pub fn record_recovery_attempt(category: &'static str, strategy: &'static str) {
    metrics::counter!(COUNTER_RECOVERY_ATTEMPTS, "category" => category, "strategy" => strategy)
        .increment(1);
}

/// Record a config reload attempt (`accepted`, `unchanged` or `rejected`).
pub fn record_config_reload(outcome: &'static str) {
    metrics::counter!(COUNTER_CONFIG_RELOADS, "outcome" => outcome).increment(1);
}

/// Record breaker state for a category.
pub fn record_circuit_state(category: &'static str, state_value: f64) {
    metrics::gauge!(GAUGE_CIRCUIT_STATE, "category" => category).set(state_value);
}

/// Record the number of live sessions.
pub fn record_active_sessions(count: usize) {
    metrics::gauge!(GAUGE_ACTIVE_SESSIONS).set(count as f64);
}

/// Record the number of blocked principals.
pub fn record_blocked_principals(count: usize) {
    metrics::gauge!(GAUGE_BLOCKED_PRINCIPALS).set(count as f64);
}

/// Record the overall threat level.
pub fn record_threat_level(level: Severity) {
    metrics::gauge!(GAUGE_THREAT_LEVEL).set(level.as_gauge());
}
