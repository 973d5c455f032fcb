//! Bounded, time-ordered store of security events.

use std::collections::VecDeque;
use std::time::Duration;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::severity::{severity_for, Severity};
use crate::clock::{Millis, SharedClock};
use crate::config::AuditConfig;
use crate::observability::metrics;

/// A single audited security event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: Millis,
    pub principal_id: String,
    pub action: String,
    pub severity: Severity,
    pub details: Value,
}

/// Append-only audit log with FIFO eviction and retention trimming.
#[derive(Debug)]
pub struct AuditLog {
    events: Mutex<VecDeque<AuditEvent>>,
    max_size: usize,
    retention: Duration,
    clock: SharedClock,
}

impl AuditLog {
    pub fn new(config: &AuditConfig, clock: SharedClock) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(config.max_log_size.min(1024))),
            max_size: config.max_log_size.max(1),
            retention: config.retention(),
            clock,
        }
    }

    /// Append an event, resolving its severity from the action table.
    ///
    /// The timestamp is taken under the lock and never runs behind the
    /// newest stored event, so the log stays ordered for the window scans.
    pub fn log_event(&self, principal_id: &str, action: &str, details: Value) -> AuditEvent {
        let severity = severity_for(action);
        let event = {
            let mut events = self.events.lock();
            let newest = events.back().map_or(0, |e| e.timestamp);
            let event = AuditEvent {
                id: Uuid::new_v4(),
                timestamp: self.clock.now_ms().max(newest),
                principal_id: principal_id.to_string(),
                action: action.to_string(),
                severity,
                details,
            };
            events.push_back(event.clone());
            while events.len() > self.max_size {
                events.pop_front();
            }
            event
        };

        match severity {
            Severity::Critical => tracing::error!(
                principal = %principal_id,
                action,
                severity = %severity,
                details = %event.details,
                "Security event"
            ),
            Severity::High => tracing::warn!(
                principal = %principal_id,
                action,
                severity = %severity,
                details = %event.details,
                "Security event"
            ),
            _ => tracing::debug!(
                principal = %principal_id,
                action,
                severity = %severity,
                "Security event"
            ),
        }
        metrics::record_audit_event(severity);
        event
    }

    /// Events for a principal inside the trailing window, oldest first.
    pub fn recent_events(&self, principal_id: &str, window: Duration) -> Vec<AuditEvent> {
        let cutoff = self.cutoff(window);
        let events = self.events.lock();
        let mut recent: Vec<AuditEvent> = events
            .iter()
            .rev()
            .take_while(|e| e.timestamp >= cutoff)
            .filter(|e| e.principal_id == principal_id)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// All events inside the trailing window, oldest first.
    pub fn events_within(&self, window: Duration) -> Vec<AuditEvent> {
        let cutoff = self.cutoff(window);
        let events = self.events.lock();
        let mut recent: Vec<AuditEvent> = events
            .iter()
            .rev()
            .take_while(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Count events at or above `min` severity inside the trailing window.
    pub fn count_at_least(&self, min: Severity, window: Duration) -> usize {
        let cutoff = self.cutoff(window);
        self.events
            .lock()
            .iter()
            .rev()
            .take_while(|e| e.timestamp >= cutoff)
            .filter(|e| e.severity >= min)
            .count()
    }

    /// Drop events older than the retention period. Returns how many were removed.
    pub fn trim_retention(&self) -> usize {
        let cutoff = self.cutoff(self.retention);
        let mut events = self.events.lock();
        let before = events.len();
        while events.front().is_some_and(|e| e.timestamp < cutoff) {
            events.pop_front();
        }
        before - events.len()
    }

    /// Copy of every retained event, oldest first.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub(crate) fn now_ms(&self) -> Millis {
        self.clock.now_ms()
    }

    fn cutoff(&self, window: Duration) -> Millis {
        self.clock.now_ms().saturating_sub(window.as_millis() as u64)
    }
}
