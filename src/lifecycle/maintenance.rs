//! Periodic background maintenance.
//!
//! # Responsibilities
//! - Expire timed-out sessions and purge tombstones
//! - Prune empty rate-limit windows
//! - Trim the audit log to its retention period
//! - Clear expired blocks
//! - Log a periodic security report and refresh gauges
//!
//! # Design Decisions
//! - One task per job, each with its own interval
//! - Jobs are synchronous; no lock is held across an await
//! - Every task exits on the shared shutdown broadcast

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::MaintenanceConfig;
use crate::gateway::SecurityGateway;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTask {
    SessionSweep,
    RateLimitPrune,
    AuditTrim,
    BlockSweep,
    ThreatReport,
}

impl MaintenanceTask {
    pub const ALL: [MaintenanceTask; 5] = [
        MaintenanceTask::SessionSweep,
        MaintenanceTask::RateLimitPrune,
        MaintenanceTask::AuditTrim,
        MaintenanceTask::BlockSweep,
        MaintenanceTask::ThreatReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceTask::SessionSweep => "session_sweep",
            MaintenanceTask::RateLimitPrune => "rate_limit_prune",
            MaintenanceTask::AuditTrim => "audit_trim",
            MaintenanceTask::BlockSweep => "block_sweep",
            MaintenanceTask::ThreatReport => "threat_report",
        }
    }

    pub fn interval(&self, config: &MaintenanceConfig) -> Duration {
        let secs = match self {
            MaintenanceTask::SessionSweep => config.session_sweep_secs,
            MaintenanceTask::RateLimitPrune => config.rate_limit_prune_secs,
            MaintenanceTask::AuditTrim => config.audit_trim_secs,
            MaintenanceTask::BlockSweep => config.block_sweep_secs,
            MaintenanceTask::ThreatReport => config.threat_report_secs,
        };
        Duration::from_secs(secs.max(1))
    }

    /// Run one pass of the job.
    pub fn run_once(&self, gateway: &SecurityGateway) {
        match self {
            MaintenanceTask::SessionSweep => {
                let outcome = gateway.sessions().sweep_expired();
                tracing::debug!(
                    expired = outcome.expired,
                    purged = outcome.purged,
                    "Session sweep"
                );
            }
            MaintenanceTask::RateLimitPrune => {
                let removed = gateway.rate_limiter().prune_all();
                tracing::debug!(removed, "Rate limit windows pruned");
            }
            MaintenanceTask::AuditTrim => {
                let removed = gateway.audit().trim_retention();
                tracing::debug!(removed, "Audit log trimmed");
            }
            MaintenanceTask::BlockSweep => {
                let cleared = gateway.blocks().sweep_expired();
                tracing::debug!(cleared, "Expired blocks cleared");
            }
            MaintenanceTask::ThreatReport => {
                let report = gateway.generate_security_report();
                metrics::record_active_sessions(report.active_sessions);
                metrics::record_blocked_principals(report.blocked_principals);
                metrics::record_threat_level(report.threat_level);
                tracing::info!(
                    threat_level = %report.threat_level,
                    active_sessions = report.active_sessions,
                    blocked_principals = report.blocked_principals,
                    events_24h = report.last_24h.total_events,
                    rate_limit_hits = report.last_24h.metrics.rate_limit_hits,
                    malicious_inputs = report.last_24h.metrics.malicious_inputs,
                    "Security report"
                );
            }
        }
    }
}

async fn run_periodic(
    task: MaintenanceTask,
    gateway: Arc<SecurityGateway>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => task.run_once(&gateway),
            _ = shutdown.recv() => {
                tracing::debug!(task = task.name(), "Maintenance task stopping");
                break;
            }
        }
    }
}

/// Spawn every maintenance task. Returns their handles for draining.
pub fn spawn_maintenance(
    gateway: Arc<SecurityGateway>,
    config: &MaintenanceConfig,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    if !config.enabled {
        tracing::info!("Background maintenance disabled");
        return Vec::new();
    }

    MaintenanceTask::ALL
        .into_iter()
        .map(|task| {
            let interval = task.interval(config);
            tracing::info!(
                task = task.name(),
                interval_secs = interval.as_secs(),
                "Starting maintenance task"
            );
            tokio::spawn(run_periodic(task, gateway.clone(), interval, shutdown.subscribe()))
        })
        .collect()
}
