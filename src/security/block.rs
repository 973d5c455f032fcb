//! Temporary, escalating blocks on principals.
//!
//! Offence counts live apart from block records: a record disappears when
//! the block ends, but the count keeps growing so that repeat offenders
//! serve longer blocks. Only an explicit unblock with reason `timeout`
//! forgets a principal's history.
//!
//! A block that runs out on its own is audited as `principal_unblocked` with
//! reason `expired`, not `timeout`: automatic expiry keeps the offence count,
//! so it must not read like the history-resetting unblock in the audit log.

use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;

use crate::audit::severity::actions;
use crate::audit::AuditLog;
use crate::clock::{Millis, SharedClock};
use crate::config::BlockConfig;
use crate::observability::metrics;

/// Unblock reason that also clears the offence history.
pub const RESET_REASON: &str = "timeout";

/// Audit reason for a block that ran its course.
pub const EXPIRY_REASON: &str = "expired";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRecord {
    pub principal_id: String,
    pub reason: String,
    pub blocked_at: Millis,
    pub blocked_until: Millis,
    pub block_count: u32,
}

impl BlockRecord {
    pub fn remaining(&self, now: Millis) -> Duration {
        Duration::from_millis(self.blocked_until.saturating_sub(now))
    }
}

/// Result of [`BlockRegistry::is_blocked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    NotBlocked,
    Blocked { reason: String, remaining: Duration },
}

impl BlockStatus {
    pub fn is_blocked(&self) -> bool {
        matches!(self, BlockStatus::Blocked { .. })
    }
}

#[derive(Debug)]
pub struct BlockRegistry {
    records: DashMap<String, BlockRecord>,
    offences: DashMap<String, u32>,
    policy: ArcSwap<BlockConfig>,
    audit: Arc<AuditLog>,
    clock: SharedClock,
}

/// `base * multiplier^(count - 1)`, capped at the configured maximum.
pub fn escalated_duration(policy: &BlockConfig, block_count: u32) -> Duration {
    let max = policy.max_duration();
    let exponent = block_count.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = policy.base_duration_secs as f64 * policy.escalation_multiplier.powi(exponent);
    Duration::try_from_secs_f64(secs)
        .map(|d| d.min(max))
        .unwrap_or(max)
}

impl BlockRegistry {
    pub fn new(policy: BlockConfig, audit: Arc<AuditLog>, clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            offences: DashMap::new(),
            policy: ArcSwap::from_pointee(policy),
            audit,
            clock,
        }
    }

    pub fn reload(&self, policy: BlockConfig) {
        self.policy.store(Arc::new(policy));
    }

    /// Check a principal, clearing the record if its block has run out.
    pub fn is_blocked(&self, principal_id: &str) -> BlockStatus {
        let now = self.clock.now_ms();
        let current = self
            .records
            .get(principal_id)
            .map(|r| (r.blocked_until, r.reason.clone()));

        match current {
            None => BlockStatus::NotBlocked,
            Some((until, _)) if now >= until => {
                self.expire(principal_id, now);
                BlockStatus::NotBlocked
            }
            Some((until, reason)) => BlockStatus::Blocked {
                reason,
                remaining: Duration::from_millis(until - now),
            },
        }
    }

    /// Block a principal.
    ///
    /// Without an explicit duration the block escalates with the principal's
    /// offence count. Explicit durations are capped at the policy maximum.
    pub fn block(
        &self,
        principal_id: &str,
        reason: &str,
        duration: Option<Duration>,
    ) -> BlockRecord {
        let policy = self.policy.load();
        let block_count = {
            let mut count = self.offences.entry(principal_id.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };

        let duration = match duration {
            Some(d) => d.min(policy.max_duration()),
            None => escalated_duration(&policy, block_count),
        }
        .max(Duration::from_millis(1));

        let now = self.clock.now_ms();
        let record = BlockRecord {
            principal_id: principal_id.to_string(),
            reason: reason.to_string(),
            blocked_at: now,
            blocked_until: now.saturating_add(duration.as_millis() as u64),
            block_count,
        };
        self.records.insert(principal_id.to_string(), record.clone());

        tracing::warn!(
            principal = %principal_id,
            reason,
            block_count,
            duration_secs = duration.as_secs(),
            "Principal blocked"
        );
        metrics::record_block(reason);
        self.audit.log_event(
            principal_id,
            actions::PRINCIPAL_BLOCKED,
            json!({
                "reason": reason,
                "duration_ms": duration.as_millis() as u64,
                "block_count": block_count,
            }),
        );
        record
    }

    /// Remove a principal's block. Returns whether a record existed.
    pub fn unblock(&self, principal_id: &str, reason: &str) -> bool {
        let removed = self.records.remove(principal_id).is_some();
        if reason == RESET_REASON {
            self.offences.remove(principal_id);
        }
        if removed {
            tracing::info!(principal = %principal_id, reason, "Principal unblocked");
            self.audit.log_event(
                principal_id,
                actions::PRINCIPAL_UNBLOCKED,
                json!({ "reason": reason }),
            );
        }
        removed
    }

    fn expire(&self, principal_id: &str, now: Millis) -> bool {
        let removed = self
            .records
            .remove_if(principal_id, |_, r| now >= r.blocked_until)
            .is_some();
        if removed {
            tracing::debug!(principal = %principal_id, "Block expired");
            self.audit.log_event(
                principal_id,
                actions::PRINCIPAL_UNBLOCKED,
                json!({ "reason": EXPIRY_REASON }),
            );
        }
        removed
    }

    /// Clear every block whose deadline has passed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|r| now >= r.blocked_until)
            .map(|r| r.principal_id.clone())
            .collect();
        expired
            .iter()
            .filter(|p| self.expire(p, now))
            .count()
    }

    /// Records still in force.
    pub fn blocked_principals(&self) -> Vec<BlockRecord> {
        let now = self.clock.now_ms();
        let mut records: Vec<BlockRecord> = self
            .records
            .iter()
            .filter(|r| now < r.blocked_until)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.blocked_until.cmp(&b.blocked_until));
        records
    }

    pub fn blocked_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.records
            .iter()
            .filter(|r| now < r.blocked_until)
            .count()
    }

    pub fn offence_count(&self, principal_id: &str) -> u32 {
        self.offences.get(principal_id).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AuditConfig;

    fn registry() -> (Arc<ManualClock>, BlockRegistry) {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let audit = Arc::new(AuditLog::new(&AuditConfig::default(), clock.clone()));
        (clock.clone(), BlockRegistry::new(BlockConfig::default(), audit, clock))
    }

    #[test]
    fn test_explicit_block_and_expiry() {
        let (clock, registry) = registry();
        registry.block("u1", "spam", Some(Duration::from_secs(120)));

        assert_eq!(
            registry.is_blocked("u1"),
            BlockStatus::Blocked {
                reason: "spam".into(),
                remaining: Duration::from_secs(120),
            }
        );

        clock.advance(Duration::from_secs(120));
        assert_eq!(registry.is_blocked("u1"), BlockStatus::NotBlocked);
        assert!(registry.blocked_principals().is_empty());
        assert_eq!(registry.offence_count("u1"), 1);
    }

    #[test]
    fn test_expiry_is_audited_apart_from_reset() {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let audit = Arc::new(AuditLog::new(&AuditConfig::default(), clock.clone()));
        let registry = BlockRegistry::new(BlockConfig::default(), audit.clone(), clock.clone());
        registry.block("u1", "spam", Some(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(60));
        assert_eq!(registry.is_blocked("u1"), BlockStatus::NotBlocked);

        let unblock = audit
            .snapshot()
            .into_iter()
            .find(|e| e.action == actions::PRINCIPAL_UNBLOCKED)
            .unwrap();
        assert_eq!(unblock.details["reason"], EXPIRY_REASON);
        assert_ne!(EXPIRY_REASON, RESET_REASON);
        assert_eq!(registry.offence_count("u1"), 1);
    }

    #[test]
    fn test_escalation_without_duration() {
        let (clock, registry) = registry();

        let first = registry.block("u1", "abuse", None);
        assert_eq!(first.blocked_until - first.blocked_at, 300_000);

        clock.advance(Duration::from_secs(301));
        let second = registry.block("u1", "abuse", None);
        assert_eq!(second.block_count, 2);
        assert_eq!(second.blocked_until - second.blocked_at, 600_000);

        registry.unblock("u1", "manual");
        let third = registry.block("u1", "abuse", None);
        assert_eq!(third.blocked_until - third.blocked_at, 1_200_000);
    }

    #[test]
    fn test_escalation_is_capped() {
        let policy = BlockConfig::default();
        assert_eq!(escalated_duration(&policy, 1), Duration::from_secs(300));
        assert_eq!(escalated_duration(&policy, 9), Duration::from_secs(76_800));
        assert_eq!(escalated_duration(&policy, 10), policy.max_duration());
        assert_eq!(escalated_duration(&policy, 5_000), policy.max_duration());
    }

    #[test]
    fn test_explicit_duration_capped_at_max() {
        let (_, registry) = registry();
        let record = registry.block("u1", "abuse", Some(Duration::from_secs(10 * 86_400)));
        assert_eq!(record.blocked_until - record.blocked_at, 86_400_000);
    }

    #[test]
    fn test_timeout_unblock_resets_history() {
        let (_, registry) = registry();
        registry.block("u1", "abuse", None);
        registry.block("u1", "abuse", None);
        assert_eq!(registry.offence_count("u1"), 2);

        assert!(registry.unblock("u1", RESET_REASON));
        assert_eq!(registry.offence_count("u1"), 0);
        assert!(!registry.unblock("u1", RESET_REASON));
    }

    #[test]
    fn test_sweep_clears_expired() {
        let (clock, registry) = registry();
        registry.block("u1", "a", Some(Duration::from_secs(10)));
        registry.block("u2", "b", Some(Duration::from_secs(100)));
        assert_eq!(registry.blocked_count(), 2);

        clock.advance(Duration::from_secs(50));
        assert_eq!(registry.sweep_expired(), 1);
        let remaining = registry.blocked_principals();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].principal_id, "u2");
    }
}
