//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration for the security gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Sliding-window limits per action class.
    pub rate_limit: RateLimitConfig,

    /// Session lifetime settings.
    pub session: SessionConfig,

    /// Blocking and escalation policy.
    pub block: BlockConfig,

    /// Audit log bounds and threat thresholds.
    pub audit: AuditConfig,

    /// Inbound payload inspection.
    pub sanitizer: SanitizerConfig,

    /// Recovery and retry policy for downstream failures.
    pub recovery: RecoveryConfig,

    /// Circuit breaker policy, shared by every error category.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Background maintenance intervals.
    pub maintenance: MaintenanceConfig,

    /// Payload encryption settings.
    pub crypto: CryptoConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A single sliding-window rule.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateRule {
    /// Requests allowed inside one window.
    pub limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateRule {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Rules keyed by action class name (`command`, `message`, ...).
    pub rules: BTreeMap<String, RateRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert("command".to_string(), RateRule::new(10, 60));
        rules.insert("message".to_string(), RateRule::new(20, 60));
        rules.insert("registration".to_string(), RateRule::new(5, 3600));
        rules.insert("subject_mutation".to_string(), RateRule::new(20, 3600));
        Self {
            enabled: true,
            rules,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Absolute session lifetime in seconds, measured from creation.
    pub timeout_secs: u64,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 24 * 3600,
        }
    }
}

/// Block policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BlockConfig {
    /// Duration of a first offence in seconds.
    pub base_duration_secs: u64,

    /// Factor applied per repeated offence.
    pub escalation_multiplier: f64,

    /// Upper bound on any block in seconds.
    pub max_duration_secs: u64,
}

impl BlockConfig {
    pub fn base_duration(&self) -> Duration {
        Duration::from_secs(self.base_duration_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            base_duration_secs: 300,
            escalation_multiplier: 2.0,
            max_duration_secs: 24 * 3600,
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum retained events; oldest are evicted first.
    pub max_log_size: usize,

    /// Events older than this are dropped by the retention sweep.
    pub retention_secs: u64,

    /// Failure-flavoured events tolerated inside the analysis window.
    pub max_failed_attempts: usize,
}

impl AuditConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_log_size: 10_000,
            retention_secs: 7 * 24 * 3600,
            max_failed_attempts: 5,
        }
    }
}

/// Inbound payload inspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Maximum payload length in characters.
    pub max_payload_len: usize,

    /// Block principals that send insecure payloads.
    pub block_on_violation: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_payload_len: 4096,
            block_on_violation: true,
        }
    }
}

/// Recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts per failure.
    pub max_retry_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Fixed wait after the transport reports rate limiting, in milliseconds.
    pub transport_backoff_ms: u64,

    /// Size of the recent-error ring kept for stats.
    pub error_log_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            transport_backoff_ms: 5000,
            error_log_size: 1000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the breaker.
    pub failure_threshold: u32,

    /// Cooldown before a half-open probe, in seconds.
    pub timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
        }
    }
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Run background maintenance tasks.
    pub enabled: bool,

    /// Session expiry sweep interval in seconds.
    pub session_sweep_secs: u64,

    /// Rate window pruning interval in seconds.
    pub rate_limit_prune_secs: u64,

    /// Audit retention trim interval in seconds.
    pub audit_trim_secs: u64,

    /// Expired block sweep interval in seconds.
    pub block_sweep_secs: u64,

    /// Threat report interval in seconds.
    pub threat_report_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_sweep_secs: 300,
            rate_limit_prune_secs: 60,
            audit_trim_secs: 3600,
            block_sweep_secs: 60,
            threat_report_secs: 900,
        }
    }
}

/// Payload encryption configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CryptoConfig {
    /// Environment variable holding the base64 key.
    pub key_env: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_env: "MESSAGE_GATE_KEY".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format (compact, pretty, json).
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
