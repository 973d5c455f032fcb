//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, thresholds > 0)
//! - Check every built-in action class has a rate rule
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::GatewayConfig;
use crate::security::rate_limit::ActionClass;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for class in ActionClass::ALL {
        if !config.rate_limit.rules.contains_key(class.as_str()) {
            errors.push(ValidationError::new(
                "rate_limit.rules",
                format!("missing rule for '{}'", class.as_str()),
            ));
        }
    }
    for (name, rule) in &config.rate_limit.rules {
        if name.parse::<ActionClass>().is_err() {
            errors.push(ValidationError::new(
                format!("rate_limit.rules.{}", name),
                "unknown action class",
            ));
        }
        if rule.limit == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.rules.{}.limit", name),
                "must be greater than 0",
            ));
        }
        if rule.window_secs == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.rules.{}.window_secs", name),
                "must be greater than 0",
            ));
        }
    }

    if config.session.timeout_secs == 0 {
        errors.push(ValidationError::new("session.timeout_secs", "must be greater than 0"));
    }

    let block = &config.block;
    if block.base_duration_secs == 0 {
        errors.push(ValidationError::new("block.base_duration_secs", "must be greater than 0"));
    }
    if !block.escalation_multiplier.is_finite() || block.escalation_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "block.escalation_multiplier",
            "must be a finite number >= 1.0",
        ));
    }
    if block.max_duration_secs < block.base_duration_secs {
        errors.push(ValidationError::new(
            "block.max_duration_secs",
            "must be >= base_duration_secs",
        ));
    }

    if config.audit.max_log_size == 0 {
        errors.push(ValidationError::new("audit.max_log_size", "must be greater than 0"));
    }
    if config.audit.retention_secs == 0 {
        errors.push(ValidationError::new("audit.retention_secs", "must be greater than 0"));
    }

    if config.sanitizer.max_payload_len == 0 {
        errors.push(ValidationError::new("sanitizer.max_payload_len", "must be greater than 0"));
    }

    let recovery = &config.recovery;
    if recovery.base_delay_ms > recovery.max_delay_ms {
        errors.push(ValidationError::new(
            "recovery.max_delay_ms",
            "must be >= base_delay_ms",
        ));
    }
    if recovery.error_log_size == 0 {
        errors.push(ValidationError::new("recovery.error_log_size", "must be greater than 0"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }
    if config.circuit_breaker.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.timeout_secs",
            "must be greater than 0",
        ));
    }

    let maintenance = &config.maintenance;
    let intervals = [
        ("maintenance.session_sweep_secs", maintenance.session_sweep_secs),
        ("maintenance.rate_limit_prune_secs", maintenance.rate_limit_prune_secs),
        ("maintenance.audit_trim_secs", maintenance.audit_trim_secs),
        ("maintenance.block_sweep_secs", maintenance.block_sweep_secs),
        ("maintenance.threat_report_secs", maintenance.threat_report_secs),
    ];
    for (field, secs) in intervals {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if !matches!(
        config.observability.log_format.as_str(),
        "compact" | "pretty" | "json"
    ) {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be one of compact, pretty, json",
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
