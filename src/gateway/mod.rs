//! Security gateway, the composition root.
//!
//! # Data Flow
//! ```text
//! Inbound message (admission.rs):
//!     → BlockRegistry (blocked? stop)
//!     → RateLimiter (over budget? stop)
//!     → Sanitizer (oversized, malformed, malicious? block + stop)
//!     → SessionRegistry (asserted session valid? else stop)
//!     → Admission (sanitized payload)
//!   Every denial is audited, then ThreatAnalyzer may escalate to a block.
//!
//! Downstream failure (failure.rs):
//!     → ErrorClassifier → ErrorLog
//!     → CircuitBreakerRegistry (open? give up with a wait hint)
//!     → plan_recovery → optional backoff → retry
//! ```
//!
//! # Design Decisions
//! - The gateway owns no state; it holds shared handles to the registries
//! - Registries are built from config but can be injected for tests
//! - Configuration swaps are applied registry by registry, never blocking admission

mod admission;
mod failure;
pub mod messages;

use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::json;

pub use admission::{Admission, InboundMessage};
pub use failure::FailureOutcome;

use crate::audit::severity::{actions, ThreatLevel};
use crate::audit::{AuditLog, SecurityReport, ThreatAnalyzer};
use crate::clock::SharedClock;
use crate::config::GatewayConfig;
use crate::resilience::{
    BreakerSnapshot, CircuitBreakerRegistry, ErrorClassifier, ErrorLog, ErrorStats,
};
use crate::security::block::{BlockRecord, BlockRegistry};
use crate::security::crypto::{CryptoError, PayloadCipher};
use crate::security::rate_limit::{RateLimiter, RateLimiterStats};
use crate::security::sanitizer::Sanitizer;
use crate::security::session::{SessionRegistry, SessionStats};

/// Principal recorded for events with no acting user.
pub const SYSTEM_PRINCIPAL: &str = "system";

/// Shared handles to every registry the gateway orchestrates.
#[derive(Debug, Clone)]
pub struct Registries {
    pub audit: Arc<AuditLog>,
    pub threats: Arc<ThreatAnalyzer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: Arc<SessionRegistry>,
    pub blocks: Arc<BlockRegistry>,
    pub sanitizer: Arc<Sanitizer>,
    pub classifier: Arc<ErrorClassifier>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub errors: Arc<ErrorLog>,
}

impl Registries {
    pub fn build(config: &GatewayConfig, clock: SharedClock) -> Self {
        let audit = Arc::new(AuditLog::new(&config.audit, clock.clone()));
        Self {
            threats: Arc::new(ThreatAnalyzer::new(audit.clone(), config.audit.max_failed_attempts)),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone(), clock.clone())),
            sessions: Arc::new(SessionRegistry::new(
                config.session.timeout(),
                audit.clone(),
                clock.clone(),
            )),
            blocks: Arc::new(BlockRegistry::new(
                config.block.clone(),
                audit.clone(),
                clock.clone(),
            )),
            sanitizer: Arc::new(Sanitizer::new(config.sanitizer.clone())),
            classifier: Arc::new(ErrorClassifier::new(clock.clone())),
            breakers: Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone(), clock)),
            errors: Arc::new(ErrorLog::new(config.recovery.error_log_size)),
            audit,
        }
    }
}

/// Point-in-time view across every registry.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub sessions: SessionStats,
    pub rate_limiter: RateLimiterStats,
    pub blocked_principals: usize,
    pub audit_events: usize,
    pub threat_level: ThreatLevel,
    pub breakers: Vec<BreakerSnapshot>,
    pub errors_total: u64,
}

#[derive(Debug)]
pub struct SecurityGateway {
    config: ArcSwap<GatewayConfig>,
    registries: Registries,
    cipher: Option<PayloadCipher>,
}

impl SecurityGateway {
    pub fn new(config: GatewayConfig, clock: SharedClock) -> Self {
        let registries = Registries::build(&config, clock);
        Self::from_registries(config, registries)
    }

    pub fn from_registries(config: GatewayConfig, registries: Registries) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            registries,
            cipher: None,
        }
    }

    pub fn with_cipher(mut self, cipher: PayloadCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn audit(&self) -> &AuditLog {
        &self.registries.audit
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.registries.sessions
    }

    pub fn blocks(&self) -> &BlockRegistry {
        &self.registries.blocks
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.registries.rate_limiter
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.registries.breakers
    }

    pub fn config(&self) -> Arc<GatewayConfig> {
        self.config.load_full()
    }

    /// Swap in a new, already validated configuration.
    ///
    /// Audit log bounds are fixed at construction and are not reloaded.
    pub fn apply_config(&self, config: GatewayConfig) {
        let r = &self.registries;
        r.rate_limiter.reload(config.rate_limit.clone());
        r.sessions.set_timeout(config.session.timeout());
        r.blocks.reload(config.block.clone());
        r.sanitizer.reload(config.sanitizer.clone());
        r.breakers.reload(config.circuit_breaker.clone());
        r.errors.set_capacity(config.recovery.error_log_size);

        if config.audit != self.config.load().audit {
            tracing::warn!("Audit settings changed; they take effect after restart");
        }
        self.config.store(Arc::new(config));
        tracing::info!("Gateway configuration applied");
    }

    /// Block a principal on behalf of an operator.
    pub fn block_user(
        &self,
        principal_id: &str,
        reason: &str,
        duration: Option<Duration>,
    ) -> BlockRecord {
        self.registries.blocks.block(principal_id, reason, duration)
    }

    pub fn unblock_user(&self, principal_id: &str, reason: &str) -> bool {
        self.registries.blocks.unblock(principal_id, reason)
    }

    pub fn generate_security_report(&self) -> SecurityReport {
        let r = &self.registries;
        SecurityReport::generate(
            &r.audit,
            &r.threats,
            r.sessions.active_count(),
            r.blocks.blocked_count(),
        )
    }

    pub fn get_error_stats(&self) -> ErrorStats {
        self.registries.errors.stats()
    }

    pub fn get_stats(&self) -> GatewayStats {
        let r = &self.registries;
        GatewayStats {
            sessions: r.sessions.stats(),
            rate_limiter: r.rate_limiter.stats(),
            blocked_principals: r.blocks.blocked_count(),
            audit_events: r.audit.len(),
            threat_level: r.threats.overall_threat_level(),
            breakers: r.breakers.snapshot_all(),
            errors_total: r.errors.stats().total,
        }
    }

    fn cipher(&self) -> Result<&PayloadCipher, CryptoError> {
        self.cipher
            .as_ref()
            .ok_or_else(|| CryptoError::MissingKey(self.config.load().crypto.key_env.clone()))
    }

    /// Encrypt a payload for storage or relay.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        self.cipher()?.seal(plaintext).inspect_err(|e| {
            self.registries.audit.log_event(
                SYSTEM_PRINCIPAL,
                actions::ENCRYPTION_FAILURE,
                json!({ "error": e.to_string() }),
            );
        })
    }

    /// Decrypt a payload presented by `principal_id`. Failures are audited.
    pub fn open(&self, principal_id: &str, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        self.cipher()?.open(sealed).inspect_err(|e| {
            self.registries.audit.log_event(
                principal_id,
                actions::FAILED_DECRYPTION,
                json!({ "error": e.to_string() }),
            );
        })
    }
}
