//! Failure handling and execute-with-recovery.

use std::future::Future;
use serde::Serialize;
use serde_json::json;

use crate::audit::severity::actions;
use crate::error::{GateError, GateResult};
use crate::gateway::{SecurityGateway, SYSTEM_PRINCIPAL};
use crate::observability::metrics;
use crate::resilience::backoff::with_jitter;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};
use crate::resilience::classify::{ErrorCategory, ErrorContext, ErrorInfo, Priority, RawError};
use crate::resilience::recovery::{plan_recovery, RecoveryPlan};

/// Decision for one downstream failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureOutcome {
    /// Whether a retry is planned.
    pub handled: bool,
    pub recovery: RecoveryPlan,
    pub error_info: ErrorInfo,
    pub circuit: BreakerSnapshot,
}

impl FailureOutcome {
    /// The error to surface when the failure is not retried.
    pub fn to_error(&self) -> GateError {
        let category = self.error_info.category;
        if self.circuit.is_open {
            return GateError::CircuitOpen {
                category,
                retry_after: self.circuit.retry_after.unwrap_or_default(),
            };
        }
        if !self.error_info.is_recoverable {
            return GateError::Unrecoverable {
                category,
                message: self.error_info.message.clone(),
            };
        }
        GateError::Recoverable {
            category,
            attempts: self.error_info.retry_count + 1,
            message: self.error_info.message.clone(),
        }
    }
}

impl SecurityGateway {
    /// Classify a failure, consult its breaker and plan recovery.
    pub fn handle_error(&self, error: &RawError, context: &ErrorContext) -> FailureOutcome {
        let r = &self.registries;
        let info = r.classifier.classify(error, context);
        r.errors.record(&info);
        self.audit_failure(&info);

        let category = info.category;
        let before = r.breakers.check_state(category);
        let recovery = if before.is_open {
            tracing::debug!(category = %category, "Circuit open, skipping recovery");
            RecoveryPlan::give_up(info.retry_count)
        } else {
            let tripped = r
                .breakers
                .record_outcome(category, true)
                .is_some_and(|t| t.to == CircuitState::Open);
            if tripped {
                r.audit.log_event(
                    principal_of(&info),
                    actions::CIRCUIT_OPENED,
                    json!({ "category": category, "operation": info.operation }),
                );
                RecoveryPlan::give_up(info.retry_count)
            } else {
                plan_recovery(&info, &self.config.load().recovery)
            }
        };

        metrics::record_recovery_attempt(category.as_str(), recovery.strategy.as_str());
        tracing::debug!(
            category = %category,
            priority = %info.priority,
            strategy = recovery.strategy.as_str(),
            delay_ms = recovery.delay.as_millis() as u64,
            "Failure handled"
        );

        FailureOutcome {
            handled: recovery.should_retry(),
            recovery,
            circuit: r.breakers.check_state(category),
            error_info: info,
        }
    }

    /// Report a successful attempt in `category`, closing a half-open breaker.
    pub fn record_success(&self, category: ErrorCategory) {
        let r = &self.registries;
        if let Some(t) = r.breakers.record_outcome(category, false) {
            if t.to == CircuitState::Closed {
                r.audit.log_event(
                    SYSTEM_PRINCIPAL,
                    actions::CIRCUIT_CLOSED,
                    json!({ "category": category }),
                );
            }
        }
    }

    /// Run `op` until it succeeds or recovery gives up.
    ///
    /// `op` receives the current retry count. Planned delays are awaited
    /// with jitter before each retry. When the context names a category
    /// whose breaker is open, `op` is not called at all.
    ///
    /// A success closes the breaker of the context category and of the last
    /// failure seen. With neither known, every half-open breaker is closed,
    /// since the successful call was the trial they were waiting for.
    pub async fn run_with_recovery<T, E, F, Fut>(
        &self,
        context: ErrorContext,
        mut op: F,
    ) -> GateResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let mut context = context;
        let mut last_category = None;

        if let Some(category) = context.category {
            let state = self.registries.breakers.check_state(category);
            if state.is_open {
                tracing::debug!(category = %category, "Circuit open, operation not attempted");
                return Err(GateError::CircuitOpen {
                    category,
                    retry_after: state.retry_after.unwrap_or_default(),
                });
            }
        }

        loop {
            match op(context.retry_count).await {
                Ok(value) => {
                    let mut resolved: Vec<ErrorCategory> =
                        context.category.into_iter().chain(last_category).collect();
                    resolved.dedup();
                    if resolved.is_empty() {
                        resolved = self.registries.breakers.half_open();
                    }
                    for category in resolved {
                        self.record_success(category);
                    }
                    if last_category.is_some() {
                        self.registries.errors.record_resolution(true);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let outcome = self.handle_error(&e.into(), &context);
                    if !outcome.handled {
                        self.registries.errors.record_resolution(false);
                        return Err(outcome.to_error());
                    }
                    last_category = Some(outcome.error_info.category);
                    tokio::time::sleep(with_jitter(outcome.recovery.delay)).await;
                    context.retry_count = outcome.recovery.next_retry;
                }
            }
        }
    }

    fn audit_failure(&self, info: &ErrorInfo) {
        let action = if !info.is_recoverable {
            actions::UNRECOVERABLE_ERROR
        } else if info.priority == Priority::Critical {
            actions::CRITICAL_ERROR
        } else {
            actions::RECOVERABLE_ERROR
        };
        self.registries.audit.log_event(
            principal_of(info),
            action,
            json!({
                "error_id": info.id,
                "category": info.category,
                "priority": info.priority,
                "operation": info.operation,
                "retry_count": info.retry_count,
            }),
        );
        if !info.is_recoverable {
            tracing::error!(
                category = %info.category,
                operation = %info.operation,
                message = %info.message,
                "Unrecoverable failure"
            );
        }
    }
}

fn principal_of(info: &ErrorInfo) -> &str {
    info.principal_id.as_deref().unwrap_or(SYSTEM_PRINCIPAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::severity::Severity;
    use crate::clock::ManualClock;
    use crate::config::GatewayConfig;
    use crate::resilience::recovery::RecoveryStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway() -> SecurityGateway {
        SecurityGateway::new(GatewayConfig::default(), Arc::new(ManualClock::new(1_000_000)))
    }

    #[test]
    fn test_connection_refused_plans_base_delay() {
        let gateway = gateway();
        let outcome = gateway.handle_error(
            &RawError::new("connect ECONNREFUSED").with_code("ECONNREFUSED"),
            &ErrorContext::new("send_reminder"),
        );
        assert!(outcome.handled);
        assert_eq!(outcome.error_info.category, ErrorCategory::Network);
        assert_eq!(outcome.error_info.priority, Priority::High);
        assert_eq!(outcome.recovery.strategy, RecoveryStrategy::ExponentialBackoff);
        assert_eq!(outcome.recovery.delay, Duration::from_millis(1000));
        assert_eq!(outcome.circuit.failures, 1);
    }

    #[test]
    fn test_unrecoverable_is_critical_audit() {
        let gateway = gateway();
        let outcome = gateway.handle_error(
            &RawError::new("EACCES: permission denied"),
            &ErrorContext::new("write_log").for_principal("u1"),
        );
        assert!(!outcome.handled);
        assert!(matches!(outcome.to_error(), GateError::Unrecoverable { .. }));

        let events = gateway.audit().snapshot();
        let event = events
            .iter()
            .find(|e| e.action == actions::UNRECOVERABLE_ERROR)
            .unwrap();
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.principal_id, "u1");
    }

    #[test]
    fn test_breaker_short_circuits() {
        let gateway = gateway();
        let error = RawError::new("ETIMEDOUT");
        for _ in 0..4 {
            assert!(gateway.handle_error(&error, &ErrorContext::new("op")).handled);
        }
        let fifth = gateway.handle_error(&error, &ErrorContext::new("op"));
        assert!(!fifth.handled);
        assert!(fifth.circuit.is_open);

        let sixth = gateway.handle_error(&error, &ErrorContext::new("op"));
        assert!(matches!(
            sixth.to_error(),
            GateError::CircuitOpen { retry_after, .. } if retry_after == Duration::from_secs(60)
        ));
        assert_eq!(gateway.get_error_stats().total, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_recovery_retries_then_succeeds() {
        let gateway = gateway();
        let calls = AtomicU32::new(0);

        let result = gateway
            .run_with_recovery(ErrorContext::new("fetch_subjects"), |retry| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if retry < 2 {
                        Err("socket hang up ECONNRESET")
                    } else {
                        Ok(retry)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = gateway.get_error_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.recovered, 1);
        assert!(!gateway.breakers().check_state(ErrorCategory::Network).is_open);
        assert_eq!(gateway.breakers().check_state(ErrorCategory::Network).failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_recovery_gives_up() {
        let gateway = gateway();
        let result: GateResult<()> = gateway
            .run_with_recovery(ErrorContext::new("op"), |_| async { Err("something odd") })
            .await;

        match result {
            Err(GateError::Recoverable { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(gateway.get_error_stats().gave_up, 1);
    }
}
