//! Admission pipeline integration tests.

use std::time::Duration;
use message_gate::audit::severity::{actions, Severity};
use message_gate::config::parse_config;
use message_gate::security::block::BlockStatus;
use message_gate::security::rate_limit::ActionClass;
use message_gate::{GateError, GatewayConfig, SessionInvalid};
use serde_json::json;

mod common;
use common::{message, message_with_session, TestGateway};

#[test]
fn test_eleventh_command_is_limited() {
    let t = TestGateway::new();

    for i in 1..=10 {
        let result = t.gateway.admit(&message("u1", ActionClass::Command, "/present"));
        assert!(result.is_ok(), "call {} denied: {:?}", i, result);
        t.advance(Duration::from_secs(5));
    }

    match t.gateway.admit(&message("u1", ActionClass::Command, "/present")) {
        Err(GateError::RateLimitExceeded { action, retry_after }) => {
            assert_eq!(action, "command");
            assert_eq!(retry_after, Duration::from_secs(10));
        }
        other => panic!("expected rate limit, got {:?}", other),
    }

    let events = t.gateway.audit().snapshot();
    assert_eq!(
        events.iter().filter(|e| e.action == actions::RATE_LIMIT_EXCEEDED).count(),
        1
    );
}

#[test]
fn test_window_slides_open_again() {
    let t = TestGateway::new();
    for _ in 0..10 {
        t.gateway
            .admit(&message("u1", ActionClass::Command, "/present"))
            .unwrap();
    }
    assert!(t.gateway.admit(&message("u1", ActionClass::Command, "/present")).is_err());
    assert_eq!(t.gateway.rate_limiter().remaining("u1", ActionClass::Command), 0);

    t.advance(Duration::from_secs(60));
    assert_eq!(t.gateway.rate_limiter().remaining("u1", ActionClass::Command), 10);
    assert!(t.gateway.admit(&message("u1", ActionClass::Command, "/present")).is_ok());
}

#[test]
fn test_rate_limits_are_per_principal_and_class() {
    let t = TestGateway::new();
    for _ in 0..10 {
        t.gateway
            .admit(&message("u1", ActionClass::Command, "/present"))
            .unwrap();
    }
    assert!(t.gateway.admit(&message("u1", ActionClass::Command, "/present")).is_err());
    assert!(t.gateway.admit(&message("u2", ActionClass::Command, "/present")).is_ok());
    assert!(t.gateway.admit(&message("u1", ActionClass::Message, "hello")).is_ok());
}

#[test]
fn test_session_presented_by_other_principal() {
    let t = TestGateway::new();
    let session = t.gateway.sessions().create_session("p1", Default::default());

    assert!(t.gateway.admit(&message_with_session("p1", &session, "hi")).is_ok());
    let err = t
        .gateway
        .admit(&message_with_session("p2", &session, "hi"))
        .unwrap_err();
    assert_eq!(err, GateError::SessionInvalid(SessionInvalid::Mismatch));

    let hijack = t
        .gateway
        .audit()
        .snapshot()
        .into_iter()
        .find(|e| e.action == actions::SESSION_HIJACK_ATTEMPT)
        .expect("hijack attempt audited");
    assert_eq!(hijack.severity, Severity::High);
}

#[test]
fn test_session_timeout_ignores_activity() {
    let t = TestGateway::new();
    let session = t.gateway.sessions().create_session("u1", Default::default());
    let timeout = t.gateway.sessions().timeout();

    t.advance(timeout / 2);
    assert!(t.gateway.admit(&message_with_session("u1", &session, "hi")).is_ok());

    t.advance(timeout / 2 - Duration::from_millis(1));
    assert!(t.gateway.admit(&message_with_session("u1", &session, "hi")).is_ok());

    t.advance(Duration::from_millis(2));
    assert_eq!(
        t.gateway.admit(&message_with_session("u1", &session, "hi")),
        Err(GateError::SessionInvalid(SessionInvalid::Expired))
    );
}

#[test]
fn test_block_runs_its_course() {
    let t = TestGateway::new();
    let duration = Duration::from_secs(600);
    t.gateway.block_user("u1", "manual", Some(duration));

    match t.gateway.is_blocked("u1") {
        BlockStatus::Blocked { reason, remaining } => {
            assert_eq!(reason, "manual");
            assert_eq!(remaining, duration);
        }
        BlockStatus::NotBlocked => panic!("expected block"),
    }
    match t.gateway.admit(&message("u1", ActionClass::Message, "hi")) {
        Err(e @ GateError::PrincipalBlocked { .. }) => {
            assert_eq!(e.wait_hint(), Some(duration));
            assert!(e.user_message().contains("10 minutes"));
        }
        other => panic!("expected blocked, got {:?}", other),
    }

    t.advance(duration);
    assert_eq!(t.gateway.is_blocked("u1"), BlockStatus::NotBlocked);
    assert!(t.gateway.blocks().blocked_principals().is_empty());
    assert!(t.gateway.admit(&message("u1", ActionClass::Message, "hi")).is_ok());
}

#[test]
fn test_repeat_violations_escalate() {
    let t = TestGateway::new();
    let attack = message("u1", ActionClass::Message, "'; DROP TABLE attendance; --");

    assert!(matches!(
        t.gateway.admit(&attack),
        Err(GateError::SecurityViolation { .. })
    ));
    let first = t.gateway.blocks().blocked_principals()[0].clone();
    assert_eq!(first.blocked_until - first.blocked_at, 300_000);

    t.advance(Duration::from_secs(300));
    assert!(matches!(
        t.gateway.admit(&attack),
        Err(GateError::SecurityViolation { .. })
    ));
    let second = t.gateway.blocks().blocked_principals()[0].clone();
    assert_eq!(second.block_count, 2);
    assert_eq!(second.blocked_until - second.blocked_at, 600_000);
}

#[test]
fn test_audit_log_is_bounded() {
    let mut config = GatewayConfig::default();
    config.audit.max_log_size = 50;
    let t = TestGateway::with_config(config);

    for i in 0..75 {
        t.gateway
            .audit()
            .log_event("u1", "note", json!({ "seq": i }));
    }

    let events = t.gateway.audit().snapshot();
    assert_eq!(events.len(), 50);
    assert_eq!(events[0].details["seq"], 25);
    assert_eq!(events[49].details["seq"], 74);
}

#[test]
fn test_reloaded_limits_apply_to_next_call() {
    let t = TestGateway::new();
    let config = parse_config(
        r#"
        [rate_limit.rules.command]
        limit = 2
        window_secs = 60

        [rate_limit.rules.message]
        limit = 20
        window_secs = 60

        [rate_limit.rules.registration]
        limit = 5
        window_secs = 3600

        [rate_limit.rules.subject_mutation]
        limit = 20
        window_secs = 3600
        "#,
    )
    .unwrap();
    t.gateway.apply_config(config);

    assert!(t.gateway.admit(&message("u1", ActionClass::Command, "/a")).is_ok());
    assert!(t.gateway.admit(&message("u1", ActionClass::Command, "/b")).is_ok());
    assert!(t.gateway.admit(&message("u1", ActionClass::Command, "/c")).is_err());
}

#[test]
fn test_report_counts_live_state() {
    let t = TestGateway::new();
    t.gateway.sessions().create_session("u1", Default::default());
    t.gateway.sessions().create_session("u2", Default::default());
    t.gateway.block_user("u3", "spam", None);
    let _ = t.gateway.admit(&message("u4", ActionClass::Message, "<script>x</script>"));

    let report = t.gateway.generate_security_report();
    assert_eq!(report.active_sessions, 2);
    assert_eq!(report.blocked_principals, 2);
    assert_eq!(report.last_24h.metrics.malicious_inputs, 1);
    assert_eq!(report.last_24h.metrics.blocks_issued, 2);
}

#[test]
fn test_everyday_text_after_semicolon_is_admitted() {
    let t = TestGateway::new();
    let admission = t
        .gateway
        .admit(&message(
            "u1",
            ActionClass::Message,
            "I was sick yesterday; update my attendance please",
        ))
        .unwrap();
    assert_eq!(
        admission.sanitized_payload,
        "I was sick yesterday; update my attendance please"
    );
    assert_eq!(t.gateway.is_blocked("u1"), BlockStatus::NotBlocked);
}
