//! User-facing notices.
//!
//! Everything shown to an end user comes from these tables. Raw error text
//! never reaches this module.

use std::time::Duration;

use crate::resilience::classify::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    RateLimited,
    Rejected,
    SessionInvalid,
    Blocked,
    Failure(ErrorCategory),
}

const FAILURE_MESSAGES: &[(ErrorCategory, &str)] = &[
    (ErrorCategory::Network, "We're having trouble connecting right now."),
    (ErrorCategory::Database, "Your data couldn't be reached right now."),
    (ErrorCategory::Transport, "Messages are being delivered slowly right now."),
    (ErrorCategory::Validation, "That input doesn't look right. Please check it and try again."),
    (ErrorCategory::System, "Something went wrong on our side."),
    (ErrorCategory::Unknown, "Something went wrong."),
];

pub fn message_for(notice: Notice) -> &'static str {
    match notice {
        Notice::RateLimited => "You're sending requests too quickly.",
        Notice::Rejected => "Your message couldn't be processed.",
        Notice::SessionInvalid => "Your session has ended. Please start again.",
        Notice::Blocked => "You're temporarily blocked.",
        Notice::Failure(category) => FAILURE_MESSAGES
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, text)| *text)
            .unwrap_or("Something went wrong."),
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Human wait time, rounded up to the coarsest sensible unit.
pub fn format_wait(wait: Duration) -> String {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    match secs {
        0..=59 => plural(secs.max(1), "second"),
        60..=3599 => plural(secs.div_ceil(60), "minute"),
        _ => plural(secs.div_ceil(3600), "hour"),
    }
}

pub fn render(notice: Notice, wait: Option<Duration>) -> String {
    let base = message_for(notice);
    match wait {
        Some(wait) => format!("{} Please try again in {}.", base, format_wait(wait)),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_a_message() {
        for category in ErrorCategory::ALL {
            assert!(FAILURE_MESSAGES.iter().any(|(c, _)| *c == category));
        }
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(Duration::from_millis(200)), "1 second");
        assert_eq!(format_wait(Duration::from_secs(42)), "42 seconds");
        assert_eq!(format_wait(Duration::from_secs(61)), "2 minutes");
        assert_eq!(format_wait(Duration::from_secs(300)), "5 minutes");
        assert_eq!(format_wait(Duration::from_secs(86_400)), "24 hours");
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render(Notice::RateLimited, Some(Duration::from_secs(30))),
            "You're sending requests too quickly. Please try again in 30 seconds."
        );
        assert_eq!(
            render(Notice::Failure(ErrorCategory::Network), None),
            "We're having trouble connecting right now."
        );
    }
}
