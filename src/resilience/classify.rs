//! Error classification.
//!
//! Errors are matched against static keyword tables in a fixed order:
//! DATABASE, TRANSPORT, NETWORK, VALIDATION, SYSTEM. The first table with a
//! hit decides the category; no hit is UNKNOWN. Matching is case-insensitive
//! over the error name, code and message together.

use std::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Millis, SharedClock};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    Network,
    Database,
    Transport,
    Validation,
    System,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::Network,
        ErrorCategory::Database,
        ErrorCategory::Transport,
        ErrorCategory::Validation,
        ErrorCategory::System,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Database => "database",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Validation => "validation",
            ErrorCategory::System => "system",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downstream failure as reported by a collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawError {
    pub name: String,
    pub code: Option<String>,
    pub message: String,
}

impl RawError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            code: None,
            message: message.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Capture any error through its `Display` output.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(err.to_string())
    }

    fn haystack(&self) -> String {
        let mut text = String::with_capacity(self.name.len() + self.message.len() + 16);
        text.push_str(&self.name);
        text.push(' ');
        if let Some(code) = &self.code {
            text.push_str(code);
            text.push(' ');
        }
        text.push_str(&self.message);
        text.to_lowercase()
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::new(message)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::new(message)
    }
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        RawError::new(err.to_string()).with_name(format!("{:?}", err.kind()))
    }
}

/// Where a failure happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorContext {
    pub principal_id: Option<String>,
    pub operation: String,
    pub retry_count: u32,
    /// Breaker the operation runs under, when known up front.
    pub category: Option<ErrorCategory>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            principal_id: None,
            operation: operation.into(),
            retry_count: 0,
            category: None,
        }
    }

    pub fn for_principal(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub id: Uuid,
    pub timestamp: Millis,
    pub name: String,
    pub code: Option<String>,
    pub message: String,
    pub category: ErrorCategory,
    pub priority: Priority,
    pub is_recoverable: bool,
    pub principal_id: Option<String>,
    pub operation: String,
    pub retry_count: u32,
}

impl ErrorInfo {
    /// Whether any keyword appears in the name, code or message.
    pub fn matches_any(&self, keywords: &[&str]) -> bool {
        let raw = RawError {
            name: self.name.clone(),
            code: self.code.clone(),
            message: self.message.clone(),
        };
        contains_any(&raw.haystack(), keywords)
    }
}

pub const DATABASE_KEYWORDS: &[&str] = &[
    "database", "sqlite", "postgres", "mysql", "mongo", "sql", "query", "constraint",
    "deadlock", "transaction", "db error",
];

pub const TRANSPORT_KEYWORDS: &[&str] = &[
    "telegram", "etelegram", "bot api", "polling", "webhook", "disconnected", "chat not found",
    "too many requests", "flood",
];

pub const NETWORK_KEYWORDS: &[&str] = &[
    "econnrefused", "econnreset", "etimedout", "enotfound", "ehostunreach", "network",
    "socket", "timeout", "timed out", "dns", "connection refused", "connection reset",
];

pub const VALIDATION_KEYWORDS: &[&str] = &[
    "validation", "invalid", "malformed", "parse", "schema", "required", "out of range",
];

pub const SYSTEM_KEYWORDS: &[&str] = &[
    "permission", "eacces", "eperm", "out of memory", "enomem", "enospc", "no space",
    "panicked", "type error", "typeerror", "reference error", "referenceerror",
    "syntax error", "syntaxerror", "index out of bounds", "system",
];

/// Category tables in match order.
pub const CATEGORY_TABLE: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::Database, DATABASE_KEYWORDS),
    (ErrorCategory::Transport, TRANSPORT_KEYWORDS),
    (ErrorCategory::Network, NETWORK_KEYWORDS),
    (ErrorCategory::Validation, VALIDATION_KEYWORDS),
    (ErrorCategory::System, SYSTEM_KEYWORDS),
];

pub const SECURITY_KEYWORDS: &[&str] = &[
    "security", "injection", "unauthorized", "forbidden", "hijack", "xss", "csrf",
];

pub const RATE_LIMIT_KEYWORDS: &[&str] = &["rate limit", "too many requests", "429", "flood"];

/// Signals that retrying cannot help.
pub const FATAL_KEYWORDS: &[&str] = &[
    "permission", "eacces", "eperm", "out of memory", "enomem", "enospc", "no space",
    "panicked", "type error", "typeerror", "reference error", "referenceerror",
    "syntax error", "syntaxerror", "index out of bounds",
];

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

pub fn category_of(haystack: &str) -> ErrorCategory {
    CATEGORY_TABLE
        .iter()
        .find(|(_, keywords)| contains_any(haystack, keywords))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

pub fn priority_of(haystack: &str, category: ErrorCategory) -> Priority {
    if contains_any(haystack, SECURITY_KEYWORDS) {
        return Priority::Critical;
    }
    if contains_any(haystack, RATE_LIMIT_KEYWORDS) {
        return Priority::Medium;
    }
    match category {
        ErrorCategory::Network | ErrorCategory::Database | ErrorCategory::Transport => {
            Priority::High
        }
        ErrorCategory::Validation => Priority::Medium,
        ErrorCategory::System | ErrorCategory::Unknown => Priority::Low,
    }
}

pub fn is_recoverable(haystack: &str) -> bool {
    !contains_any(haystack, FATAL_KEYWORDS)
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    clock: SharedClock,
}

impl ErrorClassifier {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    pub fn classify(&self, error: &RawError, context: &ErrorContext) -> ErrorInfo {
        let haystack = error.haystack();
        let category = category_of(&haystack);
        let priority = priority_of(&haystack, category);

        metrics::record_error(category.as_str(), priority.as_str());

        ErrorInfo {
            id: Uuid::new_v4(),
            timestamp: self.clock.now_ms(),
            name: error.name.clone(),
            code: error.code.clone(),
            message: error.message.clone(),
            category,
            priority,
            is_recoverable: is_recoverable(&haystack),
            principal_id: context.principal_id.clone(),
            operation: context.operation.clone(),
            retry_count: context.retry_count,
        }
    }
}
