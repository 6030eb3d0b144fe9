//! Domain-level errors: the only error type that crosses the guard.
//!
//! Each error carries a client-safe `message`, an optional field list, a
//! stable machine-readable `code` and, internally, the violated constraint
//! name and the original failure as its `source()`.

use std::error::Error as StdError;

use serde::Serialize;
use thiserror::Error;

/// Closed set of domain error shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomainErrorKind {
    Duplicate,
    MissingField,
    Reference,
    BusinessRule,
    UnknownIntegrity,
    NotFound,
    InvalidField,
    InvalidInput,
    Repository,
}

impl DomainErrorKind {
    /// Stable code carried by every error of this kind, if any.
    pub const fn default_code(self) -> Option<&'static str> {
        match self {
            DomainErrorKind::Duplicate => Some("duplicate"),
            DomainErrorKind::NotFound => Some("not_found"),
            DomainErrorKind::InvalidField => Some("invalid_field"),
            DomainErrorKind::InvalidInput => Some("invalid_input"),
            DomainErrorKind::MissingField
            | DomainErrorKind::Reference
            | DomainErrorKind::BusinessRule
            | DomainErrorKind::UnknownIntegrity
            | DomainErrorKind::Repository => None,
        }
    }
}

/// code → HTTP status. Anything else is a 400.
static STATUS_BY_CODE: &[(&str, u16)] = &[
    ("duplicate", 409),
    ("invalid_field", 422),
    ("not_found", 404),
    ("invalid_input", 422),
];

const DEFAULT_STATUS: u16 = 400;

/// Status for a code, falling back to 400.
pub fn status_for_code(code: Option<&str>) -> u16 {
    code.and_then(|code| {
        STATUS_BY_CODE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, status)| *status)
    })
    .unwrap_or(DEFAULT_STATUS)
}

/// Client-facing body. `constraint` and the source chain are never included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Error)]
#[error("{message}{}", render_extras(.fields, .constraint, .code))]
pub struct DomainError {
    kind: DomainErrorKind,
    message: String,
    fields: Option<Vec<String>>,
    constraint: Option<String>,
    code: Option<&'static str>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

/// ` (fields: a, b; constraint: c; code: d)`, or nothing when all are absent.
fn render_extras(
    fields: &Option<Vec<String>>,
    constraint: &Option<String>,
    code: &Option<&'static str>,
) -> String {
    let mut extras = Vec::new();
    if let Some(fields) = fields {
        extras.push(format!("fields: {}", fields.join(", ")));
    }
    if let Some(constraint) = constraint {
        extras.push(format!("constraint: {constraint}"));
    }
    if let Some(code) = code {
        extras.push(format!("code: {code}"));
    }
    if extras.is_empty() {
        String::new()
    } else {
        format!(" ({})", extras.join("; "))
    }
}

impl DomainError {
    pub fn new(kind: DomainErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: None,
            constraint: None,
            code: kind.default_code(),
            source: None,
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::Duplicate, message)
    }

    pub fn missing_field(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::MissingField, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::Reference, message)
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::BusinessRule, message)
    }

    pub fn unknown_integrity(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::UnknownIntegrity, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::NotFound, message)
    }

    pub fn invalid_field(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::InvalidField, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::InvalidInput, message)
    }

    pub fn repository(message: impl Into<String>) -> Self {
        Self::new(DomainErrorKind::Repository, message)
    }

    /// Attach field names; an empty list is treated as "unknown".
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.fields = (!fields.is_empty()).then_some(fields);
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Keep the original failure as the cause.
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> DomainErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// Internal only; never serialized.
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    pub fn code(&self) -> Option<&'static str> {
        self.code
    }

    pub fn http_status(&self) -> u16 {
        status_for_code(self.code)
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            detail: self.message.clone(),
            code: self.code.map(str::to_owned),
            fields: self.fields.clone(),
        }
    }
}
