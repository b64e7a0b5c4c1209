//! Failure taxonomy for the data layer.
//!
//! Every failure that can leave a remote call, a payload decoder or the local
//! store is reduced to a [`ClassifiedError`] before it reaches a caller. The
//! retry loop, the tiered fetcher and the offline queue only ever look at
//! `kind()` and `retryable()`.
//!
//! | Signal | Kind | Severity | Retryable |
//! |--------|------|----------|-----------|
//! | HTTP 400 | `Validation` | Low | no |
//! | HTTP 401 | `Auth` | Medium | no |
//! | HTTP 403 | `Permission` | Medium | no |
//! | HTTP 404 | `Api` | Low | no |
//! | HTTP 408 | `Timeout` | Medium | yes |
//! | HTTP 429 | `Api` | Medium | yes |
//! | HTTP 5xx | `ServerError` | High | yes |
//! | transport failure | `NoConnectivity` | High | yes |
//! | deadline exceeded | `Timeout` | Medium | yes |
//! | missing configuration | `Configuration` | Critical | no |
//! | anything else | `Unknown` | Medium | yes |

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Api,
    Validation,
    Auth,
    Permission,
    Timeout,
    ServerError,
    NoConnectivity,
    Configuration,
    Unknown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Api => "api",
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::NoConnectivity => "no_connectivity",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }

    /// Failures caused by the device being (partly) offline. Mutations that
    /// fail with one of these are deferred to the offline queue.
    pub const fn is_connectivity(self) -> bool {
        matches!(self, Self::NoConnectivity | Self::Network | Self::Timeout)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity; `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unclassified failure signals as they come off the wire or out of a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// Non-success HTTP status.
    Status { status: u16, body: String },
    /// The request never reached the server (DNS, refused connection, offline).
    Transport(String),
    /// The connection dropped mid-exchange.
    Interrupted(String),
    /// A local deadline fired before the response arrived.
    DeadlineExceeded(String),
    /// A required configuration value is absent.
    MissingConfiguration { key: &'static str },
    /// The response body did not have the expected shape.
    MalformedPayload(String),
    /// The response had the right shape but a field value was invalid.
    InvalidField(String),
    /// The client-side request budget is exhausted.
    RateLimited,
    /// The circuit breaker is open and the call was not attempted.
    CircuitOpen,
    Other(String),
}

impl RawFailure {
    /// Map this signal onto the taxonomy. Total: every input has an answer.
    pub fn classify(&self) -> ClassifiedError {
        match self {
            Self::Status { status, body } => classify_status(*status, body),
            Self::Transport(message) => ClassifiedError::no_connectivity(message.clone()),
            Self::Interrupted(message) => ClassifiedError::new(
                ErrorKind::Network,
                Severity::Medium,
                true,
                message.clone(),
            ),
            Self::DeadlineExceeded(message) => ClassifiedError::timeout(message.clone()),
            Self::MissingConfiguration { key } => ClassifiedError::new(
                ErrorKind::Configuration,
                Severity::Critical,
                false,
                format!("missing required configuration '{key}'"),
            ),
            Self::MalformedPayload(message) => {
                ClassifiedError::new(ErrorKind::Api, Severity::Medium, false, message.clone())
            }
            Self::InvalidField(message) => ClassifiedError::validation(message.clone()),
            Self::RateLimited => ClassifiedError::new(
                ErrorKind::Api,
                Severity::Medium,
                true,
                "client-side request budget exhausted",
            )
            .with_code(429),
            Self::CircuitOpen => {
                ClassifiedError::no_connectivity("remote circuit is open; skipping request")
            }
            Self::Other(message) => ClassifiedError::unknown(message.clone()),
        }
    }
}

impl Display for RawFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, .. } => write!(f, "http status {status}"),
            Self::Transport(message)
            | Self::Interrupted(message)
            | Self::DeadlineExceeded(message)
            | Self::MalformedPayload(message)
            | Self::InvalidField(message)
            | Self::Other(message) => f.write_str(message),
            Self::MissingConfiguration { key } => write!(f, "missing configuration '{key}'"),
            Self::RateLimited => f.write_str("rate limited"),
            Self::CircuitOpen => f.write_str("circuit open"),
        }
    }
}

impl std::error::Error for RawFailure {}

impl From<reqwest::Error> for RawFailure {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::DeadlineExceeded(error.to_string());
        }
        if error.is_connect() {
            return Self::Transport(error.to_string());
        }
        if let Some(status) = error.status() {
            return Self::Status {
                status: status.as_u16(),
                body: String::new(),
            };
        }
        if error.is_decode() {
            return Self::MalformedPayload(error.to_string());
        }
        if error.is_body() || error.is_request() {
            return Self::Interrupted(error.to_string());
        }
        Self::Other(error.to_string())
    }
}

fn classify_status(status: u16, body: &str) -> ClassifiedError {
    let (kind, severity, retryable) = match status {
        400 => (ErrorKind::Validation, Severity::Low, false),
        401 => (ErrorKind::Auth, Severity::Medium, false),
        403 => (ErrorKind::Permission, Severity::Medium, false),
        404 => (ErrorKind::Api, Severity::Low, false),
        408 => (ErrorKind::Timeout, Severity::Medium, true),
        429 => (ErrorKind::Api, Severity::Medium, true),
        500..=599 => (ErrorKind::ServerError, Severity::High, true),
        _ => (ErrorKind::Unknown, Severity::Medium, true),
    };

    let error = ClassifiedError::new(kind, severity, retryable, format!("http status {status}"))
        .with_code(status);
    let body = body.trim();
    if body.is_empty() {
        error
    } else {
        error.with_details(body)
    }
}

/// A failure after classification. This is the only error type callers of
/// the data layer see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    kind: ErrorKind,
    severity: Severity,
    retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<u16>,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ClassifiedError {
    pub fn new(
        kind: ErrorKind,
        severity: Severity,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            retryable,
            code: None,
            message: message.into(),
            details: None,
        }
    }

    pub fn no_connectivity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoConnectivity, Severity::High, true, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, Severity::Medium, true, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, Severity::Low, false, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, Severity::Medium, true, message)
    }

    /// A lookup that found nothing, e.g. a cache miss.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api, Severity::Low, false, message)
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub const fn severity(&self) -> Severity {
        self.severity
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// HTTP status code, when the failure came from one.
    pub const fn code(&self) -> Option<u16> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

impl Display for ClassifiedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}", self.message, self.kind)?;
        if let Some(code) = self.code {
            write!(f, ", status {code}")?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for ClassifiedError {}

impl From<RawFailure> for ClassifiedError {
    fn from(raw: RawFailure) -> Self {
        raw.classify()
    }
}

impl From<ValidationError> for ClassifiedError {
    fn from(error: ValidationError) -> Self {
        Self::validation(error.to_string())
    }
}

impl From<kisan_store::StoreError> for ClassifiedError {
    fn from(error: kisan_store::StoreError) -> Self {
        Self::new(
            ErrorKind::Unknown,
            Severity::High,
            false,
            format!("local store failure: {error}"),
        )
    }
}

impl From<crate::CoreError> for ClassifiedError {
    fn from(error: crate::CoreError) -> Self {
        match error {
            crate::CoreError::Validation(error) => error.into(),
            crate::CoreError::Store(error) => error.into(),
            crate::CoreError::Serialization(error) => Self::new(
                ErrorKind::Unknown,
                Severity::High,
                false,
                format!("local serialization failure: {error}"),
            ),
        }
    }
}

/// Anything the retry loop can reduce to a [`ClassifiedError`].
pub trait Classify {
    fn classify(self) -> ClassifiedError;
}

impl Classify for ClassifiedError {
    fn classify(self) -> ClassifiedError {
        self
    }
}

impl Classify for RawFailure {
    fn classify(self) -> ClassifiedError {
        RawFailure::classify(&self)
    }
}

impl Classify for ValidationError {
    fn classify(self) -> ClassifiedError {
        self.into()
    }
}

/// Classify any raw signal.
pub fn classify(raw: impl Classify) -> ClassifiedError {
    raw.classify()
}
