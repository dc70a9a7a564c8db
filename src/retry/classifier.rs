use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;

/// Retry classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Network, timeout or rate-limit failures worth another attempt
    Transient,
    /// Client errors that will fail the same way again
    Permanent,
    /// Unrecognised failures, handled like permanent ones
    Unknown,
}

impl ErrorClass {
    /// Whether a failure of this class may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an error for retry purposes
///
/// # Classification
///
/// | Error | Class |
/// |-------|-------|
/// | Timeout, connection failure, HTTP 408/429/5xx | Transient |
/// | Rate-limited response, render failure | Transient |
/// | HTTP 404 and other 4xx, malformed content | Permanent |
/// | Unsupported strategy, unparseable URL or JSON | Permanent |
/// | Anything else | Unknown |
pub fn classify(error: &IngestError) -> ErrorClass {
    match error {
        IngestError::Timeout { .. }
        | IngestError::RateLimitedResponse { .. }
        | IngestError::Render { .. } => ErrorClass::Transient,

        IngestError::HttpStatus { status, .. } => classify_status(*status),

        IngestError::Http { source, .. } | IngestError::Reqwest(source) => classify_reqwest(source),

        IngestError::Io(io) => match io.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted => ErrorClass::Transient,
            _ => ErrorClass::Unknown,
        },

        IngestError::NotFound { .. }
        | IngestError::MalformedContent { .. }
        | IngestError::UnsupportedStrategy(_)
        | IngestError::UrlParse(_)
        | IngestError::UrlError(_)
        | IngestError::Json(_) => ErrorClass::Permanent,

        _ => ErrorClass::Unknown,
    }
}

fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 => ErrorClass::Transient,
        500..=599 => ErrorClass::Transient,
        400..=499 => ErrorClass::Permanent,
        _ => ErrorClass::Unknown,
    }
}

fn classify_reqwest(error: &reqwest::Error) -> ErrorClass {
    if error.is_timeout() || error.is_connect() {
        return ErrorClass::Transient;
    }

    if let Some(status) = error.status() {
        return classify_status(status.as_u16());
    }

    if error.is_decode() || error.is_builder() || error.is_redirect() {
        return ErrorClass::Permanent;
    }

    if error.is_request() || error.is_body() {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}
