//! Typed request-level errors and their JSON rendering.
//!
//! Every failure a handler can report is a [`RestError`]. The application
//! renders it with its encoder into the one error shape clients ever see:
//!
//! ```text
//! { "type": "<kind>", "code": <int>, "message": "<str>", "details": "<str>" }
//! ```

use std::borrow::Cow;

use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

use crate::encoding::{SerializationView, Serializable};

/// A request-level error with a fixed JSON shape.
///
/// Build one with the named constructors, or [`RestError::custom`] for
/// application-specific kinds:
///
/// ```rust
/// use http::StatusCode;
/// use teeth_rest::RestError;
///
/// let err = RestError::custom(
///     "NodeLockedError",
///     StatusCode::CONFLICT,
///     "Node is locked",
///     "Node 42 is locked by another job",
/// );
/// assert_eq!(err.status(), StatusCode::CONFLICT);
/// ```
#[derive(Debug, Error)]
#[error("{kind} ({status}): {message}: {details}")]
pub struct RestError {
    kind: Cow<'static, str>,
    status: StatusCode,
    message: Cow<'static, str>,
    details: Cow<'static, str>,
    // Never serialized. Kept so the dispatcher can log what was masked.
    cause: Option<String>,
    allow: Vec<http::Method>,
}

impl RestError {
    pub fn custom(
        kind: impl Into<Cow<'static, str>>,
        status: StatusCode,
        message: impl Into<Cow<'static, str>>,
        details: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            kind: kind.into(),
            status,
            message: message.into(),
            details: details.into(),
            cause: None,
            allow: Vec::new(),
        }
    }

    /// The generic `500` every unexpected failure is masked as.
    pub fn server_error() -> Self {
        Self::custom(
            "RESTError",
            StatusCode::INTERNAL_SERVER_ERROR,
            "An error occurred",
            "An unexpected error occurred. Please try back later.",
        )
    }

    /// `400`: the request body was sent with a media type other than JSON.
    pub fn unsupported_content_type(content_type: &str) -> Self {
        Self::custom(
            "UnsupportedContentTypeError",
            StatusCode::BAD_REQUEST,
            "Unsupported Content-Type",
            format!("Content-Type \"{content_type}\" is not supported"),
        )
    }

    /// `400`: the body could not be parsed or failed validation.
    pub fn invalid_content(details: impl Into<Cow<'static, str>>) -> Self {
        Self::custom(
            "InvalidContentError",
            StatusCode::BAD_REQUEST,
            "Invalid request body",
            details,
        )
    }

    pub fn not_found() -> Self {
        Self::custom(
            "NotFound",
            StatusCode::NOT_FOUND,
            "Not found",
            "The requested resource could not be found.",
        )
    }

    /// `405`: the path exists but not for this method. The allowed methods
    /// end up in the `Allow` header as well as the details.
    pub fn method_not_allowed(allowed: Vec<http::Method>) -> Self {
        let list = allowed.iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
        let mut err = Self::custom(
            "MethodNotAllowed",
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("Allowed methods: {list}"),
        );
        err.allow = allowed;
        err
    }

    /// Attaches an internal cause. It is logged, never sent to the client.
    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn kind(&self) -> &str { &self.kind }
    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn details(&self) -> &str { &self.details }
    pub fn cause(&self) -> Option<&str> { self.cause.as_deref() }

    pub(crate) fn allow(&self) -> &[http::Method] { &self.allow }
}

impl Default for RestError {
    fn default() -> Self { Self::server_error() }
}

impl Serializable for RestError {
    fn serialize(&self, _view: SerializationView) -> Value {
        // Field order is part of the wire format; `preserve_order` keeps it.
        json!({
            "type": self.kind,
            "code": self.status.as_u16(),
            "message": self.message,
            "details": self.details,
        })
    }
}

/// Anything converted through `anyhow` is unexpected: mask it as the generic
/// server error and keep the chain for the log.
impl From<anyhow::Error> for RestError {
    fn from(e: anyhow::Error) -> Self {
        Self::server_error().with_cause(format!("{e:#}"))
    }
}
