//! Unified infrastructure error type.

use thiserror::Error;

/// The error type returned by teeth-rest's fallible setup and transport
/// operations.
///
/// Request-level failures (bad content, missing resources) are expressed as
/// [`RestError`](crate::RestError) values rendered into JSON bodies, not as
/// `Error`s. This type surfaces failures that happen outside a request:
/// binding a port, registering routes, building URLs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown converter `{converter}` in route pattern `{pattern}`")]
    UnknownConverter { pattern: String, converter: String },

    #[error("route `{pattern}` conflicts with an existing route: {source}")]
    RouteConflict {
        pattern: String,
        source: matchit::InsertError,
    },

    #[error("endpoint `{0}` is already registered")]
    DuplicateEndpoint(String),

    #[error("cannot build url for `{endpoint}`: {reason}")]
    UrlBuild { endpoint: String, reason: String },
}
