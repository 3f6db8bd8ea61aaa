//! Error types for the request builder and body decoder.
//!
//! # Design
//! Every failure a `Client` can hit lands in one `Error` value: construction
//! problems, transport failures, non-success statuses, decode failures, and
//! multipart file I/O. Once a client latches an error, later steps hand that
//! same value back instead of doing work, so the caller checks one result at
//! the end of the chain.

use std::io;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Errors produced by a `Transport` while sending a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The whole-request deadline expired.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or protocol failure reported by ureq.
    #[error(transparent)]
    Http(ureq::Error),

    /// Reading or writing a body stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Failure reported by a custom transport.
    #[error("{0}")]
    Other(String),
}

/// Errors returned by `Client` and the body decoder.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Method or URL rejected while building the wire request.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Query pair could not be form-encoded.
    #[error("invalid query: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Any 5xx response. The body is never echoed.
    #[error("internal server error")]
    InternalServerError { status: StatusCode },

    /// Non-success status outside the 5xx range. Displays as the response
    /// body, or the status line when the body is empty.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// The connection dropped while reading an error body; retrying is safe.
    #[error("stream error when reading response body, may be caused by closed connection. Please retry. Original error: {0}")]
    StreamReset(#[source] io::Error),

    #[error("unexpected error when reading response body. Please retry. Original error: {0}")]
    BodyRead(#[source] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Payload text could not be parsed into the numeric destination.
    #[error("cannot parse {payload:?} as {type_name}: {reason}")]
    Scalar {
        type_name: &'static str,
        payload: String,
        reason: String,
    },

    /// The destination cannot receive the chosen format.
    #[error("type ({0}) unknown type")]
    UnknownType(&'static str),

    #[error("response body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("decoder type not support")]
    UnsupportedFormat,

    /// A decode was requested before the request was sent.
    #[error("request has not been sent")]
    NotSent,

    /// File open/copy for a multipart attachment, or copying into a sink.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Status code carried by a protocol-status error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::InternalServerError { status } | Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error came from a dropped stream that is safe to retry.
    pub fn is_stream_reset(&self) -> bool {
        matches!(self, Error::StreamReset(_))
    }
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Io(e) => TransportError::Io(e),
            other => TransportError::Http(other),
        }
    }
}
