//! Fluent blocking HTTP client with response decoding and request tracing.
//!
//! # Overview
//! `Client` accumulates a request (method, URL, headers, query, raw or
//! multipart body), sends it through a pluggable `Transport`, and decodes the
//! response body into a caller-supplied `Target` as JSON, YAML, or raw
//! bytes/text/numbers.
//!
//! # Design
//! - `Client` is a single-use builder that latches its first error; every
//!   later step returns that error unchanged.
//! - Status classification folds transport failures, 5xx, and other
//!   non-success statuses into the same `Error` channel.
//! - `LoggingTransport` decorates any transport, captures both bodies
//!   without consuming them, and emits one trace per exchange. It is safe to
//!   share across threads; `Client` is not.
//! - Decode destinations are an explicit `Target` enum rather than
//!   something discovered by inspecting the value at runtime.

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod scalar;
pub mod transport;

pub use body::{decode_body, Body, BodyDecoder, DecodeFormat, MultipartWriter, Target};
pub use client::Client;
pub use config::{Options, DEFAULT_TIMEOUT};
pub use error::{Error, TransportError};
pub use log::{LogLevel, LoggingTransport, TraceRecord, TraceSink, TracingSink};
pub use scalar::{decode_scalar, Scalar};
pub use transport::{Transport, UreqTransport};
