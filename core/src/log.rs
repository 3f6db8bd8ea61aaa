//! Transport decorator that traces every request/response pair.
//!
//! # Design
//! `LoggingTransport` drains the request body into memory, puts an
//! equivalent in-memory body back before forwarding, and does the same for
//! the response, so the delegate and the caller still see every byte. Each
//! call owns its own buffers; the only shared state is the delegate and the
//! sink, both `Sync`. Whether a trace is marked slow is decided from that
//! trace's own elapsed time.

use std::fmt;
use std::mem;
use std::time::{Duration, Instant};

use http::{Method, Request, Response};
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::config::Options;
use crate::error::TransportError;
use crate::transport::Transport;

/// Requests slower than this are highlighted in the trace.
pub const TOLERATE_TIME: Duration = Duration::from_secs(5);

const RED: &str = "\x1b[97;41m";
const RESET: &str = "\x1b[0m";

/// Level at which `TracingSink` emits trace events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// One observed request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub host: String,
    pub method: Method,
    pub url: String,
    pub request_body: String,
    pub response_body: String,
    pub elapsed: Duration,
    /// `elapsed` exceeded the tolerance.
    pub slow: bool,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = if self.slow { RED } else { RESET };
        writeln!(f)?;
        writeln!(f, "{} {} {} ", self.host, self.method, self.url)?;
        writeln!(f, "RequestBody: {} ", self.request_body)?;
        writeln!(f, "Response: {} ", self.response_body)?;
        writeln!(f, "Cost time: {color}{:?}{RESET}", self.elapsed)
    }
}

/// Receives finished trace records. Must tolerate concurrent calls.
pub trait TraceSink: Send + Sync {
    fn emit(&self, record: &TraceRecord);
}

/// Writes each record as a single `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    level: LogLevel,
}

impl TracingSink {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

macro_rules! trace_event {
    ($mac:ident, $record:ident) => {
        tracing::$mac!(
            host = %$record.host,
            method = %$record.method,
            url = %$record.url,
            elapsed = ?$record.elapsed,
            slow = $record.slow,
            "{}",
            $record
        )
    };
}

impl TraceSink for TracingSink {
    fn emit(&self, record: &TraceRecord) {
        match self.level {
            LogLevel::Error => trace_event!(error, record),
            LogLevel::Warn => trace_event!(warn, record),
            LogLevel::Info => trace_event!(info, record),
            LogLevel::Debug => trace_event!(debug, record),
            LogLevel::Trace => trace_event!(trace, record),
        }
    }
}

/// A `Transport` that forwards to a delegate and traces each exchange.
pub struct LoggingTransport {
    delegate: Box<dyn Transport>,
    sink: Box<dyn TraceSink>,
    tolerance: Duration,
}

impl LoggingTransport {
    pub fn new(delegate: impl Transport + 'static) -> Self {
        Self::with_sink(delegate, TracingSink::default())
    }

    pub fn with_level(delegate: impl Transport + 'static, level: LogLevel) -> Self {
        Self::with_sink(delegate, TracingSink::new(level))
    }

    pub fn with_sink(delegate: impl Transport + 'static, sink: impl TraceSink + 'static) -> Self {
        Self {
            delegate: Box::new(delegate),
            sink: Box::new(sink),
            tolerance: TOLERATE_TIME,
        }
    }

    /// Override the slow-request threshold.
    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl Transport for LoggingTransport {
    fn round_trip(
        &self,
        mut request: Request<Body>,
        options: &Options,
    ) -> Result<Response<Body>, TransportError> {
        let start = Instant::now();
        let request_body = capture(request.body_mut())?;
        let host = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let method = request.method().clone();
        let url = request.uri().to_string();

        let mut response = self.delegate.round_trip(request, options)?;
        let response_body = capture(response.body_mut())?;

        let elapsed = start.elapsed();
        let record = TraceRecord {
            host,
            method,
            url,
            request_body,
            response_body,
            elapsed,
            slow: elapsed > self.tolerance,
        };
        self.sink.emit(&record);
        Ok(response)
    }
}

/// Read `body` into memory, leave an equivalent body in its place, and
/// return the content as text for the trace.
fn capture(body: &mut Body) -> Result<String, TransportError> {
    if body.is_empty() {
        return Ok(String::new());
    }
    let bytes = mem::take(body).into_bytes()?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    *body = Body::from(bytes);
    Ok(text)
}
