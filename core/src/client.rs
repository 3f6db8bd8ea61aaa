//! Fluent request builder that sends through a `Transport` and decodes the
//! response.
//!
//! # Design
//! A `Client` is a single-use builder: chain setters, call `send`, then
//! decode once. Every step takes and returns `self`. The first failure is
//! latched in the client, later steps skip their work, and `decode_into`
//! returns that same error, so a whole chain needs one error check.
//!
//! Raw bodies and multipart forms share one body slot, and the last writer
//! wins: `set_body` drops any form parts added so far, and a form call made
//! after `set_body` drops the raw body and starts a fresh form.
//!
//! Responses are classified right after the round-trip:
//! - `101 Switching Protocols` succeeds (upgrade path).
//! - `>= 500` fails with a fixed "internal server error"; the body is not
//!   echoed.
//! - anything outside `200..=206` fails with the body as the message, or the
//!   status line when the body is empty.

use std::fmt::Display;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};

use crate::body::{decode_body, Body, DecodeFormat, MultipartWriter, Target};
use crate::config::{Options, DEFAULT_TIMEOUT};
use crate::error::Error;
use crate::log::{LogLevel, LoggingTransport};
use crate::transport::{Transport, UreqTransport};

const JSON_CONTENT_TYPE: &str = "application/json";

enum Outcome {
    Pending,
    Sent(Response<Body>),
    Failed(Error),
}

/// Single-use HTTP request builder.
///
/// ```no_run
/// use gt_core::{Client, DecodeFormat, Target};
///
/// #[derive(Default, serde::Deserialize)]
/// struct Person { id: i64, name: String }
///
/// let mut person = Person::default();
/// Client::default_client()
///     .get("http://localhost:3000/person")
///     .send()
///     .decode_into(Target::structured(&mut person), DecodeFormat::Json)?;
/// # Ok::<(), gt_core::Error>(())
/// ```
pub struct Client {
    transport: Arc<dyn Transport>,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Body>,
    multipart: Option<MultipartWriter>,
    options: Options,
    outcome: Outcome,
}

impl Client {
    /// Bare client: no default headers, no timeout.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(UreqTransport::new()))
    }

    /// JSON `Content-Type` and a 10 second timeout.
    pub fn default_client() -> Self {
        Self::default_with_transport(Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            method: Method::GET,
            url: String::new(),
            headers: HeaderMap::new(),
            body: None,
            multipart: None,
            options: Options::default(),
            outcome: Outcome::Pending,
        }
    }

    pub fn default_with_transport(transport: Arc<dyn Transport>) -> Self {
        let mut client = Self::with_transport(transport);
        client
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        client.options = Options::with_timeout(DEFAULT_TIMEOUT);
        client
    }

    // -- method + url ------------------------------------------------------

    pub fn request(mut self, method: Method, url: impl Into<String>) -> Self {
        self.method = method;
        self.url = url.into();
        self
    }

    pub fn get(self, url: impl Into<String>) -> Self {
        self.request(Method::GET, url)
    }

    pub fn post(self, url: impl Into<String>) -> Self {
        self.request(Method::POST, url)
    }

    pub fn put(self, url: impl Into<String>) -> Self {
        self.request(Method::PUT, url)
    }

    pub fn patch(self, url: impl Into<String>) -> Self {
        self.request(Method::PATCH, url)
    }

    pub fn delete(self, url: impl Into<String>) -> Self {
        self.request(Method::DELETE, url)
    }

    pub fn options(self, url: impl Into<String>) -> Self {
        self.request(Method::OPTIONS, url)
    }

    /// Non-standard `UPDATE` verb.
    pub fn update(self, url: impl Into<String>) -> Self {
        self.custom("UPDATE", url)
    }

    /// Non-standard `HEADER` verb (not `HEAD`).
    pub fn header_verb(self, url: impl Into<String>) -> Self {
        self.custom("HEADER", url)
    }

    /// Any verb given by name. An invalid token latches
    /// `Error::InvalidRequest` and leaves the method unchanged.
    pub fn custom(self, method: &str, url: impl Into<String>) -> Self {
        match Method::from_bytes(method.as_bytes()) {
            Ok(method) => self.request(method, url),
            Err(err) => self.set_url(url).fail(http::Error::from(err).into()),
        }
    }

    pub fn set_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    // -- options -----------------------------------------------------------

    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Route later sends through a `LoggingTransport` wrapping the current
    /// transport.
    pub fn enable_log(mut self, level: LogLevel) -> Self {
        let inner = Arc::clone(&self.transport);
        self.transport = Arc::new(LoggingTransport::with_level(inner, level));
        self
    }

    // -- headers -----------------------------------------------------------

    /// Append every value of `headers`.
    pub fn add_headers(mut self, headers: HeaderMap) -> Self {
        let mut current = None;
        for (name, value) in headers {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                self.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Append one value, keeping existing values for the same name.
    pub fn add_header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match parse_header(key.as_ref(), value.as_ref()) {
            Ok((name, value)) => {
                self.headers.append(name, value);
                self
            }
            Err(err) => self.fail(err),
        }
    }

    /// Replace all values for `key` with `value`.
    pub fn set_header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match parse_header(key.as_ref(), value.as_ref()) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
                self
            }
            Err(err) => self.fail(err),
        }
    }

    // -- query -------------------------------------------------------------

    /// Append `key=value` to the URL. Pairs with an empty key or value are
    /// ignored.
    pub fn add_query(mut self, key: &str, value: &str) -> Self {
        if key.is_empty() || value.is_empty() {
            return self;
        }
        let pair = match serde_urlencoded::to_string([(key, value)].as_slice()) {
            Ok(pair) => pair,
            Err(err) => return self.fail(err.into()),
        };
        self.url.push(if self.url.contains('?') { '&' } else { '?' });
        self.url.push_str(&pair);
        self
    }

    /// Append every pair in iteration order.
    pub fn set_query<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        params
            .into_iter()
            .fold(self, |client, (k, v)| client.add_query(k.as_ref(), &v.to_string()))
    }

    // -- body --------------------------------------------------------------

    /// Install a raw body, discarding any form parts added so far.
    pub fn set_body(mut self, body: impl Into<Body>) -> Self {
        self.multipart = None;
        self.body = Some(body.into());
        self
    }

    pub fn set_form_field(mut self, key: &str, value: &str) -> Self {
        if self.is_failed() {
            return self;
        }
        self.form().write_field(key, value);
        self
    }

    /// Attach the file at `path` as a form part named `key`.
    pub fn set_form_file(mut self, key: &str, path: impl AsRef<Path>) -> Self {
        if self.is_failed() {
            return self;
        }
        match self.attach_file(key, path.as_ref()) {
            Ok(()) => self,
            Err(err) => self.fail(err.into()),
        }
    }

    fn attach_file(&mut self, key: &str, path: &Path) -> io::Result<()> {
        let mut file = File::open(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.form().write_file(key, &file_name, &mut file)?;
        Ok(())
    }

    fn form(&mut self) -> &mut MultipartWriter {
        if self.multipart.is_none() {
            self.body = None;
        }
        self.multipart.get_or_insert_with(MultipartWriter::new)
    }

    // -- send --------------------------------------------------------------

    /// Send the request and classify the response.
    pub fn send(mut self) -> Self {
        if self.is_failed() {
            return self;
        }

        if let Some(form) = self.multipart.take() {
            match HeaderValue::from_str(&form.content_type()) {
                Ok(value) => {
                    self.headers.insert(CONTENT_TYPE, value);
                }
                Err(err) => return self.fail(err.into()),
            }
            self.body = Some(Body::from(form.finish()));
        }

        let body = self.body.take().unwrap_or_default();
        let mut request = match Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str())
            .body(body)
        {
            Ok(request) => request,
            Err(err) => return self.fail(err.into()),
        };
        *request.headers_mut() = self.headers.clone();

        let response = match self.transport.round_trip(request, &self.options) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(method = %self.method, url = %self.url, error = %err, "request failed");
                return self.fail(err.into());
            }
        };
        tracing::debug!(
            method = %self.method,
            url = %self.url,
            status = response.status().as_u16(),
            "response received"
        );

        self.outcome = match classify(response) {
            Ok(response) => Outcome::Sent(response),
            Err(err) => Outcome::Failed(err),
        };
        self
    }

    // -- decode ------------------------------------------------------------

    /// Decode the response body into `target`.
    ///
    /// A latched error is returned first. A `None` target is a no-op.
    pub fn decode_into<'a>(
        self,
        target: impl Into<Option<Target<'a>>>,
        format: DecodeFormat,
    ) -> Result<(), Error> {
        self.decode_with(target.into(), Ok(format))
    }

    /// Like `decode_into` with the format given by name (`json`, `yaml`,
    /// `body`). An unknown name fails with `Error::UnsupportedFormat`.
    pub fn decode_as<'a>(
        self,
        target: impl Into<Option<Target<'a>>>,
        format: &str,
    ) -> Result<(), Error> {
        self.decode_with(target.into(), format.parse())
    }

    fn decode_with(
        self,
        target: Option<Target<'_>>,
        format: Result<DecodeFormat, Error>,
    ) -> Result<(), Error> {
        let response = match self.outcome {
            Outcome::Failed(err) => return Err(err),
            Outcome::Sent(response) => Some(response),
            Outcome::Pending => None,
        };
        let Some(target) = target else {
            return Ok(());
        };
        let format = format?;
        let response = response.ok_or(Error::NotSent)?;
        decode_body(response.into_body(), target, format)
    }

    // -- inspection --------------------------------------------------------

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Response<Body>> {
        match &self.outcome {
            Outcome::Sent(response) => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(Response::status)
    }

    /// Take the raw response, or the latched error.
    pub fn into_response(self) -> Result<Response<Body>, Error> {
        match self.outcome {
            Outcome::Sent(response) => Ok(response),
            Outcome::Failed(err) => Err(err),
            Outcome::Pending => Err(Error::NotSent),
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    /// Latch `err` unless an earlier error is already latched.
    fn fail(mut self, err: Error) -> Self {
        if !self.is_failed() {
            self.outcome = Outcome::Failed(err);
        }
        self
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::default_client()
    }
}

fn parse_header(key: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let name = HeaderName::from_bytes(key.as_bytes())?;
    let value = HeaderValue::from_str(value)?;
    Ok((name, value))
}

/// Turn out-of-range statuses into errors.
fn classify(response: Response<Body>) -> Result<Response<Body>, Error> {
    let status = response.status();
    match status.as_u16() {
        101 => Ok(response),
        500..=u16::MAX => Err(Error::InternalServerError { status }),
        200..=206 => Ok(response),
        _ => Err(status_error(status, response.into_body())),
    }
}

fn status_error(status: StatusCode, body: Body) -> Error {
    match body.into_bytes() {
        Ok(bytes) if bytes.is_empty() => Error::Status {
            status,
            message: status_line(status),
        },
        Ok(bytes) => Error::Status {
            status,
            message: String::from_utf8_lossy(&bytes).into_owned(),
        },
        Err(err) if is_stream_reset(&err) => Error::StreamReset(err),
        Err(err) => Error::BodyRead(err),
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_str()),
        None => status.as_str().to_string(),
    }
}

fn is_stream_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
