//! The pluggable "send one request, get one response" seam.
//!
//! # Design
//! `Client` never talks to the network directly; it hands a fully built
//! `http::Request<Body>` to a `Transport`. The default transport is a ureq
//! agent with status-as-error disabled so 4xx/5xx responses come back as
//! data and the client classifies them itself. The timeout travels with
//! each call instead of being stored on the transport, so one transport can
//! be shared by many clients at once.

use std::sync::Arc;

use http::{Request, Response};
use ureq::AsSendBody;

use crate::body::Body;
use crate::config::Options;
use crate::error::TransportError;

/// Sends one request and returns one response.
pub trait Transport: Send + Sync {
    fn round_trip(
        &self,
        request: Request<Body>,
        options: &Options,
    ) -> Result<Response<Body>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn round_trip(
        &self,
        request: Request<Body>,
        options: &Options,
    ) -> Result<Response<Body>, TransportError> {
        (**self).round_trip(request, options)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn round_trip(
        &self,
        request: Request<Body>,
        options: &Options,
    ) -> Result<Response<Body>, TransportError> {
        (**self).round_trip(request, options)
    }
}

/// Blocking transport backed by a `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .allow_non_standard_methods(true)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a preconfigured agent. The agent must have
    /// `http_status_as_error(false)`, otherwise error statuses surface as
    /// transport errors instead of being classified by the client.
    pub fn from_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }

    fn run<S: AsSendBody>(
        &self,
        request: Request<S>,
        options: &Options,
    ) -> Result<Response<ureq::Body>, TransportError> {
        let request = self
            .agent
            .configure_request(request)
            .timeout_global(options.timeout)
            .build();
        self.agent.run(request).map_err(|err| match err {
            ureq::Error::Timeout(_) => {
                TransportError::Timeout(options.timeout.unwrap_or_default())
            }
            ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                TransportError::Timeout(options.timeout.unwrap_or_default())
            }
            other => other.into(),
        })
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn round_trip(
        &self,
        request: Request<Body>,
        options: &Options,
    ) -> Result<Response<Body>, TransportError> {
        let (parts, body) = request.into_parts();
        let bytes = body.into_bytes()?;
        let response = if bytes.is_empty() {
            self.run(Request::from_parts(parts, ()), options)?
        } else {
            self.run(Request::from_parts(parts, bytes), options)?
        };
        Ok(response.map(|body| Body::from_reader(body.into_reader())))
    }
}
