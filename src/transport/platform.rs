use std::io::Read;
use std::time::Duration;

use http::header::{CONNECTION, CONTENT_LENGTH, HOST};
use tracing::debug;

use super::{
    ConnectOptions, Connection, Deadline, Endpoint, ResponseHead, TransportConnector,
    classify_io_error, resolve_endpoint,
};
use crate::error::{TimeoutPhase, TransportError};
use crate::executor::WireRequest;

pub(crate) const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
pub(crate) const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;
pub(crate) const DEFAULT_POOL_MAX_IDLE_CONNECTIONS: usize = 16;

/// HTTP(S) through pooled `ureq` agents, one verifying TLS and one not.
///
/// The agents are the session's connection pool; they are created when the
/// transport is built and released when the last clone is dropped.
#[derive(Clone)]
pub struct PlatformTransport {
    verified: ureq::Agent,
    unverified: ureq::Agent,
}

impl std::fmt::Debug for PlatformTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("PlatformTransport").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct PlatformTransportOptions {
    pub user_agent: String,
    pub connect_timeout: Option<Duration>,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_max_idle_connections: usize,
}

impl Default for PlatformTransportOptions {
    fn default() -> Self {
        Self {
            user_agent: crate::DEFAULT_USER_AGENT.to_owned(),
            connect_timeout: None,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_max_idle_connections: DEFAULT_POOL_MAX_IDLE_CONNECTIONS,
        }
    }
}

impl Default for PlatformTransport {
    fn default() -> Self {
        Self::new(&PlatformTransportOptions::default())
    }
}

impl PlatformTransport {
    pub fn new(options: &PlatformTransportOptions) -> Self {
        Self {
            verified: make_agent(options, true),
            unverified: make_agent(options, false),
        }
    }
}

fn make_agent(options: &PlatformTransportOptions, verify_tls: bool) -> ureq::Agent {
    let tls_config = ureq::tls::TlsConfig::builder()
        .disable_verification(!verify_tls)
        .build();
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .user_agent(options.user_agent.as_str())
        .timeout_connect(options.connect_timeout)
        .max_idle_age(options.pool_idle_timeout)
        .max_idle_connections_per_host(options.pool_max_idle_per_host)
        .max_idle_connections(options.pool_max_idle_connections)
        .tls_config(tls_config)
        .build()
        .new_agent()
}

impl TransportConnector for PlatformTransport {
    fn name(&self) -> &'static str {
        "platform"
    }

    fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
        deadline: Deadline,
    ) -> Result<Box<dyn Connection>, TransportError> {
        deadline.check(TimeoutPhase::Connect)?;
        let agent = if options.verify_tls {
            self.verified.clone()
        } else {
            self.unverified.clone()
        };
        Ok(Box::new(PlatformConnection {
            agent,
            endpoint: endpoint.clone(),
            head: None,
            body: None,
        }))
    }
}

/// The agent connects lazily, so connect, send and head all happen in
/// [`Connection::send`].
struct PlatformConnection {
    agent: ureq::Agent,
    endpoint: Endpoint,
    head: Option<ResponseHead>,
    body: Option<ureq::BodyReader<'static>>,
}

impl Connection for PlatformConnection {
    fn send(&mut self, request: &WireRequest, deadline: Deadline) -> Result<(), TransportError> {
        let remaining = deadline.check(TimeoutPhase::Exchange)?;

        let mut builder = ureq::http::Request::builder()
            .method(http::Method::from(request.method))
            .uri(request.uri());
        for (name, value) in &request.headers {
            if name == HOST || name == CONTENT_LENGTH || name == CONNECTION {
                continue;
            }
            builder = builder.header(name, value);
        }
        let http_request = builder
            .body(request.body.to_vec())
            .map_err(|source| TransportError::other(format!("failed to build request: {source}")))?;

        let configured_request = self
            .agent
            .configure_request(http_request)
            .timeout_global(Some(remaining))
            .build();

        let response = self
            .agent
            .run(configured_request)
            .map_err(|source| classify_ureq_error(source, &self.endpoint, deadline))?;
        debug!(status = response.status().as_u16(), "platform exchange completed");

        let (parts, body) = response.into_parts();
        self.head = Some(ResponseHead {
            status: parts.status.as_u16(),
            headers: parts.headers,
        });
        self.body = Some(body.into_reader());
        Ok(())
    }

    fn receive_head(&mut self, deadline: Deadline) -> Result<ResponseHead, TransportError> {
        deadline.check(TimeoutPhase::ResponseHead)?;
        self.head
            .take()
            .ok_or_else(|| TransportError::other("response head requested before send"))
    }

    fn read_body(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize, TransportError> {
        let Some(reader) = self.body.as_mut() else {
            return Ok(0);
        };
        deadline.check(TimeoutPhase::ResponseBody)?;
        reader.read(buf).map_err(|error| {
            match wrapped_ureq_error(&error) {
                Some(ureq::Error::Timeout(_)) => deadline.timeout_error(TimeoutPhase::ResponseBody),
                Some(other) => TransportError::other(format!("response body failed: {other}")),
                None => classify_io_error(&error, &self.endpoint, TimeoutPhase::ResponseBody, deadline),
            }
        })
    }
}

fn wrapped_ureq_error(io_error: &std::io::Error) -> Option<&ureq::Error> {
    io_error
        .get_ref()
        .and_then(|source| source.downcast_ref::<ureq::Error>())
}

fn classify_ureq_error(error: ureq::Error, endpoint: &Endpoint, deadline: Deadline) -> TransportError {
    match error {
        ureq::Error::Timeout(_) => deadline.timeout_error(TimeoutPhase::Exchange),
        ureq::Error::HostNotFound => TransportError::NameResolutionFailed {
            host: endpoint.host.clone(),
        },
        ureq::Error::Tls(message) => TransportError::TlsValidationFailed {
            message: message.to_owned(),
        },
        ureq::Error::Rustls(source) => TransportError::TlsValidationFailed {
            message: source.to_string(),
        },
        ureq::Error::ConnectionFailed => TransportError::ConnectionRefused {
            host: endpoint.host.clone(),
            port: endpoint.port,
        },
        ureq::Error::Io(source) => {
            if let Some(inner) = wrapped_ureq_error(&source) {
                return TransportError::other(inner.to_string());
            }
            match classify_io_error(&source, endpoint, TimeoutPhase::Exchange, deadline) {
                // the default resolver reports lookup failures as plain io errors
                TransportError::Other { .. } if resolve_endpoint(endpoint).is_err() => {
                    TransportError::NameResolutionFailed {
                        host: endpoint.host.clone(),
                    }
                }
                classified => classified,
            }
        }
        other => TransportError::other(other.to_string()),
    }
}
