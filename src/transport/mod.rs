//! Connection capability used by the request executor.
//!
//! Two connectors ship with the crate: [`PlatformTransport`] runs each
//! exchange through a pooled `ureq` agent and handles TLS, and
//! [`SocketTransport`] speaks plaintext HTTP/1.1 over `std::net` sockets.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use http::HeaderMap;

use crate::error::{TimeoutPhase, TransportError};
use crate::executor::WireRequest;
use crate::url_parser::bracket_ipv6;

mod platform;
mod socket;

pub(crate) use platform::{
    DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_CONNECTIONS, DEFAULT_POOL_MAX_IDLE_PER_HOST,
};
pub use platform::{PlatformTransport, PlatformTransportOptions};
pub use socket::SocketTransport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    #[default]
    Platform,
    Socket,
}

impl TransportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Socket => "socket",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// A validated (scheme, host, port) triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Value for the `Host` header.
    pub fn authority(&self) -> String {
        let host = bracket_ipv6(&self.host);
        if self.port == self.scheme.default_port() {
            host.into_owned()
        } else {
            format!("{host}:{}", self.port)
        }
    }

    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.authority())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub verify_tls: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self { verify_tls: true }
    }
}

/// One budget for an entire attempt: connect, send, head and body.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started_at: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left, or `None` once the budget is spent.
    pub fn remaining(&self) -> Option<Duration> {
        let remaining = self.timeout.checked_sub(self.started_at.elapsed())?;
        (!remaining.is_zero()).then_some(remaining)
    }

    pub fn check(&self, phase: TimeoutPhase) -> Result<Duration, TransportError> {
        self.remaining().ok_or_else(|| self.timeout_error(phase))
    }

    pub fn timeout_error(&self, phase: TimeoutPhase) -> TransportError {
        TransportError::Timeout {
            phase,
            timeout_ms: self.timeout.as_millis(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

/// Opens logical connections to an endpoint.
pub trait TransportConnector: Send + Sync {
    fn name(&self) -> &'static str;

    fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
        deadline: Deadline,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// A single request/response exchange. Dropping the connection closes it.
pub trait Connection: Send {
    fn send(&mut self, request: &WireRequest, deadline: Deadline) -> Result<(), TransportError>;

    fn receive_head(&mut self, deadline: Deadline) -> Result<ResponseHead, TransportError>;

    /// Reads the next piece of the body; `Ok(0)` marks the end.
    fn read_body(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize, TransportError>;
}

/// Blocking lookup through the system resolver.
pub(crate) fn resolve_endpoint(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, TransportError> {
    let addresses = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|_| TransportError::NameResolutionFailed {
            host: endpoint.host.clone(),
        })?
        .collect::<Vec<_>>();
    if addresses.is_empty() {
        return Err(TransportError::NameResolutionFailed {
            host: endpoint.host.clone(),
        });
    }
    Ok(addresses)
}

pub(crate) fn classify_io_error(
    error: &std::io::Error,
    endpoint: &Endpoint,
    phase: TimeoutPhase,
    deadline: Deadline,
) -> TransportError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => deadline.timeout_error(phase),
        ErrorKind::ConnectionRefused => TransportError::ConnectionRefused {
            host: endpoint.host.clone(),
            port: endpoint.port,
        },
        ErrorKind::NotFound => TransportError::NameResolutionFailed {
            host: endpoint.host.clone(),
        },
        _ if mentions_certificate(error) => TransportError::TlsValidationFailed {
            message: error.to_string(),
        },
        _ => TransportError::other(format!("{phase} failed: {error}")),
    }
}

fn mentions_certificate(error: &std::io::Error) -> bool {
    error.to_string().to_ascii_lowercase().contains("certificate")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Deadline, Endpoint, Scheme, classify_io_error, resolve_endpoint};
    use crate::error::{TimeoutPhase, TransportError};

    #[test]
    fn authority_omits_default_port_and_brackets_ipv6() {
        assert_eq!(
            Endpoint::new(Scheme::Https, "api.example.com", 443).authority(),
            "api.example.com"
        );
        assert_eq!(
            Endpoint::new(Scheme::Http, "api.example.com", 8080).authority(),
            "api.example.com:8080"
        );
        assert_eq!(Endpoint::new(Scheme::Http, "::1", 80).authority(), "[::1]");
    }

    #[test]
    fn expired_deadline_reports_phase() {
        let deadline = Deadline::after(Duration::ZERO);
        assert_eq!(deadline.remaining(), None);
        assert_eq!(
            deadline.check(TimeoutPhase::ResponseBody),
            Err(TransportError::Timeout {
                phase: TimeoutPhase::ResponseBody,
                timeout_ms: 0,
            })
        );
    }

    #[test]
    fn fresh_deadline_has_time_left() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let remaining = deadline.check(TimeoutPhase::Connect).expect("time left");
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }

    #[test]
    fn io_errors_map_to_transport_kinds() {
        let endpoint = Endpoint::new(Scheme::Https, "api.example.com", 443);
        let deadline = Deadline::after(Duration::from_secs(5));
        let classify = |error: std::io::Error| {
            classify_io_error(&error, &endpoint, TimeoutPhase::Exchange, deadline)
        };

        assert_eq!(
            classify(std::io::ErrorKind::ConnectionRefused.into()),
            TransportError::ConnectionRefused {
                host: "api.example.com".to_owned(),
                port: 443,
            }
        );
        assert!(matches!(
            classify(std::io::ErrorKind::TimedOut.into()),
            TransportError::Timeout {
                phase: TimeoutPhase::Exchange,
                ..
            }
        ));
        assert!(matches!(
            classify(std::io::Error::other("invalid peer certificate: UnknownIssuer")),
            TransportError::TlsValidationFailed { .. }
        ));
        assert!(matches!(
            classify(std::io::Error::other("broken pipe")),
            TransportError::Other { .. }
        ));
    }

    #[test]
    fn unresolvable_host_fails_resolution() {
        let endpoint = Endpoint::new(Scheme::Http, "netreq-does-not-exist.invalid", 80);
        assert_eq!(
            resolve_endpoint(&endpoint),
            Err(TransportError::NameResolutionFailed {
                host: "netreq-does-not-exist.invalid".to_owned(),
            })
        );
        let loopback = resolve_endpoint(&Endpoint::new(Scheme::Http, "127.0.0.1", 8080))
            .expect("ip literals resolve locally");
        assert_eq!(loopback[0].port(), 8080);
    }
}
