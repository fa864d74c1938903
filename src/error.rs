use thiserror::Error;

use crate::config::Method;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeoutPhase {
    Connect,
    Send,
    Exchange,
    ResponseHead,
    ResponseBody,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Connect => "connect",
            Self::Send => "send",
            Self::Exchange => "exchange",
            Self::ResponseHead => "response_head",
            Self::ResponseBody => "response_body",
        };
        formatter.write_str(text)
    }
}

/// Failure category carried by every unsuccessful [`crate::Response`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    InvalidProtocol,
    InvalidPort,
    InvalidHeader,
    RateLimited,
    NotInitialized,
    NameResolutionFailed,
    ConnectionRefused,
    TlsValidationFailed,
    Timeout,
    Transport,
    MalformedResponse,
    ServerError,
    ClientError,
    RedirectLimitExceeded,
    InvalidRedirect,
    DispatchFailed,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::InvalidProtocol => "invalid_protocol",
            Self::InvalidPort => "invalid_port",
            Self::InvalidHeader => "invalid_header",
            Self::RateLimited => "rate_limited",
            Self::NotInitialized => "not_initialized",
            Self::NameResolutionFailed => "name_resolution_failed",
            Self::ConnectionRefused => "connection_refused",
            Self::TlsValidationFailed => "tls_validation_failed",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::MalformedResponse => "malformed_response",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::RedirectLimitExceeded => "redirect_limit_exceeded",
            Self::InvalidRedirect => "invalid_redirect",
            Self::DispatchFailed => "dispatch_failed",
        }
    }

    /// True when the request never left the process.
    pub const fn is_local(self) -> bool {
        matches!(
            self,
            Self::InvalidUrl
                | Self::InvalidProtocol
                | Self::InvalidPort
                | Self::InvalidHeader
                | Self::RateLimited
                | Self::NotInitialized
        )
    }

    pub const fn is_transport(self) -> bool {
        matches!(
            self,
            Self::NameResolutionFailed
                | Self::ConnectionRefused
                | Self::TlsValidationFailed
                | Self::Timeout
                | Self::Transport
                | Self::MalformedResponse
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("url is missing the `://` scheme separator")]
    MissingScheme,
    #[error("url has an empty host")]
    MissingHost,
    #[error("url port {port:?} is not a non-negative integer")]
    InvalidPort { port: String },
    #[error("url carries `user@` credentials; pass them through RequestConfig::with_credentials")]
    UserInfoNotSupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to resolve host {host}")]
    NameResolutionFailed { host: String },
    #[error("connection refused by {host}:{port}")]
    ConnectionRefused { host: String, port: u16 },
    #[error("tls validation failed: {message}")]
    TlsValidationFailed { message: String },
    #[error("timed out in {phase} after {timeout_ms}ms")]
    Timeout { phase: TimeoutPhase, timeout_ms: u128 },
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NameResolutionFailed { .. } => ErrorKind::NameResolutionFailed,
            Self::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            Self::TlsValidationFailed { .. } => ErrorKind::TlsValidationFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Other { .. } => ErrorKind::Transport,
        }
    }

    pub(crate) fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: ParseError,
    },
    #[error("unsupported protocol {scheme:?} in {url}; expected http or https")]
    InvalidProtocol { scheme: String, url: String },
    #[error("port {port} is outside 1..=65535 in {url}")]
    InvalidPort { port: u32, url: String },
    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },
    #[error("rate limit of {limit_per_minute} requests per minute exceeded for host {host}")]
    RateLimited { host: String, limit_per_minute: u32 },
    #[error("network session is not initialized")]
    NotInitialized,
    #[error("http transport error for {method} {uri}: {source}")]
    Transport {
        method: Method,
        uri: String,
        #[source]
        source: TransportError,
    },
    #[error("http status error {status} for {method} {uri}")]
    HttpStatus {
        status: u16,
        method: Method,
        uri: String,
    },
    #[error("redirect limit exceeded ({max_redirects}) for {method} {uri}")]
    RedirectLimitExceeded {
        max_redirects: usize,
        method: Method,
        uri: String,
    },
    #[error("redirect response {status} has an unusable location {location:?} for {method} {uri}")]
    InvalidRedirect {
        status: u16,
        location: Option<String>,
        method: Method,
        uri: String,
    },
    #[error("async dispatch failed for {method} {uri}: {message}")]
    DispatchFailed {
        method: Method,
        uri: String,
        message: String,
    },
}

impl NetworkError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::InvalidProtocol { .. } => ErrorKind::InvalidProtocol,
            Self::InvalidPort { .. } => ErrorKind::InvalidPort,
            Self::InvalidHeader { .. } => ErrorKind::InvalidHeader,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::Transport { source, .. } => source.kind(),
            Self::HttpStatus { status, .. } => {
                if *status >= 500 {
                    ErrorKind::ServerError
                } else {
                    ErrorKind::ClientError
                }
            }
            Self::RedirectLimitExceeded { .. } => ErrorKind::RedirectLimitExceeded,
            Self::InvalidRedirect { .. } => ErrorKind::InvalidRedirect,
            Self::DispatchFailed { .. } => ErrorKind::DispatchFailed,
        }
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}
