use std::sync::Arc;
use std::time::Duration;

use http::HeaderValue;

use crate::NetResult;
use crate::config::DEFAULT_REQUEST_TIMEOUT;
use crate::error::NetworkError;
use crate::executor::RequestExecutor;
use crate::extensions::{Clock, SystemClock};
use crate::rate_limit::RateLimiter;
use crate::transport::{
    DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_CONNECTIONS, DEFAULT_POOL_MAX_IDLE_PER_HOST,
    PlatformTransport, PlatformTransportOptions, SocketTransport, TransportConnector, TransportKind,
};

use super::{Client, ClientBuilder};

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            transport_kind: TransportKind::default(),
            connector: None,
            user_agent: crate::DEFAULT_USER_AGENT.to_owned(),
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: None,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_max_idle_connections: DEFAULT_POOL_MAX_IDLE_CONNECTIONS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn transport(mut self, transport_kind: TransportKind) -> Self {
        self.transport_kind = transport_kind;
        self
    }

    /// Replaces the built-in transport. The `transport` kind is then only
    /// reported, not used.
    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Used when a call's `RequestConfig::timeout` is zero.
    pub fn default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host.max(1);
        self
    }

    pub fn pool_max_idle_connections(mut self, pool_max_idle_connections: usize) -> Self {
        self.pool_max_idle_connections = pool_max_idle_connections.max(1);
        self
    }

    /// Time source for the rate limiter.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn try_build(self) -> NetResult<Client> {
        let user_agent =
            HeaderValue::from_str(&self.user_agent).map_err(|source| NetworkError::InvalidHeader {
                name: "user-agent".to_owned(),
                message: source.to_string(),
            })?;
        Ok(self.build(user_agent))
    }

    pub(super) fn build(self, user_agent: HeaderValue) -> Client {
        let connector: Arc<dyn TransportConnector> = match self.connector {
            Some(connector) => connector,
            None => match self.transport_kind {
                TransportKind::Platform => Arc::new(PlatformTransport::new(&PlatformTransportOptions {
                    user_agent: self.user_agent.clone(),
                    connect_timeout: self.connect_timeout,
                    pool_idle_timeout: self.pool_idle_timeout,
                    pool_max_idle_per_host: self.pool_max_idle_per_host,
                    pool_max_idle_connections: self.pool_max_idle_connections,
                })),
                TransportKind::Socket => {
                    let mut socket = SocketTransport::new();
                    if let Some(connect_timeout) = self.connect_timeout {
                        socket = socket.connect_timeout(connect_timeout);
                    }
                    Arc::new(socket)
                }
            },
        };

        Client {
            executor: Arc::new(RequestExecutor::new(connector, user_agent)),
            rate_limiter: Arc::new(RateLimiter::with_clock(self.clock)),
            default_timeout: self.default_timeout,
            transport_kind: self.transport_kind,
        }
    }
}
