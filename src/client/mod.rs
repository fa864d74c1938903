use std::sync::Arc;
use std::time::Duration;

use crate::executor::RequestExecutor;
use crate::extensions::Clock;
use crate::rate_limit::RateLimiter;
use crate::transport::{TransportConnector, TransportKind};

mod builder;
mod execute;

pub struct ClientBuilder {
    transport_kind: TransportKind,
    connector: Option<Arc<dyn TransportConnector>>,
    user_agent: String,
    default_timeout: Duration,
    connect_timeout: Option<Duration>,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    pool_max_idle_connections: usize,
    clock: Arc<dyn Clock>,
}

/// A request session: one transport, one rate-limit table.
///
/// Cloning is cheap and clones share both. Every call runs the full
/// pipeline synchronously on the calling thread; see
/// [`Client::request_async`] for background dispatch.
#[derive(Clone)]
pub struct Client {
    executor: Arc<RequestExecutor>,
    rate_limiter: Arc<RateLimiter>,
    default_timeout: Duration,
    transport_kind: TransportKind,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("transport", &self.executor.connector_name())
            .field("default_timeout", &self.default_timeout)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}
