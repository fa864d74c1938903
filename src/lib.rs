//! `netreq` is a blocking HTTP(S) request pipeline with per-host rate
//! limiting, bounded retries for server errors, redirect following and
//! background dispatch.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use netreq::prelude::{Client, Credentials, RequestConfig};
//!
//! let client = Client::builder()
//!     .default_timeout(Duration::from_secs(10))
//!     .try_build()?;
//!
//! let config = RequestConfig::new()
//!     .with_max_retries(3)
//!     .with_rate_limit_per_minute(60)
//!     .with_credentials(Credentials::api_key("secret"));
//!
//! let response = client.get("https://api.example.com/v1/items", &config);
//! if response.is_success() {
//!     println!("{}", response.text_lossy());
//! } else {
//!     eprintln!("request failed: {:?}", response.error());
//! }
//! # Ok::<(), netreq::NetworkError>(())
//! ```
//!
//! # Process-wide session
//!
//! ```no_run
//! use netreq::{RequestConfig, session};
//!
//! session::initialize()?;
//! let response = session::get("https://api.example.com/health", &RequestConfig::new());
//! assert!(response.status_code() != 0 || response.error().is_some());
//! session::cleanup();
//! # Ok::<(), netreq::NetworkError>(())
//! ```

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("netreq/", env!("CARGO_PKG_VERSION"));

mod client;
mod config;
mod dispatch;
pub mod encoding;
mod error;
mod executor;
mod extensions;
mod rate_limit;
mod response;
mod retry;
pub mod session;
pub mod transport;
mod url_parser;
mod util;

pub use crate::client::{Client, ClientBuilder};
pub use crate::config::{Credentials, Method, RequestConfig};
pub use crate::dispatch::PendingResponse;
pub use crate::error::{ErrorKind, NetworkError, ParseError, TimeoutPhase, TransportError};
pub use crate::executor::{RawResponse, RequestExecutor, RequestParts, WireRequest};
pub use crate::extensions::{Clock, ManualClock, SystemClock};
pub use crate::rate_limit::{RATE_LIMIT_WINDOW, RateLimitWindow, RateLimiter};
pub use crate::response::Response;
pub use crate::retry::{RetryAttempt, RetryController, RetryPolicy};
pub use crate::url_parser::{ParsedUrl, default_port_for_scheme, parse_url};

pub type NetResult<T> = std::result::Result<T, NetworkError>;

pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, Credentials, ErrorKind, Method, NetResult, NetworkError,
        PendingResponse, RequestConfig, Response, RetryPolicy,
    };
}
