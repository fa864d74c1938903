use std::collections::BTreeMap;
use std::time::Duration;

use crate::encoding::base64_encode;

pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Methods whose payload is framed with `Content-Length` / `Content-Type`.
    pub const fn allows_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = String;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        match *method {
            http::Method::GET => Ok(Self::Get),
            http::Method::POST => Ok(Self::Post),
            http::Method::PUT => Ok(Self::Put),
            http::Method::PATCH => Ok(Self::Patch),
            http::Method::DELETE => Ok(Self::Delete),
            ref other => Err(format!("unsupported http method {other}")),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    ApiKey(String),
    OAuthToken(String),
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    pub fn oauth_token(token: impl Into<String>) -> Self {
        Self::OAuthToken(token.into())
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the synthesized `Authorization` header.
    pub fn authorization_value(&self) -> String {
        match self {
            Self::ApiKey(token) | Self::OAuthToken(token) => {
                let token = token.trim();
                if token.starts_with("Bearer ") {
                    token.to_owned()
                } else {
                    format!("Bearer {token}")
                }
            }
            Self::Basic { username, password } => {
                format!("Basic {}", base64_encode(format!("{username}:{password}")))
            }
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => formatter.write_str("ApiKey(<redacted>)"),
            Self::OAuthToken(_) => formatter.write_str("OAuthToken(<redacted>)"),
            Self::Basic { username, .. } => formatter
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Per-call options. Values are copied and modified through the `with_*`
/// builders; a config is never mutated while a request is using it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestConfig {
    /// Per-attempt budget for connect, send and the full response read.
    /// Zero selects the client default.
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub verify_tls: bool,
    /// Additional attempts after the first one, only for 5xx responses.
    pub max_retries: usize,
    /// Fixed delay between retries. Zero selects exponential backoff.
    pub retry_delay: Duration,
    /// Admissions per host per minute. Zero disables the limiter.
    pub rate_limit_per_minute: u32,
    pub credentials: Option<Credentials>,
    pub run_async: bool,
    headers: BTreeMap<String, (String, String)>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            verify_tls: true,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            rate_limit_per_minute: 0,
            credentials: None,
            run_async: false,
            headers: BTreeMap::new(),
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow_redirects: bool) -> Self {
        self.follow_redirects = follow_redirects;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_rate_limit_per_minute(mut self, rate_limit_per_minute: u32) -> Self {
        self.rate_limit_per_minute = rate_limit_per_minute;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_run_async(mut self, run_async: bool) -> Self {
        self.run_async = run_async;
        self
    }

    /// Sets a request header. Names compare case-insensitively and the last
    /// write wins; the caller's spelling is kept for display.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.set_header(name, value);
        }
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(&name.to_ascii_lowercase());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Headers in name order, with the spelling of their last write.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub(crate) fn effective_timeout(&self, client_default: Duration) -> Duration {
        if self.timeout.is_zero() {
            client_default
        } else {
            self.timeout
        }
    }

    fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers
            .insert(name.to_ascii_lowercase(), (name, value.into()));
    }
}
