use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, NetworkError};
use crate::executor::RawResponse;

pub const RATE_LIMITED_STATUS: u16 = 429;

/// The outcome of one pipeline call.
///
/// `success` is derived from `status_code` at construction and is true only
/// for 2xx. A response that never reached a server has status 0 and carries
/// the reason in `error`.
#[derive(Clone, Debug)]
pub struct Response {
    status_code: u16,
    headers: HeaderMap,
    body: Bytes,
    success: bool,
    error: Option<NetworkError>,
    attempts: usize,
}

impl Response {
    pub(crate) fn from_raw(raw: RawResponse, error: Option<NetworkError>) -> Self {
        Self::new(raw.status, raw.headers, raw.body, error)
    }

    pub(crate) fn failed(error: NetworkError) -> Self {
        Self::new(0, HeaderMap::new(), Bytes::new(), Some(error))
    }

    pub(crate) fn rate_limited(error: NetworkError) -> Self {
        Self::new(RATE_LIMITED_STATUS, HeaderMap::new(), Bytes::new(), Some(error))
    }

    fn new(status_code: u16, headers: HeaderMap, body: Bytes, error: Option<NetworkError>) -> Self {
        Self {
            status_code,
            headers,
            body,
            success: (200..300).contains(&status_code),
            error,
            attempts: 0,
        }
    }

    pub(crate) fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> serde_json::Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Network attempts behind this response, summed over redirect hops.
    /// Zero when the call was rejected before reaching a transport.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn error(&self) -> Option<&NetworkError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(NetworkError::kind)
    }

    /// `Ok` for 2xx, otherwise the recorded error.
    pub fn into_result(self) -> Result<Self, NetworkError> {
        match self.error {
            Some(error) if !self.success => Err(error),
            _ => Ok(self),
        }
    }
}
