use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info_span, warn};

use crate::config::{Method, RequestConfig};
use crate::error::NetworkError;
use crate::executor::{RawResponse, RequestParts};
use crate::rate_limit::RateLimiter;
use crate::response::Response;
use crate::retry::{RetryController, RetryPolicy};
use crate::transport::{Endpoint, Scheme, TransportKind};
use crate::url_parser::parse_url;
use crate::util::{
    is_redirect_status, redact_uri_for_logs, redirect_location, redirect_method,
    resolve_redirect_url, same_origin, sanitize_headers_for_redirect,
};

use super::{Client, ClientBuilder};

/// A validated destination: supported scheme, port in `1..=65535`.
#[derive(Clone, Debug)]
struct Target {
    url: String,
    redacted_url: String,
    endpoint: Endpoint,
    path: String,
}

fn resolve_target(url: &str) -> Result<Target, NetworkError> {
    let redacted_url = redact_uri_for_logs(url);
    let parsed = parse_url(url).map_err(|source| NetworkError::InvalidUrl {
        url: redacted_url.clone(),
        source,
    })?;
    let Some(scheme) = Scheme::parse(&parsed.scheme) else {
        return Err(NetworkError::InvalidProtocol {
            scheme: parsed.scheme,
            url: redacted_url,
        });
    };
    let port = u16::try_from(parsed.port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| NetworkError::InvalidPort {
            port: parsed.port,
            url: redacted_url.clone(),
        })?;

    Ok(Target {
        url: url.to_owned(),
        redacted_url,
        endpoint: Endpoint::new(scheme, parsed.host, port),
        path: parsed.path,
    })
}

/// Caller headers first, then `Authorization` from credentials, which
/// replaces any caller value.
fn request_headers(config: &RequestConfig) -> Result<HeaderMap, NetworkError> {
    let mut headers = HeaderMap::new();
    for (name, value) in config.headers() {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|source| NetworkError::InvalidHeader {
                name: name.to_owned(),
                message: source.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|source| NetworkError::InvalidHeader {
                name: name.to_owned(),
                message: source.to_string(),
            })?;
        headers.insert(header_name, header_value);
    }

    if let Some(credentials) = &config.credentials {
        let mut authorization = HeaderValue::from_str(&credentials.authorization_value())
            .map_err(|source| NetworkError::InvalidHeader {
                name: AUTHORIZATION.as_str().to_owned(),
                message: source.to_string(),
            })?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
    }
    Ok(headers)
}

fn status_error(raw: &RawResponse, method: Method, target: &Target) -> Option<NetworkError> {
    (raw.status >= 400).then(|| NetworkError::HttpStatus {
        status: raw.status,
        method,
        uri: target.redacted_url.clone(),
    })
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// A client on the platform transport with default settings.
    pub fn new() -> Self {
        ClientBuilder::new().build(HeaderValue::from_static(crate::DEFAULT_USER_AGENT))
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn get(&self, url: &str, config: &RequestConfig) -> Response {
        self.request(Method::Get, url, None, config)
    }

    pub fn post(
        &self,
        url: &str,
        payload: impl Into<Bytes>,
        content_type: &str,
        config: &RequestConfig,
    ) -> Response {
        self.request_with_content_type(Method::Post, url, payload.into(), content_type, config)
    }

    pub fn put(
        &self,
        url: &str,
        payload: impl Into<Bytes>,
        content_type: &str,
        config: &RequestConfig,
    ) -> Response {
        self.request_with_content_type(Method::Put, url, payload.into(), content_type, config)
    }

    pub fn patch(
        &self,
        url: &str,
        payload: impl Into<Bytes>,
        content_type: &str,
        config: &RequestConfig,
    ) -> Response {
        self.request_with_content_type(Method::Patch, url, payload.into(), content_type, config)
    }

    pub fn delete(&self, url: &str, config: &RequestConfig) -> Response {
        self.request(Method::Delete, url, None, config)
    }

    fn request_with_content_type(
        &self,
        method: Method,
        url: &str,
        payload: Bytes,
        content_type: &str,
        config: &RequestConfig,
    ) -> Response {
        let config = config
            .clone()
            .with_header(CONTENT_TYPE.as_str(), content_type);
        self.request(method, url, Some(payload), &config)
    }

    /// Runs the whole pipeline on the calling thread and returns exactly
    /// one [`Response`]. Failures are reported through
    /// [`Response::error`], never by panicking.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        payload: Option<Bytes>,
        config: &RequestConfig,
    ) -> Response {
        let target = match resolve_target(url) {
            Ok(target) => target,
            Err(error) => {
                debug!(%method, error = %error, "rejected request before sending");
                return Response::failed(error);
            }
        };
        let headers = match request_headers(config) {
            Ok(headers) => headers,
            Err(error) => {
                debug!(%method, uri = %target.redacted_url, error = %error, "rejected request headers");
                return Response::failed(error);
            }
        };

        self.send_with_redirects(method, target, headers, payload, config)
    }

    fn send_with_redirects(
        &self,
        method: Method,
        target: Target,
        headers: HeaderMap,
        payload: Option<Bytes>,
        config: &RequestConfig,
    ) -> Response {
        let mut attempts = 0_usize;
        self.follow_redirects(method, target, headers, payload, config, &mut attempts)
            .with_attempts(attempts)
    }

    fn follow_redirects(
        &self,
        method: Method,
        target: Target,
        mut headers: HeaderMap,
        mut payload: Option<Bytes>,
        config: &RequestConfig,
        attempts: &mut usize,
    ) -> Response {
        let timeout = config.effective_timeout(self.default_timeout);
        let retry = RetryController::new(RetryPolicy::from_config(config));
        let max_attempts = retry.policy().max_attempts();

        let mut redirect_count = 0_usize;
        let mut current_method = method;
        let mut current_target = target;

        loop {
            if !self
                .rate_limiter
                .admit(&current_target.endpoint.host, config.rate_limit_per_minute)
            {
                warn!(
                    host = %current_target.endpoint.host,
                    limit_per_minute = config.rate_limit_per_minute,
                    "rate limit exceeded; request not sent"
                );
                return Response::rate_limited(NetworkError::RateLimited {
                    host: current_target.endpoint.host.to_ascii_lowercase(),
                    limit_per_minute: config.rate_limit_per_minute,
                });
            }

            let parts = RequestParts {
                method: current_method,
                endpoint: current_target.endpoint.clone(),
                path: current_target.path.clone(),
                headers: headers.clone(),
                body: payload.clone(),
                verify_tls: config.verify_tls,
            };
            let outcome = retry.run(|attempt| {
                *attempts += 1;
                let span = info_span!(
                    "netreq.request",
                    method = %current_method,
                    uri = %current_target.redacted_url,
                    attempt = attempt.attempt_index + 1,
                    max_attempts,
                    redirect_count,
                );
                let _entered = span.enter();
                debug!(timeout_ms = timeout.as_millis() as u64, "sending request");
                self.executor.execute(&parts, timeout)
            });

            let raw = match outcome {
                Ok(raw) => raw,
                Err(source) => {
                    warn!(
                        method = %current_method,
                        uri = %current_target.redacted_url,
                        error = %source,
                        "request failed at the transport level"
                    );
                    return Response::failed(NetworkError::Transport {
                        method: current_method,
                        uri: current_target.redacted_url,
                        source,
                    });
                }
            };

            if !config.follow_redirects || !is_redirect_status(raw.status) {
                let error = status_error(&raw, current_method, &current_target);
                return Response::from_raw(raw, error);
            }

            if redirect_count >= config.max_redirects {
                let error = NetworkError::RedirectLimitExceeded {
                    max_redirects: config.max_redirects,
                    method: current_method,
                    uri: current_target.redacted_url,
                };
                return Response::from_raw(raw, Some(error));
            }

            let location = redirect_location(&raw.headers);
            let next_target = location
                .as_deref()
                .and_then(|location| resolve_redirect_url(&current_target.url, location))
                .and_then(|next_url| resolve_target(&next_url).ok());
            let Some(next_target) = next_target else {
                let error = NetworkError::InvalidRedirect {
                    status: raw.status,
                    location,
                    method: current_method,
                    uri: current_target.redacted_url,
                };
                return Response::from_raw(raw, Some(error));
            };

            let next_method = redirect_method(current_method, raw.status);
            let method_changed_to_get = next_method == Method::Get && current_method != Method::Get;
            if method_changed_to_get {
                payload = None;
            }
            sanitize_headers_for_redirect(
                &mut headers,
                method_changed_to_get,
                same_origin(&current_target.endpoint, &next_target.endpoint),
            );
            debug!(
                status = raw.status,
                from = %current_target.redacted_url,
                to = %next_target.redacted_url,
                method = %next_method,
                "following redirect"
            );

            redirect_count += 1;
            current_method = next_method;
            current_target = next_target;
        }
    }
}
