use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use tracing::debug;

use crate::config::Method;
use crate::error::{TimeoutPhase, TransportError};
use crate::transport::{ConnectOptions, Deadline, Endpoint, ResponseHead, TransportConnector};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const DEFAULT_BODY_CONTENT_TYPE: &str = "application/json";

/// Everything one attempt needs, independent of the transport.
#[derive(Clone, Debug)]
pub struct RequestParts {
    pub method: Method,
    pub endpoint: Endpoint,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub verify_tls: bool,
}

/// An HTTP/1.1 request as it goes on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    pub endpoint: Endpoint,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WireRequest {
    pub fn uri(&self) -> String {
        format!("{}{}", self.endpoint.origin(), self.target)
    }

    /// Request line and header block, terminated by an empty line.
    pub fn encode_head(&self) -> Vec<u8> {
        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(self.method.as_str().as_bytes());
        head.push(b' ');
        head.extend_from_slice(self.target.as_bytes());
        head.extend_from_slice(b" HTTP/1.1\r\n");
        for (name, value) in &self.headers {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        head
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub(crate) fn build_wire_request(parts: &RequestParts, user_agent: &HeaderValue) -> WireRequest {
    let mut headers = HeaderMap::with_capacity(parts.headers.len() + 4);
    if let Ok(host) = HeaderValue::from_str(&parts.endpoint.authority()) {
        headers.insert(HOST, host);
    }
    headers.insert(USER_AGENT, user_agent.clone());
    for (name, value) in &parts.headers {
        headers.insert(name.clone(), value.clone());
    }

    let body = match &parts.body {
        Some(body) if parts.method.allows_body() => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(DEFAULT_BODY_CONTENT_TYPE),
                );
            }
            body.clone()
        }
        Some(body) => {
            debug!(
                method = %parts.method,
                bytes = body.len(),
                "dropping payload for method without a body"
            );
            Bytes::new()
        }
        None => Bytes::new(),
    };
    if parts.method.allows_body() {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    } else {
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONTENT_TYPE);
    }
    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    WireRequest {
        method: parts.method,
        endpoint: parts.endpoint.clone(),
        target: parts.path.clone(),
        headers,
        body,
    }
}

/// Runs exactly one attempt. Holds no state between calls.
pub struct RequestExecutor {
    connector: Arc<dyn TransportConnector>,
    user_agent: HeaderValue,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestExecutor")
            .field("connector", &self.connector.name())
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RequestExecutor {
    pub fn new(connector: Arc<dyn TransportConnector>, user_agent: HeaderValue) -> Self {
        Self {
            connector,
            user_agent,
        }
    }

    pub fn connector_name(&self) -> &'static str {
        self.connector.name()
    }

    /// Buffers the whole body; see [`Self::execute_streaming`] for chunks.
    pub fn execute(
        &self,
        parts: &RequestParts,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let mut body = BytesMut::new();
        let head = self.execute_streaming(parts, timeout, &mut |chunk| {
            body.extend_from_slice(chunk);
        })?;
        Ok(RawResponse {
            status: head.status,
            headers: head.headers,
            body: body.freeze(),
        })
    }

    /// Hands each body chunk to `on_chunk` as soon as it is read.
    ///
    /// `timeout` bounds connect, send, head and body together. The deadline
    /// is re-checked between chunks, and the connection is dropped on every
    /// return path.
    pub fn execute_streaming(
        &self,
        parts: &RequestParts,
        timeout: Duration,
        on_chunk: &mut dyn FnMut(&[u8]),
    ) -> Result<ResponseHead, TransportError> {
        let deadline = Deadline::after(timeout);
        let wire = build_wire_request(parts, &self.user_agent);
        let options = ConnectOptions {
            verify_tls: parts.verify_tls,
        };

        let mut connection = self.connector.connect(&parts.endpoint, &options, deadline)?;
        connection.send(&wire, deadline)?;
        let head = connection.receive_head(deadline)?;
        debug!(
            status = head.status,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "received response head"
        );

        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        let mut total_bytes = 0_usize;
        loop {
            deadline.check(TimeoutPhase::ResponseBody)?;
            let read = connection.read_body(&mut chunk, deadline)?;
            if read == 0 {
                break;
            }
            total_bytes = total_bytes.saturating_add(read);
            on_chunk(&chunk[..read]);
        }
        debug!(body_bytes = total_bytes, "response body complete");

        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};

    use super::{RequestParts, build_wire_request};
    use crate::config::Method;
    use crate::transport::{Endpoint, Scheme};

    fn parts(method: Method, body: Option<&'static str>) -> RequestParts {
        RequestParts {
            method,
            endpoint: Endpoint::new(Scheme::Http, "api.example.com", 8080),
            path: "/v1/items?limit=2".to_owned(),
            headers: HeaderMap::new(),
            body: body.map(|s| Bytes::from_static(s.as_bytes())),
            verify_tls: true,
        }
    }

    #[test]
    fn post_body_gets_length_and_default_content_type() {
        let wire = build_wire_request(
            &parts(Method::Post, Some("{\"a\":1}")),
            &HeaderValue::from_static("netreq-test"),
        );
        let head = String::from_utf8(wire.encode_head()).expect("ascii head");

        assert!(head.starts_with("POST /v1/items?limit=2 HTTP/1.1\r\n"));
        assert!(head.contains("host: api.example.com:8080\r\n"));
        assert!(head.contains("content-length: 7\r\n"));
        assert!(head.contains("content-type: application/json\r\n"));
        assert!(head.contains("connection: close\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
        assert_eq!(wire.body, Bytes::from_static(b"{\"a\":1}"));
    }

    #[test]
    fn caller_content_type_is_kept() {
        let mut request = parts(Method::Put, Some("a=1"));
        request.headers.insert(
            "content-type",
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let wire = build_wire_request(&request, &HeaderValue::from_static("netreq-test"));
        assert_eq!(
            wire.headers.get("content-type"),
            Some(&HeaderValue::from_static("application/x-www-form-urlencoded"))
        );
    }

    #[test]
    fn get_drops_payload_and_body_headers() {
        let wire = build_wire_request(
            &parts(Method::Get, Some("ignored")),
            &HeaderValue::from_static("netreq-test"),
        );
        assert!(wire.body.is_empty());
        assert!(wire.headers.get("content-length").is_none());
        assert!(wire.headers.get("content-type").is_none());
        assert_eq!(wire.uri(), "http://api.example.com:8080/v1/items?limit=2");
    }

    #[test]
    fn bodiless_post_still_declares_zero_length() {
        let wire = build_wire_request(
            &parts(Method::Post, None),
            &HeaderValue::from_static("netreq-test"),
        );
        assert_eq!(
            wire.headers.get("content-length"),
            Some(&HeaderValue::from(0_usize))
        );
        assert!(wire.headers.get("content-type").is_none());
    }
}
