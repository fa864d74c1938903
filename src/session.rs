//! Process-wide session facade.
//!
//! [`initialize`] creates the shared [`Client`] (and with it the transport
//! pool and rate-limit table); [`cleanup`] releases it. Both are idempotent.
//! The free functions below route through the shared client and answer with
//! a `NotInitialized` response while no session exists.

use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use crate::NetResult;
use crate::client::{Client, ClientBuilder};
use crate::config::{Method, RequestConfig};
use crate::dispatch::PendingResponse;
use crate::error::NetworkError;
use crate::response::Response;
use crate::util::{read_unpoisoned, write_unpoisoned};

static SESSION: RwLock<Option<Client>> = RwLock::new(None);

/// Starts the session with default settings. A no-op when one exists.
pub fn initialize() -> NetResult<()> {
    initialize_with(ClientBuilder::new())
}

/// Starts the session from `builder`. When a session already exists it is
/// kept and `builder` is discarded.
pub fn initialize_with(builder: ClientBuilder) -> NetResult<()> {
    let mut session = write_unpoisoned(&SESSION);
    if session.is_some() {
        return Ok(());
    }
    let client = builder.try_build()?;
    debug!(transport = client.transport_kind().as_str(), "network session initialized");
    *session = Some(client);
    Ok(())
}

/// Drops the session's rate-limit windows and client. Requests already
/// running keep their own clone of the client and finish normally.
pub fn cleanup() {
    let client = write_unpoisoned(&SESSION).take();
    if let Some(client) = client {
        client.rate_limiter().clear();
        debug!("network session cleaned up");
    }
}

pub fn is_initialized() -> bool {
    read_unpoisoned(&SESSION).is_some()
}

/// A handle to the current session's client.
pub fn client() -> NetResult<Client> {
    read_unpoisoned(&SESSION)
        .clone()
        .ok_or(NetworkError::NotInitialized)
}

pub fn request(method: Method, url: &str, payload: Option<Bytes>, config: &RequestConfig) -> Response {
    match client() {
        Ok(client) => client.request(method, url, payload, config),
        Err(error) => Response::failed(error),
    }
}

pub fn get(url: &str, config: &RequestConfig) -> Response {
    request(Method::Get, url, None, config)
}

pub fn post(url: &str, payload: impl Into<Bytes>, content_type: &str, config: &RequestConfig) -> Response {
    match client() {
        Ok(client) => client.post(url, payload, content_type, config),
        Err(error) => Response::failed(error),
    }
}

pub fn put(url: &str, payload: impl Into<Bytes>, content_type: &str, config: &RequestConfig) -> Response {
    match client() {
        Ok(client) => client.put(url, payload, content_type, config),
        Err(error) => Response::failed(error),
    }
}

pub fn patch(url: &str, payload: impl Into<Bytes>, content_type: &str, config: &RequestConfig) -> Response {
    match client() {
        Ok(client) => client.patch(url, payload, content_type, config),
        Err(error) => Response::failed(error),
    }
}

pub fn delete(url: &str, config: &RequestConfig) -> Response {
    request(Method::Delete, url, None, config)
}

pub fn request_async(
    method: Method,
    url: &str,
    payload: Option<Bytes>,
    config: &RequestConfig,
) -> PendingResponse {
    match client() {
        Ok(client) => client.request_async(method, url, payload, config),
        Err(error) => PendingResponse::ready(Response::failed(error), method, url),
    }
}

pub fn get_async(url: &str, config: &RequestConfig) -> PendingResponse {
    request_async(Method::Get, url, None, config)
}

pub fn post_async(
    url: &str,
    payload: impl Into<Bytes>,
    content_type: &str,
    config: &RequestConfig,
) -> PendingResponse {
    match client() {
        Ok(client) => client.post_async(url, payload, content_type, config),
        Err(error) => PendingResponse::ready(Response::failed(error), Method::Post, url),
    }
}

pub fn request_with_callback<F>(
    method: Method,
    url: &str,
    payload: Option<Bytes>,
    config: &RequestConfig,
    callback: F,
) where
    F: FnOnce(Response) + Send + 'static,
{
    match client() {
        Ok(client) => client.request_with_callback(method, url, payload, config, callback),
        Err(error) => callback(Response::failed(error)),
    }
}
