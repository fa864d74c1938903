//! Background execution of the request pipeline.
//!
//! Each dispatched call gets its own worker thread. The result travels back
//! over a `tokio::sync::oneshot` channel, so it is delivered at most once,
//! and a worker that dies before sending surfaces as
//! [`ErrorKind::DispatchFailed`](crate::ErrorKind::DispatchFailed).

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::warn;

use crate::client::Client;
use crate::config::{Method, RequestConfig};
use crate::error::NetworkError;
use crate::response::Response;
use crate::util::{lock_unpoisoned, redact_uri_for_logs};

const WORKER_THREAD_NAME: &str = "netreq-dispatch";
const WORKER_LOST: &str = "worker exited without delivering a response";
const ALREADY_TAKEN: &str = "response was already taken";

/// A response that is being produced on another thread.
///
/// Await it from async code or call [`PendingResponse::wait`] from
/// blocking code. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct PendingResponse {
    state: PendingState,
    method: Method,
    uri: String,
}

#[derive(Debug)]
enum PendingState {
    Ready(Option<Response>),
    Waiting(oneshot::Receiver<Response>),
}

impl PendingResponse {
    pub(crate) fn ready(response: Response, method: Method, uri: &str) -> Self {
        Self {
            state: PendingState::Ready(Some(response)),
            method,
            uri: redact_uri_for_logs(uri),
        }
    }

    fn waiting(receiver: oneshot::Receiver<Response>, method: Method, uri: &str) -> Self {
        Self {
            state: PendingState::Waiting(receiver),
            method,
            uri: redact_uri_for_logs(uri),
        }
    }

    fn dispatch_failed(&self, message: &str) -> Response {
        dispatch_failed(self.method, self.uri.clone(), message)
    }

    /// Blocks the current thread until the worker delivers.
    ///
    /// Must not be called from inside an async runtime; await the value
    /// there instead.
    pub fn wait(self) -> Response {
        let Self { state, method, uri } = self;
        match state {
            PendingState::Ready(Some(response)) => response,
            PendingState::Ready(None) => dispatch_failed(method, uri, ALREADY_TAKEN),
            PendingState::Waiting(receiver) => receiver
                .blocking_recv()
                .unwrap_or_else(|_| dispatch_failed(method, uri, WORKER_LOST)),
        }
    }

    /// Returns the response if it has arrived, without blocking.
    pub fn try_take(&mut self) -> Option<Response> {
        let received = match &mut self.state {
            PendingState::Ready(response) => return response.take(),
            PendingState::Waiting(receiver) => match receiver.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => return None,
                Ok(response) => Some(response),
                Err(oneshot::error::TryRecvError::Closed) => None,
            },
        };
        self.state = PendingState::Ready(None);
        Some(received.unwrap_or_else(|| self.dispatch_failed(WORKER_LOST)))
    }
}

fn dispatch_failed(method: Method, uri: String, message: &str) -> Response {
    Response::failed(NetworkError::DispatchFailed {
        method,
        uri,
        message: message.to_owned(),
    })
}

impl Future for PendingResponse {
    type Output = Response;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = match &mut self.state {
            PendingState::Ready(response) => {
                let response = response.take();
                return Poll::Ready(response.unwrap_or_else(|| self.dispatch_failed(ALREADY_TAKEN)));
            }
            PendingState::Waiting(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(result) => result.ok(),
            },
        };
        self.state = PendingState::Ready(None);
        Poll::Ready(received.unwrap_or_else(|| self.dispatch_failed(WORKER_LOST)))
    }
}

impl Client {
    /// Runs the pipeline on a worker thread. `run_async` is ignored on the
    /// scheduled copy of `config`.
    pub fn request_async(
        &self,
        method: Method,
        url: &str,
        payload: Option<Bytes>,
        config: &RequestConfig,
    ) -> PendingResponse {
        let (sender, receiver) = oneshot::channel();
        let client = self.clone();
        let owned_url = url.to_owned();
        let config = config.clone().with_run_async(false);

        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                let response = client.request(method, &owned_url, payload, &config);
                // The caller may have dropped the handle.
                let _ = sender.send(response);
            });

        let pending = PendingResponse::waiting(receiver, method, url);
        match spawned {
            Ok(_) => pending,
            Err(source) => {
                warn!(%method, uri = %pending.uri, error = %source, "failed to spawn dispatch worker");
                let response = pending.dispatch_failed(&format!("failed to spawn worker: {source}"));
                PendingResponse::ready(response, method, url)
            }
        }
    }

    /// Runs the pipeline on a worker thread and hands the response to
    /// `callback` exactly once, whatever the outcome.
    ///
    /// If no worker can be started the callback runs on the calling thread
    /// with a `DispatchFailed` response.
    pub fn request_with_callback<F>(
        &self,
        method: Method,
        url: &str,
        payload: Option<Bytes>,
        config: &RequestConfig,
        callback: F,
    ) where
        F: FnOnce(Response) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(callback)));
        let worker_slot = Arc::clone(&slot);
        let client = self.clone();
        let owned_url = url.to_owned();
        let config = config.clone().with_run_async(false);

        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                let response = client.request(method, &owned_url, payload, &config);
                let callback = lock_unpoisoned(&worker_slot).take();
                if let Some(callback) = callback {
                    callback(response);
                }
            });

        if let Err(source) = spawned {
            let uri = redact_uri_for_logs(url);
            warn!(%method, uri = %uri, error = %source, "failed to spawn dispatch worker");
            let callback = lock_unpoisoned(&slot).take();
            if let Some(callback) = callback {
                callback(dispatch_failed(
                    method,
                    uri,
                    &format!("failed to spawn worker: {source}"),
                ));
            }
        }
    }

    /// Inline when `config.run_async` is false, on a worker thread otherwise.
    pub fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<Bytes>,
        config: &RequestConfig,
    ) -> PendingResponse {
        if config.run_async {
            self.request_async(method, url, payload, config)
        } else {
            PendingResponse::ready(self.request(method, url, payload, config), method, url)
        }
    }

    pub fn get_async(&self, url: &str, config: &RequestConfig) -> PendingResponse {
        self.request_async(Method::Get, url, None, config)
    }

    pub fn post_async(
        &self,
        url: &str,
        payload: impl Into<Bytes>,
        content_type: &str,
        config: &RequestConfig,
    ) -> PendingResponse {
        let config = config.clone().with_header("content-type", content_type);
        self.request_async(Method::Post, url, Some(payload.into()), &config)
    }
}
