//! Shared, pooled HTTP transport with classified failures and retry.
//!
//! One [`HttpClient`] is created per process (it lives in the
//! [`ResourceContext`](crate::runtime::ResourceContext)) and shared by every
//! collaborator. The underlying `reqwest` client is built lazily on the first
//! request and torn down by [`HttpClient::close`]; a closed client never
//! reopens, so a fresh instance has to be created instead.

pub mod retry;

pub use retry::with_retry;

use crate::config::{HttpConfig, RetryConfig};
use crate::error::HttpError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tracing::debug;

/// Longest error body kept in [`HttpError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// An outgoing request. Cheap to clone so it can be replayed on retry.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful (2xx) response with its body read to completion.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Decode the body as JSON. A body that does not match `T` is data corruption.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_str(&self.body).map_err(|e| HttpError::Decode {
            message: e.to_string(),
        })
    }
}

enum ClientState {
    Unopened,
    Open(reqwest::Client),
    Closed,
}

/// Pooled HTTP client shared across all research requests.
pub struct HttpClient {
    config: HttpConfig,
    state: Mutex<ClientState>,
    /// Caps requests in flight at `max_connections`.
    connections: Arc<Semaphore>,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Self {
        let connections = Arc::new(Semaphore::new(config.max_connections));
        Self {
            config,
            state: Mutex::new(ClientState::Unopened),
            connections,
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Whether the underlying transport has been built and not yet closed.
    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), ClientState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock_state(), ClientState::Closed)
    }

    /// Dispose of the transport. Requests issued afterwards fail with [`HttpError::Closed`].
    pub fn close(&self) {
        let mut state = self.lock_state();
        if !matches!(*state, ClientState::Closed) {
            debug!("Closing shared HTTP client");
        }
        *state = ClientState::Closed;
        self.connections.close();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the transport, building it on first use.
    fn transport(&self) -> Result<reqwest::Client, HttpError> {
        let mut state = self.lock_state();
        match &*state {
            ClientState::Open(client) => Ok(client.clone()),
            ClientState::Closed => Err(HttpError::Closed),
            ClientState::Unopened => {
                let client = self.build_transport()?;
                debug!(
                    timeout_secs = self.config.timeout_secs,
                    max_connections = self.config.max_connections,
                    "Opened shared HTTP client"
                );
                *state = ClientState::Open(client.clone());
                Ok(client)
            }
        }
    }

    fn build_transport(&self) -> Result<reqwest::Client, HttpError> {
        reqwest::Client::builder()
            .timeout(self.config.timeout())
            .pool_max_idle_per_host(self.config.max_keepalive_connections)
            .pool_idle_timeout(self.config.keepalive_expiry())
            .danger_accept_invalid_certs(!self.config.verify_tls)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::Setup {
                message: e.to_string(),
            })
    }

    /// Send a single request. Non-2xx responses are returned as [`HttpError::Status`].
    pub async fn request(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let client = self.transport()?;
        let _permit = self
            .connections
            .acquire()
            .await
            .map_err(|_| HttpError::Closed)?;

        let mut builder = client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let timeout_ms = self.config.timeout().as_millis() as u64;
        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(e, timeout_ms))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::from_reqwest(e, timeout_ms))?;

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            body,
        })
    }

    /// Send a request, retrying retriable failures according to `retry`.
    pub async fn request_with_retry(
        &self,
        request: &HttpRequest,
        retry: &RetryConfig,
    ) -> Result<HttpResponse, HttpError> {
        with_retry(retry, || self.request(request)).await
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
