//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline attempt
//!     → Transport::invoke(RequestDescriptor)
//!     → http.rs (hyper-util client, base URL join, body buffering)
//!     → DownstreamResponse | TransportFault
//! ```
//!
//! # Design Decisions
//! - One raw attempt per invoke; no retries or health logic here
//! - Bodies are fully buffered so a response can be classified and still
//!   be handed back to the caller
//! - Cancellation is by dropping the returned future

pub mod http;

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use thiserror::Error;

pub use http::HttpTransport;

/// Header used to correlate attempts with the originating call.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A single outbound call, independent of the downstream payload shape.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the downstream base address.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request_id: String,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header. Invalid values are dropped with a warning.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => tracing::warn!(header = name, "Dropping invalid header value"),
        }
        self
    }

    /// Reuse an upstream correlation id instead of the generated one.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// A response received from the downstream.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DownstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Connectivity-level failure of a single attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFault {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Io(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    /// The request could not be built; retrying cannot help.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Performs one raw attempt against a downstream.
pub trait Transport: Send + Sync {
    fn invoke<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<DownstreamResponse, TransportFault>>;
}
