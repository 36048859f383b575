//! HTTP transport backed by the hyper-util legacy client.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::transport::{
    DownstreamResponse, RequestDescriptor, Transport, TransportFault, REQUEST_ID_HEADER,
};

/// Default cap on buffered response bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Sends requests to a single downstream rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    client: Client<HttpConnector, Body>,
    max_body_bytes: usize,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            base_url,
            client,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_request(&self, request: &RequestDescriptor) -> Result<Request<Body>, TransportFault> {
        let target = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportFault::InvalidRequest(format!("{}: {}", request.path, e)))?;

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(target.as_str());

        if let Some(headers) = builder.headers_mut() {
            for (k, v) in request.headers.iter() {
                headers.insert(k.clone(), v.clone());
            }
            if let Ok(id) = HeaderValue::from_str(&request.request_id) {
                headers.insert(REQUEST_ID_HEADER, id);
            }
            headers
                .entry(header::USER_AGENT)
                .or_insert(HeaderValue::from_static("resilient-call"));
        }

        builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| TransportFault::InvalidRequest(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn invoke<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<DownstreamResponse, TransportFault>> {
        Box::pin(async move {
            let req = self.build_request(request)?;

            let response = self.client.request(req).await.map_err(|e| {
                if e.is_connect() {
                    TransportFault::Connect(e.to_string())
                } else {
                    TransportFault::Io(e.to_string())
                }
            })?;

            let (parts, body): (_, hyper::body::Incoming) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), self.max_body_bytes)
                .await
                .map_err(|e| TransportFault::Body(e.to_string()))?;

            tracing::trace!(
                request_id = %request.request_id,
                status = %parts.status,
                bytes = body.len(),
                "Downstream responded"
            );

            Ok(DownstreamResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }
}
