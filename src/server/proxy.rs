//! Reverse proxy to an existing origin.
//!
//! Requests are forwarded through a pooled `reqwest` client with the
//! path and query kept, and the upstream response is streamed back.
//! Upstream is asked for an identity encoding so HTML can still carry the
//! live-reload client.

use super::ServerError;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::{redirect, Client, Url};
use std::sync::Arc;

/// Headers that describe one connection and are never forwarded
const HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Where proxied requests go, with the client that sends them.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    origin: Url,
    client: Client,
}

impl ProxyTarget {
    /// Parse an `http://` or `https://` origin, optionally with a base
    /// path. A bare `host[:port]` is taken as plain HTTP.
    pub fn parse(url: &str) -> Result<Self, ServerError> {
        let with_scheme = if url.contains("://") { url.to_string() } else { format!("http://{}", url) };
        let origin = Url::parse(&with_scheme).map_err(|e| ServerError::Proxy(format!("invalid proxy {}: {}", url, e)))?;
        if origin.scheme() != "http" && origin.scheme() != "https" {
            return Err(ServerError::Proxy(format!("unsupported proxy scheme '{}' in {}", origin.scheme(), url)));
        }
        if origin.host_str().map_or(true, str::is_empty) {
            return Err(ServerError::Proxy(format!("missing host in {}", url)));
        }

        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ServerError::Proxy(e.to_string()))?;
        Ok(Self { origin, client })
    }

    /// `scheme://host[:port]` of the target, for progress output.
    pub fn origin(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    /// Upstream URL for a request path and query.
    pub fn upstream_url(&self, path_and_query: &str) -> String {
        let base = self.origin.as_str().trim_end_matches('/');
        format!("{}{}", base, path_and_query)
    }

    /// Forward one request and return the upstream response.
    pub async fn forward(&self, request: Request) -> Result<Response, ServerError> {
        let path_and_query = request.uri().path_and_query().map_or("/", |pq| pq.as_str()).to_string();
        let url = self.upstream_url(&path_and_query);
        let (parts, body) = request.into_parts();
        let body = to_bytes(body, usize::MAX).await.map_err(|e| ServerError::Proxy(e.to_string()))?;

        let mut headers = forwarded_headers(&parts.headers);
        headers.remove(header::HOST);
        headers.insert(header::ACCEPT_ENCODING, header::HeaderValue::from_static("identity"));

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ServerError::Proxy(format!("{}: {}", url, e)))?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(out) = response.headers_mut() {
            *out = forwarded_headers(upstream.headers());
        }
        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ServerError::Proxy(e.to_string()))
    }
}

/// Copy of `headers` without hop-by-hop headers.
fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_HEADERS {
        out.remove(name);
    }
    out.remove("keep-alive");
    out.remove("proxy-connection");
    out
}

/// Fallback handler answering every request from the proxy target.
pub async fn proxy_handler(State(target): State<Arc<ProxyTarget>>, request: Request) -> Response {
    let uri = request.uri().clone();
    match target.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("proxy request {} failed: {}", uri, e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
