//! Development server.
//!
//! Serves the document root, or reverse-proxies an existing origin, on
//! every interface. HTML responses carry the live-reload client, which
//! listens on the event stream fed by [`livereload::LiveReload`].

pub mod browser;
pub mod livereload;
pub mod proxy;

use crate::build::BuildContext;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::map_response;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use livereload::{inject_snippet, LiveReload, CLIENT_PATH, CLIENT_SCRIPT, EVENTS_PATH};
use proxy::{proxy_handler, ProxyTarget};
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Dev server error
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be opened
    #[error("Failed to listen on port {0}: {1}")]
    Bind(u16, std::io::Error),
    /// Socket or runtime I/O error
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    /// Proxy misconfiguration or upstream failure
    #[error("Proxy error: {0}")]
    Proxy(String),
}

async fn client_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}

/// Event stream: a `connected` comment once subscribed, then every
/// message sent through the hub.
async fn events(State(live): State<LiveReload>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = live.subscribe();
    let connected = stream::once(async { Ok(Event::default().comment("connected")) });
    let updates = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => return Some((Ok(Event::default().data(message)), receiver)),
                Err(RecvError::Lagged(skipped)) => tracing::debug!("live-reload client skipped {} messages", skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(connected.chain(updates)).keep_alive(KeepAlive::default())
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("text/html"))
}

/// Put the live-reload client into every HTML response.
async fn inject_client(response: Response) -> Response {
    if !is_html(&response) {
        return response;
    }
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("failed to read HTML response: {}", e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    let html = inject_snippet(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Response::from_parts(parts, Body::from(html))
}

/// A bound dev server.
pub struct DevServer {
    listener: TcpListener,
    router: Router,
    serving: String,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer").field("listener", &self.listener).field("serving", &self.serving).finish()
    }
}

impl DevServer {
    /// Bind `0.0.0.0:<port>` for the settings of `ctx`.
    ///
    /// Proxy targets are validated here so a bad one fails before anything
    /// listens.
    pub fn bind(ctx: &BuildContext, live: LiveReload) -> Result<Self, ServerError> {
        let settings = ctx.settings();
        let routes = Router::new()
            .route(CLIENT_PATH, get(client_script))
            .route(EVENTS_PATH, get(events))
            .with_state(live);

        let (routes, serving) = match &settings.proxy {
            Some(url) => {
                let target = ProxyTarget::parse(url)?;
                let serving = target.origin();
                let upstream = Router::new().fallback(proxy_handler).with_state(Arc::new(target));
                (routes.fallback_service(upstream), serving)
            }
            None => (routes.fallback_service(ServeDir::new(ctx.docroot())), settings.docroot.display().to_string()),
        };
        let router = routes.layer(map_response(inject_client)).layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(("0.0.0.0", settings.port)).map_err(|e| ServerError::Bind(settings.port, e))?;
        listener.set_nonblocking(true).map_err(ServerError::Io)?;
        Ok(Self { listener, router, serving })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Io)
    }

    /// Document root or proxied origin, for progress output.
    pub fn serving(&self) -> &str {
        &self.serving
    }

    /// Serve until the process exits, on a runtime owned by this call.
    pub fn serve(self) -> Result<(), ServerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(ServerError::Io)?;
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(self.listener).map_err(ServerError::Io)?;
            axum::serve(listener, self.router).await.map_err(ServerError::Io)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::http::Uri;
    use axum::response::Html;
    use axum::routing::post;
    use std::fs;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn start(temp: &TempDir, proxy: Option<String>, live: LiveReload) -> SocketAddr {
        let settings = Settings { port: 0, docroot: PathBuf::from("./dist"), proxy, ..Settings::default() };
        let ctx = BuildContext::new(settings, temp.path().to_path_buf());
        let server = DevServer::bind(&ctx, live).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || server.serve());
        addr
    }

    fn url(addr: SocketAddr, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", addr.port(), path)
    }

    async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
        reqwest::get(url(addr, path)).await.unwrap()
    }

    /// Read an event stream until `needle` shows up.
    async fn read_until(response: &mut reqwest::Response, seen: &mut String, needle: &str) {
        let wait = async {
            while !seen.contains(needle) {
                let chunk = response.chunk().await.unwrap().unwrap();
                seen.push_str(&String::from_utf8_lossy(&chunk));
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait).await.unwrap();
    }

    #[tokio::test]
    async fn test_serves_docroot_with_client() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dist/css")).unwrap();
        fs::write(temp.path().join("dist/index.html"), "<body>home</body>").unwrap();
        fs::write(temp.path().join("dist/css/app.css"), "body{color:red}").unwrap();
        let addr = start(&temp, None, LiveReload::new());

        let home = get(addr, "/").await;
        assert_eq!(home.status(), 200);
        let body = home.text().await.unwrap();
        assert_eq!(body, "<body>home<script src=\"/__assetpipe/client.js\" async></script></body>");

        let css = get(addr, "/css/app.css").await;
        assert_eq!(css.text().await.unwrap(), "body{color:red}");

        let client = get(addr, CLIENT_PATH).await;
        assert!(client.text().await.unwrap().contains("EventSource"));

        assert_eq!(get(addr, "/nope.html").await.status(), 404);
    }

    #[tokio::test]
    async fn test_event_stream_receives_reload() {
        let temp = TempDir::new().unwrap();
        let live = LiveReload::new();
        let addr = start(&temp, None, live.clone());

        let mut response = get(addr, EVENTS_PATH).await;
        assert_eq!(response.status(), 200);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let mut seen = String::new();
        read_until(&mut response, &mut seen, ": connected").await;
        assert_eq!(live.reload(), 1);
        read_until(&mut response, &mut seen, "data: reload\n").await;

        live.inject(&["app.css".to_string()]);
        read_until(&mut response, &mut seen, "data: inject app.css\n").await;
    }

    #[tokio::test]
    async fn test_proxies_origin_with_client() {
        let upstream = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        let app = Router::new()
            .route("/page", axum::routing::get(|uri: Uri| async move { Html(format!("<body>{}</body>", uri.query().unwrap_or(""))) }))
            .route("/echo", post(|body: String| async move { format!("got {}", body) }));
        tokio::spawn(async move { axum::serve(upstream, app).await });

        let temp = TempDir::new().unwrap();
        let addr = start(&temp, Some(format!("http://127.0.0.1:{}", upstream_addr.port())), LiveReload::new());

        let page = get(addr, "/page?x=1").await;
        assert_eq!(page.status(), 200);
        assert_eq!(page.text().await.unwrap(), "<body>x=1<script src=\"/__assetpipe/client.js\" async></script></body>");

        let echoed = reqwest::Client::new().post(url(addr, "/echo")).body("ping").send().await.unwrap();
        assert_eq!(echoed.text().await.unwrap(), "got ping");

        assert_eq!(get(addr, "/missing").await.status(), 404);
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_bad_gateway() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let temp = TempDir::new().unwrap();
        let addr = start(&temp, Some(format!("http://127.0.0.1:{}", port)), LiveReload::new());
        assert_eq!(get(addr, "/").await.status(), 502);
    }

    #[test]
    fn test_bind_rejects_bad_proxy() {
        let temp = TempDir::new().unwrap();
        let settings = Settings { port: 0, proxy: Some("ftp://example.test".to_string()), ..Settings::default() };
        let ctx = BuildContext::new(settings, temp.path().to_path_buf());
        assert!(matches!(DevServer::bind(&ctx, LiveReload::new()), Err(ServerError::Proxy(_))));
    }
}
