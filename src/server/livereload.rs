//! Live-update channel between the build and connected browsers.
//!
//! Browsers subscribe with `EventSource` at [`EVENTS_PATH`]; every message
//! is either `reload` or `inject <file> [<file>...]`. Each subscriber holds
//! a receiver of one broadcast channel and goes away with its connection.

use crate::build::progress::{LiveUpdateKind, ProgressEvent, Reporter};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Path of the event stream
pub const EVENTS_PATH: &str = "/__assetpipe/events";

/// Path the client script is served from
pub const CLIENT_PATH: &str = "/__assetpipe/client.js";

/// Browser side of the channel.
pub const CLIENT_SCRIPT: &str = r#"(function () {
  if (!window.EventSource) { return; }
  var source = new EventSource("/__assetpipe/events");
  source.onmessage = function (event) {
    var parts = String(event.data).split(" ");
    if (parts[0] === "reload") {
      window.location.reload();
      return;
    }
    if (parts[0] !== "inject") { return; }
    var names = parts.slice(1);
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var stamp = Date.now();
    var touched = 0;
    for (var i = 0; i < links.length; i++) {
      var href = links[i].getAttribute("href") || "";
      var bare = href.split("?")[0];
      for (var j = 0; j < names.length; j++) {
        if (bare.slice(-names[j].length) === names[j]) {
          links[i].setAttribute("href", bare + "?assetpipe=" + stamp);
          touched++;
        }
      }
    }
    if (touched === 0) { window.location.reload(); }
  };
})();
"#;

/// Script tag injected into HTML responses
pub fn client_snippet() -> String {
    format!("<script src=\"{}\" async></script>", CLIENT_PATH)
}

/// Insert the client snippet before `</body>`, or append it when the
/// document has no body end tag.
pub fn inject_snippet(html: &str) -> String {
    let snippet = client_snippet();
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + snippet.len());
            out.push_str(&html[..pos]);
            out.push_str(&snippet);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", html, snippet),
    }
}

/// Messages buffered per subscriber before a slow one starts skipping
const CHANNEL_CAPACITY: usize = 64;

/// Broadcast hub between the pipelines and subscribed browsers.
///
/// Cloning is cheap; every clone talks to the same subscribers. Sending
/// with nobody subscribed is a no-op, so pipelines can always hold a hub.
#[derive(Clone)]
pub struct LiveReload {
    sender: broadcast::Sender<String>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl Default for LiveReload {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, reporter: None }
    }
}

impl std::fmt::Debug for LiveReload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveReload").field("clients", &self.client_count()).finish()
    }
}

impl LiveReload {
    /// Create a hub with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every broadcast through `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Subscribe to every message sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Ask every browser to reload the page.
    pub fn reload(&self) -> usize {
        let sent = self.broadcast("reload".to_string());
        self.report(LiveUpdateKind::Reload, sent);
        sent
    }

    /// Ask every browser to swap the named stylesheets in place.
    pub fn inject(&self, files: &[String]) -> usize {
        if files.is_empty() {
            return 0;
        }
        let sent = self.broadcast(format!("inject {}", files.join(" ")));
        self.report(LiveUpdateKind::Inject, sent);
        sent
    }

    fn report(&self, kind: LiveUpdateKind, clients: usize) {
        if clients == 0 {
            return;
        }
        if let Some(reporter) = &self.reporter {
            reporter.report(ProgressEvent::LiveUpdate { kind, clients });
        }
    }

    /// Send `message` to every subscriber, returns how many got it.
    fn broadcast(&self, message: String) -> usize {
        self.sender.send(message).unwrap_or(0)
    }
}
