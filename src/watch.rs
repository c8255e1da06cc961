//! File watching for resident pipelines and the dev server
//!
//! A [`ChangeWatcher`] turns debounced file system events into batches of
//! changed paths matching a set of globs. [`watch_loop`] drives a rebuild
//! from those batches, and [`WatchSupervisor`] wires the markup and style
//! watchers of the dev server to the live-reload hub.

use crate::build::discovery::{DiscoveryError, PatternSet};
use crate::build::progress::{report_result, ProgressEvent, Reporter};
use crate::build::result::PipelineResult;
use crate::build::BuildContext;
use crate::diagnostics::{display_path, ErrorTracker};
use crate::server::livereload::LiveReload;
use crate::style::StylePipeline;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch {0}: {1}")]
    WatchPath(PathBuf, notify::Error),
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    ChannelError(String),
    /// A watch glob is invalid
    #[error("{0}")]
    Pattern(#[from] DiscoveryError),
}

/// Debounced watcher filtered by glob patterns.
pub struct ChangeWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: Receiver<DebounceEventResult>,
    patterns: PatternSet,
    label: String,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher").field("patterns", &self.patterns).field("label", &self.label).finish()
    }
}

/// Nearest existing ancestor of `dir`, so globs over directories that do
/// not exist yet still see files created later.
fn existing_ancestor(dir: &Path) -> Option<PathBuf> {
    let mut current = dir.to_path_buf();
    loop {
        if current.is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

impl ChangeWatcher {
    /// Watch every file under `base_dir` matching `patterns`.
    pub fn new(base_dir: &Path, patterns: &[String], debounce: Duration) -> Result<Self, WatchError> {
        let patterns_set = PatternSet::new(base_dir, patterns)?;
        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;

        let mut watched: Vec<PathBuf> = Vec::new();
        for root in patterns_set.roots() {
            let Some(dir) = existing_ancestor(root) else { continue };
            if watched.iter().any(|w| dir.starts_with(w)) {
                continue;
            }
            debouncer
                .watcher()
                .watch(&dir, RecursiveMode::Recursive)
                .map_err(|e| WatchError::WatchPath(dir.clone(), e))?;
            tracing::debug!("watching {}", dir.display());
            watched.push(dir);
        }

        Ok(Self { _debouncer: debouncer, rx, patterns: patterns_set, label: patterns.join(", ") })
    }

    /// The watched globs, for progress output.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn relevant(&self, batch: DebounceEventResult) -> Vec<PathBuf> {
        match batch {
            Ok(events) => {
                let mut paths: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any) && self.patterns.matches(&e.path))
                    .map(|e| e.path)
                    .collect();
                paths.sort();
                paths.dedup();
                paths
            }
            Err(error) => {
                // Watch errors are not fatal
                tracing::warn!("watch error: {:?}", error);
                vec![]
            }
        }
    }

    /// Block until at least one matching file changed.
    pub fn next_changes(&self) -> Result<Vec<PathBuf>, WatchError> {
        loop {
            let batch = self.rx.recv().map_err(|e| WatchError::ChannelError(e.to_string()))?;
            let paths = self.relevant(batch);
            if !paths.is_empty() {
                return Ok(paths);
            }
        }
    }

    /// Take every batch already queued without blocking.
    pub fn drain(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(batch) => paths.extend(self.relevant(batch)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        paths.sort();
        paths.dedup();
        paths
    }
}

fn report_changes(reporter: &dyn Reporter, root: &Path, paths: &[PathBuf]) {
    for path in paths {
        reporter.report(ProgressEvent::Changed { file: PathBuf::from(display_path(path, root)) });
    }
}

/// Run `on_change` for every batch of changes, forever.
///
/// Changes arriving while `on_change` runs queue up. After each run they
/// are drained and coalesced into at most one follow-up run.
pub fn watch_loop<F>(
    watcher: &ChangeWatcher,
    root: &Path,
    reporter: &dyn Reporter,
    mut on_change: F,
) -> Result<(), WatchError>
where
    F: FnMut(&[PathBuf]),
{
    reporter.report(ProgressEvent::Watching { target: watcher.label().to_string() });
    loop {
        let changed = watcher.next_changes()?;
        report_changes(reporter, root, &changed);
        on_change(&changed);

        let pending = watcher.drain();
        if !pending.is_empty() {
            report_changes(reporter, root, &pending);
            on_change(&pending);
        }
    }
}

/// Watchers of the dev server.
///
/// Markup changes broadcast a full reload. Style source changes re-run the
/// style pipeline, which injects the new stylesheet itself.
pub struct WatchSupervisor<'a> {
    ctx: &'a BuildContext,
    live: LiveReload,
    reporter: Arc<dyn Reporter>,
    watch_styles: bool,
}

impl<'a> WatchSupervisor<'a> {
    /// Create a supervisor broadcasting through `live`.
    pub fn new(ctx: &'a BuildContext, live: LiveReload, reporter: Arc<dyn Reporter>) -> Self {
        Self { ctx, live, reporter, watch_styles: true }
    }

    /// Enable or disable the style watcher.
    pub fn with_style_watch(mut self, watch_styles: bool) -> Self {
        self.watch_styles = watch_styles;
        self
    }

    /// Re-run the style pipeline, which injects the stylesheet when it
    /// wrote one.
    fn rebuild_styles(&self, tracker: &mut ErrorTracker) {
        let result = StylePipeline::new(self.ctx).with_live_reload(self.live.clone()).run();
        report_result(self.reporter.as_ref(), &result, tracker);
    }

    /// Run the watchers until one fails.
    ///
    /// Both watchers are set up before this returns from setup errors.
    /// `initial_style` seeds error tracking so a fix of a file that was
    /// broken at startup is reported.
    pub fn run(&self, initial_style: Option<&PipelineResult>) -> Result<(), WatchError> {
        let settings = self.ctx.settings();
        let root = self.ctx.project_root();
        let debounce = Duration::from_millis(u64::from(settings.debounce_ms));

        let markup = ChangeWatcher::new(root, &settings.watch, debounce)?;
        let styles = if self.watch_styles {
            Some(ChangeWatcher::new(root, std::slice::from_ref(&settings.style_src), debounce)?)
        } else {
            None
        };

        let mut tracker = ErrorTracker::new();
        if let Some(result) = initial_style {
            tracker.update(&result.diagnostics);
        }

        thread::scope(|s| {
            let style_handle = styles.map(|watcher| {
                let mut tracker = tracker;
                s.spawn(move || {
                    watch_loop(&watcher, root, self.reporter.as_ref(), |_| self.rebuild_styles(&mut tracker))
                })
            });

            let markup_result = watch_loop(&markup, root, self.reporter.as_ref(), |_| {
                self.live.reload();
            });

            match style_handle {
                Some(handle) => {
                    let style_result = handle
                        .join()
                        .unwrap_or_else(|_| Err(WatchError::ChannelError("style watcher panicked".to_string())));
                    markup_result.and(style_result)
                }
                None => markup_result,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::progress::NullReporter;
    use crate::config::Settings;
    use notify_debouncer_mini::DebouncedEvent;
    use std::fs;
    use std::sync::mpsc::Sender;
    use std::sync::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    fn canonical_temp() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        (temp, root)
    }

    #[test]
    fn test_existing_ancestor() {
        let (_temp, root) = canonical_temp();
        assert_eq!(existing_ancestor(&root.join("a/b/c")), Some(root.clone()));
        assert_eq!(existing_ancestor(&root), Some(root));
    }

    /// A watcher whose batches come from the returned sender instead of
    /// the file system.
    fn fed_watcher(root: &Path, pattern: &str) -> (ChangeWatcher, Sender<DebounceEventResult>) {
        let (idle_tx, _idle_rx) = channel();
        let debouncer = new_debouncer(Duration::from_millis(20), idle_tx).unwrap();
        let (tx, rx) = channel();
        let watcher = ChangeWatcher {
            _debouncer: debouncer,
            rx,
            patterns: PatternSet::new(root, &[pattern.to_string()]).unwrap(),
            label: pattern.to_string(),
        };
        (watcher, tx)
    }

    fn batch(paths: &[PathBuf]) -> DebounceEventResult {
        Ok(paths.iter().map(|path| DebouncedEvent { path: path.clone(), kind: DebouncedEventKind::Any }).collect())
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl Reporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            if let Ok(mut events) = self.0.lock() {
                events.push(event);
            }
        }
    }

    /// Wait for the next live-reload message, running `poke` until one
    /// arrives.
    fn next_message(client: &mut broadcast::Receiver<String>, mut poke: impl FnMut()) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            poke();
            thread::sleep(Duration::from_millis(300));
            if let Ok(message) = client.try_recv() {
                return message;
            }
        }
        panic!("no live-reload message");
    }

    #[test]
    fn test_watcher_reports_matching_changes() {
        let (_temp, root) = canonical_temp();
        fs::create_dir_all(root.join("dist")).unwrap();
        let watcher =
            ChangeWatcher::new(&root, &["./dist/**/*.html".to_string()], Duration::from_millis(50)).unwrap();

        fs::write(root.join("dist/app.css"), "a{}").unwrap();
        fs::write(root.join("dist/index.html"), "<html></html>").unwrap();

        let changed = watcher.next_changes().unwrap();
        assert_eq!(changed, vec![root.join("dist/index.html")]);
    }

    #[test]
    fn test_watcher_drains_nothing_without_changes() {
        let (_temp, root) = canonical_temp();
        let watcher =
            ChangeWatcher::new(&root, &["./src/**/*.scss".to_string()], Duration::from_millis(20)).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(watcher.drain().is_empty());
    }

    #[test]
    fn test_watch_loop_coalesces_changes_made_while_busy() {
        let (_temp, root) = canonical_temp();
        let (watcher, tx) = fed_watcher(&root, "./src/**/*.js");
        tx.send(batch(&[root.join("src/a.js")])).unwrap();

        let reporter = Recorder::default();
        let mut feed = Some(tx);
        let mut calls: Vec<Vec<PathBuf>> = Vec::new();
        let result = watch_loop(&watcher, &root, &reporter, |changed| {
            calls.push(changed.to_vec());
            if calls.len() == 1 {
                // Several batches land while the first run is still busy
                if let Some(tx) = &feed {
                    tx.send(batch(&[root.join("src/c.js")])).unwrap();
                    tx.send(batch(&[root.join("src/b.js"), root.join("src/notes.txt")])).unwrap();
                    tx.send(batch(&[root.join("src/c.js")])).unwrap();
                }
            } else {
                feed = None;
            }
        });

        assert!(matches!(result, Err(WatchError::ChannelError(_))));
        assert_eq!(calls, vec![vec![root.join("src/a.js")], vec![root.join("src/b.js"), root.join("src/c.js")]]);

        let events = reporter.0.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::Watching { .. }));
        let changed = events.iter().filter(|e| matches!(e, ProgressEvent::Changed { .. })).count();
        assert_eq!(changed, 3);
    }

    #[test]
    fn test_watch_loop_skips_batches_without_matches() {
        let (_temp, root) = canonical_temp();
        let (watcher, tx) = fed_watcher(&root, "./src/**/*.js");
        tx.send(batch(&[root.join("src/readme.md")])).unwrap();
        tx.send(Err(notify::Error::generic("lost event"))).unwrap();
        tx.send(batch(&[root.join("src/app.js")])).unwrap();
        drop(tx);

        let mut calls = 0;
        let result = watch_loop(&watcher, &root, &NullReporter, |changed| {
            assert_eq!(changed, [root.join("src/app.js")]);
            calls += 1;
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_style_rebuild_injects_stylesheet() {
        let (_temp, root) = canonical_temp();
        fs::create_dir_all(root.join("src/style")).unwrap();
        fs::write(root.join("src/style/app.scss"), "body { color: red; }\n").unwrap();
        let ctx = BuildContext::new(Settings::default(), root.clone());
        let live = LiveReload::new();
        let mut client = live.subscribe();

        let supervisor = WatchSupervisor::new(&ctx, live, Arc::new(NullReporter));
        supervisor.rebuild_styles(&mut ErrorTracker::new());

        assert_eq!(client.try_recv().unwrap(), "inject app.css");
        assert!(root.join("dist/assets/css/app.css").exists());
    }

    #[test]
    fn test_style_rebuild_with_errors_injects_nothing() {
        let (_temp, root) = canonical_temp();
        fs::create_dir_all(root.join("src/style")).unwrap();
        fs::write(root.join("src/style/app.scss"), "body { color: $missing; }\n").unwrap();
        let ctx = BuildContext::new(Settings::default(), root.clone());
        let live = LiveReload::new();
        let mut client = live.subscribe();

        WatchSupervisor::new(&ctx, live, Arc::new(NullReporter)).rebuild_styles(&mut ErrorTracker::new());
        assert!(client.try_recv().is_err());
    }

    #[test]
    fn test_supervisor_injects_on_style_change_and_reloads_on_markup_change() {
        let (temp, root) = canonical_temp();
        fs::create_dir_all(root.join("src/style")).unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        let settings = Settings { debounce_ms: 50, ..Settings::default() };
        let live = LiveReload::new();
        let mut client = live.subscribe();

        let ctx = BuildContext::new(settings, root.clone());
        let remote = live.clone();
        thread::spawn(move || WatchSupervisor::new(&ctx, remote, Arc::new(NullReporter)).run(None));

        let style = root.join("src/style/app.scss");
        let mut shade = 0;
        let message = next_message(&mut client, || {
            shade += 1;
            fs::write(&style, format!("body {{ color: #{:06x}; }}\n", shade)).unwrap();
        });
        assert_eq!(message, "inject app.css");

        // Let queued style runs settle before switching to markup
        thread::sleep(Duration::from_millis(500));
        while client.try_recv().is_ok() {}

        let page = root.join("dist/index.html");
        let message = next_message(&mut client, || fs::write(&page, "<body></body>").unwrap());
        assert_eq!(message, "reload");
        drop(temp);
    }

    #[test]
    fn test_watcher_invalid_pattern() {
        let (_temp, root) = canonical_temp();
        let result = ChangeWatcher::new(&root, &["src/{a".to_string()], Duration::from_millis(20));
        assert!(matches!(result, Err(WatchError::Pattern(_))));
    }
}
