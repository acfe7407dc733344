//! Watch mode is a small set of cooperating threads:
//!
//! 1. **File watcher**: a debounced `notify` watcher on the smallest set of
//!    directories covering every category's watch pattern. Each batch of
//!    events is mapped back to the categories it touches.
//! 2. **Stage workers**: one thread per transformed category. A worker
//!    reruns only its own stage, so an edit to a stylesheet never
//!    re-renders pages. Requests arriving while a worker is busy collapse
//!    into a single follow-up run.
//! 3. **Reload socket**: a `tungstenite` server that tells open pages to
//!    reload, swap stylesheets in place, or show a rebuild failure.
//! 4. **HTTP server** (feature `server`): serves staging, sources and public
//!    files, and turns Ctrl-C into a graceful stop of the whole loop.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tracing::{debug, error, info, warn};

use crate::Website;
use crate::asset::Category;
use crate::context::Environment;
use crate::error::{BuildError, WatchError};
use crate::io::as_overhead;
use crate::transform::run_stage;

use super::reload::{Message, new_thread_ws_incoming, new_thread_ws_reload};

pub use super::reload::reserve_port;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// Lifecycle of the watch server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not serving yet.
    Idle,
    /// Serving and waiting for changes.
    Serving,
    /// At least one stage is rerunning.
    Rebuilding,
    /// Shut down; no further rebuilds start.
    Stopped,
}

/// Shared state plus the number of stages currently rerunning.
#[derive(Debug)]
pub(crate) struct Status {
    inner: Mutex<(State, usize)>,
}

impl Status {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new((State::Idle, 0)),
        }
    }

    pub(crate) fn get(&self) -> State {
        self.lock().0
    }

    pub(crate) fn serve(&self) {
        self.update(|state, running| match state {
            State::Stopped => State::Stopped,
            _ if running > 0 => State::Rebuilding,
            _ => State::Serving,
        });
    }

    /// Returns `false` once stopped, in which case the rebuild must not run.
    pub(crate) fn begin_rebuild(&self) -> bool {
        let mut inner = self.lock();
        if inner.0 == State::Stopped {
            return false;
        }

        inner.1 += 1;
        inner.0 = State::Rebuilding;
        true
    }

    pub(crate) fn end_rebuild(&self) {
        let mut inner = self.lock();
        inner.1 = inner.1.saturating_sub(1);

        if inner.1 == 0 && inner.0 == State::Rebuilding {
            inner.0 = State::Serving;
        }
    }

    pub(crate) fn stop(&self) {
        self.update(|_, _| State::Stopped);
    }

    fn update(&self, next: impl FnOnce(State, usize) -> State) {
        let mut inner = self.lock();
        let state = next(inner.0, inner.1);

        if state != inner.0 {
            debug!("watch server {:?} -> {:?}", inner.0, state);
            inner.0 = state;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (State, usize)> {
        // the guarded data is plain values, a panicked holder can't corrupt it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) enum Signal {
    Fs(DebounceEventResult),
    Shutdown,
}

/// Maps changed paths to the categories whose watch pattern they match.
pub(crate) struct Routes {
    routes: Vec<(Category, Pattern)>,
}

impl Routes {
    pub(crate) fn new(site: &Website) -> Result<Self, WatchError> {
        let routes = Category::ALL
            .into_iter()
            .map(|category| -> Result<_, WatchError> {
                Ok((category, category.watch_pattern(&site.root, &site.config.paths)?))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { routes })
    }

    pub(crate) fn categories<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> BTreeSet<Category> {
        let mut hit = BTreeSet::new();

        for path in paths {
            for (category, pattern) in &self.routes {
                if pattern.matches_path(path) {
                    hit.insert(*category);
                }
            }
        }

        hit
    }
}

/// What open pages should do once a category has been handled.
pub(crate) fn message_for(category: Category) -> Message {
    match category {
        Category::Style => Message::Styles,
        _ => Message::Reload,
    }
}

/// Directories to register with the watcher: each category's static
/// prefix, skipping those that don't exist, collapsed to the fewest roots.
fn watch_roots(site: &Website) -> Vec<Utf8PathBuf> {
    let mut roots = HashSet::new();

    for category in Category::ALL {
        let root = category.watch_root(&site.root, &site.config.paths);
        match root.canonicalize_utf8() {
            Ok(root) => {
                roots.insert(root);
            }
            Err(_) => debug!("not watching {root} for {category}, it doesn't exist"),
        }
    }

    collapse_watch_paths(roots)
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// The watcher is recursive, so a path below an already accepted one adds
/// nothing.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

/// Reruns one stage per request, folding requests that pile up meanwhile
/// into a single follow-up run.
fn spawn_worker(
    site: Arc<Website>,
    env: Environment,
    category: Category,
    requests: Receiver<()>,
    reload: Sender<Message>,
    status: Arc<Status>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while requests.recv().is_ok() {
            while requests.try_recv().is_ok() {}

            if !status.begin_rebuild() {
                break;
            }

            let s = Instant::now();
            let message = match run_stage(&site, &env, category) {
                Ok(report) => {
                    info!(
                        "rebuilt {} {category} file(s) {}",
                        report.staged.len(),
                        as_overhead(s)
                    );
                    message_for(category)
                }
                Err(e) => {
                    warn!("{category} rebuild failed, serving the last good output");
                    Message::Error {
                        message: e.to_string(),
                    }
                }
            };

            status.end_rebuild();
            reload.send(message).ok();
        }
    })
}

/// Serves the compiled site and keeps it fresh until interrupted.
pub(crate) fn serve(site: &Arc<Website>, env: Environment, socket: Arc<TcpListener>) -> Result<(), BuildError> {
    Ok(run(site, env, socket)?)
}

fn run(site: &Arc<Website>, env: Environment, socket: Arc<TcpListener>) -> Result<(), WatchError> {
    let status = Arc::new(Status::new());
    let routes = Routes::new(site)?;

    let clients = Arc::default();
    let _thread_i = new_thread_ws_incoming(socket.clone(), Arc::clone(&clients));
    let (tx_reload, thread_o) = new_thread_ws_reload(clients);

    let (tx, rx) = channel::<Signal>();

    let mut debouncer = {
        let tx = tx.clone();
        new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            tx.send(Signal::Fs(result)).ok();
        })?
    };

    for path in watch_roots(site) {
        info!("watching {path}");
        debouncer.watch(&path, RecursiveMode::Recursive)?;
    }

    let mut workers = BTreeMap::new();
    let mut threads = Vec::new();

    for category in Category::TRANSFORMED {
        let (tx_worker, rx_worker) = channel();
        let thread = spawn_worker(
            site.clone(),
            env,
            category,
            rx_worker,
            tx_reload.clone(),
            status.clone(),
        );
        workers.insert(category, tx_worker);
        threads.push((category, thread));
    }

    #[cfg(feature = "server")]
    let thread_http = {
        let tx = tx.clone();
        super::http::start(site, async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tx.send(Signal::Shutdown).ok();
            }
        })?
    };

    drop(tx);
    status.serve();

    if let Ok(addr) = socket.local_addr() {
        debug!("live reload listening on {addr}");
    }
    info!(state = ?status.get(), "serving, watching for changes...");

    dispatch(&rx, &routes, &workers, &tx_reload);

    info!("shutting down...");
    status.stop();
    drop(debouncer);

    drop(workers);
    for (category, thread) in threads {
        if thread.join().is_err() {
            error!("{category} worker panicked");
        }
    }

    drop(tx_reload);
    thread_o.join().ok();

    #[cfg(feature = "server")]
    match thread_http.join() {
        Ok(result) => result?,
        Err(_) => return Err(WatchError::Server("HTTP thread panicked".into())),
    }

    Ok(())
}

fn dispatch(
    rx: &Receiver<Signal>,
    routes: &Routes,
    workers: &BTreeMap<Category, Sender<()>>,
    reload: &Sender<Message>,
) {
    while let Ok(signal) = rx.recv() {
        let events = match signal {
            Signal::Shutdown => return,
            Signal::Fs(Ok(events)) => events,
            Signal::Fs(Err(errors)) => {
                for e in errors {
                    error!("watch error: {e}");
                }
                continue;
            }
        };

        let paths = events
            .iter()
            .filter(|de| !matches!(de.event.kind, EventKind::Access(_)))
            .flat_map(|de| de.event.paths.iter().map(|p| p.as_path()));

        let categories = routes.categories(paths);
        if categories.is_empty() {
            continue;
        }

        debug!("change detected in {categories:?}");

        for category in categories {
            match workers.get(&category) {
                Some(worker) => {
                    worker.send(()).ok();
                }
                // served straight from the source tree
                None => {
                    reload.send(message_for(category)).ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use notify::Event;
    use notify::event::{AccessKind, ModifyKind};
    use notify_debouncer_full::DebouncedEvent;

    use super::*;
    use crate::test_support::site;

    fn changed(kind: EventKind, path: Utf8PathBuf) -> DebouncedEvent {
        DebouncedEvent::new(Event::new(kind).add_path(path.into_std_path_buf()), Instant::now())
    }

    #[test]
    fn changed_paths_map_to_categories() {
        let (_dir, site) = site(&[]);
        let routes = Routes::new(&site).unwrap();
        let src = site.source();

        let hit = |path: Utf8PathBuf| routes.categories([path.as_std_path()]);

        assert_eq!(hit(src.join("index.html")), BTreeSet::from([Category::Markup]));
        assert_eq!(hit(src.join("layouts/basic.html")), BTreeSet::from([Category::Markup]));
        assert_eq!(hit(src.join("assets/styles/_vars.scss")), BTreeSet::from([Category::Style]));
        assert_eq!(hit(src.join("assets/scripts/lib/util.js")), BTreeSet::from([Category::Script]));
        assert_eq!(hit(src.join("assets/images/logo.png")), BTreeSet::from([Category::Image]));
        assert_eq!(hit(src.join("assets/fonts/body.woff2")), BTreeSet::from([Category::Font]));
        assert_eq!(hit(site.public().join("robots.txt")), BTreeSet::from([Category::Extra]));
        assert!(hit(site.staging().join("index.html")).is_empty());
        assert!(hit(site.root.join("README.md")).is_empty());
    }

    #[test]
    fn stylesheets_swap_in_place_and_everything_else_reloads() {
        assert_eq!(message_for(Category::Style), Message::Styles);

        for category in [Category::Markup, Category::Script, Category::Image, Category::Font, Category::Extra] {
            assert_eq!(message_for(category), Message::Reload);
        }
    }

    #[test]
    fn watch_roots_skip_missing_directories() {
        let (_dir, site) = site(&[
            ("src/index.html", ""),
            ("src/assets/styles/main.scss", ""),
        ]);

        let roots = watch_roots(&site);
        assert_eq!(roots, [site.source().canonicalize_utf8().unwrap()]);
    }

    #[test]
    fn status_transitions() {
        let status = Status::new();
        assert_eq!(status.get(), State::Idle);

        status.serve();
        assert_eq!(status.get(), State::Serving);

        assert!(status.begin_rebuild());
        assert!(status.begin_rebuild());
        status.end_rebuild();
        assert_eq!(status.get(), State::Rebuilding);
        status.end_rebuild();
        assert_eq!(status.get(), State::Serving);

        status.stop();
        assert_eq!(status.get(), State::Stopped);
        assert!(!status.begin_rebuild());
    }

    #[test]
    fn worker_reports_failures_and_keeps_going() {
        let (_dir, site) = site(&[("src/assets/styles/main.scss", ".a { color: ; ")]);
        let site = Arc::new(site);
        let status = Arc::new(Status::new());
        status.serve();

        let (tx_reload, rx_reload) = channel();
        let (worker, requests) = channel();
        let thread = spawn_worker(
            site.clone(),
            Environment::build(),
            Category::Style,
            requests,
            tx_reload,
            status.clone(),
        );

        worker.send(()).unwrap();
        assert!(matches!(rx_reload.recv().unwrap(), Message::Error { .. }));

        crate::io::write(&site.source().join("assets/styles/main.scss"), ".a { color: red; }").unwrap();
        worker.send(()).unwrap();
        assert_eq!(rx_reload.recv().unwrap(), Message::Styles);
        assert!(site.staging().join("assets/styles/main.css").exists());

        drop(worker);
        thread.join().unwrap();
        assert_eq!(status.get(), State::Serving);
    }

    #[test]
    fn queued_requests_coalesce() {
        let (_dir, site) = site(&[("src/index.html", "<p>hi</p>")]);
        let site = Arc::new(site);
        let (tx_reload, rx_reload) = channel();
        let (worker, requests) = channel();

        // everything is queued before the worker starts
        for _ in 0..5 {
            worker.send(()).unwrap();
        }
        drop(worker);

        spawn_worker(
            site.clone(),
            Environment::build(),
            Category::Markup,
            requests,
            tx_reload,
            Arc::new(Status::new()),
        )
        .join()
        .unwrap();

        assert_eq!(rx_reload.try_iter().collect::<Vec<_>>(), [Message::Reload]);
        assert!(site.staging().join("index.html").exists());
    }

    #[test]
    fn dispatch_sends_styles_to_their_worker_and_reloads_for_images() {
        let (_dir, site) = site(&[]);
        let routes = Routes::new(&site).unwrap();
        let (tx, rx) = channel();
        let (tx_reload, rx_reload) = channel();

        let mut workers = BTreeMap::new();
        let mut queues = BTreeMap::new();
        for category in Category::TRANSFORMED {
            let (worker, queue) = channel();
            workers.insert(category, worker);
            queues.insert(category, queue);
        }

        let modify = || EventKind::Modify(ModifyKind::Any);
        let src = site.source();

        tx.send(Signal::Fs(Ok(vec![changed(modify(), src.join("assets/images/logo.png"))])))
            .unwrap();
        tx.send(Signal::Fs(Ok(vec![changed(modify(), src.join("assets/styles/main.scss"))])))
            .unwrap();
        // reads are not changes
        tx.send(Signal::Fs(Ok(vec![changed(
            EventKind::Access(AccessKind::Any),
            src.join("index.html"),
        )])))
        .unwrap();
        tx.send(Signal::Shutdown).unwrap();

        dispatch(&rx, &routes, &workers, &tx_reload);

        assert_eq!(rx_reload.try_iter().collect::<Vec<_>>(), [Message::Reload]);
        assert_eq!(queues[&Category::Style].try_iter().count(), 1);
        assert_eq!(queues[&Category::Markup].try_iter().count(), 0);
        assert_eq!(queues[&Category::Script].try_iter().count(), 0);
    }

    #[test]
    fn test_collapse_watch_paths() {
        let paths = HashSet::from([
            Utf8PathBuf::from("/a"),
            Utf8PathBuf::from("/a/b"),
            Utf8PathBuf::from("/b"),
            Utf8PathBuf::from("/foo"),
            Utf8PathBuf::from("/foo-bar"),
        ]);

        assert_eq!(
            collapse_watch_paths(paths),
            ["/a", "/b", "/foo", "/foo-bar"].map(Utf8PathBuf::from)
        );
    }
}
