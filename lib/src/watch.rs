//! Watching a site's sources and rebuilding what changed.
//!
//! ```text
//! notify ──▶ events channel ──▶ debounce thread ──▶ batches channel ──▶ rebuild
//! ```
//!
//! The watcher never touches resources. It only forwards batches of paths;
//! the thread calling [`Site::rebuild()`] does the rest.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use derive_more::Debug;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use rustc_hash::FxHashMap;

use crate::build::BuildReport;
use crate::error::{Chainable, Result};
use crate::site::Site;
use crate::util::normalize;

/// The quiet period after the last event before a batch is emitted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// How long the debounce thread sleeps when nothing is pending.
const IDLE: Duration = Duration::from_secs(3600);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Change {
    Created,
    Modified,
    Removed,
}

/// Collects changed paths and releases them once no event has arrived for
/// `delay`. Time is only read when events are pushed; readiness is checked
/// against a caller-supplied instant.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    changes: FxHashMap<PathBuf, Change>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer { delay, changes: FxHashMap::default(), last_event: None }
    }

    /// Records the paths of `event`. Metadata-only changes, access events,
    /// and editor temp files are dropped. Returns whether anything was
    /// recorded.
    pub fn push(&mut self, event: &notify::Event) -> bool {
        let change = match event.kind {
            EventKind::Create(_) => Change::Created,
            EventKind::Remove(_) => Change::Removed,
            EventKind::Modify(ModifyKind::Metadata(_)) => return false,
            EventKind::Modify(_) => Change::Modified,
            _ => return false,
        };

        let mut recorded = false;
        for path in event.paths.iter().filter(|p| !is_temp_file(p)) {
            let path = normalize(path);
            tracing::trace!(path = %path.display(), ?change, "file event");
            match (self.changes.get(&path).copied(), change) {
                // Appeared and vanished inside one window.
                (Some(Change::Created), Change::Removed) => { self.changes.remove(&path); }
                (Some(Change::Removed), _) | (Some(_), Change::Removed) | (None, _) => {
                    self.changes.insert(path, change);
                }
                (Some(_), _) => {}
            }

            recorded = true;
        }

        if recorded {
            self.last_event = Some(Instant::now());
        }

        recorded
    }

    /// When the pending batch becomes ready, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_event.map(|last| last + self.delay)
    }

    /// Takes the pending batch, sorted, if the quiet period has elapsed by
    /// `now`.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        self.last_event = None;
        let mut batch: Vec<PathBuf> = std::mem::take(&mut self.changes).into_keys().collect();
        if batch.is_empty() {
            return None;
        }

        batch.sort();
        Some(batch)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Backup, swap, and hidden files written by editors.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    name.starts_with('.')
        || name.ends_with('~')
        || matches!(ext, "swp" | "swo" | "swx" | "tmp" | "bak" | "bck")
}

/// A recursive watch over a set of roots producing debounced batches of
/// changed paths. Dropping it stops the watch and discards any pending
/// batch.
#[derive(Debug)]
pub struct Watcher {
    batches: Receiver<Vec<PathBuf>>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    #[debug(ignore)]
    _watcher: RecommendedWatcher,
}

impl Watcher {
    /// Watches every existing path in `roots`.
    pub fn new<P: AsRef<Path>>(roots: &[P], delay: Duration) -> Result<Watcher> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let _ = event_tx.send(event);
        })?;

        for root in roots.iter().map(|r| r.as_ref()).filter(|r| r.exists()) {
            watcher.watch(root, RecursiveMode::Recursive)
                .chain_with(|| error!("failed to watch directory", "path" => root.display()))?;

            tracing::info!(path = %root.display(), "watching");
        }

        let (batch_tx, batches) = crossbeam_channel::unbounded();
        let (stop, stop_rx) = crossbeam_channel::bounded(0);
        let thread = std::thread::Builder::new()
            .name("weft-watch".into())
            .spawn(move || debounce(Debouncer::new(delay), event_rx, stop_rx, batch_tx))
            .chain(error!("failed to spawn watch thread"))?;

        Ok(Watcher { batches, stop: Some(stop), thread: Some(thread), _watcher: watcher })
    }

    /// Watches the site's content and template directories.
    pub fn for_site(site: &Site, delay: Duration) -> Result<Watcher> {
        let config = site.config();
        Watcher::new(&[&config.content_dir, &config.template_dir], delay)
    }

    pub fn batches(&self) -> &Receiver<Vec<PathBuf>> {
        &self.batches
    }

    /// Blocks until the next batch. `None` once the watch has stopped.
    pub fn recv(&self) -> Option<Vec<PathBuf>> {
        self.batches.recv().ok()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn debounce(
    mut debouncer: Debouncer,
    events: Receiver<notify::Result<notify::Event>>,
    stop: Receiver<()>,
    batches: Sender<Vec<PathBuf>>,
) {
    loop {
        let timeout = debouncer.deadline()
            .map_or(IDLE, |deadline| deadline.saturating_duration_since(Instant::now()));

        crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(Ok(event)) => { debouncer.push(&event); }
                Ok(Err(e)) => tracing::warn!(error = %e, "watch error"),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
            default(timeout) => {}
        }

        if let Some(batch) = debouncer.take_ready(Instant::now()) {
            tracing::debug!(paths = batch.len(), "changes settled");
            if batches.send(batch).is_err() {
                break;
            }
        }
    }

    tracing::debug!("watch stopped");
}

impl Site {
    /// Builds the site, then rebuilds it with every batch of changes until
    /// the watch stops. `on_build` sees each report.
    pub fn watch<F>(&self, delay: Duration, mut on_build: F) -> Result<()>
        where F: FnMut(&BuildReport)
    {
        let watcher = Watcher::for_site(self, delay)?;
        on_build(&self.rebuild(None)?);
        while let Some(batch) = watcher.recv() {
            tracing::info!(changed = batch.len(), "rebuilding");
            on_build(&self.rebuild(Some(batch.as_slice()))?);
        }

        Ok(())
    }
}
