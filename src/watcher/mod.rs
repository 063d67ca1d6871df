//! Watcher (spec.md §4.7): observes template base paths, emits debounced
//! `FileAdded` events.
//!
//! Grounded directly on the teacher's `services/watcher.rs` (`notify` +
//! `notify_debouncer_full`, hidden-file/temp-file suppression, symlink-
//! escape guards via `canonicalize` + `starts_with`, a per-folder
//! `FolderWatcher` map). The teacher's watcher only debounces at the
//! `notify` layer (waits 500ms for write bursts to settle); spec.md §4.7
//! additionally requires an explicit stability-poll (file size unchanged
//! for `stabilityThreshold`, polled every `pollInterval`) before
//! delivering `FileAdded`, so raw `notify` create events are treated as
//! *candidates* that a stability task confirms.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::mpsc;

use crate::security::PathValidator;

/// Emitted by the Watcher (spec.md §4.7).
#[derive(Debug, Clone)]
pub enum WatchEvent {
    FileAdded {
        path: PathBuf,
        template_id: String,
        file_name: String,
    },
    /// A subscription failure (path unreadable). Does not tear down
    /// sibling subscriptions (spec.md §4.7).
    Error {
        template_id: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub stability_threshold: Duration,
    pub poll_interval: Duration,
    /// Per-template option to watch recursively instead of depth-1
    /// (spec.md §4.7: "Directories are not watched recursively by
    /// default; depth-1 only unless a per-template option requests
    /// otherwise").
    pub recursive: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            stability_threshold: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            recursive: false,
        }
    }
}

struct Subscription {
    #[allow(dead_code)]
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

/// Subscribes to each watched template's `basePath`. A file name leading
/// with `.` is suppressed (hidden files), matching the teacher's
/// temp/hidden file skip in `handle_file_event`.
pub struct Watcher {
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    /// Paths with a stability-poll task already running. Two debounced
    /// `notify` batches for the same path (e.g. a create then an append,
    /// each landing in its own 200ms window) must still surface as
    /// exactly one `FileAdded` (spec.md §4.7, scenario 5) — the running
    /// task already re-reads the path's current size every poll, so a
    /// second candidate for the same path is a no-op rather than a
    /// second stability-poll task racing the first.
    stability_watches: Arc<Mutex<HashSet<PathBuf>>>,
    sender: mpsc::Sender<WatchEvent>,
}

/// Default bound on the Watcher→Daemon event channel (spec.md §5): past
/// this many undelivered events, a producer blocks with backpressure
/// rather than growing memory without bound.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

impl Watcher {
    pub fn new() -> (Self, mpsc::Receiver<WatchEvent>) {
        let (sender, receiver) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        (
            Self {
                subscriptions: Arc::new(Mutex::new(HashMap::new())),
                stability_watches: Arc::new(Mutex::new(HashSet::new())),
                sender,
            },
            receiver,
        )
    }

    /// Subscribe `template_id`'s base path. A failure here is surfaced as
    /// an `Error` event rather than propagated as a hard error, so a
    /// caller iterating over several templates can continue subscribing
    /// the rest.
    pub fn subscribe(&self, template_id: &str, base_path: &Path, config: WatcherConfig) {
        if let Err(message) = self.try_subscribe(template_id, base_path, config) {
            let sender = self.sender.clone();
            let event = WatchEvent::Error {
                template_id: template_id.to_string(),
                message,
            };
            // `subscribe` itself is synchronous, so the bounded, backpressure-
            // respecting send (default policy: block with backpressure on the
            // Watcher, spec.md §5) happens on a spawned task rather than here.
            tokio::spawn(async move {
                let _ = sender.send(event).await;
            });
        }
    }

    fn try_subscribe(&self, template_id: &str, base_path: &Path, config: WatcherConfig) -> Result<(), String> {
        if PathValidator::is_protected_path(base_path) {
            return Err(format!("{} resolves under a protected system directory", base_path.display()));
        }
        if !base_path.exists() {
            return Err(format!("{} does not exist", base_path.display()));
        }

        let watched = base_path.to_path_buf();
        let template_id_owned = template_id.to_string();
        let sender = self.sender.clone();
        let stability_threshold = config.stability_threshold;
        let poll_interval = config.poll_interval;
        let stability_watches = self.stability_watches.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| {
                match result {
                    Ok(events) => {
                        for event in events {
                            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                                continue;
                            }
                            for path in &event.paths {
                                if let Some(candidate) =
                                    accept_candidate(path, &watched, &template_id_owned)
                                {
                                    if !stability_watches.lock().unwrap().insert(candidate.clone()) {
                                        continue;
                                    }
                                    let sender = sender.clone();
                                    let stability_watches = stability_watches.clone();
                                    tokio::spawn(stability_watch(
                                        candidate,
                                        template_id_owned.clone(),
                                        stability_threshold,
                                        poll_interval,
                                        sender,
                                        stability_watches,
                                    ));
                                }
                            }
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            tracing::warn!(template = %template_id_owned, "watcher error: {}", error);
                        }
                    }
                }
            },
        )
        .map_err(|e| e.to_string())?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        debouncer.watch(base_path, mode).map_err(|e| e.to_string())?;

        self.subscriptions
            .lock()
            .unwrap()
            .insert(template_id.to_string(), Subscription { debouncer });

        Ok(())
    }

    pub fn unsubscribe(&self, template_id: &str) {
        self.subscriptions.lock().unwrap().remove(template_id);
    }

    pub fn is_subscribed(&self, template_id: &str) -> bool {
        self.subscriptions.lock().unwrap().contains_key(template_id)
    }
}

/// Candidate filter: directories, symlinks (escape guard), hidden files,
/// and files outside the watched folder are rejected before a stability
/// task is ever spawned — mirroring the teacher's
/// `handle_file_event` checks.
fn accept_candidate(path: &Path, watched: &Path, _template_id: &str) -> Option<PathBuf> {
    if path.is_dir() {
        return None;
    }
    if path.is_symlink() {
        return None;
    }

    let file_name = path.file_name()?.to_string_lossy().to_string();
    if file_name.starts_with('.') {
        return None;
    }

    if let (Ok(canonical_path), Ok(canonical_watched)) = (path.canonicalize(), watched.canonicalize()) {
        if !canonical_path.starts_with(&canonical_watched) {
            return None;
        }
    } else {
        return None;
    }

    Some(path.to_path_buf())
}

/// Polls `path`'s size every `poll_interval` until it has been stable for
/// `stability_threshold`, then emits `FileAdded` (spec.md §4.7, scenario
/// 5: exactly one event after the stability window closes even if the
/// file was created then appended to twice within the window).
async fn stability_watch(
    path: PathBuf,
    template_id: String,
    stability_threshold: Duration,
    poll_interval: Duration,
    sender: mpsc::Sender<WatchEvent>,
    stability_watches: Arc<Mutex<HashSet<PathBuf>>>,
) {
    let mut last_size = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(_) => {
            stability_watches.lock().unwrap().remove(&path);
            return;
        }
    };
    let mut stable_since = tokio::time::Instant::now();

    loop {
        tokio::time::sleep(poll_interval).await;

        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                // file vanished before it stabilized
                stability_watches.lock().unwrap().remove(&path);
                return;
            }
        };

        if size != last_size {
            last_size = size;
            stable_since = tokio::time::Instant::now();
            continue;
        }

        if stable_since.elapsed() >= stability_threshold {
            stability_watches.lock().unwrap().remove(&path);
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            // Bounded send applies backpressure to the stability-poll task
            // itself (spec.md §5 default policy) rather than dropping the
            // event if the Daemon is momentarily behind.
            let _ = sender.send(WatchEvent::FileAdded {
                path,
                template_id,
                file_name,
            })
            .await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn accept_candidate_rejects_hidden_files() {
        let dir = tempdir().unwrap();
        let hidden = dir.path().join(".hidden");
        std::fs::write(&hidden, "x").unwrap();
        assert!(accept_candidate(&hidden, dir.path(), "t").is_none());
    }

    #[test]
    fn accept_candidate_rejects_directories() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        assert!(accept_candidate(&sub, dir.path(), "t").is_none());
    }

    #[test]
    fn accept_candidate_allows_plain_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("report.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(accept_candidate(&file, dir.path(), "t").is_some());
    }

    #[tokio::test]
    async fn stability_watch_emits_exactly_once_after_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.txt");
        std::fs::write(&path, "a").unwrap();

        let (sender, mut receiver) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let stability_watches = Arc::new(Mutex::new(HashSet::new()));
        let handle = tokio::spawn(stability_watch(
            path.clone(),
            "docs".to_string(),
            Duration::from_millis(50),
            Duration::from_millis(10),
            sender,
            stability_watches,
        ));

        // Append once during the stability window; should reset the timer.
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&path, "a longer body").unwrap();

        handle.await.unwrap();

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, WatchEvent::FileAdded { .. }));
        assert!(receiver.try_recv().is_err(), "expected exactly one event");
    }

    /// A second debounced batch for the same path (e.g. a create then an
    /// append landing in separate `notify` 200ms windows) must not spawn a
    /// second stability-poll task — the guard in `stability_watches`
    /// dedupes it so scenario 5's "exactly one `FileAdded`" holds even
    /// across debounce-window boundaries, not just within one.
    #[tokio::test]
    async fn duplicate_candidate_for_in_flight_path_does_not_spawn_a_second_task() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.txt");
        std::fs::write(&path, "a").unwrap();

        let stability_watches = Arc::new(Mutex::new(HashSet::new()));
        assert!(stability_watches.lock().unwrap().insert(path.clone()));
        // Simulates the closure's own guard check for a second candidate
        // arriving while the first's task is still running.
        assert!(!stability_watches.lock().unwrap().insert(path.clone()));

        let (sender, mut receiver) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(stability_watch(
            path.clone(),
            "docs".to_string(),
            Duration::from_millis(30),
            Duration::from_millis(10),
            sender,
            stability_watches.clone(),
        ));
        handle.await.unwrap();

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, WatchEvent::FileAdded { .. }));
        assert!(!stability_watches.lock().unwrap().contains(&path), "entry should be cleared on completion");
    }
}
