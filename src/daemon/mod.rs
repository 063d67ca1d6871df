//! Watch Daemon Coordinator: subscribes every watch-enabled template's
//! base path, dispatches `FileAdded` events through a bounded worker
//! pool, and shuts down cleanly on SIGINT/SIGTERM.
//!
//! Grounded on the teacher's `jobs` queue discipline (bounded
//! concurrency via a semaphore, cancellation-aware task spawning) and
//! `lib.rs::run`'s signal handling, generalized from Tauri's window
//! lifecycle into a plain `tokio::signal::ctrl_c` + SIGTERM select.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::OrganizeError;
use crate::pipeline::{ConflictPolicy, OrganizationPipeline};
use crate::template::registry::TemplateRegistry;
use crate::template::resolver::expand_tilde;
use crate::watcher::{WatchEvent, Watcher, WatcherConfig};

#[derive(Debug, Clone, Copy)]
pub struct DaemonConfig {
    /// Upper bound on concurrently running organize operations. Defaults
    /// to the smaller of 4 and the machine's core count — organize calls
    /// are I/O- and network-bound, not CPU-bound, so there is little
    /// value in exceeding a small fixed bound regardless of core count.
    pub max_concurrency: usize,
    pub watcher: WatcherConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().min(4).max(1),
            watcher: WatcherConfig::default(),
        }
    }
}

/// Owns the Watcher, the Template Registry, and the Organization
/// Pipeline for the lifetime of a `run()` call. A single daemon process
/// runs one of these.
pub struct Daemon {
    registry: TemplateRegistry,
    pipeline: OrganizationPipeline,
    conflict_policy: ConflictPolicy,
    daemon_config: DaemonConfig,
}

impl Daemon {
    pub fn new(registry: TemplateRegistry, pipeline: OrganizationPipeline) -> Self {
        Self {
            registry,
            pipeline,
            conflict_policy: ConflictPolicy::default(),
            daemon_config: DaemonConfig::default(),
        }
    }

    pub fn with_config(mut self, daemon_config: DaemonConfig) -> Self {
        self.daemon_config = daemon_config;
        self
    }

    pub fn with_conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    /// Subscribe every watch-enabled template, then process `FileAdded`
    /// events until a shutdown signal arrives. Each event is matched
    /// back to its template by id; a template whose `autoOrganize` flag
    /// is off is still watched (so its discovered-file index stays
    /// current) but never auto-committed.
    pub async fn run(self) -> Result<(), OrganizeError> {
        let (watcher, mut events) = Watcher::new();
        for template in self.registry.watched() {
            let base_path = expand_tilde(&template.base_path);
            watcher.subscribe(&template.id, &base_path, self.daemon_config.watcher);
        }

        let pipeline = Arc::new(self.pipeline);
        let registry = Arc::new(self.registry);
        let semaphore = Arc::new(Semaphore::new(self.daemon_config.max_concurrency));
        // Per-path FIFO queue: a path with a task already running just gets
        // its new event appended here rather than dispatched immediately
        // (spec.md §5 "a second event for a path is not dispatched until
        // the first completes", testable scenario 6).
        let queues: Arc<DashMap<PathBuf, Mutex<VecDeque<PendingEvent>>>> = Arc::new(DashMap::new());
        let conflict_policy = self.conflict_policy;

        // Tracks every per-path worker spawned by `dispatch` so shutdown can
        // abort them rather than leaving them detached (spec.md §4.9/§5: "abort
        // in-flight pipeline tasks ... before exiting", "propagate cancellation
        // to all child tasks").
        let mut workers: JoinSet<()> = JoinSet::new();

        let mut shutdown = Box::pin(shutdown_signal());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received, stopping subscriptions");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(WatchEvent::FileAdded { path, template_id, file_name }) => {
                            Self::dispatch(
                                path,
                                file_name,
                                template_id,
                                &registry,
                                &pipeline,
                                &semaphore,
                                &queues,
                                conflict_policy,
                                &mut workers,
                            );
                        }
                        Some(WatchEvent::Error { template_id, message }) => {
                            tracing::warn!(template = %template_id, message = %message, "watch subscription error");
                        }
                        None => break,
                    }
                }
                // Reap finished workers as they complete so the JoinSet does
                // not grow unbounded across a long-running daemon.
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
            }
        }

        let in_flight = workers.len();
        if in_flight > 0 {
            tracing::info!(count = in_flight, "aborting in-flight organize tasks");
        }
        workers.shutdown().await;

        Ok(())
    }

    /// Per-path serialization (spec.md §5): events for the same path are
    /// processed in arrival order, and a second event is never dispatched
    /// until the first completes. A path already owning a running worker
    /// just has its new event appended to that path's queue; the worker
    /// drains the queue itself once spawned, so only one organize call is
    /// ever in flight per path at a time (testable scenario 6).
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        path: PathBuf,
        file_name: String,
        template_id: String,
        registry: &Arc<TemplateRegistry>,
        pipeline: &Arc<OrganizationPipeline>,
        semaphore: &Arc<Semaphore>,
        queues: &Arc<DashMap<PathBuf, Mutex<VecDeque<PendingEvent>>>>,
        conflict_policy: ConflictPolicy,
        workers: &mut JoinSet<()>,
    ) {
        let event = PendingEvent { file_name, template_id };

        let needs_worker = {
            let entry = queues
                .entry(path.clone())
                .or_insert_with(|| Mutex::new(VecDeque::new()));
            let mut queue = entry.lock().unwrap();
            queue.push_back(event);
            queue.len() == 1
        };

        if !needs_worker {
            tracing::debug!(path = %path.display(), "path already in flight, event queued");
            return;
        }

        let registry = registry.clone();
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        let queues = queues.clone();

        workers.spawn(async move {
            loop {
                let next = {
                    let queue = queues.get(&path).expect("worker owns this path's queue entry");
                    queue.lock().unwrap().front().cloned()
                };
                let Some(event) = next else { break };

                Self::process_event(&path, event, &registry, &pipeline, &semaphore, conflict_policy).await;

                let queue_empty = {
                    let queue = queues.get(&path).expect("worker owns this path's queue entry");
                    let mut queue = queue.lock().unwrap();
                    queue.pop_front();
                    queue.is_empty()
                };
                if queue_empty {
                    queues.remove(&path);
                    break;
                }
            }
        });
    }

    async fn process_event(
        path: &PathBuf,
        event: PendingEvent,
        registry: &Arc<TemplateRegistry>,
        pipeline: &Arc<OrganizationPipeline>,
        semaphore: &Arc<Semaphore>,
        conflict_policy: ConflictPolicy,
    ) {
        let PendingEvent { file_name, template_id } = event;

        let Some(template) = registry.get(&template_id).cloned() else {
            tracing::warn!(template = %template_id, "event for unknown template id, dropping");
            return;
        };

        if !template.auto_organize {
            // spec.md §4.9: when autoOrganize is off, a FileAdded event is
            // recorded to the discovered-files index only — never fed to
            // the pipeline.
            let file_size = std::fs::metadata(path).ok().map(|m| m.len());
            let _ = pipeline.catalog().record_discovered(crate::catalog::NewDiscoveredFile {
                file_path: path.clone(),
                file_name: file_name.clone(),
                organization_status: crate::catalog::OrganizationStatus::Unorganized,
                file_size,
                file_modified: None,
                template_id: Some(template_id),
            });
            return;
        }

        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        match pipeline.watch_mode_organize(path, &template, conflict_policy).await {
            Ok(Some(result)) => {
                tracing::info!(
                    file = %file_name,
                    destination = %result.final_path.display(),
                    "organized"
                );
            }
            Ok(None) => {
                tracing::debug!(file = %file_name, "already organized, skipped");
            }
            Err(error) => {
                tracing::warn!(file = %file_name, error = %error, "organize failed");
            }
        }
    }
}

/// One queued watch event awaiting its turn on a path's worker.
#[derive(Debug, Clone)]
struct PendingEvent {
    file_name: String,
    template_id: String,
}

/// Resolves once Ctrl-C or (on Unix) SIGTERM is received, matching spec
/// exit code 130 for SIGINT; SIGTERM is treated identically for a
/// graceful stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque as Deque;
    use std::time::Duration;
    use tempfile::tempdir;

    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::error::ProviderError;
    use crate::provider::ChatProvider;
    use crate::template::case::FileNameCase;
    use crate::template::registry::{Template, TemplateRegistry};

    #[test]
    fn default_concurrency_is_at_least_one_and_at_most_four() {
        let config = DaemonConfig::default();
        assert!(config.max_concurrency >= 1);
        assert!(config.max_concurrency <= 4);
    }

    struct ScriptedProvider {
        responses: Mutex<Deque<String>>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn chat(&self, _prompt: &str) -> Result<String, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses
                .pop_front()
                .unwrap_or_else(|| r#"{"title":"Notes","category":"Reports","summary":"s","tags":[]}"#.to_string()))
        }
        fn variant_name(&self) -> &'static str {
            "test"
        }
    }

    /// Scenario 6 (spec.md §8): two `FileAdded` events for the same path
    /// arrive close together. The second must not be dispatched until the
    /// first completes; since the first organize call moves the file and
    /// marks it with the Metadata Sidecar, the second becomes a no-op
    /// (property R3) rather than a second Catalog row.
    #[tokio::test]
    async fn second_event_for_same_path_is_queued_and_becomes_a_no_op() {
        let root = tempdir().unwrap();
        let source = root.path().join("notes.txt");
        std::fs::write(&source, "content").unwrap();

        let config_dir = root.path().join("cfg");
        let config = Config::load_from(&config_dir.join("config"), &config_dir).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let provider = ScriptedProvider {
            responses: Mutex::new(Deque::from(vec![
                r#"{"title":"Notes","category":"Reports","summary":"s","tags":[]}"#.to_string(),
            ])),
        };
        let pipeline = Arc::new(OrganizationPipeline::with_provider(config, catalog, Box::new(provider)));

        let mut registry = TemplateRegistry::load(&root.path().join("templates.json")).unwrap();
        registry
            .add(Template {
                id: "docs".to_string(),
                name: "Docs".to_string(),
                description: "general documents".to_string(),
                base_path: root.path().join("out").to_string_lossy().to_string(),
                naming_structure: "{file_category_1}/{file_title}".to_string(),
                file_name_case: FileNameCase::Snake,
                folder_structure: None,
                enforce_template_structure: false,
                watch_for_changes: true,
                auto_organize: true,
            })
            .unwrap();
        let registry = Arc::new(registry);

        let semaphore = Arc::new(Semaphore::new(1));
        let queues: Arc<DashMap<PathBuf, Mutex<VecDeque<PendingEvent>>>> = Arc::new(DashMap::new());
        let mut workers: JoinSet<()> = JoinSet::new();

        Daemon::dispatch(
            source.clone(),
            "notes.txt".to_string(),
            "docs".to_string(),
            &registry,
            &pipeline,
            &semaphore,
            &queues,
            ConflictPolicy::AutoRename,
            &mut workers,
        );
        // Fired before the first event's worker has had a chance to run;
        // must be queued behind it, not dropped and not run concurrently.
        Daemon::dispatch(
            source.clone(),
            "notes.txt".to_string(),
            "docs".to_string(),
            &registry,
            &pipeline,
            &semaphore,
            &queues,
            ConflictPolicy::AutoRename,
            &mut workers,
        );

        for _ in 0..100 {
            if queues.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(queues.is_empty(), "worker never drained the path's queue");
        assert_eq!(pipeline.catalog().list_files(10).unwrap().len(), 1);
    }

    /// Spec.md §4.9/§5: shutdown must abort in-flight per-path workers
    /// rather than leave them detached. A worker blocked mid-organize is
    /// aborted by `JoinSet::shutdown`, so it never reaches the commit
    /// stage once the daemon has decided to stop.
    #[tokio::test]
    async fn shutdown_aborts_in_flight_worker() {
        struct StallingProvider;

        #[async_trait]
        impl ChatProvider for StallingProvider {
            async fn chat(&self, _prompt: &str) -> Result<String, ProviderError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("shutdown should abort this task first")
            }
            fn variant_name(&self) -> &'static str {
                "test"
            }
        }

        let root = tempdir().unwrap();
        let source = root.path().join("notes.txt");
        std::fs::write(&source, "content").unwrap();

        let config_dir = root.path().join("cfg");
        let config = Config::load_from(&config_dir.join("config"), &config_dir).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let pipeline = Arc::new(OrganizationPipeline::with_provider(config, catalog, Box::new(StallingProvider)));

        let mut registry = TemplateRegistry::load(&root.path().join("templates.json")).unwrap();
        registry
            .add(Template {
                id: "docs".to_string(),
                name: "Docs".to_string(),
                description: "general documents".to_string(),
                base_path: root.path().join("out").to_string_lossy().to_string(),
                naming_structure: "{file_category_1}/{file_title}".to_string(),
                file_name_case: FileNameCase::Snake,
                folder_structure: None,
                enforce_template_structure: false,
                watch_for_changes: true,
                auto_organize: true,
            })
            .unwrap();
        let registry = Arc::new(registry);

        let semaphore = Arc::new(Semaphore::new(1));
        let queues: Arc<DashMap<PathBuf, Mutex<VecDeque<PendingEvent>>>> = Arc::new(DashMap::new());
        let mut workers: JoinSet<()> = JoinSet::new();

        Daemon::dispatch(
            source.clone(),
            "notes.txt".to_string(),
            "docs".to_string(),
            &registry,
            &pipeline,
            &semaphore,
            &queues,
            ConflictPolicy::AutoRename,
            &mut workers,
        );

        // Give the worker a chance to actually start and block inside chat().
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(workers.len(), 1, "expected exactly one in-flight worker");

        workers.shutdown().await;

        assert!(pipeline.catalog().list_files(10).unwrap().is_empty(), "aborted worker must not have committed");
    }
}
