//! `sentinel_organize`: an LLM-directed file organization core.
//!
//! The crate has no UI of its own. It exposes the Organization Pipeline,
//! the Template & Path Resolver, the File Catalog, and the Watch Daemon
//! as library operations; a CLI, tray app, or desktop front end composes
//! them the way it sees fit.

pub mod catalog;
pub mod coercer;
pub mod config;
pub mod daemon;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod pipeline;
pub mod provider;
pub mod security;
pub mod sidecar;
pub mod template;
pub mod wal;
pub mod watcher;

pub use catalog::Catalog;
pub use config::Config;
pub use daemon::{Daemon, DaemonConfig};
pub use error::OrganizeError;
pub use pipeline::{ConflictPolicy, OrganizationPipeline};
pub use template::TemplateRegistry;

use tracing_subscriber::EnvFilter;

/// Loads a `.env` from the working directory (falling back to
/// `<CONFIG_DIR>/.env`), then installs a `tracing_subscriber` formatter
/// honoring `RUST_LOG`. Mirrors the teacher's `lib.rs::run` startup
/// sequence; a CLI or daemon entry point calls this once before doing
/// anything else.
pub fn init() {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_path(Config::config_dir().join(".env"));
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,sentinel_organize=info")),
        )
        .try_init();
}

/// Convenience entry point for a standalone watch-daemon process: loads
/// config and the template registry from their default on-disk
/// locations, opens the catalog, resumes any WAL journal left behind by
/// a crash mid-commit, and runs until a shutdown signal arrives. A UI
/// layer that wants finer control constructs `Config`, `TemplateRegistry`,
/// `Catalog`, `OrganizationPipeline`, and `Daemon` directly instead of
/// calling this.
pub async fn run_daemon() -> Result<(), OrganizeError> {
    let config = config::Config::load()?;
    recover_interrupted_commits();

    let templates_path = config.config_dir_path().join("templates.json");
    let registry = template::TemplateRegistry::load(&templates_path)?;
    let fields_path = config.config_dir_path().join("fields.json");
    let fields = fields::FieldRegistry::load(&fields_path)?;
    let catalog_path = config.config_dir_path().join("catalog.sqlite3");
    let catalog = catalog::Catalog::open(&catalog_path)?;

    let pipeline = pipeline::OrganizationPipeline::new(config, catalog).with_fields(fields);
    let daemon = daemon::Daemon::new(registry, pipeline);
    daemon.run().await
}

/// Runs `wal::check_for_recovery`/`resume_journal` once at process start
/// so a journal left `Pending`/`InProgress` by a crash mid-commit (spec.md
/// end-to-end scenario 3) is finished rather than left to rot. Best
/// effort: a recovery failure is logged and the daemon starts anyway —
/// the stuck journal just stays on disk for a later manual look.
fn recover_interrupted_commits() {
    match wal::check_for_recovery() {
        Ok(Some(info)) => {
            tracing::warn!(
                job_id = %info.job_id,
                pending = info.pending_count,
                completed = info.completed_count,
                "found an interrupted WAL journal at startup, resuming it"
            );
            match wal::resume_journal(&info.job_id) {
                Ok(result) if result.success => {
                    tracing::info!(job_id = %info.job_id, completed = result.completed_count, "WAL journal recovered");
                }
                Ok(result) => {
                    tracing::error!(job_id = %info.job_id, errors = ?result.errors, "WAL journal recovery left failures behind");
                }
                Err(error) => {
                    tracing::error!(job_id = %info.job_id, %error, "failed to resume interrupted WAL journal");
                }
            }
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(%error, "failed to check for an interrupted WAL journal");
        }
    }
}
