//! Commit stage: resolves the final destination path's conflict policy,
//! copies a timestamped backup aside, moves or copies the source into
//! place, marks the Metadata Sidecar, and records the result in the
//! Catalog.
//!
//! Grounded on the teacher's `execution::executor` — the only module
//! that actually moves files on disk: mkdir -p of parent directories
//! before the move, a `.backup.<epoch_ms>` sibling copy taken first, and
//! a conflict policy deciding what happens when the destination is
//! already occupied.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::catalog::{Catalog, NewDiscoveredFile, NewOrganizedFile, OrganizationStatus, OrganizedFile};
use crate::config::{Config, MoveFileOperation};
use crate::error::{CommitError, OrganizeError};
use crate::security::PathValidator;
use crate::sidecar::{MetadataSidecar, SidecarMetadata};
use crate::wal::{WALJournal, WALManager, WALOperationType};

/// What happens when the resolved destination path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Fail,
    AutoRename,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::AutoRename
    }
}

/// Everything the commit stage needs about one file, gathered from the
/// resolved path and the pipeline's `AnalysisResult`.
pub struct CommitRequest<'a> {
    pub source: &'a Path,
    pub destination: PathBuf,
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    pub category: String,
    pub title: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub ai_provider: String,
    pub ai_model: String,
    pub ai_prompt: String,
    pub ai_response: String,
}

pub struct CommitResult {
    pub organized_file: OrganizedFile,
    pub final_path: PathBuf,
}

/// Run the commit stage end to end. Each step's failure mode is distinct
/// (protected path, mkdir, backup, conflict, move, catalog write) so a
/// caller can tell exactly how far the commit got before failing.
pub fn commit(
    config: &Config,
    catalog: &Catalog,
    conflict_policy: ConflictPolicy,
    request: CommitRequest,
) -> Result<CommitResult, OrganizeError> {
    if PathValidator::is_protected_path(&request.destination) {
        return Err(CommitError::ProtectedPath {
            path: request.destination.clone(),
        }
        .into());
    }

    let parent = request
        .destination
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let final_path = resolve_conflict(&request.destination, conflict_policy)?;

    // Each commit is journaled before it touches the filesystem: a crash
    // between the mkdir and the move leaves a WAL entry `wal::recovery`
    // can resume or roll back instead of an ambiguous half-moved file.
    let wal_manager = WALManager::with_dir(config.config_dir_path().join("wal"));
    let job_id = Uuid::new_v4().to_string();
    let mut journal = WALJournal::new(job_id.clone(), parent.clone());
    let mkdir_entry = journal
        .add_operation(WALOperationType::CreateFolder { path: parent.clone() })
        .expect("CreateFolder inverse is infallible");
    let move_op = match config.move_file_operation {
        MoveFileOperation::Move => WALOperationType::Move {
            source: request.source.to_path_buf(),
            destination: final_path.clone(),
        },
        MoveFileOperation::Copy => WALOperationType::Copy {
            source: request.source.to_path_buf(),
            destination: final_path.clone(),
        },
    };
    let move_entry = journal.add_operation(move_op).expect("Move/Copy inverse is infallible");
    let _ = wal_manager.save_journal(&journal);

    let _ = wal_manager.mark_entry_in_progress(&job_id, mkdir_entry);
    if let Err(source) = std::fs::create_dir_all(&parent) {
        let _ = wal_manager.mark_entry_failed(&job_id, mkdir_entry, source.to_string());
        return Err(CommitError::Mkdir { path: parent.clone(), source }.into());
    }
    let _ = wal_manager.mark_entry_complete(&job_id, mkdir_entry);

    let backup_path = write_backup(config, request.source)?;

    let _ = wal_manager.mark_entry_in_progress(&job_id, move_entry);
    if let Err(error) = move_or_copy(request.source, &final_path, config.move_file_operation) {
        let _ = wal_manager.mark_entry_failed(&job_id, move_entry, error.to_string());
        return Err(error.into());
    }
    let _ = wal_manager.mark_entry_complete(&job_id, move_entry);
    let _ = wal_manager.discard_journal(&job_id);

    // The sidecar mark is best-effort: a failure here must not unwind an
    // otherwise-successful commit, since the move already landed.
    let _ = MetadataSidecar::mark(
        &final_path,
        &SidecarMetadata {
            organized_at: chrono::Utc::now(),
            template_id: request.template_id.clone(),
            file_id: None,
        },
    );

    let current_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let original_name = request
        .source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let organized_file = catalog.insert_file(NewOrganizedFile {
        original_path: request.source.to_path_buf(),
        current_path: final_path.clone(),
        backup_path: Some(backup_path),
        original_name,
        current_name,
        template_id: request.template_id,
        template_name: request.template_name,
        category: request.category,
        title: request.title,
        tags: request.tags,
        summary: request.summary,
        ai_provider: request.ai_provider,
        ai_model: request.ai_model,
        ai_prompt: request.ai_prompt,
        ai_response: request.ai_response,
    })?;

    // Upsert the discovered-files index for both the original and the new
    // path with status `organized` (spec.md §4.4 commit step 7, invariant
    // P4) — the index is a supplementary view over the Catalog, so it is
    // refreshed in the same commit rather than lazily on next scan.
    let file_size = std::fs::metadata(&final_path).ok().map(|m| m.len());
    let _ = catalog.record_discovered(NewDiscoveredFile {
        file_path: final_path.clone(),
        file_name: organized_file.current_name.clone(),
        organization_status: OrganizationStatus::Organized,
        file_size,
        file_modified: None,
        template_id: organized_file.template_id.clone(),
    });
    let _ = catalog.record_discovered(NewDiscoveredFile {
        file_path: organized_file.original_path.clone(),
        file_name: organized_file.original_name.clone(),
        organization_status: OrganizationStatus::Organized,
        file_size: None,
        file_modified: None,
        template_id: organized_file.template_id.clone(),
    });

    Ok(CommitResult {
        organized_file,
        final_path,
    })
}

/// `ConflictPolicy::Fail` rejects an occupied destination outright.
/// `ConflictPolicy::AutoRename` (the default) appends " (2)", " (3)", ...
/// before the extension until a free path is found.
fn resolve_conflict(destination: &Path, policy: ConflictPolicy) -> Result<PathBuf, CommitError> {
    if !destination.exists() {
        return Ok(destination.to_path_buf());
    }

    match policy {
        ConflictPolicy::Fail => Err(CommitError::DestinationExists {
            path: destination.to_path_buf(),
        }),
        ConflictPolicy::AutoRename => {
            let stem = destination
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let extension = destination.extension().map(|e| e.to_string_lossy().to_string());
            let parent = destination.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

            for counter in 2.. {
                let candidate_name = match &extension {
                    Some(ext) => format!("{} ({}).{}", stem, counter, ext),
                    None => format!("{} ({})", stem, counter),
                };
                let candidate = parent.join(candidate_name);
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }
            unreachable!("counter range is unbounded")
        }
    }
}

/// Writes `<CONFIG_DIR>/backups/<basename>.backup.<epoch_ms>` before the
/// destructive move/copy, so a bad organization can be manually undone
/// even if the Write-Ahead Log path isn't used for this commit.
fn write_backup(config: &Config, source: &Path) -> Result<PathBuf, CommitError> {
    let backups_dir = config.backups_dir();
    std::fs::create_dir_all(&backups_dir).map_err(|source_err| CommitError::Backup {
        path: backups_dir.clone(),
        source: source_err,
    })?;

    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let basename = source.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let backup_path = backups_dir.join(format!("{}.backup.{}", basename, epoch_ms));

    std::fs::copy(source, &backup_path).map_err(|source_err| CommitError::Backup {
        path: backup_path.clone(),
        source: source_err,
    })?;

    Ok(backup_path)
}

/// `MOVE_FILE_OPERATION` decides whether the source is renamed (moved)
/// or copied into place, leaving the original behind.
fn move_or_copy(source: &Path, destination: &Path, operation: MoveFileOperation) -> Result<(), CommitError> {
    let result = match operation {
        MoveFileOperation::Move => std::fs::rename(source, destination).or_else(|_| {
            // `rename` fails across filesystem boundaries; fall back to
            // copy-then-remove, matching the teacher's cross-device move
            // handling in `execution::executor`.
            std::fs::copy(source, destination).map(|_| ()).and_then(|_| std::fs::remove_file(source))
        }),
        MoveFileOperation::Copy => std::fs::copy(source, destination).map(|_| ()),
    };

    result.map_err(|error| CommitError::MoveOrCopy {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(config_dir: &Path) -> Config {
        Config::load_from(&config_dir.join("config"), config_dir).unwrap()
    }

    fn request<'a>(source: &'a Path, destination: PathBuf) -> CommitRequest<'a> {
        CommitRequest {
            source,
            destination,
            template_id: Some("docs".to_string()),
            template_name: Some("Docs".to_string()),
            category: "Reports".to_string(),
            title: "Q1 Sales Report".to_string(),
            tags: vec!["finance".to_string()],
            summary: "summary".to_string(),
            ai_provider: "openai".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_prompt: "prompt".to_string(),
            ai_response: r#"{"title":"Q1 Sales Report"}"#.to_string(),
        }
    }

    #[test]
    fn commit_moves_file_and_writes_backup() {
        let root = tempdir().unwrap();
        let cfg_dir = root.path().join("cfg");
        let config = config(&cfg_dir);
        let catalog = Catalog::open_in_memory().unwrap();

        let source = root.path().join("incoming.txt");
        std::fs::write(&source, "hello").unwrap();
        let destination = root.path().join("Documents").join("reports").join("q1.txt");

        let result = commit(&config, &catalog, ConflictPolicy::AutoRename, request(&source, destination.clone())).unwrap();

        assert!(!source.exists());
        assert!(result.final_path.exists());
        assert_eq!(result.final_path, destination);
        assert_eq!(result.organized_file.version, 1);
        assert!(result.organized_file.backup_path.unwrap().exists());

        // A successful commit leaves no trace in the WAL directory: the
        // journal is discarded once both filesystem steps complete.
        let wal_dir = cfg_dir.join("wal");
        let remaining = std::fs::read_dir(&wal_dir)
            .map(|entries| entries.filter_map(Result::ok).filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false)).count())
            .unwrap_or(0);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn auto_rename_avoids_overwriting_existing_destination() {
        let root = tempdir().unwrap();
        let cfg_dir = root.path().join("cfg");
        let config = config(&cfg_dir);
        let catalog = Catalog::open_in_memory().unwrap();

        let destination = root.path().join("Documents").join("q1.txt");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, "existing").unwrap();

        let source = root.path().join("incoming.txt");
        std::fs::write(&source, "new content").unwrap();

        let result = commit(&config, &catalog, ConflictPolicy::AutoRename, request(&source, destination.clone())).unwrap();

        assert_ne!(result.final_path, destination);
        assert_eq!(result.final_path.file_name().unwrap().to_string_lossy(), "q1 (2).txt");
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "existing");
    }

    #[test]
    fn fail_policy_rejects_existing_destination() {
        let root = tempdir().unwrap();
        let cfg_dir = root.path().join("cfg");
        let config = config(&cfg_dir);
        let catalog = Catalog::open_in_memory().unwrap();

        let destination = root.path().join("Documents").join("q1.txt");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, "existing").unwrap();

        let source = root.path().join("incoming.txt");
        std::fs::write(&source, "new content").unwrap();

        let err = commit(&config, &catalog, ConflictPolicy::Fail, request(&source, destination)).unwrap_err();
        assert!(matches!(err, OrganizeError::Commit(CommitError::DestinationExists { .. })));
    }

    #[test]
    fn protected_destination_is_rejected() {
        let root = tempdir().unwrap();
        let cfg_dir = root.path().join("cfg");
        let config = config(&cfg_dir);
        let catalog = Catalog::open_in_memory().unwrap();

        let source = root.path().join("incoming.txt");
        std::fs::write(&source, "hello").unwrap();

        let err = commit(&config, &catalog, ConflictPolicy::AutoRename, request(&source, PathBuf::from("/etc/passwd"))).unwrap_err();
        assert!(matches!(err, OrganizeError::Commit(CommitError::ProtectedPath { .. })));
    }
}
