//! Metadata Sidecar (spec.md §4.8): marks files as organized so the
//! pipeline does not re-process them (spec.md R3, design note "Metadata
//! sidecar choice" — the sidecar marker IS the canonical "already
//! organized" signal; the Catalog is a supplementary index).
//!
//! No `xattr`-family crate exists anywhere in the corpus's dependency
//! graphs, so SPEC_FULL resolves the implementation choice (left open by
//! spec.md §4.8) as a parallel `<path>.sentinel-meta.json` sidecar file,
//! written with the same atomic-write discipline as
//! `history/store.rs::atomic_write` (temp file + `sync_all` + rename).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `{organizedAt, templateId?, fileId?}` (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarMetadata {
    pub organized_at: DateTime<Utc>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".sentinel-meta.json");
    PathBuf::from(s)
}

/// Durable, survives-process-restart "already organized" marker.
pub struct MetadataSidecar;

impl MetadataSidecar {
    /// Mark `path` as organized. Durable — the sidecar file is written
    /// with fsync + atomic rename so a crash mid-write never leaves a
    /// corrupt marker (spec.md §4.8 "mark is durable").
    pub fn mark(path: &Path, metadata: &SidecarMetadata) -> std::io::Result<()> {
        let sidecar = sidecar_path(path);
        let temp_path = sidecar.with_extension("json.tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, metadata)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp_path, &sidecar)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Option<SidecarMetadata> {
        let sidecar = sidecar_path(path);
        let text = fs::read_to_string(sidecar).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn has(path: &Path) -> bool {
        sidecar_path(path).exists()
    }

    /// Restores the apparent absence of the mark (spec.md §4.8).
    pub fn remove(path: &Path) -> std::io::Result<()> {
        let sidecar = sidecar_path(path);
        if sidecar.exists() {
            fs::remove_file(sidecar)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mark_then_has_then_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "content").unwrap();

        assert!(!MetadataSidecar::has(&path));

        MetadataSidecar::mark(
            &path,
            &SidecarMetadata {
                organized_at: Utc::now(),
                template_id: Some("docs".to_string()),
                file_id: Some("abc123".to_string()),
            },
        )
        .unwrap();

        assert!(MetadataSidecar::has(&path));
        let read = MetadataSidecar::read(&path).unwrap();
        assert_eq!(read.template_id.as_deref(), Some("docs"));

        MetadataSidecar::remove(&path).unwrap();
        assert!(!MetadataSidecar::has(&path));
    }

    #[test]
    fn read_on_unmarked_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("untouched.txt");
        std::fs::write(&path, "content").unwrap();
        assert!(MetadataSidecar::read(&path).is_none());
    }
}
