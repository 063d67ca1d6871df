//! The File Catalog (spec.md §4.6): a persistent, versioned record of
//! every organized file plus a discovered-files index.
//!
//! Grounded on the teacher's only `rusqlite`-backed store,
//! `billing/usage.rs::UsageTracker`: a `Mutex<Connection>`,
//! `CREATE TABLE IF NOT EXISTS` schema setup on open, prepared
//! statements, `ON CONFLICT` upserts for counters. `updateFile`/insert-
//! version is one `conn.transaction()` per invariant P1.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::CatalogError;

/// `organizationStatus` of a `DiscoveredFile` row (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizationStatus {
    Organized,
    Unorganized,
}

impl OrganizationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Organized => "organized",
            Self::Unorganized => "unorganized",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "organized" {
            Self::Organized
        } else {
            Self::Unorganized
        }
    }
}

/// `OrganizedFile` catalog row (spec.md §3).
#[derive(Debug, Clone)]
pub struct OrganizedFile {
    pub id: String,
    pub original_path: PathBuf,
    pub current_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub original_name: String,
    pub current_name: String,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Fields needed to insert a new `OrganizedFile` (id/version/timestamps
/// are assigned by the catalog).
#[derive(Debug, Clone)]
pub struct NewOrganizedFile {
    pub original_path: PathBuf,
    pub current_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub original_name: String,
    pub current_name: String,
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

/// A mutation to apply to an existing `OrganizedFile`: every field the
/// human-editable catalog API (rename, re-tag, re-summarize) or the
/// re-analyze pipeline path may change. `None` leaves the field as-is.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub current_path: Option<PathBuf>,
    pub current_name: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub summary: Option<String>,
    pub ai_prompt: Option<String>,
    pub ai_response: Option<String>,
}

/// Append-only `FileVersion` snapshot row (spec.md §3).
#[derive(Debug, Clone)]
pub struct FileVersion {
    pub id: String,
    pub file_id: String,
    pub version: i64,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub path: PathBuf,
    pub name: String,
    pub ai_prompt: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

/// `DiscoveredFile` index row (spec.md §3): "a file the system has
/// seen", distinct from `OrganizedFile`.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub file_path: PathBuf,
    pub file_name: String,
    pub organization_status: OrganizationStatus,
    pub file_size: Option<u64>,
    pub file_modified: Option<DateTime<Utc>>,
    pub template_id: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDiscoveredFile {
    pub file_path: PathBuf,
    pub file_name: String,
    pub organization_status: OrganizationStatus,
    pub file_size: Option<u64>,
    pub file_modified: Option<DateTime<Utc>>,
    pub template_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveredStats {
    pub total: i64,
    pub organized: i64,
    pub unorganized: i64,
}

/// Persistent store of organized files, their versions, and discovered
/// files, backed by a single embedded SQLite database file.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                original_path TEXT NOT NULL,
                current_path TEXT NOT NULL,
                backup_path TEXT,
                original_name TEXT NOT NULL,
                current_name TEXT NOT NULL,
                template_id TEXT,
                template_name TEXT,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                tags_json TEXT NOT NULL,
                summary TEXT NOT NULL,
                ai_provider TEXT NOT NULL,
                ai_model TEXT NOT NULL,
                ai_prompt TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_files_current_path ON files(current_path);
            CREATE INDEX IF NOT EXISTS idx_files_original_path ON files(original_path);

            CREATE TABLE IF NOT EXISTS file_versions (
                id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                tags_json TEXT NOT NULL,
                summary TEXT NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                ai_prompt TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_file_versions_file_id ON file_versions(file_id);

            CREATE TABLE IF NOT EXISTS discovered_files (
                file_path TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                organization_status TEXT NOT NULL,
                file_size INTEGER,
                file_modified TEXT,
                template_id TEXT,
                discovered_at TEXT NOT NULL,
                last_checked TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_discovered_status ON discovered_files(organization_status);
            "#,
        )?;
        Ok(())
    }

    /// Insert a new `OrganizedFile` and its initial `FileVersion` (version
    /// 1) in a single transaction (spec.md invariant P1, P5).
    pub fn insert_file(&self, new: NewOrganizedFile) -> Result<OrganizedFile, CatalogError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let tags_json = serde_json::to_string(&new.tags)?;

        tx.execute(
            "INSERT INTO files (id, original_path, current_path, backup_path, original_name,
                current_name, template_id, template_name, category, title, tags_json, summary,
                ai_provider, ai_model, ai_prompt, ai_response, created_at, updated_at, version)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,1)",
            params![
                id,
                path_str(&new.original_path),
                path_str(&new.current_path),
                new.backup_path.as_ref().map(|p| path_str(p)),
                new.original_name,
                new.current_name,
                new.template_id,
                new.template_name,
                new.category,
                new.title,
                tags_json,
                new.summary,
                new.ai_provider,
                new.ai_model,
                new.ai_prompt,
                new.ai_response,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "INSERT INTO file_versions (id, file_id, version, title, category, tags_json, summary,
                path, name, ai_prompt, ai_response, created_at)
             VALUES (?1,?2,1,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                Uuid::new_v4().to_string(),
                id,
                new.title,
                new.category,
                serde_json::to_string(&new.tags)?,
                new.summary,
                path_str(&new.current_path),
                new.current_name,
                new.ai_prompt,
                new.ai_response,
                now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        Ok(OrganizedFile {
            id,
            original_path: new.original_path,
            current_path: new.current_path,
            backup_path: new.backup_path,
            original_name: new.original_name,
            current_name: new.current_name,
            template_id: new.template_id,
            template_name: new.template_name,
            category: new.category,
            title: new.title,
            tags: new.tags,
            summary: new.summary,
            ai_provider: new.ai_provider,
            ai_model: new.ai_model,
            ai_prompt: new.ai_prompt,
            ai_response: new.ai_response,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// Apply `update` to an existing file: increments `version`, inserts
    /// a `FileVersion` row — all in a single transaction (spec.md §4.6,
    /// invariant P1).
    pub fn update_file(&self, id: &str, update: FileUpdate) -> Result<OrganizedFile, CatalogError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut current = Self::fetch_file(&tx, id)?.ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        if let Some(path) = update.current_path {
            current.current_path = path;
        }
        if let Some(name) = update.current_name {
            current.current_name = name;
        }
        if let Some(category) = update.category {
            current.category = category;
        }
        if let Some(title) = update.title {
            current.title = title;
        }
        if let Some(tags) = update.tags {
            current.tags = tags;
        }
        if let Some(summary) = update.summary {
            current.summary = summary;
        }
        if let Some(prompt) = update.ai_prompt {
            current.ai_prompt = prompt;
        }
        if let Some(response) = update.ai_response {
            current.ai_response = response;
        }
        current.version += 1;
        current.updated_at = Utc::now();

        let tags_json = serde_json::to_string(&current.tags)?;
        tx.execute(
            "UPDATE files SET current_path=?1, current_name=?2, category=?3, title=?4,
                tags_json=?5, summary=?6, ai_prompt=?7, ai_response=?8, updated_at=?9, version=?10
             WHERE id=?11",
            params![
                path_str(&current.current_path),
                current.current_name,
                current.category,
                current.title,
                tags_json,
                current.summary,
                current.ai_prompt,
                current.ai_response,
                current.updated_at.to_rfc3339(),
                current.version,
                id,
            ],
        )?;

        tx.execute(
            "INSERT INTO file_versions (id, file_id, version, title, category, tags_json, summary,
                path, name, ai_prompt, ai_response, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                Uuid::new_v4().to_string(),
                id,
                current.version,
                current.title,
                current.category,
                tags_json,
                current.summary,
                path_str(&current.current_path),
                current.current_name,
                current.ai_prompt,
                current.ai_response,
                current.updated_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(current)
    }

    pub fn get_file_by_id(&self, id: &str) -> Result<Option<OrganizedFile>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_file(&conn, id)
    }

    pub fn get_file_by_path(&self, path: &Path) -> Result<Option<OrganizedFile>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM files WHERE current_path = ?1",
                params![path_str(path)],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Self::fetch_file(&conn, &id),
            None => Ok(None),
        }
    }

    pub fn list_files(&self, limit: usize) -> Result<Vec<OrganizedFile>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, original_path, current_path, backup_path, original_name, current_name,
                template_id, template_name, category, title, tags_json, summary, ai_provider,
                ai_model, ai_prompt, ai_response, created_at, updated_at, version
             FROM files ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_file)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CatalogError::from)
    }

    /// Case-insensitive `LIKE` search over `title`, `category`,
    /// `tags_json`, `currentPath` (spec.md §4.6).
    pub fn search(&self, query: &str) -> Result<Vec<OrganizedFile>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare(
            "SELECT id, original_path, current_path, backup_path, original_name, current_name,
                template_id, template_name, category, title, tags_json, summary, ai_provider,
                ai_model, ai_prompt, ai_response, created_at, updated_at, version
             FROM files
             WHERE lower(title) LIKE ?1 OR lower(category) LIKE ?1 OR lower(tags_json) LIKE ?1
                OR lower(current_path) LIKE ?1
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![pattern], row_to_file)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CatalogError::from)
    }

    pub fn get_versions(&self, file_id: &str) -> Result<Vec<FileVersion>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, version, title, category, tags_json, summary, path, name,
                ai_prompt, ai_response, created_at
             FROM file_versions WHERE file_id = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![file_id], |row| {
            let tags_json: String = row.get(5)?;
            Ok(FileVersion {
                id: row.get(0)?,
                file_id: row.get(1)?,
                version: row.get(2)?,
                title: row.get(3)?,
                category: row.get(4)?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                summary: row.get(6)?,
                path: PathBuf::from(row.get::<_, String>(7)?),
                name: row.get(8)?,
                ai_prompt: row.get(9)?,
                ai_response: row.get(10)?,
                created_at: parse_dt(&row.get::<_, String>(11)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CatalogError::from)
    }

    /// Cascades to `file_versions` (spec.md §4.6).
    pub fn delete_file(&self, id: &str) -> Result<(), CatalogError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM file_versions WHERE file_id = ?1", params![id])?;
        tx.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn record_discovered(&self, new: NewDiscoveredFile) -> Result<(), CatalogError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO discovered_files (file_path, file_name, organization_status, file_size,
                file_modified, template_id, discovered_at, last_checked)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
             ON CONFLICT(file_path) DO UPDATE SET
                organization_status=excluded.organization_status,
                file_size=excluded.file_size,
                file_modified=excluded.file_modified,
                template_id=excluded.template_id,
                last_checked=excluded.last_checked",
            params![
                path_str(&new.file_path),
                new.file_name,
                new.organization_status.as_str(),
                new.file_size.map(|s| s as i64),
                new.file_modified.map(|d| d.to_rfc3339()),
                new.template_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_discovered_status(&self, path: &Path, status: OrganizationStatus) -> Result<(), CatalogError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE discovered_files SET organization_status = ?1, last_checked = ?2 WHERE file_path = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), path_str(path)],
        )?;
        Ok(())
    }

    pub fn remove_discovered(&self, path: &Path) -> Result<(), CatalogError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM discovered_files WHERE file_path = ?1", params![path_str(path)])?;
        Ok(())
    }

    pub fn discovered_by_status(&self, status: OrganizationStatus, limit: usize) -> Result<Vec<DiscoveredFile>, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT file_path, file_name, organization_status, file_size, file_modified,
                template_id, discovered_at, last_checked
             FROM discovered_files WHERE organization_status = ?1
             ORDER BY discovered_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![status.as_str(), limit as i64], row_to_discovered)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(CatalogError::from)
    }

    pub fn get_discovered_stats(&self) -> Result<DiscoveredStats, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let (organized, unorganized): (i64, i64) = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM discovered_files WHERE organization_status = 'organized'),
                (SELECT COUNT(*) FROM discovered_files WHERE organization_status = 'unorganized')",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DiscoveredStats {
            total: organized + unorganized,
            organized,
            unorganized,
        })
    }

    fn fetch_file(conn: &Connection, id: &str) -> Result<Option<OrganizedFile>, CatalogError> {
        conn.query_row(
            "SELECT id, original_path, current_path, backup_path, original_name, current_name,
                template_id, template_name, category, title, tags_json, summary, ai_provider,
                ai_model, ai_prompt, ai_response, created_at, updated_at, version
             FROM files WHERE id = ?1",
            params![id],
            row_to_file,
        )
        .optional()
        .map_err(CatalogError::from)
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<OrganizedFile> {
    let tags_json: String = row.get(10)?;
    Ok(OrganizedFile {
        id: row.get(0)?,
        original_path: PathBuf::from(row.get::<_, String>(1)?),
        current_path: PathBuf::from(row.get::<_, String>(2)?),
        backup_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        original_name: row.get(4)?,
        current_name: row.get(5)?,
        template_id: row.get(6)?,
        template_name: row.get(7)?,
        category: row.get(8)?,
        title: row.get(9)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        summary: row.get(11)?,
        ai_provider: row.get(12)?,
        ai_model: row.get(13)?,
        ai_prompt: row.get(14)?,
        ai_response: row.get(15)?,
        created_at: parse_dt(&row.get::<_, String>(16)?),
        updated_at: parse_dt(&row.get::<_, String>(17)?),
        version: row.get(18)?,
    })
}

fn row_to_discovered(row: &rusqlite::Row) -> rusqlite::Result<DiscoveredFile> {
    Ok(DiscoveredFile {
        file_path: PathBuf::from(row.get::<_, String>(0)?),
        file_name: row.get(1)?,
        organization_status: OrganizationStatus::parse(&row.get::<_, String>(2)?),
        file_size: row.get::<_, Option<i64>>(3)?.map(|s| s as u64),
        file_modified: row.get::<_, Option<String>>(4)?.map(|s| parse_dt(&s)),
        template_id: row.get(5)?,
        discovered_at: parse_dt(&row.get::<_, String>(6)?),
        last_checked: parse_dt(&row.get::<_, String>(7)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewOrganizedFile {
        NewOrganizedFile {
            original_path: PathBuf::from("/tmp/report.txt"),
            current_path: PathBuf::from("/home/user/Documents/reports/q1.txt"),
            backup_path: Some(PathBuf::from("/cfg/backups/report.txt.backup.1")),
            original_name: "report.txt".to_string(),
            current_name: "q1.txt".to_string(),
            template_id: Some("docs".to_string()),
            template_name: Some("Docs".to_string()),
            category: "Reports".to_string(),
            title: "Q1 Sales Report".to_string(),
            tags: vec!["finance".to_string(), "quarterly".to_string()],
            summary: "Quarterly sales summary".to_string(),
            ai_provider: "openai".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_prompt: "prompt text".to_string(),
            ai_response: r#"{"title":"Q1 Sales Report"}"#.to_string(),
        }
    }

    #[test]
    fn insert_creates_one_version_row() {
        let catalog = Catalog::open_in_memory().unwrap();
        let file = catalog.insert_file(sample()).unwrap();
        assert_eq!(file.version, 1);
        let versions = catalog.get_versions(&file.id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
    }

    #[test]
    fn update_increments_version_and_appends_row() {
        let catalog = Catalog::open_in_memory().unwrap();
        let file = catalog.insert_file(sample()).unwrap();

        let updated = catalog
            .update_file(
                &file.id,
                FileUpdate {
                    title: Some("Q1 Sales Report (Final)".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "Q1 Sales Report (Final)");

        let versions = catalog.get_versions(&file.id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![1, 2]);
        // Original aiResponse of v1 is preserved.
        assert_eq!(versions[0].ai_response, sample().ai_response);
    }

    #[test]
    fn search_is_case_insensitive() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.insert_file(sample()).unwrap();
        let results = catalog.search("SALES").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn delete_cascades_to_versions() {
        let catalog = Catalog::open_in_memory().unwrap();
        let file = catalog.insert_file(sample()).unwrap();
        catalog.delete_file(&file.id).unwrap();
        assert!(catalog.get_file_by_id(&file.id).unwrap().is_none());
        assert!(catalog.get_versions(&file.id).unwrap().is_empty());
    }

    #[test]
    fn discovered_file_round_trip() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .record_discovered(NewDiscoveredFile {
                file_path: PathBuf::from("/tmp/report.txt"),
                file_name: "report.txt".to_string(),
                organization_status: OrganizationStatus::Unorganized,
                file_size: Some(1024),
                file_modified: None,
                template_id: None,
            })
            .unwrap();

        let stats = catalog.get_discovered_stats().unwrap();
        assert_eq!(stats.unorganized, 1);
        assert_eq!(stats.organized, 0);

        catalog
            .update_discovered_status(Path::new("/tmp/report.txt"), OrganizationStatus::Organized)
            .unwrap();
        let stats = catalog.get_discovered_stats().unwrap();
        assert_eq!(stats.organized, 1);
        assert_eq!(stats.unorganized, 0);
    }
}
