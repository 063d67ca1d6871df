//! Template Registry: loads, validates, and persists user templates.
//!
//! Grounded on the teacher's `history/store.rs::atomic_write` (temp file +
//! `sync_all` + rename) for the single-document persistence discipline of
//! spec.md §4.5, generalized from history's per-folder JSON documents to
//! a single `templates.json` array.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TemplateResolveError;
use crate::template::case::FileNameCase;

/// A user-authored rule describing where a class of files should live and
/// how they should be named (spec.md §3 `Template`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_path: String,
    pub naming_structure: String,
    pub file_name_case: FileNameCase,
    #[serde(default)]
    pub folder_structure: Option<Vec<String>>,
    #[serde(default)]
    pub enforce_template_structure: bool,
    #[serde(default)]
    pub watch_for_changes: bool,
    #[serde(default)]
    pub auto_organize: bool,
}

impl Template {
    /// Invariants from spec.md §3: `id` is a non-empty token,
    /// `namingStructure` contains at least one `{…}` placeholder.
    pub fn validate(&self) -> Result<(), TemplateResolveError> {
        if self.id.trim().is_empty() {
            return Err(TemplateResolveError::InvalidTemplate(
                "template id must be a non-empty token".to_string(),
            ));
        }
        if self.id.chars().any(|c| c.is_whitespace()) {
            return Err(TemplateResolveError::InvalidTemplate(format!(
                "template id {:?} must not contain whitespace",
                self.id
            )));
        }
        if !self.naming_structure.contains('{') || !self.naming_structure.contains('}') {
            return Err(TemplateResolveError::InvalidTemplate(format!(
                "template {} namingStructure must contain at least one {{placeholder}}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Loads, validates, persists user templates; all writes go through an
/// atomic document rewrite (write to a sibling temp path, then rename).
pub struct TemplateRegistry {
    path: PathBuf,
    templates: Vec<Template>,
}

impl TemplateRegistry {
    /// Load `<CONFIG_DIR>/templates.json`. An absent file is treated as
    /// an empty registry, not an error — the setup wizard (out of core
    /// scope) is what first populates it.
    pub fn load(path: &Path) -> Result<Self, TemplateResolveError> {
        let templates = if path.exists() {
            let text = fs::read_to_string(path)?;
            if text.trim().is_empty() {
                Vec::new()
            } else {
                let templates: Vec<Template> = serde_json::from_str(&text)?;
                for t in &templates {
                    t.validate()?;
                }
                templates
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            templates,
        })
    }

    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn add(&mut self, template: Template) -> Result<(), TemplateResolveError> {
        template.validate()?;
        if self.templates.iter().any(|t| t.id == template.id) {
            return Err(TemplateResolveError::InvalidTemplate(format!(
                "template id {} already exists",
                template.id
            )));
        }
        self.templates.push(template);
        self.persist()
    }

    pub fn update(&mut self, template: Template) -> Result<(), TemplateResolveError> {
        template.validate()?;
        let slot = self
            .templates
            .iter_mut()
            .find(|t| t.id == template.id)
            .ok_or_else(|| TemplateResolveError::TemplateNotFound(template.id.clone()))?;
        *slot = template;
        self.persist()
    }

    pub fn remove(&mut self, id: &str) -> Result<(), TemplateResolveError> {
        let before = self.templates.len();
        self.templates.retain(|t| t.id != id);
        if self.templates.len() == before {
            return Err(TemplateResolveError::TemplateNotFound(id.to_string()));
        }
        self.persist()
    }

    pub fn enable_watch(&mut self, id: &str) -> Result<(), TemplateResolveError> {
        self.set_watch(id, true)
    }

    pub fn disable_watch(&mut self, id: &str) -> Result<(), TemplateResolveError> {
        self.set_watch(id, false)
    }

    fn set_watch(&mut self, id: &str, enabled: bool) -> Result<(), TemplateResolveError> {
        let slot = self
            .templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TemplateResolveError::TemplateNotFound(id.to_string()))?;
        slot.watch_for_changes = enabled;
        self.persist()
    }

    /// Templates subscribed to the Watcher (spec.md §4.9 step 2).
    pub fn watched(&self) -> Vec<&Template> {
        self.templates.iter().filter(|t| t.watch_for_changes).collect()
    }

    /// Atomic document rewrite: write to a sibling temp path, `sync_all`,
    /// then rename over the live file. Grounded on
    /// `history/store.rs::atomic_write`.
    fn persist(&self) -> Result<(), TemplateResolveError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.templates)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(id: &str) -> Template {
        Template {
            id: id.to_string(),
            name: "Docs".to_string(),
            description: "".to_string(),
            base_path: "~/Documents".to_string(),
            naming_structure: "{file_category_1}/{file_title}".to_string(),
            file_name_case: FileNameCase::Snake,
            folder_structure: None,
            enforce_template_structure: false,
            watch_for_changes: false,
            auto_organize: false,
        }
    }

    #[test]
    fn add_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.json");
        let mut registry = TemplateRegistry::load(&path).unwrap();
        registry.add(sample("docs")).unwrap();

        let reloaded = TemplateRegistry::load(&path).unwrap();
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.get("docs").unwrap().name, "Docs");
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let mut t = sample("no-placeholder");
        t.naming_structure = "flat-filename".to_string();
        assert!(t.validate().is_err());
    }

    #[test]
    fn remove_missing_id_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.json");
        let mut registry = TemplateRegistry::load(&path).unwrap();
        assert!(registry.remove("nope").is_err());
    }

    #[test]
    fn enable_watch_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.json");
        let mut registry = TemplateRegistry::load(&path).unwrap();
        registry.add(sample("docs")).unwrap();
        registry.enable_watch("docs").unwrap();

        let reloaded = TemplateRegistry::load(&path).unwrap();
        assert!(reloaded.get("docs").unwrap().watch_for_changes);
    }
}
