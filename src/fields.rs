//! Field Registry: `<CONFIG_DIR>/fields.json` (spec.md §6), the per-mime-
//! category field vocabulary (`music_artist`, `picture_date_taken`, ...)
//! the Organization Pipeline asks the model to extract alongside the core
//! `AnalysisResult` fields.
//!
//! Authoring `fields.json` is the setup wizard's job (out of core scope);
//! the core only reads it, the way `TemplateRegistry::load` reads
//! `templates.json` — an absent file is an empty registry, not an error.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TemplateResolveError;
use crate::extractor::MimeCategory;

/// One extra field the model should populate for files of a given
/// category, e.g. `{"name": "music_artist", "description": "the
/// recording artist"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Field definitions keyed by `MimeCategory::as_str()`. Read-only: there
/// is no core operation that writes `fields.json`.
pub struct FieldRegistry {
    by_category: HashMap<String, Vec<FieldDefinition>>,
}

impl FieldRegistry {
    /// No extra fields for any category — the default for a pipeline that
    /// never attaches a loaded `fields.json`.
    pub fn empty() -> Self {
        Self {
            by_category: HashMap::new(),
        }
    }

    /// Load `<CONFIG_DIR>/fields.json`. An absent or empty file yields a
    /// registry with no extra fields for any category, so prompt
    /// composition degrades to the core placeholder vocabulary alone.
    pub fn load(path: &Path) -> Result<Self, TemplateResolveError> {
        let by_category = if path.exists() {
            let text = fs::read_to_string(path)?;
            if text.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            HashMap::new()
        };
        Ok(Self { by_category })
    }

    pub fn fields_for(&self, category: MimeCategory) -> &[FieldDefinition] {
        self.by_category.get(category.as_str()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Renders the `{additionalPrompts}` instruction for `category`: an
    /// empty string when no extra fields are defined for it (the common
    /// case while `fields.json` is absent), otherwise an instruction
    /// listing each field name and its description.
    pub fn prompt_instruction(&self, category: MimeCategory) -> String {
        let fields = self.fields_for(category);
        if fields.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = fields
            .iter()
            .map(|f| {
                if f.description.is_empty() {
                    format!("- {}", f.name)
                } else {
                    format!("- {}: {}", f.name, f.description)
                }
            })
            .collect();
        format!(
            "Also extract the following fields for this file type, if applicable:\n{}",
            lines.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absent_file_yields_empty_registry() {
        let dir = tempdir().unwrap();
        let registry = FieldRegistry::load(&dir.path().join("fields.json")).unwrap();
        assert!(registry.fields_for(MimeCategory::Music).is_empty());
        assert_eq!(registry.prompt_instruction(MimeCategory::Music), "");
    }

    #[test]
    fn loads_fields_for_a_category_and_composes_instruction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.json");
        fs::write(
            &path,
            r#"{"Music": [{"name": "music_artist", "description": "the recording artist"}]}"#,
        )
        .unwrap();

        let registry = FieldRegistry::load(&path).unwrap();
        let fields = registry.fields_for(MimeCategory::Music);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "music_artist");

        let instruction = registry.prompt_instruction(MimeCategory::Music);
        assert!(instruction.contains("music_artist"));
        assert!(instruction.contains("the recording artist"));

        assert_eq!(registry.prompt_instruction(MimeCategory::Pictures), "");
    }
}
