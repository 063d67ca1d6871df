//! `AnalysisResult` — the ephemeral record produced by the Organization
//! Pipeline and consumed by the Template Resolver (spec.md §3).
//!
//! Per the "dynamic field shape" design note (spec.md §9): a known
//! required core plus a typed map of optional domain-specific fields
//! (`music_artist`, `picture_date_taken`, `dateRelevant`, ...). The
//! resolver accesses fields by name and tolerates absence rather than
//! demanding a closed schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The structured record produced by the pipeline from an input file; the
/// bridge between the LLM and the template resolver. Lives only on the
/// call stack (spec.md §3 "Ownership & lifecycle") — never persisted
/// directly, only folded into `OrganizedFile.aiResponse`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    pub title: String,
    pub summary: String,
    pub category: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub suggested_path: Option<String>,
    #[serde(default)]
    pub suggested_filename: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub selected_template_id: Option<String>,
    #[serde(default)]
    pub template_confidence: Option<f64>,
    #[serde(default)]
    pub template_reasoning: Option<String>,
    #[serde(default)]
    pub selected_folder_path: Option<String>,
    #[serde(default)]
    pub folder_confidence: Option<f64>,
    #[serde(default)]
    pub folder_reasoning: Option<String>,
    /// Open-ended domain fields: `dateRelevant`, `people`, `locations`,
    /// `organizations`, `music_artist`, `picture_date_taken`, and any
    /// other per-type field the model returns. Referenced by name from
    /// `namingStructure` placeholders (spec.md §4.5).
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl AnalysisResult {
    /// Resolve a placeholder token's *inner name* (without braces) against
    /// the known core fields first, then the open-ended `fields` map.
    /// Returns `None` when the field is absent or null — the resolver
    /// elides the placeholder and its adjacent separator in that case.
    pub fn resolve_field(&self, name: &str) -> Option<String> {
        match name {
            "file_title" => non_empty(&self.title),
            "file_summary" => non_empty(&self.summary),
            "file_category_1" => non_empty(&self.category),
            "file_category_2" => self.subcategories.first().cloned(),
            "file_type" => self.file_type.clone(),
            "file_tags" => {
                if self.tags.is_empty() {
                    None
                } else {
                    Some(self.tags.join("-"))
                }
            }
            "file_date_created" => {
                Some(chrono::Utc::now().format("%Y-%m-%d").to_string())
            }
            _ => self.fields.get(name).and_then(value_to_string),
        }
    }

    /// Merge the accumulated `aiResponse` text this result should be
    /// recorded under: the verbatim final JSON this record was coerced
    /// from, set by the pipeline once coercion succeeds.
    pub fn title_or_fallback(&self, mime_category: &str) -> String {
        non_empty(&self.title).unwrap_or_else(|| mime_category.to_string())
    }

    pub fn category_or_fallback(&self, mime_category: &str) -> String {
        non_empty(&self.category).unwrap_or_else(|| mime_category.to_string())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let joined: Vec<String> = items.iter().filter_map(value_to_string).collect();
            if joined.is_empty() {
                None
            } else {
                Some(joined.join("-"))
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_core_fields() {
        let result = AnalysisResult {
            title: "Q1 Sales Report".to_string(),
            category: "Reports".to_string(),
            ..Default::default()
        };
        assert_eq!(result.resolve_field("file_title").as_deref(), Some("Q1 Sales Report"));
        assert_eq!(result.resolve_field("file_category_1").as_deref(), Some("Reports"));
    }

    #[test]
    fn resolves_open_ended_field() {
        let mut result = AnalysisResult::default();
        result
            .fields
            .insert("music_artist".to_string(), Value::String("Radiohead".to_string()));
        assert_eq!(result.resolve_field("music_artist").as_deref(), Some("Radiohead"));
    }

    #[test]
    fn missing_field_resolves_to_none() {
        let result = AnalysisResult::default();
        assert_eq!(result.resolve_field("picture_date_taken"), None);
    }

    #[test]
    fn fallback_uses_mime_category_when_title_blank() {
        let result = AnalysisResult::default();
        assert_eq!(result.title_or_fallback("Documents"), "Documents");
    }
}
