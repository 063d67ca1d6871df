//! The six Organization Pipeline sub-steps of spec.md §4.4 multi-call
//! mode, plus single-call mode and the simpler "basic" schema shared by
//! watch-mode/re-analyze (spec.md §9 Open Question: kept as two explicit
//! code paths, not unified).
//!
//! Each sub-step is a distinct Chat Provider call wrapped by the
//! `JsonCoercer`, grounded on `ai/grok/orchestrator.rs`'s staged prompt
//! construction (basic → categorize → ... ) generalized from Grok's
//! fixed pipeline into the schema-per-step shape spec.md describes.

use serde_json::Value;

use crate::coercer::{JsonCoercer, Schema};
use crate::error::{CoerceError, CoerceFailed, TemplateResolveError};
use crate::pipeline::analysis::AnalysisResult;
use crate::provider::ChatProvider;
use crate::template::registry::Template;

pub const BASIC_SCHEMA: Schema = Schema {
    name: "basic",
    required_string_fields: &["title", "summary"],
    required_array_fields: &[],
};

pub const CATEGORIZATION_SCHEMA: Schema = Schema {
    name: "categorization",
    required_string_fields: &["category"],
    required_array_fields: &[],
};

pub const METADATA_SCHEMA: Schema = Schema {
    name: "metadata",
    required_string_fields: &[],
    required_array_fields: &["tags"],
};

pub const ORGANIZATION_SCHEMA: Schema = Schema {
    name: "organization",
    required_string_fields: &[],
    required_array_fields: &[],
};

pub const TEMPLATE_SELECTION_SCHEMA: Schema = Schema {
    name: "template-selection",
    required_string_fields: &["selectedTemplateId"],
    required_array_fields: &[],
};

pub const FOLDER_SELECTION_SCHEMA: Schema = Schema {
    name: "folder-selection",
    required_string_fields: &["selectedFolderPath"],
    required_array_fields: &[],
};

pub const SINGLE_CALL_SCHEMA: Schema = Schema {
    name: "single-call",
    required_string_fields: &["title", "summary", "category"],
    required_array_fields: &[],
};

/// Shared by the watch daemon's auto-organize path and the re-analyze
/// operation (spec.md §9 Open Question).
pub const SIMPLE_SCHEMA: Schema = Schema {
    name: "simple",
    required_string_fields: &["title", "category", "summary"],
    required_array_fields: &[],
};

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn str_array_field(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Step 1: basic understanding → `{title, summary, mainTopic,
/// contentType}`.
pub async fn basic_understanding(
    provider: &dyn ChatProvider,
    prompt: &str,
) -> Result<AnalysisResult, CoerceError> {
    let coercer = JsonCoercer::default();
    let value = coercer.coerce(provider, prompt, &BASIC_SCHEMA).await?;

    let mut result = AnalysisResult {
        title: str_field(&value, "title").unwrap_or_default(),
        summary: str_field(&value, "summary").unwrap_or_default(),
        ..Default::default()
    };
    if let Some(main_topic) = str_field(&value, "mainTopic") {
        result.fields.insert("mainTopic".to_string(), Value::String(main_topic));
    }
    if let Some(content_type) = str_field(&value, "contentType") {
        result.fields.insert("contentType".to_string(), Value::String(content_type));
    }
    Ok(result)
}

/// Step 2: categorization (sees step 1) → `{category, subcategories,
/// fileType}`.
pub async fn categorize(
    provider: &dyn ChatProvider,
    prompt: &str,
    mut result: AnalysisResult,
) -> Result<AnalysisResult, CoerceError> {
    let coercer = JsonCoercer::default();
    let value = coercer.coerce(provider, prompt, &CATEGORIZATION_SCHEMA).await?;

    result.category = str_field(&value, "category").unwrap_or(result.category);
    result.subcategories = str_array_field(&value, "subcategories");
    result.file_type = str_field(&value, "fileType");
    Ok(result)
}

/// Step 3: metadata extraction (sees 1,2 + excerpt) → `{tags, keywords,
/// dateRelevant?, people?, locations?, organizations?}`.
pub async fn extract_metadata(
    provider: &dyn ChatProvider,
    prompt: &str,
    mut result: AnalysisResult,
) -> Result<AnalysisResult, CoerceError> {
    let coercer = JsonCoercer::default();
    let value = coercer.coerce(provider, prompt, &METADATA_SCHEMA).await?;

    result.tags = str_array_field(&value, "tags");
    result.keywords = str_array_field(&value, "keywords");
    for key in ["dateRelevant", "people", "locations", "organizations"] {
        if let Some(v) = value.get(key) {
            if !v.is_null() {
                result.fields.insert(key.to_string(), v.clone());
            }
        }
    }
    Ok(result)
}

/// Step 4: organization recommendation (sees 1,2,3) → `{suggestedPath,
/// suggestedFilename, priority, confidence}`.
pub async fn recommend_organization(
    provider: &dyn ChatProvider,
    prompt: &str,
    mut result: AnalysisResult,
) -> Result<AnalysisResult, CoerceError> {
    let coercer = JsonCoercer::default();
    let value = coercer.coerce(provider, prompt, &ORGANIZATION_SCHEMA).await?;

    result.suggested_path = str_field(&value, "suggestedPath");
    result.suggested_filename = str_field(&value, "suggestedFilename");
    result.confidence = value.get("confidence").and_then(|v| v.as_f64());
    if let Some(priority) = str_field(&value, "priority") {
        result.fields.insert("priority".to_string(), Value::String(priority));
    }
    Ok(result)
}

/// Step 5: template selection (sees 1–4 + registry list) →
/// `{selectedTemplateId, templateConfidence, templateReasoning}`.
/// Skipped if no templates exist. The coercer MUST reject selections
/// whose id is not in the provided list (spec.md §4.4).
pub async fn select_template(
    provider: &dyn ChatProvider,
    prompt: &str,
    templates: &[Template],
    mut result: AnalysisResult,
) -> Result<AnalysisResult, CoerceError> {
    if templates.is_empty() {
        return Ok(result);
    }

    let allowed: Vec<String> = templates.iter().map(|t| t.id.clone()).collect();
    let semantic_check: crate::coercer::SemanticCheck = Box::new(move |value: &Value| {
        let selected = value
            .get("selectedTemplateId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "selectedTemplateId missing".to_string())?;
        if allowed.iter().any(|id| id == selected) {
            Ok(())
        } else {
            Err(format!("selectedTemplateId {:?} is not one of the known template ids", selected))
        }
    });

    let coercer = JsonCoercer::default().with_semantic_check(semantic_check);
    let value = coercer.coerce(provider, prompt, &TEMPLATE_SELECTION_SCHEMA).await?;

    result.selected_template_id = str_field(&value, "selectedTemplateId");
    result.template_confidence = value.get("templateConfidence").and_then(|v| v.as_f64());
    result.template_reasoning = str_field(&value, "templateReasoning");
    Ok(result)
}

/// Step 6: folder selection within the selected template (sees 1–5 +
/// its folder list) → `{selectedFolderPath, folderConfidence,
/// folderReasoning}`. Skipped if the selected template has no
/// `folderStructure`. When `enforceTemplateStructure` is true the
/// coercer MUST reject paths not present verbatim in the folder list
/// (spec.md §4.4).
pub async fn select_folder(
    provider: &dyn ChatProvider,
    prompt: &str,
    template: &Template,
    mut result: AnalysisResult,
) -> Result<AnalysisResult, CoerceError> {
    let folders = match &template.folder_structure {
        Some(folders) if !folders.is_empty() => folders.clone(),
        _ => return Ok(result),
    };

    let enforce = template.enforce_template_structure;
    let allowed = folders.clone();
    let semantic_check: crate::coercer::SemanticCheck = Box::new(move |value: &Value| {
        if !enforce {
            return Ok(());
        }
        let selected = value
            .get("selectedFolderPath")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "selectedFolderPath missing".to_string())?;
        if allowed.iter().any(|f| f == selected) {
            Ok(())
        } else {
            Err(format!(
                "selectedFolderPath {:?} is not one of the template's declared folders {:?}",
                selected, allowed
            ))
        }
    });

    let coercer = JsonCoercer::default().with_semantic_check(semantic_check);
    let value = coercer.coerce(provider, prompt, &FOLDER_SELECTION_SCHEMA).await?;

    result.selected_folder_path = str_field(&value, "selectedFolderPath");
    result.folder_confidence = value.get("folderConfidence").and_then(|v| v.as_f64());
    result.folder_reasoning = str_field(&value, "folderReasoning");
    Ok(result)
}

/// Single-call mode: one prompt requesting the full `AnalysisResult`;
/// one coercion pass (spec.md §4.4).
pub async fn single_call(
    provider: &dyn ChatProvider,
    prompt: &str,
) -> Result<AnalysisResult, CoerceError> {
    let coercer = JsonCoercer::default();
    let value = coercer.coerce(provider, prompt, &SINGLE_CALL_SCHEMA).await?;
    Ok(analysis_from_rich_value(&value))
}

/// Watch-mode / re-analyze's simpler schema: re-parses only
/// `title/category/tags/summary`, never the rich multi-call schema
/// (spec.md §9 Open Question).
pub async fn simple_call(
    provider: &dyn ChatProvider,
    prompt: &str,
) -> Result<AnalysisResult, CoerceError> {
    let coercer = JsonCoercer::default();
    let value = coercer.coerce(provider, prompt, &SIMPLE_SCHEMA).await?;
    Ok(AnalysisResult {
        title: str_field(&value, "title").unwrap_or_default(),
        category: str_field(&value, "category").unwrap_or_default(),
        summary: str_field(&value, "summary").unwrap_or_default(),
        tags: str_array_field(&value, "tags"),
        ..Default::default()
    })
}

fn analysis_from_rich_value(value: &Value) -> AnalysisResult {
    let mut result = AnalysisResult {
        title: str_field(value, "title").unwrap_or_default(),
        summary: str_field(value, "summary").unwrap_or_default(),
        category: str_field(value, "category").unwrap_or_default(),
        subcategories: str_array_field(value, "subcategories"),
        file_type: str_field(value, "fileType"),
        tags: str_array_field(value, "tags"),
        keywords: str_array_field(value, "keywords"),
        suggested_path: str_field(value, "suggestedPath"),
        suggested_filename: str_field(value, "suggestedFilename"),
        confidence: value.get("confidence").and_then(|v| v.as_f64()),
        selected_template_id: str_field(value, "selectedTemplateId"),
        selected_folder_path: str_field(value, "selectedFolderPath"),
        ..Default::default()
    };
    for key in ["dateRelevant", "people", "locations", "organizations"] {
        if let Some(v) = value.get(key) {
            if !v.is_null() {
                result.fields.insert(key.to_string(), v.clone());
            }
        }
    }
    result
}

/// Resolve `CoerceFailed` at the top edge into the taxonomy's
/// `TemplateResolveFailed` when it originated from a selection step's
/// semantic check, matching spec.md §7's boundary (B2: after the
/// attempt budget, a `TemplateResolveFailed` at the top edge).
pub fn coerce_failure_is_selection_rejection(failed: &CoerceFailed) -> bool {
    failed
        .attempts
        .last()
        .map(|a| a.error.contains("is not one of"))
        .unwrap_or(false)
}

impl From<&CoerceFailed> for TemplateResolveError {
    fn from(failed: &CoerceFailed) -> Self {
        TemplateResolveError::InvalidTemplate(format!(
            "selection rejected after {} attempts: {}",
            failed.attempts.len(),
            failed.attempts.last().map(|a| a.error.clone()).unwrap_or_default()
        ))
    }
}
