//! Organization Pipeline: the end-to-end operation that turns one file
//! into a committed, cataloged result — extract content, run the
//! configured analysis mode, resolve a template path, then hand off to
//! the commit stage.

pub mod analysis;
pub mod commit;
mod diagnostics;
pub mod prompts;
pub mod steps;

use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;

pub use analysis::AnalysisResult;
pub use commit::{ConflictPolicy};
use commit::{commit as commit_file, CommitRequest, CommitResult};

use crate::catalog::{Catalog, FileUpdate, OrganizedFile};
use crate::config::{Config, PipelineMode};
use crate::error::{CatalogError, CoerceError, OrganizeError, TemplateResolveError};
use crate::extractor::{ContentExtractor, ExtractedContent};
use crate::fields::FieldRegistry;
use crate::provider::{ChatProvider, HttpChatProvider};
use crate::sidecar::MetadataSidecar;
use crate::template::registry::{Template, TemplateRegistry};
use crate::template::resolver::{resolve_path, with_extension};

/// Ties together the Chat Provider, Content Extractor, and Catalog for
/// one configured process. Holds no per-file state; every operation
/// takes the file path (and, where relevant, the Template Registry or a
/// single already-matched `Template`) as arguments.
pub struct OrganizationPipeline {
    config: Config,
    provider: Box<dyn ChatProvider>,
    extractor: ContentExtractor,
    catalog: Catalog,
    fields: FieldRegistry,
}

impl OrganizationPipeline {
    pub fn new(config: Config, catalog: Catalog) -> Self {
        let provider: Box<dyn ChatProvider> = Box::new(HttpChatProvider::new(&config));
        let extractor = ContentExtractor::new(config.max_content_words);
        Self {
            config,
            provider,
            extractor,
            catalog,
            fields: FieldRegistry::empty(),
        }
    }

    /// Construction seam for tests and alternative transports: the
    /// provider is supplied rather than built from `config`.
    pub fn with_provider(config: Config, catalog: Catalog, provider: Box<dyn ChatProvider>) -> Self {
        let extractor = ContentExtractor::new(config.max_content_words);
        Self {
            config,
            provider,
            extractor,
            catalog,
            fields: FieldRegistry::empty(),
        }
    }

    /// Attach a loaded `fields.json` so prompt composition asks the model
    /// for the per-mime-category fields it defines (spec.md §6), in
    /// addition to the core `AnalysisResult` fields. Omit to fall back to
    /// the core vocabulary alone, the way an empty `fields.json` would.
    pub fn with_fields(mut self, fields: FieldRegistry) -> Self {
        self.fields = fields;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// A file already carrying a Metadata Sidecar mark is never
    /// re-processed (property R3) — checked before any provider call is
    /// made, so a re-run over an already-organized tree costs nothing.
    pub fn already_organized(path: &Path) -> bool {
        MetadataSidecar::has(path)
    }

    /// CoerceFailed is per-file fatal (spec.md §7): dump the full attempt
    /// history to `last-error.log` before the error propagates. Best
    /// effort — a logging failure here is itself only logged, never
    /// substituted for the real error.
    fn record_if_coerce_failed(&self, path: &Path, error: &OrganizeError) {
        if let OrganizeError::Coerce(failed) = error {
            if let Err(io_error) = diagnostics::write_last_error_log(&self.config.config_dir_path(), path, failed) {
                tracing::warn!(path = %path.display(), error = %io_error, "failed to write last-error.log");
            }
        }
    }

    /// Full organize operation against the whole Template Registry: runs
    /// single-call or multi-call analysis per `PIPELINE_MODE`, lets the
    /// model choose the template (and, where enforced, the folder), then
    /// commits. Returns `Ok(None)` when the file was already organized.
    pub async fn organize(
        &self,
        path: &Path,
        registry: &TemplateRegistry,
        conflict_policy: ConflictPolicy,
    ) -> Result<Option<CommitResult>, OrganizeError> {
        if Self::already_organized(path) {
            return Ok(None);
        }

        let deadline = Duration::from_secs(self.config.organization_timeout_secs);
        let result = async {
            let (analysis, template) = timeout(deadline, self.run_analysis(path, registry))
                .await
                .map_err(|_| OrganizeError::Cancelled)??;
            self.finish_commit(path, &template, analysis, conflict_policy).await
        }
        .await;

        if let Err(ref error) = result {
            self.record_if_coerce_failed(path, error);
        }
        result
    }

    /// Watch daemon's auto-organize path: the template is already known
    /// (the Watcher only fires for a subscribed template's base path),
    /// so only the simpler schema is used — no template-selection step
    /// (spec.md §9 Open Question: kept as a separate, simpler code path
    /// rather than unified with multi-call mode).
    pub async fn watch_mode_organize(
        &self,
        path: &Path,
        template: &Template,
        conflict_policy: ConflictPolicy,
    ) -> Result<Option<CommitResult>, OrganizeError> {
        if Self::already_organized(path) {
            return Ok(None);
        }

        let deadline = Duration::from_secs(self.config.organization_timeout_secs);
        let result = async {
            let analysis = timeout(deadline, self.run_watch_analysis(path, template))
                .await
                .map_err(|_| OrganizeError::Cancelled)??;
            self.finish_commit(path, template, analysis, conflict_policy).await
        }
        .await;

        if let Err(ref error) = result {
            self.record_if_coerce_failed(path, error);
        }
        result
    }

    /// Re-analyze an already-cataloged file in place: re-extracts its
    /// current content, re-runs the simple schema, and records a new
    /// `FileVersion` without moving the file.
    pub async fn reanalyze(&self, file_id: &str) -> Result<OrganizedFile, OrganizeError> {
        let existing = self
            .catalog
            .get_file_by_id(file_id)?
            .ok_or_else(|| CatalogError::NotFound(file_id.to_string()))?;

        let content = self
            .extractor
            .extract(&existing.current_path, Some(self.provider.as_ref()), &prompts::image_caption_prompt(&self.config))
            .await?;
        let additional = self.fields.prompt_instruction(content.mime_category);
        let prompt = prompts::reanalyze_prompt(&self.config, &content, &additional);
        let analysis = match steps::simple_call(self.provider.as_ref(), &prompt).await {
            Ok(analysis) => analysis,
            Err(error) => {
                let error = OrganizeError::from(error);
                self.record_if_coerce_failed(&existing.current_path, &error);
                return Err(error);
            }
        };

        let update = FileUpdate {
            category: Some(analysis.category.clone()),
            title: Some(analysis.title.clone()),
            tags: Some(analysis.tags.clone()),
            summary: Some(analysis.summary.clone()),
            ai_response: Some(serde_json::to_string(&analysis).unwrap_or_default()),
            ..Default::default()
        };
        Ok(self.catalog.update_file(file_id, update)?)
    }

    async fn run_analysis(
        &self,
        path: &Path,
        registry: &TemplateRegistry,
    ) -> Result<(AnalysisResult, Template), OrganizeError> {
        let content = self
            .extractor
            .extract(path, Some(self.provider.as_ref()), &prompts::image_caption_prompt(&self.config))
            .await?;

        let additional = self.fields.prompt_instruction(content.mime_category);
        let analysis = match self.config.pipeline_mode {
            PipelineMode::SingleCall => {
                let prompt = prompts::organization_prompt(&self.config, &content, &additional);
                steps::single_call(self.provider.as_ref(), &prompt).await?
            }
            PipelineMode::MultiCall => self.run_multi_call(&content, &additional, registry).await?,
        };

        let template_id = analysis.selected_template_id.clone().ok_or_else(|| {
            OrganizeError::TemplateResolve(TemplateResolveError::TemplateNotFound("<no template selected>".to_string()))
        })?;
        let template = registry
            .get(&template_id)
            .cloned()
            .ok_or_else(|| OrganizeError::TemplateResolve(TemplateResolveError::TemplateNotFound(template_id.clone())))?;

        let analysis = if template.enforce_template_structure
            && template.folder_structure.is_some()
            && analysis.selected_folder_path.is_none()
        {
            let prompt = Self::folder_prompt(&content, &analysis, &template);
            steps::select_folder(self.provider.as_ref(), &prompt, &template, analysis)
                .await
                .map_err(Self::selection_error)?
        } else {
            analysis
        };

        Ok((analysis, template))
    }

    /// Per spec.md §4.4/§7 boundary B2: a selection step's coercer
    /// exhausting its attempt budget on a semantic-check rejection
    /// (unknown template id, disallowed folder path) surfaces as
    /// `TemplateResolveFailed` at the top edge rather than a bare
    /// `CoerceFailed` — the attempt history is still a JSON-shape
    /// failure at every individual attempt, but the terminal condition
    /// is "the model never picked an allowed value", not "the model
    /// never produced valid JSON". A provider-level failure keeps its
    /// own `ProviderError` kind rather than being treated as a rejection.
    fn selection_error(error: CoerceError) -> OrganizeError {
        match error {
            CoerceError::Provider(provider_error) => OrganizeError::Provider(provider_error),
            CoerceError::Failed(failed) => {
                if steps::coerce_failure_is_selection_rejection(&failed) {
                    OrganizeError::TemplateResolve(TemplateResolveError::from(&failed))
                } else {
                    OrganizeError::Coerce(failed)
                }
            }
        }
    }

    async fn run_multi_call(&self, content: &ExtractedContent, additional: &str, registry: &TemplateRegistry) -> Result<AnalysisResult, OrganizeError> {
        let base_prompt = prompts::organization_prompt(&self.config, content, additional);

        let basic_prompt = format!(
            "{}\n\nRespond with ONLY a JSON object containing title, summary, mainTopic, and contentType.",
            base_prompt
        );
        let basic = steps::basic_understanding(self.provider.as_ref(), &basic_prompt).await?;

        let categorize_prompt = Self::step_prompt(
            &base_prompt,
            "Categorize the file: category, subcategories, fileType.",
            &basic,
        );
        let categorized = steps::categorize(self.provider.as_ref(), &categorize_prompt, basic).await?;

        let metadata_prompt = Self::step_prompt(
            &base_prompt,
            "Extract tags, keywords, and any dates, people, locations, or organizations mentioned.",
            &categorized,
        );
        let with_metadata = steps::extract_metadata(self.provider.as_ref(), &metadata_prompt, categorized).await?;

        let organization_prompt = Self::step_prompt(
            &base_prompt,
            "Recommend a suggestedPath, suggestedFilename, and confidence for this file.",
            &with_metadata,
        );
        let with_recommendation = steps::recommend_organization(self.provider.as_ref(), &organization_prompt, with_metadata).await?;

        let templates = registry.list();
        if templates.is_empty() {
            return Ok(with_recommendation);
        }

        let template_list = templates
            .iter()
            .map(|t| format!("- {}: {}", t.id, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        let template_prompt = format!(
            "{}\n\nChoose the best-fit template id from the following list:\n{}",
            Self::step_prompt(&base_prompt, "Select the template this file belongs to.", &with_recommendation),
            template_list
        );
        steps::select_template(self.provider.as_ref(), &template_prompt, templates, with_recommendation)
            .await
            .map_err(Self::selection_error)
    }

    async fn run_watch_analysis(&self, path: &Path, template: &Template) -> Result<AnalysisResult, OrganizeError> {
        let content = self
            .extractor
            .extract(path, Some(self.provider.as_ref()), &prompts::image_caption_prompt(&self.config))
            .await?;
        let additional = self.fields.prompt_instruction(content.mime_category);
        let prompt = prompts::watch_mode_prompt(&self.config, &content, &additional);
        let analysis = steps::simple_call(self.provider.as_ref(), &prompt).await?;

        let analysis = if template.enforce_template_structure && template.folder_structure.is_some() {
            let folder_prompt = Self::folder_prompt(&content, &analysis, template);
            steps::select_folder(self.provider.as_ref(), &folder_prompt, template, analysis)
                .await
                .map_err(Self::selection_error)?
        } else {
            analysis
        };

        Ok(analysis)
    }

    async fn finish_commit(
        &self,
        path: &Path,
        template: &Template,
        analysis: AnalysisResult,
        conflict_policy: ConflictPolicy,
    ) -> Result<Option<CommitResult>, OrganizeError> {
        let extension = path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
        let resolved = resolve_path(template, &analysis)?;
        let destination = with_extension(&resolved, &extension);

        let request = CommitRequest {
            source: path,
            destination,
            template_id: Some(template.id.clone()),
            template_name: Some(template.name.clone()),
            category: analysis.category_or_fallback("Others"),
            title: analysis.title_or_fallback("Untitled"),
            tags: analysis.tags.clone(),
            summary: analysis.summary.clone(),
            ai_provider: self.provider.variant_name().to_string(),
            ai_model: self.config.model.clone(),
            ai_prompt: String::new(),
            ai_response: serde_json::to_string(&analysis).unwrap_or_default(),
        };

        let result = commit_file(&self.config, &self.catalog, conflict_policy, request)?;
        Ok(Some(result))
    }

    fn step_prompt(base_prompt: &str, instruction: &str, analysis: &AnalysisResult) -> String {
        let context = serde_json::to_string(analysis).unwrap_or_default();
        format!(
            "{}\n\n{}\n\nAnalysis so far:\n{}\n\nRespond with ONLY a JSON object matching the requested schema.",
            base_prompt, instruction, context
        )
    }

    fn folder_prompt(content: &ExtractedContent, analysis: &AnalysisResult, template: &Template) -> String {
        let folders = template.folder_structure.clone().unwrap_or_default().join("\n");
        format!(
            "File \"{}\" was assigned to template \"{}\" (id {}). Analysis so far:\n{}\n\n\
             Choose the best-fit folder path from this list:\n{}\n\n\
             Respond with ONLY a JSON object matching the requested schema.",
            content.original_name,
            template.name,
            template.id,
            serde_json::to_string(analysis).unwrap_or_default(),
            folders
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    use crate::error::ProviderError;
    use crate::template::case::FileNameCase;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn chat(&self, _prompt: &str) -> Result<String, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }
        fn variant_name(&self) -> &'static str {
            "test"
        }
    }

    fn template(id: &str) -> Template {
        Template {
            id: id.to_string(),
            name: "Docs".to_string(),
            description: "general documents".to_string(),
            base_path: "~/Documents".to_string(),
            naming_structure: "{file_category_1}/{file_title}".to_string(),
            file_name_case: FileNameCase::Snake,
            folder_structure: None,
            enforce_template_structure: false,
            watch_for_changes: false,
            auto_organize: false,
        }
    }

    fn pipeline(config_dir: &Path, provider: ScriptedProvider) -> OrganizationPipeline {
        let config = Config::load_from(&config_dir.join("config"), config_dir).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        OrganizationPipeline::with_provider(config, catalog, Box::new(provider))
    }

    #[tokio::test]
    async fn watch_mode_organize_commits_using_simple_schema() {
        let root = tempdir().unwrap();
        let source = root.path().join("notes.txt");
        std::fs::write(&source, "meeting notes for Q1 planning").unwrap();

        let provider = ScriptedProvider {
            responses: Mutex::new(vec![r#"{"title":"Q1 Planning","category":"Reports","summary":"notes","tags":["planning"]}"#.to_string()]),
        };
        let pipeline = pipeline(&root.path().join("cfg"), provider);
        let t = template("docs");

        let result = pipeline
            .watch_mode_organize(&source, &t, ConflictPolicy::AutoRename)
            .await
            .unwrap()
            .unwrap();

        assert!(result.final_path.exists());
        assert!(!source.exists());
        assert_eq!(result.organized_file.category, "Reports");
    }

    #[tokio::test]
    async fn already_organized_file_is_skipped() {
        let root = tempdir().unwrap();
        let source = root.path().join("notes.txt");
        std::fs::write(&source, "content").unwrap();
        crate::sidecar::MetadataSidecar::mark(
            &source,
            &crate::sidecar::SidecarMetadata {
                organized_at: chrono::Utc::now(),
                template_id: None,
                file_id: None,
            },
        )
        .unwrap();

        let provider = ScriptedProvider { responses: Mutex::new(vec![]) };
        let pipeline = pipeline(&root.path().join("cfg"), provider);
        let t = template("docs");

        let result = pipeline.watch_mode_organize(&source, &t, ConflictPolicy::AutoRename).await.unwrap();
        assert!(result.is_none());
    }

    /// Boundary B2: an enforced-folder selection that never lands on an
    /// allowed path within the attempt budget surfaces as
    /// `TemplateResolveFailed` at the top edge, not a bare `CoerceFailed`.
    #[tokio::test]
    async fn enforced_folder_rejection_exhausting_attempts_is_template_resolve_failed() {
        let root = tempdir().unwrap();
        let source = root.path().join("notes.txt");
        std::fs::write(&source, "content").unwrap();

        let responses: Vec<String> = std::iter::repeat(r#"{"selectedFolderPath":"Invoices"}"#.to_string())
            .take(crate::coercer::DEFAULT_MAX_ATTEMPTS as usize)
            .collect();
        let provider = ScriptedProvider {
            responses: Mutex::new(
                std::iter::once(r#"{"title":"Notes","category":"Reports","summary":"s","tags":[]}"#.to_string())
                    .chain(responses)
                    .collect(),
            ),
        };
        let pipeline = pipeline(&root.path().join("cfg"), provider);
        let mut t = template("docs");
        t.folder_structure = Some(vec!["Contracts".to_string(), "Personal".to_string()]);
        t.enforce_template_structure = true;

        let err = pipeline
            .watch_mode_organize(&source, &t, ConflictPolicy::AutoRename)
            .await
            .unwrap_err();
        assert!(matches!(err, OrganizeError::TemplateResolve(_)));
    }

    struct StalledProvider;

    #[async_trait]
    impl ChatProvider for StalledProvider {
        async fn chat(&self, _prompt: &str) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("deadline should fire first")
        }
        fn variant_name(&self) -> &'static str {
            "test"
        }
    }

    /// Boundary B3: a provider call that never returns is cancelled at the
    /// configured deadline rather than hanging the pipeline forever, and
    /// leaves no Catalog row and no moved file behind.
    #[tokio::test]
    async fn timed_out_provider_call_yields_cancelled_with_no_side_effects() {
        let root = tempdir().unwrap();
        let source = root.path().join("notes.txt");
        std::fs::write(&source, "content").unwrap();

        let config_dir = root.path().join("cfg");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config"), "ORGANIZATION_TIMEOUT=0\n").unwrap();
        let config = Config::load_from(&config_dir.join("config"), &config_dir).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let pipeline = OrganizationPipeline::with_provider(config, catalog, Box::new(StalledProvider));
        let t = template("docs");

        let err = pipeline
            .watch_mode_organize(&source, &t, ConflictPolicy::AutoRename)
            .await
            .unwrap_err();
        assert!(matches!(err, OrganizeError::Cancelled));
        assert!(source.exists());
        assert!(pipeline.catalog.list_files(100).unwrap().is_empty());
    }
}
