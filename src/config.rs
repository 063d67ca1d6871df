//! Process-wide configuration: `<CONFIG_DIR>/config` (line-oriented
//! `KEY=VALUE`, `dotenvy`-style) layered with environment variable
//! overrides, matching the teacher's `dotenvy::dotenv()` +
//! `std::env::var` layering in `lib.rs` and `ai/grok/orchestrator.rs`.
//!
//! Loaded once at process start; refreshed only on an explicit reload
//! request (spec.md §3 "Ownership & lifecycle").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// One of the five wire-compatible Chat Provider variants (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderVariant {
    OpenAi,
    Grok,
    Deepseek,
    Ollama,
    LmStudio,
}

impl ProviderVariant {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "grok" => Some(Self::Grok),
            "deepseek" => Some(Self::Deepseek),
            "ollama" => Some(Self::Ollama),
            "lmstudio" => Some(Self::LmStudio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Grok => "grok",
            Self::Deepseek => "deepseek",
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
        }
    }

    /// Default base URL for each variant's OpenAI-chat-completions-compatible
    /// endpoint. `LLM_BASE_URL` overrides this for self-hosted variants.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Grok => "https://api.x.ai/v1",
            Self::Deepseek => "https://api.deepseek.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::LmStudio => "http://localhost:1234/v1",
        }
    }

    /// Conservative per-variant character cap enforced by `HttpChatProvider`
    /// before a request is ever sent (spec.md §4.2 `PromptTooLarge`).
    pub fn prompt_char_cap(&self) -> usize {
        match self {
            Self::OpenAi => 400_000,
            Self::Grok => 400_000,
            Self::Deepseek => 250_000,
            Self::Ollama => 32_000,
            Self::LmStudio => 32_000,
        }
    }
}

/// Whether the commit stage moves (`rename`) or copies (`copyFile`) the
/// source into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveFileOperation {
    Move,
    Copy,
}

/// Whether the pipeline runs the single-prompt mode or the six-step
/// multi-call mode (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    SingleCall,
    MultiCall,
}

/// `<CONFIG_DIR>/database.<ext>` / `FILE_MANAGER_INDEX_MODE` switch
/// (spec.md §6); not otherwise interpreted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Launch,
    OnDemand,
}

/// Recognized config keys, closed set per spec.md §6.
const RECOGNIZED_KEYS: &[&str] = &[
    "LLM_PROVIDER",
    "LLM_MODEL",
    "LLM_BASE_URL",
    "OPENAI_API_KEY",
    "GROK_API_KEY",
    "DEEPSEEK_API_KEY",
    "BASE_DIRECTORY",
    "DOCUMENT_DIRECTORY",
    "PICTURES_DIRECTORY",
    "MUSIC_DIRECTORY",
    "VIDEOS_DIRECTORY",
    "ARCHIVES_DIRECTORY",
    "DOWNLOADS_DIRECTORY",
    "DESKTOP_DIRECTORY",
    "OTHERS_DIRECTORY",
    "MOVE_FILE_OPERATION",
    "ADD_FILE_TAGS",
    "ADD_FILE_COMMENTS",
    "PROMPT_FOR_REVISION_NUMBER",
    "PROMPT_FOR_CUSTOM_CONTEXT",
    "MAX_CONTENT_WORDS",
    "ORGANIZATION_TIMEOUT",
    "FILE_MANAGER_INDEX_MODE",
    "ORGANIZATION_PROMPT_TEMPLATE",
    "REANALYZE_PROMPT",
    "WATCH_MODE_PROMPT",
    "IMAGE_CAPTION_PROMPT",
    "PIPELINE_MODE",
    "CONFLICT_POLICY",
];

/// Process-wide, read-mostly configuration. Holds both the raw key/value
/// map (for prompt templates and anything string-shaped) and a handful of
/// pre-parsed, strongly typed fields the rest of the core reads often.
#[derive(Debug, Clone)]
pub struct Config {
    raw: HashMap<String, String>,
    pub provider: ProviderVariant,
    pub model: String,
    pub base_url: Option<String>,
    pub move_file_operation: MoveFileOperation,
    pub max_content_words: usize,
    pub organization_timeout_secs: u64,
    pub pipeline_mode: PipelineMode,
    pub index_mode: IndexMode,
    pub add_file_tags: bool,
    pub add_file_comments: bool,
    config_dir: PathBuf,
}

impl Config {
    /// Resolve `<CONFIG_DIR>` the way every teacher persistence module
    /// does (`history::store::HistoryStore::new`,
    /// `billing::usage::UsageTracker::get_db_path`): `dirs::config_dir()`
    /// joined with a product-specific subdirectory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sentinel-organize")
    }

    /// Load `<CONFIG_DIR>/config`, then apply environment variable
    /// overrides (`dotenvy::dotenv()` is expected to have already been
    /// called by the process entry point, the way `lib.rs::run` does it).
    pub fn load() -> Result<Self, ConfigError> {
        let dir = Self::config_dir();
        let path = dir.join("config");
        Self::load_from(&path, &dir)
    }

    /// Testable entry point: load from an explicit path and config dir.
    pub fn load_from(path: &Path, config_dir: &Path) -> Result<Self, ConfigError> {
        let mut raw = HashMap::new();

        if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim().to_string();
                    let value = value.trim().trim_matches('"').to_string();
                    if RECOGNIZED_KEYS.contains(&key.as_str()) {
                        raw.insert(key, value);
                    } else {
                        tracing::warn!(key = %key, "ignoring unrecognized config key");
                    }
                }
            }
        }

        // Environment variables take precedence over the file, mirroring
        // `dotenvy::dotenv()` + `std::env::var` layering in the teacher's
        // orchestrator (env wins because dotenvy only fills in what's unset).
        for key in RECOGNIZED_KEYS {
            if let Ok(value) = std::env::var(key) {
                raw.insert(key.to_string(), value);
            }
        }

        let provider = raw
            .get("LLM_PROVIDER")
            .and_then(|v| ProviderVariant::parse(v))
            .unwrap_or(ProviderVariant::OpenAi);

        let model = raw
            .get("LLM_MODEL")
            .cloned()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let base_url = raw.get("LLM_BASE_URL").cloned();

        let move_file_operation = match raw.get("MOVE_FILE_OPERATION").map(String::as_str) {
            Some("copy") => MoveFileOperation::Copy,
            _ => MoveFileOperation::Move,
        };

        let max_content_words = raw
            .get("MAX_CONTENT_WORDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(2000);

        let organization_timeout_secs = raw
            .get("ORGANIZATION_TIMEOUT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(180);

        let pipeline_mode = match raw.get("PIPELINE_MODE").map(String::as_str) {
            Some("single_call") | Some("single-call") => PipelineMode::SingleCall,
            _ => PipelineMode::MultiCall,
        };

        let index_mode = match raw.get("FILE_MANAGER_INDEX_MODE").map(String::as_str) {
            Some("on-demand") | Some("on_demand") => IndexMode::OnDemand,
            _ => IndexMode::Launch,
        };

        let add_file_tags = raw
            .get("ADD_FILE_TAGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let add_file_comments = raw
            .get("ADD_FILE_COMMENTS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Config {
            raw,
            provider,
            model,
            base_url,
            move_file_operation,
            max_content_words,
            organization_timeout_secs,
            pipeline_mode,
            index_mode,
            add_file_tags,
            add_file_comments,
            config_dir: config_dir.to_path_buf(),
        })
    }

    /// Raw string lookup, for prompt templates and any key not promoted to
    /// a typed field above.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    pub fn config_dir_path(&self) -> &Path {
        &self.config_dir
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    pub fn api_key_for(&self, variant: ProviderVariant) -> Option<String> {
        let key = match variant {
            ProviderVariant::OpenAi => "OPENAI_API_KEY",
            ProviderVariant::Grok => "GROK_API_KEY",
            ProviderVariant::Deepseek => "DEEPSEEK_API_KEY",
            ProviderVariant::Ollama | ProviderVariant::LmStudio => return None,
        };
        self.raw.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_recognized_keys_and_ignores_unknown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(
            &path,
            "LLM_PROVIDER=grok\nLLM_MODEL=grok-4-1-fast\nNOT_A_KEY=nope\n# comment\n",
        )
        .unwrap();

        let config = Config::load_from(&path, dir.path()).unwrap();
        assert_eq!(config.provider, ProviderVariant::Grok);
        assert_eq!(config.model, "grok-4-1-fast");
        assert!(config.get("NOT_A_KEY").is_none());
    }

    #[test]
    fn defaults_when_file_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        let config = Config::load_from(&path, dir.path()).unwrap();
        assert_eq!(config.provider, ProviderVariant::OpenAi);
        assert_eq!(config.organization_timeout_secs, 180);
    }
}
