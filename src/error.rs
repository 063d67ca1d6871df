//! Error taxonomy for the organization core.
//!
//! Each component boundary gets its own `thiserror` enum; `OrganizeError`
//! composes them at the pipeline's outer edge, which is the only place
//! the daemon and the single-file driver need to match on.

use std::path::PathBuf;
use thiserror::Error;

/// Config Store failures. Surfaced immediately; the process exits with a
/// diagnostic rather than attempting to run with a partial configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(String),
    #[error("config value for {key} is not one of the recognized values: {value}")]
    UnrecognizedValue { key: String, value: String },
    #[error("could not read config file at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Content Extractor failures. Only raised when the extractor cannot
/// produce even an empty excerpt; unrecognized formats degrade to
/// `Others` rather than failing.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("content collaborator failed for {path}: {reason}")]
    CollaboratorFailed { path: PathBuf, reason: String },
}

/// Chat Provider failures, discriminated so retry policy can tell
/// transport/auth problems (never retried by the pipeline) from content
/// problems (retried by the JSON Coercer).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("prompt of {chars} characters exceeds the {limit} character cap for {variant}")]
    PromptTooLarge {
        variant: String,
        chars: usize,
        limit: usize,
    },
    #[error("authentication failed for provider {variant}: {reason}")]
    Auth { variant: String, reason: String },
    #[error("network error talking to provider {variant}: {source}")]
    Network {
        variant: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider {variant} returned server error {status}: {body}")]
    Server {
        variant: String,
        status: u16,
        body: String,
    },
    #[error("provider {variant} does not support vision")]
    VisionUnsupported { variant: String },
}

/// One failed attempt at coercing free text into structured JSON.
#[derive(Debug, Clone)]
pub struct CoerceAttempt {
    pub attempt: u32,
    pub raw_text: String,
    pub error: String,
}

/// JSON Coercer exhaustion. Carries the full attempt history so the
/// top-level handler can write `last-error.log`.
#[derive(Debug, Error)]
#[error("JSON coercion failed after {} attempts", .attempts.len())]
pub struct CoerceFailed {
    pub attempts: Vec<CoerceAttempt>,
}

/// Outcome of a single `JsonCoercer::coerce` call: either the provider
/// itself failed (transport/auth/server/too-large — never retried, per
/// spec.md §4.2/§7) or the retry loop exhausted its attempt budget on
/// content-shape failures. Kept distinct so a step function's caller can
/// tell "the model never produced valid JSON" from "the provider call
/// itself failed" without inspecting attempt-history text.
#[derive(Debug, Error)]
pub enum CoerceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Failed(#[from] CoerceFailed),
}

/// Template Registry / resolver failures.
#[derive(Debug, Error)]
pub enum TemplateResolveError {
    #[error("placeholder {placeholder} in namingStructure had no value and elision was not possible")]
    MissingPlaceholder { placeholder: String },
    #[error("selected path {selected} is not among the template's declared folders: {allowed:?}")]
    PathNotAllowed {
        selected: String,
        allowed: Vec<String>,
    },
    #[error("template {0} not found in the registry")]
    TemplateNotFound(String),
    #[error("template document is invalid: {0}")]
    InvalidTemplate(String),
    #[error("io error persisting templates.json: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error reading/writing templates.json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Filesystem commit-stage failures. The backup, if taken, is preserved;
/// the catalog insert is never attempted.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("target path {path} resolves under a protected system directory")]
    ProtectedPath { path: PathBuf },
    #[error("could not create parent directory {path}: {source}")]
    Mkdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write backup copy for {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("destination {path} already exists and ConflictPolicy::Fail is in effect")]
    DestinationExists { path: PathBuf },
    #[error("could not move/copy {source} to {destination}: {error}")]
    MoveOrCopy {
        source: PathBuf,
        destination: PathBuf,
        error: std::io::Error,
    },
}

/// Catalog (embedded SQLite store) failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("file with id {0} not found")]
    NotFound(String),
    #[error("serde_json error storing tags: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error composing every component's failure kind. This is the
/// only type the daemon's per-event handler and the single-file driver
/// match against.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Coerce(#[from] CoerceFailed),
    #[error("template resolve failed: {0}")]
    TemplateResolve(#[from] TemplateResolveError),
    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("pipeline invocation cancelled")]
    Cancelled,
}

/// Unwraps a step's `CoerceError` back into the taxonomy: a provider
/// failure keeps its own `ProviderError` kind (never folded into
/// `CoerceFailed`/`last-error.log`), and an exhausted retry loop becomes
/// `OrganizeError::Coerce` as before.
impl From<CoerceError> for OrganizeError {
    fn from(error: CoerceError) -> Self {
        match error {
            CoerceError::Provider(provider_error) => OrganizeError::Provider(provider_error),
            CoerceError::Failed(failed) => OrganizeError::Coerce(failed),
        }
    }
}

impl OrganizeError {
    /// The error-taxonomy "kind" name used in log lines and `last-error.log`,
    /// independent of the wrapped Display text.
    pub fn kind(&self) -> &'static str {
        match self {
            OrganizeError::Config(_) => "ConfigError",
            OrganizeError::Extract(_) => "ExtractFailed",
            OrganizeError::Provider(_) => "ProviderError",
            OrganizeError::Coerce(_) => "CoerceFailed",
            OrganizeError::TemplateResolve(_) => "TemplateResolveFailed",
            OrganizeError::Commit(_) => "CommitFailed",
            OrganizeError::Catalog(_) => "CatalogError",
            OrganizeError::Cancelled => "Cancelled",
        }
    }

    /// Process exit code per spec.md §6: 0 success, 1 unrecoverable error,
    /// 130 on SIGINT (handled separately by the daemon's signal path).
    pub fn exit_code(&self) -> i32 {
        match self {
            OrganizeError::Cancelled => 130,
            _ => 1,
        }
    }
}
