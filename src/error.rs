//! Error types for muse-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Configuration loading and validation
//! - Prompt template rendering and response extraction
//! - Passage source loading
//! - Remote generation endpoint interactions
//! - Local batch files
//! - Dataset publication (HuggingFace Hub)
//! - The generation loop itself

use thiserror::Error;

/// Errors raised while building or validating the run configuration.
///
/// Every variant is fatal: the process stops before any request is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Sampling parameter '{name}' must be within [0.0, 1.0], got {value}")]
    SamplingOutOfRange { name: &'static str, value: f64 },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Config file already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to render prompt for template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },

    #[error("Response has no opening delimiter <{0}>")]
    MissingOpenTag(String),

    #[error("Response has no closing delimiter </{0}>")]
    MissingCloseTag(String),

    #[error("Failed to parse template file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Duplicate template name '{0}'")]
    DuplicateName(String),

    #[error("Invalid template '{name}': {message}")]
    Invalid { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading passage sources.
#[derive(Debug, Error)]
pub enum PassageError {
    #[error("Passage source '{0}' is empty")]
    EmptySource(String),

    #[error("No passage source registered for dataset '{0}'")]
    UnknownDataset(String),

    #[error("Unsupported passage file '{0}': expected .json, .jsonl or .parquet")]
    UnsupportedFile(String),

    #[error("Malformed passage file '{path}': {message}")]
    Malformed { path: String, message: String },

    #[error("Failed to download '{file}' from {repo}: {reason}")]
    DownloadFailed {
        repo: String,
        file: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while writing or rotating local batch files.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to {action} '{path}': {source}")]
    File {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SinkError {
    pub(crate) fn file<'a>(
        action: &'static str,
        path: &'a std::path::Path,
    ) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| SinkError::File {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HuggingFace API error: {0}")]
    HuggingFaceApi(String),

    #[error("Failed to create dataset repository '{repo}': {reason}")]
    DatasetCreationFailed { repo: String, reason: String },

    #[error("Failed to upload file '{file}': {reason}")]
    UploadFailed { file: String, reason: String },

    #[error("Missing authentication token")]
    MissingToken,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop the generation loop.
///
/// Individual request failures never surface here; only conditions under
/// which output can no longer be written safely do.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    #[error("Passage error: {0}")]
    Passage(#[from] PassageError),
}
