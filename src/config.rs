//! Run configuration.
//!
//! A single immutable [`GenerationConfig`] is built once at startup and shared
//! by the dispatcher, the output sink and the publisher. It is assembled in
//! layers: built-in defaults, then an optional YAML file, then environment
//! variables, then command-line flags. [`GenerationConfig::validate`] runs
//! last; any failure stops the process before a single request is sent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{Credential, SamplingParams, DEFAULT_GEMINI_ENDPOINT};
use crate::passage::{PassageSourceConfig, RowFormat};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "muse-forge.yaml";

/// Wire format of the generation endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Gemini `generateContent`, key appended to the URL.
    #[default]
    #[serde(rename = "gemini")]
    Gemini,
    /// OpenAI-compatible `/chat/completions`, key as bearer token.
    #[serde(rename = "openai")]
    OpenAi,
}

impl std::str::FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" | "litellm" => Ok(Self::OpenAi),
            other => Err(format!("unknown endpoint kind '{}'", other)),
        }
    }
}

/// Generation endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub kind: EndpointKind,
    /// Gemini: URL the key is appended to. OpenAI: API base URL.
    pub url: String,
    /// Model name, sent by the OpenAI-compatible client only.
    pub model: String,
    /// HTTP timeout for one generation request.
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            kind: EndpointKind::Gemini,
            url: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model: "gemini-pro".to_string(),
            // Long-form answers can take minutes.
            timeout_secs: 600,
        }
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dataset publication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Repository name; the full id is `{owner}/{dataset_name}`.
    pub dataset_name: String,
    /// Repository owner. Resolved from the token when unset.
    pub owner: Option<String>,
    /// HuggingFace token. Without one, batches stay local.
    pub token: Option<String>,
    pub private: bool,
    /// Pause between upload attempts.
    pub retry_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dataset_name: "muse_textbooks".to_string(),
            owner: None,
            token: None,
            private: false,
            retry_delay_ms: 1000,
        }
    }
}

impl PublishConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Configuration for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Access keys; one request per key is dispatched every tick.
    pub credentials: Vec<Credential>,
    pub endpoint: EndpointConfig,
    /// Sampling temperature, must lie in [0.0, 1.0].
    pub temperature: f64,
    /// Nucleus sampling probability, must lie in [0.0, 1.0].
    pub top_p: f64,

    // Output settings
    /// Directory holding `cur.<ext>` and the finalized batches.
    pub output_dir: PathBuf,
    pub file_extension: String,
    /// Records per finalized batch.
    pub batch_size: usize,
    /// Smallest index a finalized batch may receive.
    pub begin_index: u64,

    // Scheduling settings
    /// Pause between ticks.
    pub tick_interval_ms: u64,
    /// Skip a credential's dispatch while it has this many requests pending.
    /// Unset means no cap.
    pub max_in_flight_per_credential: Option<usize>,
    /// Log failed requests with their full debug representation.
    pub verbose_errors: bool,
    /// How often the progress line is logged.
    pub progress_interval_secs: u64,

    // Inputs
    /// Extra templates loaded on top of the built-in set.
    pub templates_file: Option<PathBuf>,
    pub passage_sources: Vec<PassageSourceConfig>,
    /// Where downloaded passage files are cached.
    pub passage_cache_dir: PathBuf,

    pub publish: PublishConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            endpoint: EndpointConfig::default(),
            temperature: 1.0,
            top_p: 0.99,

            output_dir: PathBuf::from("./textbooks"),
            file_extension: "jsonl".to_string(),
            batch_size: 1000,
            begin_index: 0,

            tick_interval_ms: 1000,
            max_in_flight_per_credential: None,
            verbose_errors: false,
            progress_interval_secs: 60,

            templates_file: None,
            passage_sources: default_passage_sources(),
            passage_cache_dir: PathBuf::from("./.passage-cache"),

            publish: PublishConfig::default(),
        }
    }
}

/// The conversation and code-instruction corpora the built-in templates were
/// written for, read from the Hub's Parquet conversion.
///
/// Only the first train shard of each conversion is read. For the whole
/// split, point the dataset at a local export of it instead.
fn default_passage_sources() -> Vec<PassageSourceConfig> {
    vec![
        PassageSourceConfig::hub(
            crate::template::builtin::TEXT_DATASET,
            "WizardLM/WizardLM_evol_instruct_V2_196k",
            "refs/convert/parquet",
            "default/train/0000.parquet",
            RowFormat::Conversation,
        ),
        PassageSourceConfig::hub(
            crate::template::builtin::CODE_DATASET,
            "TokenBender/code_instructions_122k_alpaca_style",
            "refs/convert/parquet",
            "default/train/0000.parquet",
            RowFormat::Instruction,
        ),
    ]
}

impl GenerationConfig {
    /// Load defaults overlaid with a YAML file and the process environment.
    ///
    /// When `path` is `None`, [`DEFAULT_CONFIG_FILE`] is read if it exists.
    /// The result is not validated yet; callers apply their own overrides
    /// first and then call [`GenerationConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Overlay environment variables, read through `lookup`.
    ///
    /// # Environment Variables
    ///
    /// - `API_KEYS`: comma-separated credentials (replaces the list)
    /// - `API_KEY`: a single credential (used when `API_KEYS` is unset)
    /// - `API_ENDPOINT`, `API_KIND` (`gemini` | `openai`), `MODEL`
    /// - `TEMPERATURE`, `TOP_P`
    /// - `OUT_DIR`, `COUNT_PER_FILE`, `BEGIN_INDEX`
    /// - `DATASET_NAME`, `HF_OWNER`, `HF_TOKEN`
    /// - `VERBOSE_ERRORS`, `MAX_IN_FLIGHT_PER_CREDENTIAL`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("API_KEYS") {
            self.credentials = split_credentials(&val);
        } else if let Some(val) = lookup("API_KEY") {
            self.credentials = split_credentials(&val);
        }

        if let Some(val) = lookup("API_ENDPOINT") {
            self.endpoint.url = val;
        }
        if let Some(val) = lookup("API_KIND") {
            self.endpoint.kind = parse_env_value(&val, "API_KIND")?;
        }
        if let Some(val) = lookup("MODEL") {
            self.endpoint.model = val;
        }

        if let Some(val) = lookup("TEMPERATURE") {
            self.temperature = parse_env_value(&val, "TEMPERATURE")?;
        }
        if let Some(val) = lookup("TOP_P") {
            self.top_p = parse_env_value(&val, "TOP_P")?;
        }

        if let Some(val) = lookup("OUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("COUNT_PER_FILE") {
            self.batch_size = parse_env_value(&val, "COUNT_PER_FILE")?;
        }
        if let Some(val) = lookup("BEGIN_INDEX") {
            self.begin_index = parse_env_value(&val, "BEGIN_INDEX")?;
        }

        if let Some(val) = lookup("DATASET_NAME") {
            self.publish.dataset_name = val;
        }
        if let Some(val) = lookup("HF_OWNER") {
            self.publish.owner = Some(val);
        }
        if let Some(val) = lookup("HF_TOKEN") {
            self.publish.token = Some(val);
        }

        if let Some(val) = lookup("VERBOSE_ERRORS") {
            self.verbose_errors = parse_env_bool(&val, "VERBOSE_ERRORS")?;
        }
        if let Some(val) = lookup("MAX_IN_FLIGHT_PER_CREDENTIAL") {
            self.max_in_flight_per_credential =
                Some(parse_env_value(&val, "MAX_IN_FLIGHT_PER_CREDENTIAL")?);
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampling()?;

        if self.credentials.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one credential is required (API_KEYS or `credentials`)".to_string(),
            ));
        }
        if self.credentials.iter().any(|c| c.expose().trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "credentials cannot be empty strings".to_string(),
            ));
        }

        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "endpoint url cannot be empty".to_string(),
            ));
        }
        if self.endpoint.kind == EndpointKind::OpenAi && self.endpoint.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "an OpenAI-compatible endpoint needs a model".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        let ext = self.file_extension.as_str();
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(ConfigError::ValidationFailed(format!(
                "file_extension '{}' must be a bare extension such as 'jsonl'",
                ext
            )));
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_in_flight_per_credential == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "max_in_flight_per_credential must be greater than 0 when set".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.passage_sources {
            if !seen.insert(source.dataset.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "passage dataset '{}' is configured twice",
                    source.dataset
                )));
            }
        }

        if self.publish.dataset_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "publish.dataset_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The validated sampling parameters.
    pub fn sampling(&self) -> Result<SamplingParams, ConfigError> {
        SamplingParams::new(self.temperature, self.top_p)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs.max(1))
    }

    /// Write the default configuration as YAML.
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.display().to_string()));
        }
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn split_credentials(val: &str) -> Vec<Credential> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Credential::new)
        .collect()
}

/// Parses a value from an environment variable string.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Parses a boolean from an environment variable string.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{}'", value),
        }),
    }
}
