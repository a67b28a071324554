//! CLI command definitions for muse-forge.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{EndpointKind, GenerationConfig, DEFAULT_CONFIG_FILE};
use crate::export::{resolve_owner, BatchSink, HfUploadConfig, HfUploader, Publisher};
use crate::llm;
use crate::passage::{load_source, PassagePool};
use crate::scheduler::{Dispatcher, Harvester, Orchestrator, ProgressMonitor, Selector};
use crate::template::{ExtractRule, TemplateRegistry};

/// Synthetic textbook generator that keeps a fleet of API keys busy.
#[derive(Parser)]
#[command(name = "muse-forge")]
#[command(about = "Generate synthetic textbook-style text and publish it as a dataset")]
#[command(version)]
#[command(
    long_about = "muse-forge turns passages from instruction datasets into prompts, sends one request per API key every tick, and writes the extracted answers to numbered JSONL batches that are uploaded to a HuggingFace dataset repository.\n\nExample usage:\n  API_KEYS=key1,key2 HF_TOKEN=hf_xxx muse-forge run --output-dir ./textbooks"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the generation loop until interrupted.
    Run(RunArgs),

    /// Write a default configuration file.
    InitConfig(InitConfigArgs),

    /// List the registered prompt templates.
    Templates(TemplatesArgs),
}

/// Arguments for `muse-forge run`.
///
/// Flags override the config file and environment variables.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Config file (defaults to ./muse-forge.yaml when present).
    #[arg(short, long, env = "MUSE_FORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the active and finalized batch files.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Records per finalized batch.
    #[arg(short = 'n', long)]
    pub batch_size: Option<usize>,

    /// Smallest index a finalized batch may receive.
    #[arg(long)]
    pub begin_index: Option<u64>,

    /// Sampling temperature in [0, 1].
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling probability in [0, 1].
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Generation endpoint URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Endpoint wire format: gemini or openai.
    #[arg(long)]
    pub api_kind: Option<EndpointKind>,

    /// Model name for OpenAI-compatible endpoints.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Extra prompt templates (YAML).
    #[arg(short, long)]
    pub templates: Option<PathBuf>,

    /// Skip a key while it has this many requests outstanding.
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Pause between ticks, in milliseconds.
    #[arg(long)]
    pub tick_interval_ms: Option<u64>,

    /// Log failed requests with full error detail.
    #[arg(long)]
    pub verbose_errors: bool,

    /// Dataset repository name on the Hub.
    #[arg(long)]
    pub dataset_name: Option<String>,

    /// Dataset repository owner (defaults to the token's account).
    #[arg(long)]
    pub hf_owner: Option<String>,

    /// Create the dataset repository as private.
    #[arg(long)]
    pub private: bool,

    /// Seed for template choice and passage shuffling.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl RunArgs {
    fn apply(&self, config: &mut GenerationConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(index) = self.begin_index {
            config.begin_index = index;
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(p) = self.top_p {
            config.top_p = p;
        }
        if let Some(url) = &self.endpoint {
            config.endpoint.url = url.clone();
        }
        if let Some(kind) = self.api_kind {
            config.endpoint.kind = kind;
        }
        if let Some(model) = &self.model {
            config.endpoint.model = model.clone();
        }
        if let Some(path) = &self.templates {
            config.templates_file = Some(path.clone());
        }
        if self.max_in_flight.is_some() {
            config.max_in_flight_per_credential = self.max_in_flight;
        }
        if let Some(ms) = self.tick_interval_ms {
            config.tick_interval_ms = ms;
        }
        if self.verbose_errors {
            config.verbose_errors = true;
        }
        if let Some(name) = &self.dataset_name {
            config.publish.dataset_name = name.clone();
        }
        if let Some(owner) = &self.hf_owner {
            config.publish.owner = Some(owner.clone());
        }
        if self.private {
            config.publish.private = true;
        }
    }
}

/// Arguments for `muse-forge init-config`.
#[derive(Parser, Debug)]
pub struct InitConfigArgs {
    /// Where to write the file.
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub path: PathBuf,

    /// Overwrite an existing file.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for `muse-forge templates`.
#[derive(Parser, Debug)]
pub struct TemplatesArgs {
    /// Also load templates from this YAML file.
    #[arg(short, long)]
    pub templates: Option<PathBuf>,

    /// Print the full prompt bodies.
    #[arg(long)]
    pub show_prompts: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_generation_command(args).await,
        Commands::InitConfig(args) => run_init_config_command(args),
        Commands::Templates(args) => run_templates_command(args),
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

async fn run_generation_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = GenerationConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        credentials = config.credentials.len(),
        endpoint_kind = ?config.endpoint.kind,
        output_dir = %config.output_dir.display(),
        batch_size = config.batch_size,
        "Starting generation"
    );

    let orchestrator = build_orchestrator(&config, args.seed).await?;
    let monitor = ProgressMonitor::start(
        orchestrator.counters().clone(),
        config.progress_interval(),
    );

    let result = orchestrator.run().await;
    monitor.stop().await;
    result.context("Generation loop stopped")?;
    Ok(())
}

/// Assemble every component of a run from a validated configuration.
pub async fn build_orchestrator(
    config: &GenerationConfig,
    seed: Option<u64>,
) -> anyhow::Result<Orchestrator> {
    let sampling = config.sampling()?;
    let registry = load_registry(config.templates_file.as_ref())?;

    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    };
    let used = registry.datasets();
    let mut pool = PassagePool::new();
    for source in &config.passage_sources {
        if !used.contains(source.dataset.as_str()) {
            debug!(dataset = %source.dataset, "No template uses this passage source, skipping");
            continue;
        }
        let passages = load_source(
            source,
            &config.passage_cache_dir,
            config.publish.token.as_deref(),
            &mut rng,
        )
        .await
        .with_context(|| format!("Failed to load passages for '{}'", source.dataset))?;
        pool.insert(source.dataset.clone(), Box::new(passages));
    }

    let selector = match seed {
        Some(seed) => Selector::seeded(registry, pool, seed)?,
        None => Selector::new(registry, pool)?,
    };
    let provider = llm::build_provider(&config.endpoint)?;
    let dispatcher = Dispatcher::new(config.credentials.clone(), selector, provider, sampling)
        .with_max_in_flight(config.max_in_flight_per_credential);

    let sink = BatchSink::open(
        &config.output_dir,
        &config.file_extension,
        config.batch_size,
        config.begin_index,
    )?;

    let publisher = build_publisher(config).await?;

    Ok(Orchestrator::new(
        dispatcher,
        Harvester::new(config.verbose_errors),
        sink,
        publisher,
        config.tick_interval(),
    ))
}

async fn build_publisher(config: &GenerationConfig) -> anyhow::Result<Option<Publisher>> {
    let Some(token) = config.publish.token.as_deref() else {
        warn!("No HuggingFace token configured, finished batches will stay local");
        return Ok(None);
    };

    let owner = match &config.publish.owner {
        Some(owner) => owner.clone(),
        None => resolve_owner(token)
            .await
            .context("Failed to resolve the HuggingFace account for the token")?,
    };
    let uploader = HfUploader::new(HfUploadConfig {
        repo_id: format!("{}/{}", owner, config.publish.dataset_name),
        token: token.to_string(),
        private: config.publish.private,
    })?;
    info!(repo = %uploader.repo_id(), "Publishing finished batches");

    Ok(Some(Publisher::new(
        Box::new(uploader),
        config.publish.retry_delay(),
    )))
}

fn load_registry(extra: Option<&PathBuf>) -> anyhow::Result<TemplateRegistry> {
    let mut registry = TemplateRegistry::builtin();
    if let Some(path) = extra {
        registry
            .load_file(path)
            .with_context(|| format!("Failed to load templates from {}", path.display()))?;
    }
    Ok(registry)
}

// ============================================================================
// Other Commands
// ============================================================================

fn run_init_config_command(args: InitConfigArgs) -> anyhow::Result<()> {
    GenerationConfig::write_default(&args.path, args.force)?;
    println!("Wrote default configuration to {}", args.path.display());
    Ok(())
}

fn run_templates_command(args: TemplatesArgs) -> anyhow::Result<()> {
    let registry = load_registry(args.templates.as_ref())?;
    for template in registry.iter() {
        let extract = match &template.extract {
            ExtractRule::Section { tag } => format!("section <{}>", tag),
            ExtractRule::TitledSection {
                title_tag,
                body_tag,
                ..
            } => format!("titled section <{}> + <{}>", title_tag, body_tag),
        };
        println!(
            "{:<20} dataset={:<10} extract={}",
            template.name, template.dataset, extract
        );
        if args.show_prompts {
            println!("{}\n", template.prompt);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Credential;
    use crate::passage::{PassageSourceConfig, RowFormat};
    use tempfile::TempDir;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "muse-forge",
            "run",
            "--output-dir",
            "/tmp/out",
            "-n",
            "50",
            "--api-kind",
            "openai",
            "--max-in-flight",
            "2",
            "--seed",
            "9",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let mut config = GenerationConfig::default();
        args.apply(&mut config);

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.endpoint.kind, EndpointKind::OpenAi);
        assert_eq!(config.max_in_flight_per_credential, Some(2));
        assert_eq!(args.seed, Some(9));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_parse_init_config_default_path() {
        let cli = Cli::try_parse_from(["muse-forge", "init-config"]).unwrap();
        let Commands::InitConfig(args) = cli.command else {
            panic!("expected init-config command");
        };
        assert_eq!(args.path, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(!args.force);
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = GenerationConfig {
            batch_size: 7,
            ..Default::default()
        };
        RunArgs::default().apply(&mut config);
        assert_eq!(config.batch_size, 7);
        assert!(!config.verbose_errors);
    }

    #[tokio::test]
    async fn test_build_orchestrator_from_local_sources() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("text.jsonl");
        let code = dir.path().join("code.jsonl");
        std::fs::write(&text, "{\"text\":\"a passage\"}\n").unwrap();
        std::fs::write(
            &code,
            "{\"instruction\":\"sum\",\"output\":\"fn add() {}\"}\n",
        )
        .unwrap();

        let config = GenerationConfig {
            credentials: vec![Credential::new("k")],
            output_dir: dir.path().join("out"),
            passage_sources: vec![
                PassageSourceConfig::local("text", &text, RowFormat::Text),
                PassageSourceConfig::local("code", &code, RowFormat::Instruction),
            ],
            ..Default::default()
        };
        config.validate().unwrap();

        let orchestrator = build_orchestrator(&config, Some(1)).await.unwrap();
        assert!(orchestrator.sink().is_empty());
        assert!(dir.path().join("out").join("cur.jsonl").is_file());
    }

    #[tokio::test]
    async fn test_build_orchestrator_requires_every_dataset() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("text.jsonl");
        std::fs::write(&text, "{\"text\":\"a passage\"}\n").unwrap();

        let config = GenerationConfig {
            credentials: vec![Credential::new("k")],
            output_dir: dir.path().join("out"),
            passage_sources: vec![PassageSourceConfig::local("text", &text, RowFormat::Text)],
            ..Default::default()
        };

        let err = build_orchestrator(&config, None).await.unwrap_err();
        assert!(err.to_string().contains("code"));
    }
}
