// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use annotext::annotation::RunControl;
use annotext::app_config::{self, Config, ProviderKind};
use annotext::app_controller::{describe_failure, Controller, ProgressTelemetry, RunRequest};
use annotext::pipeline::{PipelineReport, Stage};

/// CLI Wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    OpenAI,
    Anthropic,
    Ollama,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::OpenAI => ProviderKind::OpenAI,
            CliProvider::Anthropic => ProviderKind::Anthropic,
            CliProvider::Ollama => ProviderKind::Ollama,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Annotate a text file, a saved document, or a directory of text files
    Annotate(AnnotateArgs),

    /// Write a default configuration file
    InitConfig {
        /// Where to write the configuration
        #[arg(default_value = "annotext.json")]
        path: PathBuf,

        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions for annotext
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct AnnotateArgs {
    /// Input `.txt` file, `.json` document or directory
    #[arg(value_name = "INPUT_PATH", required_unless_present = "describe")]
    input_path: Option<PathBuf>,

    /// Write a new text from this description instead of reading one
    #[arg(long, value_name = "DESCRIPTION", conflicts_with = "input_path")]
    describe: Option<String>,

    /// First stage to run
    #[arg(long, default_value = "segmentation")]
    from: String,

    /// Last stage to run
    #[arg(long, default_value = "audio")]
    to: String,

    /// Source language code (e.g., 'en', 'zh', 'fr')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code; an empty value disables translation and gloss
    #[arg(short, long)]
    target_language: Option<String>,

    /// Generative service provider
    #[arg(short, long, value_enum)]
    provider: Option<CliProvider>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum in-flight requests per stage
    #[arg(long)]
    concurrency: Option<usize>,

    /// Redo annotations that already exist
    #[arg(long)]
    force: bool,

    /// Replace existing output files
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Output document path (single file input only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Give up after this many seconds, keeping finished segments
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Configuration file path
    #[arg(short, long, default_value = "annotext.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// annotext - LLM-driven text annotation
///
/// Segments raw text and annotates every segment through a generative
/// language service: translation, multi-word expressions, lemmas, glosses,
/// romanization and audio.
#[derive(Parser, Debug)]
#[command(name = "annotext")]
#[command(version)]
#[command(about = "LLM-driven text annotation engine")]
#[command(long_about = "annotext segments a text and annotates it stage by stage with a generative language service.

STAGES (in order):
    segmentation, tokenize, translation, mwe, lemma, gloss, romanization, audio

EXAMPLES:
    annotext annotate story.txt -s en -t fr              # Full pipeline
    annotext annotate story.annotated.json --from lemma  # Re-run from lemma onward
    annotext annotate story.txt --to tokenize            # Segmentation only
    annotext annotate -p anthropic stories/              # Every .txt under a directory
    annotext annotate --describe \"a fox in winter\" -s fr # Generate a text, then annotate it
    annotext init-config                                 # Write annotext.json
    annotext completions bash > annotext.bash            # Generate bash completions

CONFIGURATION:
    Settings are read from annotext.json by default. API keys may be left empty
    and supplied through OPENAI_API_KEY or ANTHROPIC_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Prefix and ANSI color for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (prefix, color) = Self::style_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, prefix, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "annotext", &mut std::io::stdout());
            Ok(())
        }
        Commands::InitConfig { path, force } => init_config(&path, force),
        Commands::Annotate(args) => run_annotate(args).await,
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!("{} already exists (use --force to replace it)", path.display()));
    }
    let json = serde_json::to_string_pretty(&Config::default())
        .context("Failed to serialize default config to JSON")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;
    info!("Default configuration written to {}", path.display());
    Ok(())
}

fn load_config(options: &AnnotateArgs) -> Result<Config> {
    let mut config = if options.config_path.exists() {
        Config::from_file(&options.config_path)?
    } else {
        warn!("Config file not found at {:?}, using defaults", options.config_path);
        Config::default()
    };

    // Command line wins over the file
    if let Some(provider) = &options.provider {
        config.gateway.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.gateway.model = model.clone();
    }
    if let Some(source_language) = &options.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(concurrency) = options.concurrency {
        config.runner.concurrency_limit = concurrency;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.apply_env_overrides()?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_annotate(options: AnnotateArgs) -> Result<()> {
    if let Some(level) = &options.log_level {
        log::set_max_level(level_filter(level.clone().into()));
    }

    let config = load_config(&options)?;
    log::set_max_level(level_filter(config.log_level));

    let start: Stage = options.from.parse()?;
    let end: Stage = options.to.parse()?;
    let request = RunRequest {
        start,
        end,
        force: options.force,
        overwrite: options.overwrite,
        output: options.output.clone(),
    };

    let (mut control, cancel) = RunControl::cancellable();
    control = control.with_policy(config.runner.cancel_policy);
    if let Some(secs) = options.timeout_secs {
        control = control.with_timeout(std::time::Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing up");
            cancel.cancel();
        }
    });

    let controller = Controller::with_config(config)?;
    let telemetry = ProgressTelemetry::new();

    let print_report = |report: Option<PipelineReport>| {
        if let Some(report) = report {
            telemetry.finish();
            info!("Stages:\n{}", report.summary());
            for (stage, path, reason) in report.failures() {
                warn!("{} failed at {}: {}", stage, path, reason);
            }
        }
    };

    let input_path = options.input_path.clone().unwrap_or_default();
    let result = if let Some(description) = &options.describe {
        controller
            .generate(description, &request, &telemetry, &control)
            .await
            .map(print_report)
    } else if input_path.is_file() {
        controller
            .run(&input_path, &request, &telemetry, &control)
            .await
            .map(print_report)
    } else if input_path.is_dir() {
        if options.output.is_some() {
            warn!("--output is ignored for directory input");
        }
        controller
            .run_folder(&input_path, &request, &telemetry, &control)
            .await
            .map(|processed| info!("Finished processing {} file(s)", processed))
    } else {
        Err(anyhow!("Input path does not exist: {:?}", input_path))
    };
    telemetry.finish();

    if let Err(e) = &result {
        error!("{}", describe_failure(e));
    }
    result
}
