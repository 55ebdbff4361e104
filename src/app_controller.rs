use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

use crate::annotation::{GenerativeAnnotator, OperationRunner, RunControl};
use crate::app_config::{AudioEngine, Config, ProviderKind};
use crate::audio::{AudioAnnotator, AudioCache, SpeechApiBackend, SynthesisBackend, ToneBackend};
use crate::document::Text;
use crate::errors::PipelineError;
use crate::gateway::{Gateway, GatewayOptions};
use crate::pipeline::{Pipeline, PipelineInput, PipelineOptions, PipelineReport, Stage};
use crate::prompts::PromptLibrary;
use crate::providers::anthropic::Anthropic;
use crate::providers::ollama::Ollama;
use crate::providers::openai::OpenAI;
use crate::providers::Provider;
use crate::segmentation::Segmenter;
use crate::telemetry::{EventLevel, LogTelemetry, Telemetry};

// @module: Application controller wiring configuration to the pipeline

const OUTPUT_SUFFIX: &str = ".annotated.json";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// What a single invocation should do
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub start: Stage,
    pub end: Stage,
    /// Redo annotations that already exist
    pub force: bool,
    /// Replace an existing output file
    pub overwrite: bool,
    pub output: Option<PathBuf>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            start: Stage::SegmentationPhase1,
            end: Stage::Audio,
            force: false,
            overwrite: false,
            output: None,
        }
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    pipeline: Pipeline,
}

impl Controller {
    // @method: Create a controller talking to the configured provider
    pub fn with_config(config: Config) -> Result<Self> {
        let provider = build_provider(&config)?;
        Self::with_provider(config, provider)
    }

    /// Create a controller around an explicit provider (used by tests with the mock)
    pub fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        let prompts = Arc::new(PromptLibrary::new(config.prompts_root.clone()));
        let options = GatewayOptions::from_config(&config.gateway);
        let gateway = Gateway::new(provider);
        info!("Using provider {} with model {:?}", gateway.provider_name(), options.model);

        let segmenter = Segmenter::new(gateway.clone(), prompts.clone(), options.clone());
        let annotator = GenerativeAnnotator::new(gateway, prompts, options);
        let audio_annotator = AudioAnnotator::new(Arc::new(build_audio_cache(&config)?), config.audio.voice.clone());

        let pipeline = Pipeline::new(segmenter, OperationRunner::new(Arc::new(annotator)))
            .with_audio(OperationRunner::new(Arc::new(audio_annotator.clone())))
            .with_page_audio(audio_annotator)
            .with_options(PipelineOptions {
                concurrency_limit: config.runner.concurrency_limit,
                force: false,
                audio_segments: config.audio.segment_audio,
                audio_tokens: config.audio.token_audio,
                audio_pages: config.audio.page_audio,
            });

        Ok(Self { config, pipeline })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output path for an input file: `story.txt` becomes `story.annotated.json`
    pub fn output_path_for(input_file: &Path) -> PathBuf {
        let stem = input_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "text".to_string());
        let stem = stem.strip_suffix(".annotated").unwrap_or(&stem).to_string();
        input_file.with_file_name(format!("{}{}", stem, OUTPUT_SUFFIX))
    }

    /// Load the pipeline input for a file: JSON documents resume, anything else is plain text
    pub fn load_input(&self, input_file: &Path, start: Stage) -> Result<PipelineInput> {
        let content = std::fs::read_to_string(input_file)
            .with_context(|| format!("Failed to read input file {}", input_file.display()))?;

        let is_json = input_file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json || start > Stage::SegmentationPhase1 {
            let text = Text::from_json(&content)
                .with_context(|| format!("Failed to parse document {}", input_file.display()))?;
            return Ok(PipelineInput::Text(text));
        }

        let target_language = Some(self.config.target_language.clone()).filter(|lang| !lang.trim().is_empty());
        Ok(PipelineInput::PlainText {
            text: content,
            source_language: self.config.source_language.clone(),
            target_language,
        })
    }

    /// Annotate one file and write the resulting document.
    ///
    /// When a stage aborts or the run is cancelled, whatever text the error
    /// carries is still written so the run can be resumed from it.
    pub async fn run(
        &self,
        input_file: &Path,
        request: &RunRequest,
        telemetry: &dyn Telemetry,
        control: &RunControl,
    ) -> Result<Option<PipelineReport>> {
        if !input_file.is_file() {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }

        let output_path = request
            .output
            .clone()
            .unwrap_or_else(|| Self::output_path_for(input_file));
        if output_path.exists() && !request.overwrite && output_path != input_file {
            warn!("Skipping {:?}, output already exists (use --overwrite to replace it)", output_path);
            return Ok(None);
        }

        let input = self.load_input(input_file, request.start)?;
        let label = format!("{:?}", input_file);
        self.run_and_write(input, &label, &output_path, request, telemetry, control)
            .await
            .map(Some)
    }

    /// Write a new text from `description`, annotate it and write the document.
    ///
    /// Output goes to `request.output`, or `generated.annotated.json` in the
    /// working directory.
    pub async fn generate(
        &self,
        description: &str,
        request: &RunRequest,
        telemetry: &dyn Telemetry,
        control: &RunControl,
    ) -> Result<Option<PipelineReport>> {
        if description.trim().is_empty() {
            return Err(anyhow!("The description is empty"));
        }
        if request.start != Stage::SegmentationPhase1 {
            return Err(anyhow!("A generated text starts at segmentation, not {}", request.start));
        }

        let output_path = request
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("generated{}", OUTPUT_SUFFIX)));
        if output_path.exists() && !request.overwrite {
            warn!("Skipping generation, {:?} already exists (use --overwrite to replace it)", output_path);
            return Ok(None);
        }

        let target_language = Some(self.config.target_language.clone()).filter(|lang| !lang.trim().is_empty());
        let input = PipelineInput::Description {
            description: description.to_string(),
            source_language: self.config.source_language.clone(),
            target_language,
        };
        self.run_and_write(input, "generated text", &output_path, request, telemetry, control)
            .await
            .map(Some)
    }

    /// Run the requested range and write the result, or whatever partial
    /// text the failure carries, to `output_path`.
    async fn run_and_write(
        &self,
        input: PipelineInput,
        label: &str,
        output_path: &Path,
        request: &RunRequest,
        telemetry: &dyn Telemetry,
        control: &RunControl,
    ) -> Result<PipelineReport> {
        let pipeline = self.pipeline_for(request);

        let started = std::time::Instant::now();
        match pipeline
            .run_with_control(input, request.start, request.end, telemetry, control)
            .await
        {
            Ok(report) => {
                write_document(&report.text, output_path)?;
                info!(
                    "Annotated {} in {} -> {:?}",
                    label,
                    format_duration(started.elapsed()),
                    output_path
                );
                Ok(report)
            }
            Err(e) => {
                if let Some(partial) = e.partial_text() {
                    write_document(partial, output_path)?;
                    warn!("Partial document written to {:?}", output_path);
                }
                Err(anyhow::Error::new(e).context(format!("Failed to annotate {}", label)))
            }
        }
    }

    /// Annotate every `.txt` file under a directory
    pub async fn run_folder(
        &self,
        input_dir: &Path,
        request: &RunRequest,
        telemetry: &dyn Telemetry,
        control: &RunControl,
    ) -> Result<usize> {
        let inputs: Vec<PathBuf> = WalkDir::new(input_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| path.is_file() && is_text_input(path))
            .collect();

        if inputs.is_empty() {
            warn!("No text files found in {:?}", input_dir);
            return Ok(0);
        }
        info!("Found {} text file(s) in {:?}", inputs.len(), input_dir);

        // A shared output path only makes sense for a single file
        let request = RunRequest {
            output: None,
            ..request.clone()
        };

        let mut processed = 0;
        for path in inputs {
            if control.is_cancelled() {
                warn!("Cancelled, {} file(s) processed", processed);
                break;
            }
            match self.run(&path, &request, telemetry, control).await {
                Ok(Some(_)) => processed += 1,
                Ok(None) => {}
                Err(e) => error!("{:#}", e),
            }
        }
        Ok(processed)
    }

    fn pipeline_for(&self, request: &RunRequest) -> Pipeline {
        let mut options = self.pipeline.options().clone();
        options.force = request.force;
        self.pipeline.clone().with_options(options)
    }
}

/// Build the generative service client for the configured provider
pub fn build_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let gateway = &config.gateway;
    let model = gateway.effective_model();
    let endpoint = gateway.effective_endpoint();

    let provider: Arc<dyn Provider> = match gateway.provider {
        ProviderKind::OpenAI => Arc::new(OpenAI::new(&gateway.api_key, endpoint, model, gateway.timeout_secs)),
        ProviderKind::Anthropic => Arc::new(Anthropic::new(&gateway.api_key, endpoint, model, gateway.timeout_secs)),
        ProviderKind::Ollama => Arc::new(Ollama::new(&endpoint, DEFAULT_OLLAMA_PORT, model, gateway.timeout_secs)),
    };
    Ok(provider)
}

fn build_backend(config: &Config, engine: AudioEngine) -> Arc<dyn SynthesisBackend> {
    match engine {
        AudioEngine::Speech => {
            // The speech API shares credentials with an OpenAI-compatible gateway
            let (api_key, endpoint) = match config.gateway.provider {
                ProviderKind::OpenAI => (config.gateway.api_key.clone(), config.gateway.effective_endpoint()),
                _ => (std::env::var("OPENAI_API_KEY").unwrap_or_default(), String::new()),
            };
            Arc::new(SpeechApiBackend::new(
                api_key,
                endpoint,
                &config.audio.speech_model,
                config.gateway.timeout_secs,
            ))
        }
        AudioEngine::Tone => Arc::new(ToneBackend::new()),
    }
}

fn build_audio_cache(config: &Config) -> Result<AudioCache> {
    let dir = config.audio.effective_cache_dir();
    let mut cache = AudioCache::new(&dir, build_backend(config, config.audio.engine))
        .with_context(|| format!("Failed to open audio cache at {}", dir.display()))?
        .with_min_duration(Duration::from_millis(config.audio.min_duration_ms));
    if let Some(fallback) = config.audio.fallback_engine {
        cache = cache.with_fallback(build_backend(config, fallback));
    }
    Ok(cache)
}

fn is_text_input(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

/// Write a document next to its final location, then move it into place
pub fn write_document(text: &Text, path: &Path) -> Result<()> {
    let json = text.to_json_pretty().context("Failed to serialize document")?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(json.as_bytes())?;
    file.persist(path)
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e.error))?;
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Telemetry sink that drives a terminal spinner and forwards to the log.
pub struct ProgressTelemetry {
    spinner: ProgressBar,
    log: LogTelemetry,
}

impl Default for ProgressTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTelemetry {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self {
            spinner,
            log: LogTelemetry,
        }
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Telemetry for ProgressTelemetry {
    fn heartbeat(&self, op_id: &str, elapsed: Duration, note: Option<&str>) {
        self.spinner
            .set_message(format!("waiting on {} ({:.0}s)", note.unwrap_or(op_id), elapsed.as_secs_f64()));
        self.log.heartbeat(op_id, elapsed, note);
    }

    fn event(&self, op_id: &str, level: EventLevel, message: &str, data: Option<&Value>) {
        if level != EventLevel::Debug {
            self.spinner.set_message(message.to_string());
        }
        self.spinner.suspend(|| self.log.event(op_id, level, message, data));
    }
}

impl Drop for ProgressTelemetry {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

/// Describe a pipeline failure for the terminal
pub fn describe_failure(error: &anyhow::Error) -> String {
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::OperationAborted { operation, failed_paths, .. }) => format!(
            "{} aborted, failed at: {}",
            operation,
            failed_paths.iter().map(|(path, _)| path.to_string()).collect::<Vec<_>>().join(", ")
        ),
        Some(PipelineError::Cancelled { stage, pending_paths, .. }) => {
            format!("{} cancelled with {} segment(s) pending", stage, pending_paths.len())
        }
        _ => format!("{:#}", error),
    }
}
