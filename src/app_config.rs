use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::annotation::CancelPolicy;

/// Application configuration module
/// This module handles loading, validating and overriding the settings the
/// engine consumes: credentials and model for the generative service,
/// concurrency, retry/backoff, heartbeat interval and synthesis backends.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Generative service settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Operation runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Audio synthesis settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Directory holding `{operation}/{language}/template.txt` overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_root: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Generative service provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    // @provider: OpenAI (and compatible servers)
    #[default]
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: Ollama
    Ollama,
}

impl ProviderKind {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Ollama => "Ollama",
        }
    }

    // @returns: Environment variable holding the API key, if the provider needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }
}

// Implement Display trait for ProviderKind
impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        };
        write!(f, "{}", name)
    }
}

// Implement FromStr trait for ProviderKind
impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Generative service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Provider to use
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model name; empty means the provider default
    #[serde(default)]
    pub model: String,

    /// API key; empty means read from the provider's environment variable
    #[serde(default)]
    pub api_key: String,

    /// Service URL; empty means the provider default
    #[serde(default)]
    pub endpoint: String,

    /// Timeout for one call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for transient failures, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on total backoff per call (in milliseconds)
    #[serde(default = "default_max_total_wait_ms")]
    pub max_total_wait_ms: u64,

    /// Heartbeat interval while a call is outstanding (in milliseconds)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Extra attempts for answers that do not match the expected schema
    #[serde(default = "default_schema_retries")]
    pub schema_retries: u32,

    /// Temperature; `None` leaves the model default (some models reject others)
    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// System instruction sent with every call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_total_wait_ms: default_max_total_wait_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            schema_retries: default_schema_retries(),
            temperature: None,
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

impl GatewayConfig {
    /// Get the model for the active provider
    pub fn effective_model(&self) -> String {
        if !self.model.is_empty() {
            return self.model.clone();
        }
        match self.provider {
            ProviderKind::OpenAI => default_openai_model(),
            ProviderKind::Anthropic => default_anthropic_model(),
            ProviderKind::Ollama => default_ollama_model(),
        }
    }

    /// Get the endpoint for the active provider
    pub fn effective_endpoint(&self) -> String {
        if !self.endpoint.is_empty() {
            return self.endpoint.clone();
        }
        match self.provider {
            ProviderKind::OpenAI => default_openai_endpoint(),
            ProviderKind::Anthropic => default_anthropic_endpoint(),
            ProviderKind::Ollama => default_ollama_endpoint(),
        }
    }
}

/// Operation runner configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Maximum in-flight generative calls per operation run
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// What to do with in-flight calls when a run is cancelled
    #[serde(default)]
    pub cancel_policy: CancelPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            cancel_policy: CancelPolicy::default(),
        }
    }
}

/// Speech synthesis engine
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioEngine {
    /// OpenAI-compatible `/audio/speech` endpoint
    Speech,
    /// Offline tone generator
    #[default]
    Tone,
}

impl std::fmt::Display for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Speech => write!(f, "speech"),
            Self::Tone => write!(f, "tone"),
        }
    }
}

impl std::str::FromStr for AudioEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "speech" | "openai" => Ok(Self::Speech),
            "tone" | "simple" => Ok(Self::Tone),
            _ => Err(anyhow!("Invalid audio engine: {}", s)),
        }
    }
}

/// Audio synthesis configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    /// Primary engine
    #[serde(default)]
    pub engine: AudioEngine,

    /// Engine tried once when the primary fails validation
    #[serde(default = "default_fallback_engine")]
    pub fallback_engine: Option<AudioEngine>,

    /// Voice name passed to the engine
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Speech model for the `speech` engine
    #[serde(default = "default_speech_model")]
    pub speech_model: String,

    /// Cache directory; defaults to the user cache dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Shortest clip accepted as valid (in milliseconds)
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Synthesize audio for lexical tokens
    #[serde(default = "default_true")]
    pub token_audio: bool,

    /// Synthesize audio for whole segments
    #[serde(default = "default_true")]
    pub segment_audio: bool,

    /// Join segment clips into one clip per page
    #[serde(default = "default_true")]
    pub page_audio: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            engine: AudioEngine::default(),
            fallback_engine: default_fallback_engine(),
            voice: default_voice(),
            speech_model: default_speech_model(),
            cache_dir: None,
            min_duration_ms: default_min_duration_ms(),
            token_audio: true,
            segment_audio: true,
            page_audio: true,
        }
    }
}

impl AudioConfig {
    /// Resolved cache directory
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("annotext")
                .join("audio")
        })
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_max_total_wait_ms() -> u64 {
    60_000
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_schema_retries() -> u32 {
    2
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_concurrency_limit() -> usize {
    8
}

fn default_fallback_engine() -> Option<AudioEngine> {
    Some(AudioEngine::Tone)
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_speech_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

fn default_min_duration_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1".to_string()
}

impl Config {
    /// Load a configuration file, filling missing sections with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.gateway.api_key.is_empty() {
            if let Some(key) = self.gateway.provider.api_key_env().and_then(&lookup) {
                self.gateway.api_key = key;
            }
        }
        if let Some(model) = lookup("ANNOTEXT_MODEL") {
            self.gateway.model = model;
        }
        if let Some(limit) = lookup("ANNOTEXT_CONCURRENCY") {
            self.runner.concurrency_limit = limit
                .trim()
                .parse()
                .with_context(|| format!("ANNOTEXT_CONCURRENCY is not a number: {}", limit))?;
        }
        if let Some(engine) = lookup("ANNOTEXT_TTS_ENGINE") {
            self.audio.engine = engine.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        // Validate languages
        let _source_name = crate::language_utils::get_language_name(&self.source_language)?;
        // An empty target disables translation and gloss
        if !self.target_language.trim().is_empty() {
            let _target_name = crate::language_utils::get_language_name(&self.target_language)?;
        }

        if self.gateway.provider.api_key_env().is_some() && self.gateway.api_key.is_empty() {
            return Err(anyhow!(
                "An API key is required for the {} provider",
                self.gateway.provider.display_name()
            ));
        }
        if self.runner.concurrency_limit == 0 {
            return Err(anyhow!("Concurrency limit must be at least 1"));
        }
        if self.gateway.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.gateway.heartbeat_interval_ms == 0 {
            return Err(anyhow!("heartbeat_interval_ms must be positive"));
        }
        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            gateway: GatewayConfig::default(),
            runner: RunnerConfig::default(),
            audio: AudioConfig::default(),
            prompts_root: None,
            log_level: LogLevel::default(),
        }
    }
}
