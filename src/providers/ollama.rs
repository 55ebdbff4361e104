use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{ensure_success, transport_error, CompletionRequest, CompletionResponse, Provider};

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Model used by `test_connection`
    model: String,
    timeout_ms: u64,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Format to return a response in
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    /// Whether to stream the response
    stream: bool,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    /// Generated text
    pub response: String,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl From<&CompletionRequest> for GenerationRequest {
    fn from(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            options: Some(GenerationOptions {
                temperature: request.temperature,
                num_predict: Some(request.max_tokens),
            }),
            format: request.json_mode.then(|| "json".to_string()),
            stream: false,
        }
    }
}

/// Build a base URL from a host that may or may not carry a scheme and port
fn base_url_for(host: &str, port: u16) -> String {
    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    match Url::parse(&candidate) {
        Ok(mut url) => {
            if url.port().is_none() {
                // Only fails for cannot-be-a-base URLs, which parse already excluded
                let _ = url.set_port(Some(port));
            }
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(e) => {
            error!("Invalid Ollama host '{}': {}, falling back to localhost", host, e);
            format!("http://localhost:{}", port)
        }
    }
}

impl Ollama {
    /// Create a new Ollama client with the specified host and port
    pub fn new(host: &str, port: u16, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url_for(host, port),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                // Ollama speaks HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            model: model.into(),
            timeout_ms: timeout_secs * 1000,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text from the Ollama API
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!("Ollama request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_ms))?;

        let response = ensure_success("Ollama", response).await?;
        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to get response text from Ollama API: {}", e)))?;

        serde_json::from_str::<GenerationResponse>(&response_text).map_err(|e| {
            let preview: String = response_text.chars().take(500).collect();
            error!("Failed to parse Ollama API response: {}. Raw response (first 500 chars): {}", e, preview);
            ProviderError::ParseError(e.to_string())
        })
    }
}

#[async_trait]
impl Provider for Ollama {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let response = self.generate(&GenerationRequest::from(request)).await?;
        Ok(CompletionResponse {
            text: response.response,
            prompt_tokens: response.prompt_eval_count,
            completion_tokens: response.eval_count,
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_ms))?;
        ensure_success("Ollama", response).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
