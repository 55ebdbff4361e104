/*!
 * Generative-service gateway.
 *
 * One logical request goes through here: the gateway builds the provider
 * request, races it against a per-call timeout while emitting heartbeats,
 * retries transient failures with exponential backoff, extracts the JSON
 * answer and checks it against the caller's schema. Nothing shared is
 * mutated; the only side effects are telemetry and the network call.
 */

pub mod json;
pub mod retry;

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};

use crate::app_config::GatewayConfig;
use crate::errors::{GatewayError, ProviderError};
use crate::providers::{CompletionRequest, CompletionResponse, Provider};
use crate::telemetry::{new_op_id, EventLevel, Telemetry};

pub use json::{extract_json, parse_response};
pub use retry::RetryPolicy;

/// Per-request knobs
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub model: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    /// Deadline for a single provider call
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
    /// Extra attempts allowed for answers that do not fit the schema
    pub schema_retries: u32,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            system: None,
            temperature: None,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            schema_retries: 2,
        }
    }
}

impl GatewayOptions {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let options = Self {
            model: config.model.clone(),
            system: None,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                backoff_base: Duration::from_millis(config.retry_backoff_ms),
                max_total_wait: Duration::from_millis(config.max_total_wait_ms),
                jitter: 0.1,
            },
            schema_retries: config.schema_retries,
        };
        match &config.system_prompt {
            Some(system) if !system.trim().is_empty() => options.with_system(system.as_str()),
            _ => options,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    fn to_request(&self, prompt: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.model.clone(), prompt)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        if let Some(system) = &self.system {
            request = request.system(system.clone());
        }
        request
    }
}

/// Front door to the generative service
#[derive(Debug, Clone)]
pub struct Gateway {
    provider: Arc<dyn Provider>,
}

impl Gateway {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send a prompt and deserialize the JSON answer into `T`.
    pub async fn request<T: DeserializeOwned + Send>(
        &self,
        prompt: &str,
        options: &GatewayOptions,
        telemetry: &dyn Telemetry,
        op_id: Option<&str>,
    ) -> Result<T, GatewayError> {
        self.request_with(prompt, options, telemetry, op_id, |value| {
            serde_json::from_value(value).map_err(|e| e.to_string())
        })
        .await
    }

    /// Send a prompt and validate the JSON answer with `parse`.
    ///
    /// A `parse` error counts as a schema mismatch and is retried up to
    /// `options.schema_retries` times before surfacing as `ResponseSchema`.
    pub async fn request_with<T, F>(
        &self,
        prompt: &str,
        options: &GatewayOptions,
        telemetry: &dyn Telemetry,
        op_id: Option<&str>,
        parse: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Value) -> Result<T, String> + Send + Sync,
        T: Send,
    {
        let op_id = op_id.map(str::to_string).unwrap_or_else(new_op_id);
        let request = options.to_request(prompt);
        let started = Instant::now();

        let mut attempt = 0u32;
        let mut transient_failures = 0u32;
        let mut schema_failures = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            attempt += 1;
            telemetry.event(
                &op_id,
                EventLevel::Debug,
                "generative call attempt",
                Some(&json!({ "attempt": attempt, "provider": self.provider.name() })),
            );

            match self.call_with_heartbeat(&request, options, telemetry, &op_id, attempt, started).await {
                Ok(response) => match parse_response(&response.text).and_then(&parse) {
                    Ok(value) => {
                        telemetry.event(
                            &op_id,
                            EventLevel::Info,
                            "generative call completed",
                            Some(&json!({
                                "attempt": attempt,
                                "elapsed_ms": started.elapsed().as_millis() as u64,
                                "completion_tokens": response.completion_tokens,
                            })),
                        );
                        return Ok(value);
                    }
                    Err(reason) => {
                        schema_failures += 1;
                        telemetry.event(
                            &op_id,
                            EventLevel::Warn,
                            "response schema mismatch",
                            Some(&json!({ "attempt": attempt, "reason": reason })),
                        );
                        if schema_failures > options.schema_retries {
                            return Err(GatewayError::ResponseSchema { attempts: attempt, reason });
                        }
                    }
                },
                Err(error) if error.is_transient() => {
                    transient_failures += 1;
                    if transient_failures >= options.retry.max_attempts {
                        telemetry.event(
                            &op_id,
                            EventLevel::Error,
                            "retries exhausted",
                            Some(&json!({ "attempt": attempt, "error": error.to_string() })),
                        );
                        return Err(GatewayError::RetriesExhausted { attempts: attempt, last: error });
                    }

                    let delay = options.retry.delay_for(transient_failures);
                    if waited + delay > options.retry.max_total_wait {
                        telemetry.event(
                            &op_id,
                            EventLevel::Error,
                            "retry wait budget exhausted",
                            Some(&json!({ "attempt": attempt, "error": error.to_string() })),
                        );
                        return Err(GatewayError::WaitBudgetExceeded {
                            attempts: attempt,
                            budget_ms: options.retry.max_total_wait.as_millis() as u64,
                            last: error,
                        });
                    }

                    telemetry.event(
                        &op_id,
                        EventLevel::Warn,
                        "retrying after transient error",
                        Some(&json!({
                            "attempt": attempt,
                            "error": error.to_string(),
                            "backoff_ms": delay.as_millis() as u64,
                        })),
                    );
                    debug!("{} backing off {:?} after attempt {}", op_id, delay, attempt);
                    tokio::time::sleep(delay).await;
                    waited += delay;
                }
                Err(error) => {
                    telemetry.event(
                        &op_id,
                        EventLevel::Error,
                        "non-transient provider error",
                        Some(&json!({ "attempt": attempt, "error": error.to_string() })),
                    );
                    return Err(GatewayError::Provider(error));
                }
            }
        }
    }

    /// One provider call, bounded by the timeout, with heartbeats while it runs.
    async fn call_with_heartbeat(
        &self,
        request: &CompletionRequest,
        options: &GatewayOptions,
        telemetry: &dyn Telemetry,
        op_id: &str,
        attempt: u32,
        started: Instant,
    ) -> Result<CompletionResponse, ProviderError> {
        let period = options.heartbeat_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        let note = format!("attempt {}", attempt);

        let call = tokio::time::timeout(options.timeout, self.provider.complete(request));
        tokio::pin!(call);

        loop {
            tokio::select! {
                outcome = &mut call => {
                    return match outcome {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(options.timeout.as_millis() as u64)),
                    };
                }
                _ = ticker.tick() => {
                    telemetry.heartbeat(op_id, started.elapsed(), Some(&note));
                }
            }
        }
    }
}
