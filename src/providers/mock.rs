/*!
 * Mock provider implementations for testing.
 *
 * This module provides a scripted provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with the responder's answer
 * - `MockProvider::fail_first(n)` - Fails transiently n times, then succeeds
 * - `MockProvider::failing()` - Always fails with a transient server error
 * - `MockProvider::auth_failure()` - Always fails with a non-transient error
 * - `MockProvider::slow(ms)` / `random_delay(ms)` - Delayed responses
 */

use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, CompletionResponse, Provider};

/// Function producing the response text for a request
pub type Responder = Arc<dyn Fn(&CompletionRequest) -> String + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// First `failures` calls fail with a 503, later calls succeed
    FailFirst { failures: usize },
    /// Always fails with a 503
    Failing,
    /// Always fails with a 401
    AuthFailure,
    /// Returns text that contains no JSON at all
    Malformed,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for timeout and heartbeat testing)
    Slow { delay_ms: u64 },
    /// Succeeds after a random delay, to shuffle completion order
    RandomDelay { max_delay_ms: u64 },
}

/// Mock provider for testing gateway and runner behavior
#[derive(Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Custom response generator (optional)
    responder: Option<Responder>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("behavior", &self.behavior)
            .field("request_count", &self.request_count())
            .finish()
    }
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            responder: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn fail_first(failures: usize) -> Self {
        Self::new(MockBehavior::FailFirst { failures })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn auth_failure() -> Self {
        Self::new(MockBehavior::AuthFailure)
    }

    pub fn malformed() -> Self {
        Self::new(MockBehavior::Malformed)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn random_delay(max_delay_ms: u64) -> Self {
        Self::new(MockBehavior::RandomDelay { max_delay_ms })
    }

    /// Set a custom response generator
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Answer every request with the same text
    pub fn with_fixed_response(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_responder(move |_| text.clone())
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &CompletionRequest) -> CompletionResponse {
        let text = match &self.responder {
            Some(responder) => responder(request),
            None => "{}".to_string(),
        };
        CompletionResponse {
            prompt_tokens: Some(request.prompt.len() as u64),
            completion_tokens: Some(text.len() as u64),
            text,
        }
    }

    fn server_error(count: usize) -> ProviderError {
        ProviderError::ApiError {
            status_code: 503,
            message: format!("Simulated overload on request {}", count + 1),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            MockBehavior::Working => Ok(self.respond(request)),

            MockBehavior::FailFirst { failures } => {
                if count < failures {
                    Err(Self::server_error(count))
                } else {
                    Ok(self.respond(request))
                }
            }

            MockBehavior::Failing => Err(Self::server_error(count)),

            MockBehavior::AuthFailure => Err(ProviderError::AuthenticationError("Simulated invalid API key".to_string())),

            MockBehavior::Malformed => Ok(CompletionResponse {
                text: "I am sorry, I cannot produce structured output today.".to_string(),
                ..Default::default()
            }),

            MockBehavior::Empty => Ok(CompletionResponse::default()),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.respond(request))
            }

            MockBehavior::RandomDelay { max_delay_ms } => {
                let delay_ms = rand::rng().random_range(0..=max_delay_ms);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.respond(request))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(Self::server_error(0)),
            MockBehavior::AuthFailure => Err(ProviderError::AuthenticationError("Simulated invalid API key".to_string())),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
