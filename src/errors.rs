/*!
 * Error types for the annotext engine.
 *
 * Each layer owns one `thiserror` enum: providers talk HTTP, the gateway adds
 * retry and schema semantics, the document model guards its invariants, and
 * the pipeline reports run-level failures together with the paths they touched.
 */

use thiserror::Error;

use crate::document::{NodePath, Text};

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish within the configured deadline
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Classify an HTTP failure status into the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Whether retrying the same request can reasonably succeed.
    ///
    /// Rate limits, timeouts, dropped connections and server-side failures are
    /// transient. Authentication problems and other client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded(_) | Self::Timeout(_) | Self::ConnectionError(_) => true,
            Self::ApiError { status_code, .. } => {
                *status_code >= 500 || *status_code == 408 || *status_code == 429
            }
            // Body arrived but was garbled in transit
            Self::ParseError(_) => true,
            Self::RequestFailed(_) | Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors surfaced by the generative-service gateway
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// A non-transient provider failure, not retried
    #[error("Provider error: {0}")]
    Provider(#[source] ProviderError),

    /// Transient failures persisted through every allowed attempt
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ProviderError },

    /// The next backoff would exceed the total wait budget
    #[error("Retry wait budget of {budget_ms} ms exhausted after {attempts} attempts: {last}")]
    WaitBudgetExceeded {
        attempts: u32,
        budget_ms: u64,
        last: ProviderError,
    },

    /// The response never matched the expected structure
    #[error("Response did not match the expected schema after {attempts} attempts: {reason}")]
    ResponseSchema { attempts: u32, reason: String },
}

/// Errors raised by the document model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// Input was not valid document JSON
    #[error("Invalid document JSON: {0}")]
    Json(String),

    /// Children of a node do not concatenate to the node's surface
    #[error("Concatenation invariant violated at {path}: expected {expected:?}, children give {actual:?}")]
    Concatenation {
        path: String,
        expected: String,
        actual: String,
    },

    /// A patch tried to change or add something it is not allowed to
    #[error("Schema violation at {path}: {reason}")]
    SchemaViolation { path: NodePath, reason: String },

    /// A patch addressed a node that does not exist
    #[error("No node at {0}")]
    UnknownPath(NodePath),
}

/// Errors raised while bootstrapping a document from plain text
#[derive(Error, Debug, Clone)]
pub enum SegmentationError {
    /// The segmentation call itself failed
    #[error("Segmentation request failed: {0}")]
    Gateway(#[from] GatewayError),

    /// Returned segments could not be reconciled with the source text
    #[error("Segmentation integrity error: {0}")]
    Integrity(String),

    /// The repaired tree was still rejected by the document model
    #[error("Segmentation produced an invalid document: {0}")]
    Document(#[from] DocumentError),
}

/// Errors raised by the audio synthesis cache and its backends
#[derive(Error, Debug, Clone)]
pub enum AudioError {
    /// A synthesis backend failed outright
    #[error("{engine} synthesis failed: {reason}")]
    Backend { engine: String, reason: String },

    /// Synthesis produced something unusable
    #[error("Synthesized audio rejected: {0}")]
    Validation(String),

    /// Reading or writing the cache directory failed
    #[error("Audio cache I/O error: {0}")]
    Io(String),

    /// Primary and fallback both failed for a key
    #[error("No usable audio for key {key}: {reason}")]
    Exhausted { key: String, reason: String },
}

impl From<std::io::Error> for AudioError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// Failure of one segment's work inside an operation run
#[derive(Error, Debug, Clone)]
pub enum UnitError {
    /// The generative call failed after the gateway's own retries
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Every synthesis backend failed
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// A structural predecessor has not run on this segment
    #[error("Missing predecessor: {0}")]
    MissingPredecessor(String),

    /// The annotator cannot handle this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Run-level failures of an operation or the whole pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bootstrap could not produce a document
    #[error("Segmentation failed: {0}")]
    Segmentation(#[from] SegmentationError),

    /// A merge was rejected; always a programming or configuration fault
    #[error("Merge rejected: {0}")]
    Document(#[from] DocumentError),

    /// An abort-run operation had failing segments; `partial` is the input untouched
    #[error("Operation {operation} aborted: {} segment(s) failed", failed_paths.len())]
    OperationAborted {
        operation: String,
        failed_paths: Vec<(NodePath, String)>,
        partial: Box<Text>,
    },

    /// The run was cancelled; completed segments are merged into `partial`
    #[error("Operation {stage} cancelled with {} segment(s) pending", pending_paths.len())]
    Cancelled {
        stage: String,
        pending_paths: Vec<NodePath>,
        partial: Box<Text>,
    },

    /// Stage range is empty or reversed
    #[error("Invalid stage range: {0}")]
    InvalidRange(String),

    /// The run needs an input it was not given
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// The operation descriptor or environment is unusable
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Text to keep when the run stopped part way, if any
    pub fn partial_text(&self) -> Option<&Text> {
        match self {
            Self::OperationAborted { partial, .. } | Self::Cancelled { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the document model
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Error from the annotation pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
