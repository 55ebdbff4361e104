/*!
 * Operation descriptors.
 *
 * An `OperationSpec` tells the runner everything it needs about one
 * linguistic step: what it fans out over, which keys it owns, how to tell it
 * already ran, what must run first and what to do when a segment fails.
 */

use serde::{Deserialize, Serialize};

use crate::document::{MergeMode, MergePolicy};

/// Which units of a segment an operation answers for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationScope {
    /// The segment as a whole, no units
    Segment,
    /// Lemma-bearing units: lexical tokens, expressions grouped; results broadcast to member tokens
    TokenUnit,
    /// Every lexical token on its own, expressions ignored
    Token,
}

/// What a failing segment does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed segment aborts the operation
    AbortRun,
    /// Failed segments stay unannotated and are listed
    #[default]
    SkipSegment,
}

/// Structural requirement checked before dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predecessor {
    /// The segment must be tokenized
    Tokens,
    /// The segment must carry this annotation key
    SegmentKey(String),
}

impl Predecessor {
    pub fn describe(&self) -> String {
        match self {
            Self::Tokens => "tokens".to_string(),
            Self::SegmentKey(key) => format!("segment key '{}'", key),
        }
    }
}

/// Shape of an operation's result and the keys it writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutputShape {
    /// `{"tokens": [string]}`, sets the segment's token list
    Tokens,
    /// `{"<key>": string, ...}`, one string per key on the segment
    SegmentFields { keys: Vec<String> },
    /// `{"mwes": [{"id", "tokens": [index], "label"}]}`, span list plus token `mwe_id`
    Mwes,
    /// `{"units": [{"unit": index, "<key>": string, ...}]}`, broadcast to member tokens
    UnitFields { required: Vec<String>, optional: Vec<String> },
    /// Audio references on the segment and on lexical tokens
    Audio { segment: bool, tokens: bool },
}

pub const MWES_KEY: &str = "mwes";
pub const MWE_ID_KEY: &str = "mwe_id";
pub const AUDIO_KEY: &str = "audio";

/// Full description of one annotation operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Name, also the prompt directory
    pub name: String,
    pub scope: OperationScope,
    pub output: OutputShape,
    /// Key whose presence means the work is done
    pub idempotency_key: String,
    #[serde(default)]
    pub predecessors: Vec<Predecessor>,
    /// Segment keys from earlier operations passed to the prompt
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Appended to every prompt; describes the expected JSON
    #[serde(default)]
    pub output_instructions: String,
}

impl OperationSpec {
    /// Segment-level keys this operation writes
    pub fn segment_keys(&self) -> Vec<String> {
        match &self.output {
            OutputShape::Tokens | OutputShape::UnitFields { .. } => Vec::new(),
            OutputShape::SegmentFields { keys } => keys.clone(),
            OutputShape::Mwes => vec![MWES_KEY.to_string()],
            OutputShape::Audio { segment, .. } => {
                if *segment {
                    vec![AUDIO_KEY.to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Token-level keys this operation writes
    pub fn token_keys(&self) -> Vec<String> {
        match &self.output {
            OutputShape::Tokens | OutputShape::SegmentFields { .. } => Vec::new(),
            OutputShape::Mwes => vec![MWE_ID_KEY.to_string()],
            OutputShape::UnitFields { required, optional } => {
                required.iter().chain(optional.iter()).cloned().collect()
            }
            OutputShape::Audio { tokens, .. } => {
                if *tokens {
                    vec![AUDIO_KEY.to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Merge policy restricted to the owned keys
    pub fn merge_policy(&self, force: bool) -> MergePolicy {
        let mode = if force { MergeMode::ReplaceOwned } else { MergeMode::Additive };
        MergePolicy::owned(self.segment_keys().into_iter().chain(self.token_keys())).with_mode(mode)
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}
