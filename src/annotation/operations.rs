/*!
 * Built-in operation descriptors for the pipeline stages.
 */

use crate::annotation::spec::{
    FailurePolicy, OperationScope, OperationSpec, OutputShape, Predecessor, AUDIO_KEY, MWES_KEY,
};
use crate::language_utils::Romanization;

const TOKENS_INSTRUCTIONS: &str = r#"Respond with JSON only: {"tokens": [string, ...]}.
The tokens, concatenated in order, must equal the segment surface exactly."#;

const TRANSLATION_INSTRUCTIONS: &str = r#"Respond with JSON only: {"translation": string}."#;

const MWE_INSTRUCTIONS: &str = r#"Respond with JSON only: {"mwes": [{"id": string, "tokens": [token index, ...], "label": string}, ...]}.
Each expression has at least two lexical tokens and no token belongs to two expressions."#;

const LEMMA_INSTRUCTIONS: &str = r#"Respond with JSON only: {"units": [{"unit": unit index, "lemma": string, "pos": string}, ...]}.
Answer every unit listed in the input exactly once. Use Universal Dependencies part-of-speech tags."#;

const GLOSS_INSTRUCTIONS: &str = r#"Respond with JSON only: {"units": [{"unit": unit index, "gloss": string}, ...]}.
Answer every unit listed in the input exactly once."#;

/// Split each segment into word, punctuation and whitespace tokens
pub fn tokenize() -> OperationSpec {
    OperationSpec {
        name: "tokenize".to_string(),
        scope: OperationScope::Segment,
        output: OutputShape::Tokens,
        idempotency_key: "tokens".to_string(),
        predecessors: Vec::new(),
        hints: Vec::new(),
        failure_policy: FailurePolicy::AbortRun,
        output_instructions: TOKENS_INSTRUCTIONS.to_string(),
    }
}

/// Whole-segment translation into the target language
pub fn translation() -> OperationSpec {
    OperationSpec {
        name: "translation".to_string(),
        scope: OperationScope::Segment,
        output: OutputShape::SegmentFields {
            keys: vec!["translation".to_string()],
        },
        idempotency_key: "translation".to_string(),
        predecessors: Vec::new(),
        hints: Vec::new(),
        failure_policy: FailurePolicy::SkipSegment,
        output_instructions: TRANSLATION_INSTRUCTIONS.to_string(),
    }
}

/// Multi-word expression detection over a tokenized segment
pub fn mwe() -> OperationSpec {
    OperationSpec {
        name: "mwe".to_string(),
        scope: OperationScope::Segment,
        output: OutputShape::Mwes,
        idempotency_key: MWES_KEY.to_string(),
        predecessors: vec![Predecessor::Tokens],
        hints: vec!["translation".to_string()],
        failure_policy: FailurePolicy::SkipSegment,
        output_instructions: MWE_INSTRUCTIONS.to_string(),
    }
}

/// Lemma and part of speech per unit; expressions share one lemma
pub fn lemma() -> OperationSpec {
    OperationSpec {
        name: "lemma".to_string(),
        scope: OperationScope::TokenUnit,
        output: OutputShape::UnitFields {
            required: vec!["lemma".to_string()],
            optional: vec!["pos".to_string()],
        },
        idempotency_key: "lemma".to_string(),
        predecessors: vec![Predecessor::Tokens, Predecessor::SegmentKey(MWES_KEY.to_string())],
        hints: Vec::new(),
        failure_policy: FailurePolicy::SkipSegment,
        output_instructions: LEMMA_INSTRUCTIONS.to_string(),
    }
}

/// Contextual gloss per unit in the target language
pub fn gloss() -> OperationSpec {
    OperationSpec {
        name: "gloss".to_string(),
        scope: OperationScope::TokenUnit,
        output: OutputShape::UnitFields {
            required: vec!["gloss".to_string()],
            optional: Vec::new(),
        },
        idempotency_key: "gloss".to_string(),
        predecessors: vec![Predecessor::Tokens, Predecessor::SegmentKey(MWES_KEY.to_string())],
        hints: vec!["translation".to_string()],
        failure_policy: FailurePolicy::SkipSegment,
        output_instructions: GLOSS_INSTRUCTIONS.to_string(),
    }
}

/// Script-specific romanization per unit
pub fn romanization(scheme: Romanization) -> OperationSpec {
    let key = scheme.annotation_key();
    OperationSpec {
        name: key.to_string(),
        scope: OperationScope::TokenUnit,
        output: OutputShape::UnitFields {
            required: vec![key.to_string()],
            optional: Vec::new(),
        },
        idempotency_key: key.to_string(),
        predecessors: vec![Predecessor::Tokens, Predecessor::SegmentKey(MWES_KEY.to_string())],
        hints: Vec::new(),
        failure_policy: FailurePolicy::SkipSegment,
        output_instructions: format!(
            r#"Respond with JSON only: {{"units": [{{"unit": unit index, "{}": string}}, ...]}}.
Answer every unit listed in the input exactly once."#,
            key
        ),
    }
}

/// Audio references for segments and lexical tokens
pub fn audio(segment: bool, tokens: bool) -> OperationSpec {
    OperationSpec {
        name: "audio".to_string(),
        scope: if tokens { OperationScope::Token } else { OperationScope::Segment },
        output: OutputShape::Audio { segment, tokens },
        idempotency_key: AUDIO_KEY.to_string(),
        predecessors: if tokens { vec![Predecessor::Tokens] } else { Vec::new() },
        hints: Vec::new(),
        failure_policy: FailurePolicy::SkipSegment,
        output_instructions: String::new(),
    }
}
