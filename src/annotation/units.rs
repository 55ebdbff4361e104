/*!
 * Lemma-bearing units and pending-work detection.
 *
 * A unit is either one lexical token or one multi-word expression. Token-unit
 * operations ask for one value per unit and broadcast it to every member
 * token, so all tokens sharing an `mwe_id` always end up with the same value.
 */

use serde::Serialize;
use serde_json::Value;

use crate::annotation::spec::{OperationScope, OperationSpec, OutputShape, Predecessor, AUDIO_KEY, MWE_ID_KEY};
use crate::document::Segment;

/// One lexical unit of a segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    /// Position in the segment's unit list
    pub unit: usize,
    /// Member token indices, in order
    pub tokens: Vec<usize>,
    /// Member surfaces joined by single spaces
    pub surface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mwe_id: Option<String>,
}

/// Group a tokenized segment's lexical tokens into units.
///
/// Tokens sharing an `mwe_id` form one unit, placed at the position of its
/// first member. Whitespace and punctuation tokens belong to no unit.
pub fn lemma_units(segment: &Segment) -> Vec<Unit> {
    let Some(tokens) = segment.tokens() else {
        return Vec::new();
    };

    let mut units: Vec<Unit> = Vec::new();
    for (index, token) in tokens.iter().enumerate() {
        let mwe_id = token.annotation(MWE_ID_KEY).and_then(Value::as_str);

        if let Some(id) = mwe_id {
            if let Some(unit) = units.iter_mut().find(|u| u.mwe_id.as_deref() == Some(id)) {
                unit.tokens.push(index);
                unit.surface.push(' ');
                unit.surface.push_str(token.surface().trim());
                continue;
            }
        } else if !token.is_lexical() {
            continue;
        }

        units.push(Unit {
            unit: units.len(),
            tokens: vec![index],
            surface: token.surface().trim().to_string(),
            mwe_id: mwe_id.map(str::to_string),
        });
    }
    units
}

/// One unit per lexical token, ignoring expressions (audio is per word).
pub fn token_units(segment: &Segment) -> Vec<Unit> {
    segment
        .tokens()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter(|(_, token)| token.is_lexical())
        .enumerate()
        .map(|(unit, (index, token))| Unit {
            unit,
            tokens: vec![index],
            surface: token.surface().to_string(),
            mwe_id: None,
        })
        .collect()
}

/// Work still to do on one segment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingWork {
    /// The segment-level result is missing
    pub segment: bool,
    /// Units whose members still lack the result
    pub units: Vec<Unit>,
}

impl PendingWork {
    pub fn is_empty(&self) -> bool {
        !self.segment && self.units.is_empty()
    }
}

/// First unmet predecessor of `spec` on `segment`, if any
pub fn missing_predecessor(spec: &OperationSpec, segment: &Segment) -> Option<String> {
    spec.predecessors
        .iter()
        .find(|p| match p {
            Predecessor::Tokens => !segment.is_tokenized(),
            Predecessor::SegmentKey(key) => segment.annotation(key).is_none(),
        })
        .map(Predecessor::describe)
}

/// Decide what `spec` still has to do on `segment`.
///
/// Without `force`, anything already carrying the idempotency key is
/// skipped. Tokenization is structural and never redone here.
pub fn pending_work(spec: &OperationSpec, segment: &Segment, force: bool) -> PendingWork {
    let key = spec.idempotency_key.as_str();
    let unit_pending = |unit: &Unit| {
        force
            || unit.tokens.iter().any(|&i| {
                segment
                    .tokens()
                    .and_then(|tokens| tokens.get(i))
                    .is_some_and(|token| token.annotation(key).is_none())
            })
    };

    let units = match spec.scope {
        OperationScope::Segment => Vec::new(),
        OperationScope::TokenUnit => lemma_units(segment),
        OperationScope::Token => token_units(segment),
    };

    let segment_pending = match &spec.output {
        OutputShape::Tokens => !segment.is_tokenized(),
        OutputShape::SegmentFields { .. } | OutputShape::Mwes => force || segment.annotation(key).is_none(),
        OutputShape::UnitFields { .. } => false,
        OutputShape::Audio { segment: want_segment, .. } => {
            *want_segment && (force || segment.annotation(AUDIO_KEY).is_none())
        }
    };

    PendingWork {
        segment: segment_pending,
        units: units.into_iter().filter(unit_pending).collect(),
    }
}
