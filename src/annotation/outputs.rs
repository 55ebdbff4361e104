/*!
 * Interpretation of generative answers into patch sets.
 *
 * Every function here validates the answer against what was asked for. A
 * returned `Err(String)` is a schema mismatch and makes the gateway ask again.
 */

use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};

use crate::annotation::annotator::SegmentJob;
use crate::annotation::spec::{OperationSpec, OutputShape, MWES_KEY, MWE_ID_KEY};
use crate::document::{align_pieces, NodePath, Patch, PatchSet, WhitespacePlacement};

/// Turn a JSON answer for `job` into patches according to `spec.output`.
pub fn interpret(spec: &OperationSpec, job: &SegmentJob, answer: Value) -> Result<PatchSet, String> {
    match &spec.output {
        OutputShape::Tokens => interpret_tokens(job, &answer),
        OutputShape::SegmentFields { keys } => interpret_segment_fields(job, keys, &answer),
        OutputShape::Mwes => interpret_mwes(job, &answer),
        OutputShape::UnitFields { required, optional } => {
            interpret_unit_fields(job, required, optional, &answer)
        }
        OutputShape::Audio { .. } => Err(format!("operation '{}' is not generative", spec.name)),
    }
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, String> {
    let items = value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing array '{}'", field))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("'{}' must contain only strings", field))
        })
        .collect()
}

fn interpret_tokens(job: &SegmentJob, answer: &Value) -> Result<PatchSet, String> {
    let pieces = string_list(answer, "tokens")?;
    let surface = job.segment.surface();

    let tokens = if pieces.concat() == surface && pieces.iter().all(|p| !p.is_empty()) {
        pieces
    } else {
        // The model often trims or merges whitespace; recover it from the source
        align_pieces(surface, &pieces, WhitespacePlacement::Separate).ok_or_else(|| {
            format!("tokens do not rebuild the segment surface {:?}", surface)
        })?
    };

    let mut patches = PatchSet::new();
    patches.insert(job.path, Patch::tokens(tokens));
    Ok(patches)
}

fn interpret_segment_fields(job: &SegmentJob, keys: &[String], answer: &Value) -> Result<PatchSet, String> {
    let mut patch = Patch::new();
    for key in keys {
        let value = answer
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing string field '{}'", key))?;
        patch = patch.with(key, json!(value));
    }
    let mut patches = PatchSet::new();
    patches.insert(job.path, patch);
    Ok(patches)
}

fn interpret_mwes(job: &SegmentJob, answer: &Value) -> Result<PatchSet, String> {
    let tokens = job
        .segment
        .tokens()
        .ok_or_else(|| "segment is not tokenized".to_string())?;
    let items = answer
        .get(MWES_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing array '{}'", MWES_KEY))?;

    let prefix = format!("p{}s{}", job.path.page, job.path.segment);
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut spans = Vec::with_capacity(items.len());
    let mut patches = PatchSet::new();

    for (position, item) in items.iter().enumerate() {
        let local_id = match item.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("{}", position + 1),
        };
        if !seen_ids.insert(local_id.clone()) {
            return Err(format!("duplicate expression id '{}'", local_id));
        }

        let indices: BTreeSet<usize> = item
            .get("tokens")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("expression '{}' has no token list", local_id))?
            .iter()
            .map(|v| {
                v.as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| format!("expression '{}' has a non-integer token index", local_id))
            })
            .collect::<Result<_, _>>()?;

        if indices.len() < 2 {
            return Err(format!("expression '{}' needs at least two tokens", local_id));
        }
        for &index in &indices {
            let token = tokens
                .get(index)
                .ok_or_else(|| format!("expression '{}' refers to missing token {}", local_id, index))?;
            if !token.is_lexical() {
                return Err(format!(
                    "expression '{}' includes non-lexical token {} ({:?})",
                    local_id,
                    index,
                    token.surface()
                ));
            }
            if !claimed.insert(index) {
                return Err(format!("token {} belongs to more than one expression", index));
            }
        }

        let id = format!("{}-{}", prefix, local_id);
        let label = item
            .get("label")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                indices
                    .iter()
                    .map(|&i| tokens[i].surface().trim())
                    .collect::<Vec<_>>()
                    .join(" ")
            });

        for &index in &indices {
            patches.insert(
                NodePath::token(job.path.page, job.path.segment, index),
                Patch::new().with(MWE_ID_KEY, json!(id)),
            );
        }
        spans.push(json!({ "id": id, "tokens": indices, "label": label }));
    }

    patches.insert(job.path, Patch::new().with(MWES_KEY, Value::Array(spans)));
    Ok(patches)
}

fn interpret_unit_fields(
    job: &SegmentJob,
    required: &[String],
    optional: &[String],
    answer: &Value,
) -> Result<PatchSet, String> {
    let items = answer
        .get("units")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing array 'units'".to_string())?;

    let mut answered: HashSet<usize> = HashSet::new();
    let mut patches = PatchSet::new();

    for item in items {
        let unit_index = item
            .get("unit")
            .and_then(Value::as_u64)
            .ok_or_else(|| "every unit answer needs an integer 'unit'".to_string())?
            as usize;
        let unit = job
            .units
            .iter()
            .find(|u| u.unit == unit_index)
            .ok_or_else(|| format!("unit {} was not asked for", unit_index))?;
        if !answered.insert(unit_index) {
            return Err(format!("unit {} answered twice", unit_index));
        }

        let mut fields = Map::new();
        for key in required {
            let value = item
                .get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| format!("unit {} is missing string field '{}'", unit_index, key))?;
            fields.insert(key.clone(), json!(value));
        }
        for key in optional {
            if let Some(value) = item.get(key).and_then(Value::as_str) {
                fields.insert(key.clone(), json!(value));
            }
        }

        for &token_index in &unit.tokens {
            let mut patch = Patch::new();
            for (key, value) in &fields {
                patch = patch.with(key, value.clone());
            }
            patches.insert(NodePath::token(job.path.page, job.path.segment, token_index), patch);
        }
    }

    if let Some(missing) = job.units.iter().find(|u| !answered.contains(&u.unit)) {
        return Err(format!("unit {} ({:?}) was not answered", missing.unit, missing.surface));
    }
    Ok(patches)
}
