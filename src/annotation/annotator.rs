/*!
 * Per-segment annotation work.
 *
 * The runner hands each dispatched segment to an `Annotator` as a
 * `SegmentJob`. The generative annotator turns the job into a prompt, sends
 * it through the gateway and interprets the answer into patches.
 */

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::annotation::outputs::interpret;
use crate::annotation::spec::OperationSpec;
use crate::annotation::units::Unit;
use crate::document::{NodePath, PatchSet, Segment};
use crate::errors::UnitError;
use crate::gateway::{Gateway, GatewayOptions};
use crate::prompts::{build_prompt, PromptContext, PromptLibrary};
use crate::telemetry::Telemetry;

/// Everything needed to annotate one segment, detached from the text
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub path: NodePath,
    /// Snapshot of the segment at dispatch time
    pub segment: Segment,
    /// Units still missing the result (token-unit operations)
    pub units: Vec<Unit>,
    /// Whether the segment-level result is missing
    pub segment_pending: bool,
    /// Values of the operation's hint keys present on the segment
    pub hints: BTreeMap<String, Value>,
    /// Operation id suffixed with the segment path
    pub op_id: String,
    pub source_language: String,
    pub target_language: Option<String>,
}

impl SegmentJob {
    /// JSON payload sent to the generative service
    pub fn payload(&self) -> Value {
        let tokens: Option<Vec<Value>> = self.segment.tokens().map(|tokens| {
            tokens
                .iter()
                .enumerate()
                .map(|(index, token)| {
                    let mut entry = json!({ "index": index, "surface": token.surface() });
                    if !token.annotations().is_empty() {
                        entry["annotations"] = json!(token.annotations());
                    }
                    entry
                })
                .collect()
        });

        let mut payload = json!({
            "path": self.path.to_string(),
            "surface": self.segment.surface(),
        });
        if let Some(tokens) = tokens {
            payload["tokens"] = Value::Array(tokens);
        }
        if !self.segment.annotations().is_empty() {
            payload["annotations"] = json!(self.segment.annotations());
        }
        if !self.units.is_empty() {
            payload["units"] = json!(self.units);
        }
        payload
    }
}

/// Produces the patches for one segment
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(
        &self,
        spec: &OperationSpec,
        job: &SegmentJob,
        telemetry: &dyn Telemetry,
    ) -> Result<PatchSet, UnitError>;
}

/// Annotator backed by the generative-service gateway
#[derive(Debug, Clone)]
pub struct GenerativeAnnotator {
    gateway: Gateway,
    prompts: Arc<PromptLibrary>,
    options: GatewayOptions,
}

impl GenerativeAnnotator {
    pub fn new(gateway: Gateway, prompts: Arc<PromptLibrary>, options: GatewayOptions) -> Self {
        Self {
            gateway,
            prompts,
            options,
        }
    }
}

#[async_trait]
impl Annotator for GenerativeAnnotator {
    async fn annotate(
        &self,
        spec: &OperationSpec,
        job: &SegmentJob,
        telemetry: &dyn Telemetry,
    ) -> Result<PatchSet, UnitError> {
        let payload = job.payload();
        let set = self.prompts.load(&spec.name, &job.source_language);
        let prompt = build_prompt(
            &set,
            &PromptContext {
                operation: &spec.name,
                source_language: &job.source_language,
                target_language: job.target_language.as_deref(),
                payload: &payload,
                hints: &job.hints,
                output_instructions: &spec.output_instructions,
            },
        );

        let patches = self
            .gateway
            .request_with(&prompt, &self.options, telemetry, Some(&job.op_id), |answer| {
                interpret(spec, job, answer)
            })
            .await?;
        Ok(patches)
    }
}
