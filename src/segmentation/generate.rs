/*!
 * Text generation: a short description in, an original text out.
 */

use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::errors::SegmentationError;
use crate::prompts::{build_prompt, PromptContext};
use crate::segmentation::Segmenter;
use crate::telemetry::{new_op_id, EventLevel, Telemetry};

const OUTPUT_INSTRUCTIONS: &str = r#"Respond with JSON only: {"title": string, "surface": string}.
"surface" holds the full text exactly as a reader should see it."#;

/// A freshly written text, not yet segmented
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedText {
    #[serde(default)]
    pub title: Option<String>,
    pub surface: String,
}

impl Segmenter {
    /// Ask the service for an original text in `source_language` matching `description`.
    pub async fn generate(
        &self,
        description: &str,
        source_language: &str,
        target_language: Option<&str>,
        telemetry: &dyn Telemetry,
    ) -> Result<GeneratedText, SegmentationError> {
        let op_id = new_op_id();
        telemetry.event(&op_id, EventLevel::Info, "generating text", Some(&json!({ "description": description })));

        let payload = json!({ "description": description });
        let set = self.prompts.load("text_gen", source_language);
        let prompt = build_prompt(
            &set,
            &PromptContext {
                operation: "text_gen",
                source_language,
                target_language,
                payload: &payload,
                hints: &BTreeMap::new(),
                output_instructions: OUTPUT_INSTRUCTIONS,
            },
        );

        let generated = self
            .gateway
            .request_with(&prompt, &self.options, telemetry, Some(&op_id), |value: Value| {
                let generated: GeneratedText = serde_json::from_value(value).map_err(|e| e.to_string())?;
                if generated.surface.trim().is_empty() {
                    return Err("generated text is empty".to_string());
                }
                Ok(generated)
            })
            .await?;

        info!(
            "Generated {} character(s) of text{}",
            generated.surface.chars().count(),
            generated.title.as_deref().map(|t| format!(" titled {:?}", t)).unwrap_or_default()
        );
        Ok(generated)
    }
}
