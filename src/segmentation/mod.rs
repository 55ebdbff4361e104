/*!
 * Segmentation bootstrap: plain text to a page/segment tree.
 *
 * Phase 1 lives here. One generative call proposes pages and segments; the
 * proposal is checked against the original text and, when the model dropped
 * or changed whitespace, deterministically re-cut from the original using the
 * proposed segments as boundary hints. Phase 2 (tokens) is the `tokenize`
 * operation run through the operation runner.
 *
 * When there is no text yet, `generate` writes one from a description.
 */

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::document::{align_pieces, Page, Segment, Text, WhitespacePlacement};
use crate::errors::SegmentationError;
use crate::gateway::{Gateway, GatewayOptions};
use crate::prompts::{build_prompt, PromptContext, PromptLibrary};
use crate::telemetry::{new_op_id, EventLevel, Telemetry};

mod generate;

pub use generate::GeneratedText;

const OUTPUT_INSTRUCTIONS: &str = r#"Respond with JSON only: {"title": string, "pages": [{"segments": [{"surface": string}, ...]}, ...]}.
The segment surfaces, concatenated in order across all pages, must equal the input text exactly."#;

#[derive(Debug, Clone, Deserialize)]
struct SegmentationAnswer {
    #[serde(default)]
    title: Option<String>,
    pages: Vec<PageAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
struct PageAnswer {
    segments: Vec<SegmentAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
struct SegmentAnswer {
    surface: String,
}

/// Phase-1 segmenter
#[derive(Debug, Clone)]
pub struct Segmenter {
    gateway: Gateway,
    prompts: Arc<PromptLibrary>,
    options: GatewayOptions,
}

impl Segmenter {
    pub fn new(gateway: Gateway, prompts: Arc<PromptLibrary>, options: GatewayOptions) -> Self {
        Self {
            gateway,
            prompts,
            options,
        }
    }

    /// Build an untokenized text from `plain_text`.
    ///
    /// The result always concatenates back to `plain_text` exactly. Empty and
    /// whitespace-only inputs are handled without a generative call.
    pub async fn segment(
        &self,
        plain_text: &str,
        source_language: &str,
        target_language: Option<&str>,
        telemetry: &dyn Telemetry,
    ) -> Result<Text, SegmentationError> {
        let with_target = |text: Text| match target_language {
            Some(target) => text.with_target_language(target),
            None => text,
        };

        if plain_text.is_empty() {
            return Ok(with_target(Text::new(source_language, Vec::new())?));
        }
        if plain_text.trim().is_empty() {
            let page = Page::from_segments(vec![Segment::new(plain_text)]);
            return Ok(with_target(Text::new(source_language, vec![page])?));
        }

        let op_id = new_op_id();
        let payload = json!({ "text": plain_text });
        let set = self.prompts.load("segmentation", source_language);
        let prompt = build_prompt(
            &set,
            &PromptContext {
                operation: "segmentation",
                source_language,
                target_language,
                payload: &payload,
                hints: &BTreeMap::new(),
                output_instructions: OUTPUT_INSTRUCTIONS,
            },
        );

        let answer: SegmentationAnswer = self
            .gateway
            .request_with(&prompt, &self.options, telemetry, Some(&op_id), |value: Value| {
                serde_json::from_value::<SegmentationAnswer>(value).map_err(|e| e.to_string())
            })
            .await?;

        let pages = reconcile(plain_text, &answer.pages, telemetry, &op_id)?;
        info!("Segmented text into {} page(s)", pages.len());

        let mut text = with_target(Text::new(source_language, pages)?);
        if let Some(title) = answer.title.filter(|t| !t.trim().is_empty()) {
            text = text.with_title(title);
        }
        Ok(text)
    }
}

/// Turn proposed pages into pages whose surfaces rebuild `source` exactly.
fn reconcile(
    source: &str,
    proposed: &[PageAnswer],
    telemetry: &dyn Telemetry,
    op_id: &str,
) -> Result<Vec<Page>, SegmentationError> {
    let exact: String = proposed
        .iter()
        .flat_map(|p| p.segments.iter().map(|s| s.surface.as_str()))
        .collect();
    let has_empty = proposed.iter().any(|p| p.segments.iter().any(|s| s.surface.is_empty()));

    if exact == source && !has_empty && proposed.iter().all(|p| !p.segments.is_empty()) {
        debug!("Segmentation answer matches the source exactly");
        return Ok(proposed
            .iter()
            .map(|page| {
                Page::from_segments(page.segments.iter().map(|s| Segment::new(s.surface.clone())).collect())
            })
            .collect());
    }

    // Whitespace-only proposals carry no boundary information
    let hints: Vec<(usize, String)> = proposed
        .iter()
        .enumerate()
        .flat_map(|(page, p)| p.segments.iter().map(move |s| (page, s.surface.clone())))
        .filter(|(_, surface)| !surface.trim().is_empty())
        .collect();
    let surfaces: Vec<String> = hints.iter().map(|(_, s)| s.clone()).collect();

    let pieces = align_pieces(source, &surfaces, WhitespacePlacement::Attach)
        .filter(|pieces| pieces.len() == hints.len())
        .ok_or_else(|| {
            SegmentationError::Integrity(format!(
                "proposed segments do not match the source text ({} proposed)",
                surfaces.len()
            ))
        })?;

    let mut pages: Vec<Vec<Segment>> = Vec::new();
    let mut current_page = None;
    for ((page, _), piece) in hints.iter().zip(pieces) {
        if current_page != Some(*page) {
            pages.push(Vec::new());
            current_page = Some(*page);
        }
        if let Some(segments) = pages.last_mut() {
            segments.push(Segment::new(piece));
        }
    }

    warn!("Segmentation answer did not match the source; repaired {} segment(s)", hints.len());
    telemetry.event(
        op_id,
        EventLevel::Warn,
        "segmentation repaired",
        Some(&json!({ "segments": hints.len(), "pages": pages.len() })),
    );

    Ok(pages.into_iter().map(Page::from_segments).collect())
}
