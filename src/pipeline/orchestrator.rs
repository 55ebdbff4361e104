/*!
 * Stage sequencing.
 *
 * The pipeline runs a contiguous range of the fixed stage order over a text.
 * Entering at any stage first strips whatever the stages after it wrote
 * before, since those results may no longer match the upstream annotations
 * they were derived from.
 */

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::annotation::operations;
use crate::annotation::{OperationOutcome, OperationRunner, OperationSpec, RunControl};
use crate::audio::AudioAnnotator;
use crate::document::{NodePath, Text};
use crate::errors::PipelineError;
use crate::language_utils::romanization_for;
use crate::segmentation::Segmenter;
use crate::telemetry::{new_op_id, EventLevel, Telemetry};

/// Pipeline stages in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SegmentationPhase1,
    SegmentationPhase2,
    Translation,
    Mwe,
    Lemma,
    Gloss,
    Romanization,
    Audio,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::SegmentationPhase1,
        Stage::SegmentationPhase2,
        Stage::Translation,
        Stage::Mwe,
        Stage::Lemma,
        Stage::Gloss,
        Stage::Romanization,
        Stage::Audio,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SegmentationPhase1 => "segmentation_phase_1",
            Self::SegmentationPhase2 => "segmentation_phase_2",
            Self::Translation => "translation",
            Self::Mwe => "mwe",
            Self::Lemma => "lemma",
            Self::Gloss => "gloss",
            Self::Romanization => "romanization",
            Self::Audio => "audio",
        }
    }

    /// Page-level keys written by this stage
    fn page_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Audio => &["audio"],
            _ => &[],
        }
    }

    /// Segment-level keys written by this stage
    fn segment_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Translation => &["translation"],
            Self::Mwe => &["mwes"],
            Self::Audio => &["audio"],
            _ => &[],
        }
    }

    /// Token-level keys written by this stage
    fn token_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Mwe => &["mwe_id"],
            Self::Lemma => &["lemma", "pos"],
            Self::Gloss => &["gloss"],
            Self::Romanization => &["pinyin", "jyutping"],
            Self::Audio => &["audio"],
            _ => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "segmentation_phase_1" | "segmentation" | "segment" => Ok(Self::SegmentationPhase1),
            "segmentation_phase_2" | "tokenize" | "tokens" => Ok(Self::SegmentationPhase2),
            "translation" | "translate" => Ok(Self::Translation),
            "mwe" | "mwes" => Ok(Self::Mwe),
            "lemma" => Ok(Self::Lemma),
            "gloss" => Ok(Self::Gloss),
            "romanization" | "pinyin" | "jyutping" => Ok(Self::Romanization),
            "audio" => Ok(Self::Audio),
            _ => Err(PipelineError::InvalidRange(format!("unknown stage '{}'", s))),
        }
    }
}

/// What the pipeline starts from
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// Raw text; only valid when starting at segmentation
    PlainText {
        text: String,
        source_language: String,
        target_language: Option<String>,
    },
    /// A description to write a new text from; only valid when starting at segmentation
    Description {
        description: String,
        source_language: String,
        target_language: Option<String>,
    },
    /// A text already annotated up to the stage before the start
    Text(Text),
}

/// Run-wide knobs
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency_limit: usize,
    /// Redo work even where results already exist
    pub force: bool,
    pub audio_segments: bool,
    pub audio_tokens: bool,
    /// Join each page's segment clips after the audio stage
    pub audio_pages: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            force: false,
            audio_segments: true,
            audio_tokens: true,
            audio_pages: true,
        }
    }
}

/// What happened in one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub dispatched: usize,
    pub skipped: usize,
    pub failures: Vec<(NodePath, String)>,
    /// Why the stage did nothing, when it did nothing on purpose
    pub note: Option<String>,
}

impl StageReport {
    fn from_outcome(stage: Stage, outcome: &OperationOutcome) -> Self {
        Self {
            stage,
            dispatched: outcome.dispatched,
            skipped: outcome.skipped,
            failures: outcome.failures.clone(),
            note: None,
        }
    }

    fn skipped(stage: Stage, note: impl Into<String>) -> Self {
        Self {
            stage,
            dispatched: 0,
            skipped: 0,
            failures: Vec::new(),
            note: Some(note.into()),
        }
    }
}

/// Final text plus per-stage reports
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub text: Text,
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// Every failed path across stages
    pub fn failures(&self) -> Vec<(Stage, NodePath, String)> {
        self.stages
            .iter()
            .flat_map(|report| {
                report
                    .failures
                    .iter()
                    .map(move |(path, reason)| (report.stage, *path, reason.clone()))
            })
            .collect()
    }

    /// One line per stage
    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(|report| match &report.note {
                Some(note) => format!("{:<22} skipped: {}", report.stage.name(), note),
                None => format!(
                    "{:<22} {} dispatched, {} already done, {} failed",
                    report.stage.name(),
                    report.dispatched,
                    report.skipped,
                    report.failures.len()
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Stage sequencer
#[derive(Clone)]
pub struct Pipeline {
    segmenter: Segmenter,
    runner: OperationRunner,
    audio_runner: Option<OperationRunner>,
    page_audio: Option<AudioAnnotator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(segmenter: Segmenter, runner: OperationRunner) -> Self {
        Self {
            segmenter,
            runner,
            audio_runner: None,
            page_audio: None,
            options: PipelineOptions::default(),
        }
    }

    /// Enable the audio stage with the given runner (usually over an `AudioAnnotator`)
    pub fn with_audio(mut self, audio_runner: OperationRunner) -> Self {
        self.audio_runner = Some(audio_runner);
        self
    }

    /// Join segment clips into page clips at the end of the audio stage
    pub fn with_page_audio(mut self, annotator: AudioAnnotator) -> Self {
        self.page_audio = Some(annotator);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run stages `start..=end`.
    pub async fn run(
        &self,
        input: PipelineInput,
        start: Stage,
        end: Stage,
        telemetry: &dyn Telemetry,
    ) -> Result<PipelineReport, PipelineError> {
        self.run_with_control(input, start, end, telemetry, &RunControl::new()).await
    }

    /// Run stages `start..=end` under `control`.
    pub async fn run_with_control(
        &self,
        input: PipelineInput,
        start: Stage,
        end: Stage,
        telemetry: &dyn Telemetry,
        control: &RunControl,
    ) -> Result<PipelineReport, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidRange(format!("{} comes after {}", start, end)));
        }

        let run_id = new_op_id();
        telemetry.event(
            &run_id,
            EventLevel::Info,
            "pipeline started",
            Some(&serde_json::json!({ "start": start.name(), "end": end.name() })),
        );

        let mut stages = Vec::new();
        let mut text = match (start, input) {
            (
                Stage::SegmentationPhase1,
                PipelineInput::PlainText {
                    text,
                    source_language,
                    target_language,
                },
            ) => {
                let text = self
                    .segmenter
                    .segment(&text, &source_language, target_language.as_deref(), telemetry)
                    .await?;
                stages.push(StageReport {
                    stage: Stage::SegmentationPhase1,
                    dispatched: 1,
                    skipped: 0,
                    failures: Vec::new(),
                    note: None,
                });
                text
            }
            (
                Stage::SegmentationPhase1,
                PipelineInput::Description {
                    description,
                    source_language,
                    target_language,
                },
            ) => {
                let generated = self
                    .segmenter
                    .generate(&description, &source_language, target_language.as_deref(), telemetry)
                    .await?;
                let mut text = self
                    .segmenter
                    .segment(&generated.surface, &source_language, target_language.as_deref(), telemetry)
                    .await?;
                if let Some(title) = generated.title.filter(|t| !t.trim().is_empty()) {
                    text = text.with_title(title);
                }
                stages.push(StageReport {
                    stage: Stage::SegmentationPhase1,
                    dispatched: 2,
                    skipped: 0,
                    failures: Vec::new(),
                    note: None,
                });
                text
            }
            (Stage::SegmentationPhase1, PipelineInput::Text(_)) => {
                return Err(PipelineError::MissingInput(
                    "segmentation starts from plain text or a description".to_string(),
                ));
            }
            (_, PipelineInput::PlainText { .. } | PipelineInput::Description { .. }) => {
                return Err(PipelineError::MissingInput(format!(
                    "starting at {} needs a segmented text",
                    start
                )));
            }
            (_, PipelineInput::Text(text)) => clear_from(&text, start),
        };

        for stage in Stage::ALL.into_iter().filter(|s| *s > Stage::SegmentationPhase1 && *s >= start && *s <= end) {
            let mut report = match self.spec_for(stage, &text) {
                Ok((spec, runner)) => {
                    info!("Stage {} starting", stage);
                    let outcome = runner
                        .run_with_control(&text, &spec, self.options.concurrency_limit, self.options.force, telemetry, control)
                        .await?;
                    let report = StageReport::from_outcome(stage, &outcome);
                    text = outcome.text;
                    report
                }
                Err(note) => {
                    warn!("Stage {} skipped: {}", stage, note);
                    StageReport::skipped(stage, note)
                }
            };
            if stage == Stage::Audio && self.options.audio_pages {
                if let Some(page_audio) = &self.page_audio {
                    let outcome = page_audio.voice_pages(&text, self.options.force, telemetry).await;
                    report.failures.extend(outcome.failures);
                    text = outcome.text;
                }
            }
            if !report.failures.is_empty() {
                warn!("Stage {} finished with {} failed segment(s)", stage, report.failures.len());
            }
            stages.push(report);
        }

        telemetry.event(&run_id, EventLevel::Info, "pipeline finished", None);
        Ok(PipelineReport { text, stages })
    }

    /// Descriptor and runner for a stage, or why the stage does not apply
    fn spec_for(&self, stage: Stage, text: &Text) -> Result<(OperationSpec, &OperationRunner), String> {
        let spec = match stage {
            Stage::SegmentationPhase1 => return Err("handled by the segmenter".to_string()),
            Stage::SegmentationPhase2 => operations::tokenize(),
            Stage::Translation => {
                if text.target_language().is_none() {
                    return Err("text has no target language".to_string());
                }
                operations::translation()
            }
            Stage::Mwe => operations::mwe(),
            Stage::Lemma => operations::lemma(),
            Stage::Gloss => {
                if text.target_language().is_none() {
                    return Err("text has no target language".to_string());
                }
                operations::gloss()
            }
            Stage::Romanization => match romanization_for(text.source_language()) {
                Some(scheme) => operations::romanization(scheme),
                None => return Err(format!("no romanization for '{}'", text.source_language())),
            },
            Stage::Audio => {
                let runner = self
                    .audio_runner
                    .as_ref()
                    .ok_or_else(|| "audio synthesis is not configured".to_string())?;
                if !self.options.audio_segments && !self.options.audio_tokens {
                    return Err("segment and token audio are both disabled".to_string());
                }
                return Ok((operations::audio(self.options.audio_segments, self.options.audio_tokens), runner));
            }
        };
        Ok((spec, &self.runner))
    }
}

/// Copy of `text` without anything written by stages after `start`.
///
/// The start stage keeps its own results so an interrupted stage resumes
/// where it stopped; `force` decides whether they are recomputed. Entering
/// at tokenization drops the token lists, and with them every token key.
fn clear_from(text: &Text, start: Stage) -> Text {
    let stale: Vec<Stage> = Stage::ALL.into_iter().filter(|s| *s > start).collect();
    let page_keys: Vec<&str> = stale.iter().flat_map(|s| s.page_keys().iter().copied()).collect();
    let segment_keys: Vec<&str> = stale.iter().flat_map(|s| s.segment_keys().iter().copied()).collect();
    let token_keys: Vec<&str> = stale.iter().flat_map(|s| s.token_keys().iter().copied()).collect();
    text.cleared(&page_keys, &segment_keys, &token_keys, start <= Stage::SegmentationPhase2)
}
