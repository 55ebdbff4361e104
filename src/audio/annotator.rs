use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::annotation::spec::{OperationSpec, OutputShape, AUDIO_KEY};
use crate::annotation::{Annotator, SegmentJob};
use crate::audio::cache::{AudioCache, AudioReference};
use crate::audio::key::{AudioKey, AudioLevel};
use crate::document::{NodePath, Page, Patch, PatchSet, Text};
use crate::errors::UnitError;
use crate::telemetry::{new_op_id, EventLevel, Telemetry};

/// Annotator that attaches cached audio to segments and lexical tokens.
///
/// All clips of a segment are requested concurrently; the segment fails as a
/// whole if any clip is exhausted, so it never ends up half voiced.
#[derive(Debug, Clone)]
pub struct AudioAnnotator {
    cache: Arc<AudioCache>,
    voice: String,
}

impl AudioAnnotator {
    pub fn new(cache: Arc<AudioCache>, voice: impl Into<String>) -> Self {
        Self {
            cache,
            voice: voice.into(),
        }
    }

    fn key(&self, level: AudioLevel, language: &str, surface: &str) -> AudioKey {
        AudioKey::new(level, language, &self.voice, self.cache.primary_engine(), surface)
    }

    /// Give each page one clip made of its segment clips, in reading order.
    ///
    /// Pages that already carry audio keep it unless `force`. A page with a
    /// spoken segment that has no audio yet is left without page audio; only
    /// a failed join is reported, under the page's first segment.
    pub async fn voice_pages(&self, text: &Text, force: bool, telemetry: &dyn Telemetry) -> PageAudioOutcome {
        let op_id = new_op_id();
        let mut skipped = 0usize;
        let mut jobs: Vec<(usize, AudioKey, Vec<AudioReference>)> = Vec::new();

        for (index, page) in text.pages().iter().enumerate() {
            if !force && page.annotation(AUDIO_KEY).is_some() {
                skipped += 1;
                continue;
            }
            match segment_clips(page) {
                Some(clips) if !clips.is_empty() => {
                    let key = self
                        .key(AudioLevel::Page, text.source_language(), page.surface())
                        .with_parts(clips.iter().map(|clip| clip.key.clone()).collect());
                    jobs.push((index, key, clips));
                }
                _ => {
                    debug!("Page {} has unvoiced segments, no page audio", index);
                    skipped += 1;
                }
            }
        }

        let results = join_all(jobs.iter().map(|(_, key, clips)| self.cache.get_or_join(key, clips))).await;

        let mut voiced = text.clone();
        let mut failures = Vec::new();
        for ((index, _, _), result) in jobs.iter().zip(results) {
            match result {
                Ok(reference) => {
                    if let Some(page) = voiced.pages_mut().get_mut(*index) {
                        page.annotations_mut().insert(AUDIO_KEY.to_string(), reference.to_value());
                    }
                }
                Err(error) => {
                    warn!("Page {} audio failed: {}", index, error);
                    telemetry.event(
                        &op_id,
                        EventLevel::Warn,
                        "page audio failed",
                        Some(&json!({ "page": index, "error": error.to_string() })),
                    );
                    failures.push((NodePath::segment(*index, 0), format!("page audio: {}", error)));
                }
            }
        }

        let joined = jobs.len() - failures.len();
        info!("Joined audio for {} page(s), {} left as they were", joined, skipped);
        PageAudioOutcome {
            text: voiced,
            joined,
            skipped,
            failures,
        }
    }
}

/// Result of `AudioAnnotator::voice_pages`
#[derive(Debug, Clone)]
pub struct PageAudioOutcome {
    pub text: Text,
    pub joined: usize,
    pub skipped: usize,
    pub failures: Vec<(NodePath, String)>,
}

/// Clips of every spoken segment of a page, or `None` if one is missing.
/// Whitespace-only segments without audio are passed over.
fn segment_clips(page: &Page) -> Option<Vec<AudioReference>> {
    let mut clips = Vec::new();
    for segment in page.segments() {
        match segment.annotation(AUDIO_KEY) {
            Some(value) => clips.push(serde_json::from_value(value.clone()).ok()?),
            None if segment.surface().trim().is_empty() => {}
            None => return None,
        }
    }
    Some(clips)
}

fn annotation_str(annotations: Option<&Value>) -> Option<String> {
    annotations.and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl Annotator for AudioAnnotator {
    async fn annotate(
        &self,
        spec: &OperationSpec,
        job: &SegmentJob,
        telemetry: &dyn Telemetry,
    ) -> Result<PatchSet, UnitError> {
        if !matches!(spec.output, OutputShape::Audio { .. }) {
            return Err(UnitError::Unsupported(format!("{} is not an audio operation", spec.name)));
        }

        let mut targets: Vec<(NodePath, AudioKey)> = Vec::new();
        if job.segment_pending {
            targets.push((job.path, self.key(AudioLevel::Segment, &job.source_language, job.segment.surface())));
        }
        let tokens = job.segment.tokens().unwrap_or_default();
        for unit in &job.units {
            for &index in &unit.tokens {
                let Some(token) = tokens.get(index) else { continue };
                let key = self
                    .key(AudioLevel::Token, &job.source_language, token.surface())
                    .with_lemma(annotation_str(token.annotation("lemma")), annotation_str(token.annotation("pos")));
                targets.push((NodePath::token(job.path.page, job.path.segment, index), key));
            }
        }

        let references = try_join_all(targets.iter().map(|(_, key)| self.cache.get_or_synthesize(key))).await?;

        telemetry.event(
            &job.op_id,
            EventLevel::Debug,
            "audio attached",
            Some(&json!({ "path": job.path.to_string(), "clips": references.len() })),
        );

        Ok(targets
            .into_iter()
            .zip(references)
            .map(|((path, _), reference)| (path, Patch::new().with(AUDIO_KEY, reference.to_value())))
            .collect())
    }
}
