/*!
 * Tests for the audio cache and the audio annotator
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use annotext::annotation::{operations, OperationRunner};
use annotext::audio::{
    AudioAnnotator, AudioCache, AudioKey, AudioLevel, SynthesisBackend, SynthesisRequest, ToneBackend,
};
use annotext::document::{NodePath, Page, Segment, Text, Token};
use annotext::errors::AudioError;
use annotext::telemetry::NullTelemetry;

use crate::common;

/// Speech engine that is always down
#[derive(Debug)]
struct Unavailable;

#[async_trait]
impl SynthesisBackend for Unavailable {
    fn engine(&self) -> &str {
        "speech"
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Bytes, AudioError> {
        Err(AudioError::Backend {
            engine: "speech".to_string(),
            reason: "service unavailable".to_string(),
        })
    }
}

fn repeated_text(count: usize) -> Text {
    let segments = (0..count)
        .map(|_| Segment::from_tokens(vec![Token::new("Sea"), Token::new(".")]))
        .collect();
    Text::new("en", vec![Page::from_segments(segments)]).unwrap()
}

/// Identical clips requested from many segments at once are synthesized once each
#[tokio::test]
async fn test_audioRun_withRepeatedWords_shouldSynthesizeEachClipOnce() {
    let dir = common::create_temp_dir().unwrap();
    let cache = Arc::new(AudioCache::new(dir.path(), Arc::new(ToneBackend::new())).unwrap());
    let runner = OperationRunner::new(Arc::new(AudioAnnotator::new(cache.clone(), "alloy")));

    let outcome = runner
        .run(&repeated_text(12), &operations::audio(true, true), 8, false, &NullTelemetry)
        .await
        .unwrap();

    assert!(outcome.failures.is_empty());
    // One segment clip and one word clip, shared by all twelve segments
    assert_eq!(cache.synthesis_count(), 2);
    let first = outcome.text.token(NodePath::token(0, 0, 0)).unwrap().annotation("audio").cloned();
    let last = outcome.text.token(NodePath::token(0, 11, 0)).unwrap().annotation("audio").cloned();
    assert!(first.is_some());
    assert_eq!(first, last);
    // Punctuation is never voiced
    assert!(outcome.text.token(NodePath::token(0, 0, 1)).unwrap().annotation("audio").is_none());
}

/// A second run finds every clip on disk
#[tokio::test]
async fn test_audioRun_withWarmCache_shouldNotSynthesize() {
    let dir = common::create_temp_dir().unwrap();
    let text = repeated_text(2);
    let spec = operations::audio(true, true);

    let cold = Arc::new(AudioCache::new(dir.path(), Arc::new(ToneBackend::new())).unwrap());
    OperationRunner::new(Arc::new(AudioAnnotator::new(cold.clone(), "alloy")))
        .run(&text, &spec, 2, false, &NullTelemetry)
        .await
        .unwrap();

    let warm = Arc::new(AudioCache::new(dir.path(), Arc::new(ToneBackend::new())).unwrap());
    let outcome = OperationRunner::new(Arc::new(AudioAnnotator::new(warm.clone(), "alloy")))
        .run(&text, &spec, 2, false, &NullTelemetry)
        .await
        .unwrap();

    assert_eq!(cold.synthesis_count(), 2);
    assert_eq!(warm.synthesis_count(), 0);
    assert!(outcome.failures.is_empty());
}

/// A failing primary falls back, and the fallback clip is cached under its own engine
#[tokio::test]
async fn test_getOrSynthesize_withPrimaryDown_shouldUseAndCacheFallback() {
    let dir = common::create_temp_dir().unwrap();
    let key = AudioKey::new(AudioLevel::Token, "en", "alloy", "speech", "tide");

    let cache = AudioCache::new(dir.path(), Arc::new(Unavailable)).unwrap().with_fallback(Arc::new(ToneBackend::new()));
    let reference = cache.get_or_synthesize(&key).await.unwrap();

    assert_eq!(reference.engine, "tone");
    assert!(reference.path.exists());
    assert_ne!(reference.key, key.digest());

    // A fresh instance still tries the primary, then finds the fallback clip on disk
    let again = AudioCache::new(dir.path(), Arc::new(Unavailable)).unwrap().with_fallback(Arc::new(ToneBackend::new()));
    assert_eq!(again.get_or_synthesize(&key).await.unwrap(), reference);
    assert_eq!(again.synthesis_count(), 1);
}

/// Without a fallback the failure surfaces and the segment is reported
#[tokio::test]
async fn test_audioRun_withPrimaryDownAndNoFallback_shouldFailSegments() {
    let dir = common::create_temp_dir().unwrap();
    let cache = Arc::new(AudioCache::new(dir.path(), Arc::new(Unavailable)).unwrap());
    let text = repeated_text(2);

    let outcome = OperationRunner::new(Arc::new(AudioAnnotator::new(cache, "alloy")))
        .run(&text, &operations::audio(true, true), 2, false, &NullTelemetry)
        .await
        .unwrap();

    assert_eq!(outcome.failures.len(), 2);
    assert_eq!(outcome.text, text);
}

/// The content key depends on every input that changes the sound
#[test]
fn test_digest_withDifferentInputs_shouldDiffer() {
    let base = AudioKey::new(AudioLevel::Token, "en", "alloy", "tone", "read");
    let same = AudioKey::new(AudioLevel::Token, "en", "alloy", "tone", "read");
    let past = base.clone().with_lemma(Some("read".to_string()), Some("VERB".to_string()));
    let other_voice = AudioKey::new(AudioLevel::Token, "en", "echo", "tone", "read");
    let segment = AudioKey::new(AudioLevel::Segment, "en", "alloy", "tone", "read");

    assert_eq!(base.digest(), same.digest());
    assert_ne!(base.digest(), past.digest());
    assert_ne!(base.digest(), other_voice.digest());
    assert_ne!(base.digest(), segment.digest());
}
