/*!
 * Common test utilities for the annotext test suite
 */

use anyhow::Result;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use annotext::annotation::{GenerativeAnnotator, OperationRunner};
use annotext::app_config::{AudioEngine, Config, ProviderKind};
use annotext::document::{Page, Segment, Text, Token};
use annotext::gateway::{Gateway, GatewayOptions, RetryPolicy};
use annotext::pipeline::Pipeline;
use annotext::prompts::PromptLibrary;
use annotext::providers::mock::MockProvider;
use annotext::segmentation::Segmenter;

// Re-export the scripted responder module
pub mod scripted;

pub const SCENARIO_A: &str =
    "A boy once lived with his mother in a house by the sea. The boy's name was Will.";

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Route library logs to the test output; `RUST_LOG=debug` shows gateway retries
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Gateway options with no real waiting, for fast tests
pub fn fast_options() -> GatewayOptions {
    GatewayOptions::default()
        .with_retry(RetryPolicy::immediate(3))
        .with_heartbeat_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
}

/// Mock provider answering every operation through the scripted responder
pub fn scripted_provider() -> MockProvider {
    MockProvider::working().with_responder(scripted::respond)
}

/// Pipeline over `provider` without an audio stage
pub fn pipeline_with(provider: MockProvider) -> Pipeline {
    let gateway = Gateway::new(Arc::new(provider));
    let prompts = Arc::new(PromptLibrary::builtin());
    let segmenter = Segmenter::new(gateway.clone(), prompts.clone(), fast_options());
    let annotator = GenerativeAnnotator::new(gateway, prompts, fast_options());
    Pipeline::new(segmenter, OperationRunner::new(Arc::new(annotator)))
}

/// Runner over `provider` for a single operation
pub fn runner_with(provider: MockProvider) -> OperationRunner {
    let gateway = Gateway::new(Arc::new(provider));
    let annotator = GenerativeAnnotator::new(gateway, Arc::new(PromptLibrary::builtin()), fast_options());
    OperationRunner::new(Arc::new(annotator))
}

/// Configuration that needs no network: Ollama for text, tones for audio
pub fn offline_config(cache_dir: &Path) -> Config {
    let mut config = Config::default();
    config.gateway.provider = ProviderKind::Ollama;
    config.gateway.retry_backoff_ms = 1;
    config.gateway.heartbeat_interval_ms = 10;
    config.audio.engine = AudioEngine::Tone;
    config.audio.fallback_engine = None;
    config.audio.cache_dir = Some(cache_dir.to_path_buf());
    config
}

/// Text after segmentation only: two untokenized segments
pub fn segmented_text() -> Text {
    Text::new(
        "en",
        vec![Page::from_segments(vec![
            Segment::new("A boy once lived with his mother in a house by the sea."),
            Segment::new(" The boy's name was Will."),
        ])],
    )
    .unwrap()
    .with_target_language("fr")
}

/// Tokenized `She put up with the noise.` with tokens 2, 4 and 6 forming one expression
pub fn mwe_text() -> Text {
    let surfaces = ["She", " ", "put", " ", "up", " ", "with", " ", "the", " ", "noise", "."];
    let tokens = surfaces
        .iter()
        .enumerate()
        .map(|(i, surface)| {
            let token = Token::new(*surface);
            if matches!(i, 2 | 4 | 6) {
                token.with_annotation("mwe_id", json!("m1"))
            } else {
                token
            }
        })
        .collect();
    let segment = Segment::from_tokens(tokens)
        .with_annotation("translation", json!("Elle a supporté le bruit."))
        .with_annotation("mwes", json!([{ "id": "m1", "tokens": [2, 4, 6], "label": "put up with" }]));
    Text::new("en", vec![Page::from_segments(vec![segment])])
        .unwrap()
        .with_target_language("fr")
}

/// Text with `count` tokenized one-word segments
pub fn numbered_text(count: usize) -> Text {
    let segments = (0..count)
        .map(|i| Segment::from_tokens(vec![Token::new(format!("word{}", i)), Token::new(".")]))
        .collect();
    Text::new("en", vec![Page::from_segments(segments)])
        .unwrap()
        .with_target_language("fr")
}
