/*!
 * Speech synthesis backends.
 *
 * - `SpeechApiBackend`: OpenAI-compatible `/audio/speech` endpoint
 * - `ToneBackend`: deterministic offline tone, one pitch per text; used as
 *   the fallback and in tests
 */

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::time::Duration;

use crate::audio::key::AudioKey;
use crate::audio::wav::encode_pcm16;
use crate::errors::AudioError;
use crate::providers::{ensure_success, transport_error};

/// What a backend is asked to say
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub voice: String,
}

impl From<&AudioKey> for SynthesisRequest {
    fn from(key: &AudioKey) -> Self {
        Self {
            text: key.spoken_text(),
            language: key.language.clone(),
            voice: key.voice.clone(),
        }
    }
}

/// A text-to-speech engine producing WAV bytes
#[async_trait]
pub trait SynthesisBackend: Send + Sync + Debug {
    /// Engine name, part of every cache key
    fn engine(&self) -> &str;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, AudioError>;
}

/// Client for an OpenAI-compatible speech endpoint
#[derive(Debug)]
pub struct SpeechApiBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

impl SpeechApiBackend {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout_ms: timeout_secs * 1000,
        }
    }

    fn api_url(&self) -> String {
        if self.endpoint.is_empty() {
            "https://api.openai.com/v1/audio/speech".to_string()
        } else {
            format!("{}/audio/speech", self.endpoint.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl SynthesisBackend for SpeechApiBackend {
    fn engine(&self) -> &str {
        "speech"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, AudioError> {
        let failed = |reason: String| AudioError::Backend {
            engine: self.engine().to_string(),
            reason,
        };

        let body = SpeechRequest {
            model: &self.model,
            voice: &request.voice,
            input: &request.text,
            response_format: "wav",
        };

        debug!("Speech request to {} ({} chars)", self.api_url(), request.text.chars().count());
        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(transport_error(e, self.timeout_ms).to_string()))?;

        let response = ensure_success("Speech", response)
            .await
            .map_err(|e| failed(e.to_string()))?;

        response.bytes().await.map_err(|e| failed(e.to_string()))
    }
}

/// Offline backend rendering a short sine tone per request.
///
/// Pitch is derived from the text, length from its character count, so the
/// same request always yields the same bytes.
#[derive(Debug, Clone)]
pub struct ToneBackend {
    sample_rate: u32,
    ms_per_char: u64,
}

impl Default for ToneBackend {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            ms_per_char: 60,
        }
    }
}

impl ToneBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(&self, text: &str) -> Vec<u8> {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count() as u64;
        let duration_ms = (chars * self.ms_per_char).clamp(200, 10_000);
        let frames = (self.sample_rate as u64 * duration_ms / 1000) as usize;

        let seed = Sha256::digest(text.as_bytes());
        let frequency = 220.0 + f64::from(u16::from_be_bytes([seed[0], seed[1]]) % 440);
        let rate = f64::from(self.sample_rate);
        let fade = (frames / 20).max(1);

        let samples: Vec<i16> = (0..frames)
            .map(|i| {
                let envelope = (i.min(frames - 1 - i).min(fade) as f64) / fade as f64;
                let phase = 2.0 * std::f64::consts::PI * frequency * i as f64 / rate;
                (phase.sin() * envelope * 0.3 * f64::from(i16::MAX)) as i16
            })
            .collect();

        encode_pcm16(&samples, self.sample_rate)
    }
}

#[async_trait]
impl SynthesisBackend for ToneBackend {
    fn engine(&self) -> &str {
        "tone"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Bytes, AudioError> {
        if request.text.trim().is_empty() {
            return Err(AudioError::Backend {
                engine: self.engine().to_string(),
                reason: "nothing to say".to_string(),
            });
        }
        Ok(Bytes::from(self.render(&request.text)))
    }
}
