/*!
 * Content-addressed, single-flight audio cache.
 *
 * Entries live in one directory as `{digest}.wav` plus a `{digest}.json`
 * sidecar describing the clip. Concurrent requests for one key share a
 * single synthesis through a per-key `OnceCell`; different keys never wait
 * on each other. Only validated audio is ever written.
 */

use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::OnceCell;

use crate::audio::backend::{SynthesisBackend, SynthesisRequest};
use crate::audio::key::{AudioKey, AudioLevel};
use crate::audio::wav::{self, wav_duration_ms};
use crate::errors::AudioError;

/// Where a clip is and what it says
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioReference {
    pub path: PathBuf,
    pub surface: String,
    pub engine: String,
    pub voice: String,
    pub language: String,
    pub level: AudioLevel,
    pub duration_ms: u64,
    /// Digest the file is stored under
    pub key: String,
}

impl AudioReference {
    /// Annotation value written into the document
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Audio cache in front of a primary and an optional fallback backend
#[derive(Debug)]
pub struct AudioCache {
    dir: PathBuf,
    primary: Arc<dyn SynthesisBackend>,
    fallback: Option<Arc<dyn SynthesisBackend>>,
    min_duration: Duration,
    inflight: Mutex<HashMap<String, Arc<OnceCell<AudioReference>>>>,
    synthesis_calls: AtomicUsize,
}

impl AudioCache {
    /// Create a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, primary: Arc<dyn SynthesisBackend>) -> Result<Self, AudioError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            primary,
            fallback: None,
            min_duration: Duration::from_millis(50),
            inflight: Mutex::new(HashMap::new()),
            synthesis_calls: AtomicUsize::new(0),
        })
    }

    /// Backend tried once when the primary fails or produces unusable audio
    pub fn with_fallback(mut self, fallback: Arc<dyn SynthesisBackend>) -> Self {
        if fallback.engine() != self.primary.engine() {
            self.fallback = Some(fallback);
        }
        self
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Engine name callers should put in their keys
    pub fn primary_engine(&self) -> &str {
        self.primary.engine()
    }

    /// Backend calls made so far, fallback included
    pub fn synthesis_count(&self) -> usize {
        self.synthesis_calls.load(Ordering::SeqCst)
    }

    /// Cached clip for `key`, synthesizing it with the primary backend if needed.
    pub async fn get_or_synthesize(&self, key: &AudioKey) -> Result<AudioReference, AudioError> {
        let primary = Arc::clone(&self.primary);
        self.get_or_synthesize_with(key, move |request| async move { primary.synthesize(&request).await })
            .await
    }

    /// Cached clip for `key`, produced by `synthesize` on a miss.
    ///
    /// Callers racing on the same key wait for the first one and receive the
    /// same reference. A failed attempt leaves nothing behind, so the next
    /// caller tries again.
    pub async fn get_or_synthesize_with<F, Fut>(
        &self,
        key: &AudioKey,
        synthesize: F,
    ) -> Result<AudioReference, AudioError>
    where
        F: FnOnce(SynthesisRequest) -> Fut,
        Fut: Future<Output = Result<Bytes, AudioError>>,
    {
        self.get_or_create(key, synthesize, true).await
    }

    /// Cached clip for `key`, made by joining `clips` end to end on a miss.
    ///
    /// A join that fails is never handed to the fallback backend.
    pub async fn get_or_join(&self, key: &AudioKey, clips: &[AudioReference]) -> Result<AudioReference, AudioError> {
        let paths: Vec<PathBuf> = clips.iter().map(|clip| clip.path.clone()).collect();
        self.get_or_create(
            key,
            move |_| async move {
                let mut parts = Vec::with_capacity(paths.len());
                for path in &paths {
                    match tokio::fs::read(path).await {
                        Ok(bytes) => parts.push(bytes),
                        Err(error) => return Err(AudioError::from(error)),
                    }
                }
                wav::concat(&parts).map(Bytes::from)
            },
            false,
        )
        .await
    }

    async fn get_or_create<F, Fut>(
        &self,
        key: &AudioKey,
        synthesize: F,
        use_fallback: bool,
    ) -> Result<AudioReference, AudioError>
    where
        F: FnOnce(SynthesisRequest) -> Fut,
        Fut: Future<Output = Result<Bytes, AudioError>>,
    {
        let digest = key.digest();
        let cell = {
            let mut inflight = self.inflight.lock();
            Arc::clone(inflight.entry(digest.clone()).or_default())
        };

        let reference = cell
            .get_or_try_init(|| self.load_or_create(key, &digest, synthesize, use_fallback))
            .await?;
        Ok(reference.clone())
    }

    async fn load_or_create<F, Fut>(
        &self,
        key: &AudioKey,
        digest: &str,
        synthesize: F,
        use_fallback: bool,
    ) -> Result<AudioReference, AudioError>
    where
        F: FnOnce(SynthesisRequest) -> Fut,
        Fut: Future<Output = Result<Bytes, AudioError>>,
    {
        if let Some(reference) = self.read_entry(digest) {
            debug!("Audio cache hit for {:?} ({})", key.surface, digest);
            return Ok(reference);
        }

        self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
        let primary_error = match synthesize(SynthesisRequest::from(key)).await {
            Ok(audio) => match self.validate(&audio) {
                Ok(duration_ms) => return self.write_entry(key, digest, &audio, duration_ms),
                Err(error) => error,
            },
            Err(error) => error,
        };
        warn!("Primary synthesis for {:?} failed: {}", key.surface, primary_error);

        let Some(fallback) = self.fallback.as_ref().filter(|_| use_fallback) else {
            return Err(AudioError::Exhausted {
                key: digest.to_string(),
                reason: primary_error.to_string(),
            });
        };

        // Fallback audio is stored under its own engine's key, never the primary one
        let fallback_key = key.with_engine(fallback.engine());
        let fallback_digest = fallback_key.digest();
        if let Some(reference) = self.read_entry(&fallback_digest) {
            return Ok(reference);
        }

        self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
        let fallback_result = fallback
            .synthesize(&SynthesisRequest::from(&fallback_key))
            .await
            .and_then(|audio| self.validate(&audio).map(|duration_ms| (audio, duration_ms)));

        match fallback_result {
            Ok((audio, duration_ms)) => self.write_entry(&fallback_key, &fallback_digest, &audio, duration_ms),
            Err(fallback_error) => Err(AudioError::Exhausted {
                key: digest.to_string(),
                reason: format!("primary: {}; fallback: {}", primary_error, fallback_error),
            }),
        }
    }

    fn validate(&self, audio: &[u8]) -> Result<u64, AudioError> {
        if audio.is_empty() {
            return Err(AudioError::Validation("empty audio".to_string()));
        }
        let duration_ms = wav_duration_ms(audio)
            .ok_or_else(|| AudioError::Validation("not a readable WAV file".to_string()))?;
        if duration_ms < self.min_duration.as_millis() as u64 {
            return Err(AudioError::Validation(format!(
                "clip lasts {} ms, below the {} ms minimum",
                duration_ms,
                self.min_duration.as_millis()
            )));
        }
        Ok(duration_ms)
    }

    fn wav_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", digest))
    }

    fn sidecar_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.json", digest))
    }

    fn read_entry(&self, digest: &str) -> Option<AudioReference> {
        let sidecar = std::fs::read_to_string(self.sidecar_path(digest)).ok()?;
        let reference: AudioReference = match serde_json::from_str(&sidecar) {
            Ok(reference) => reference,
            Err(e) => {
                warn!("Ignoring unreadable audio sidecar for {}: {}", digest, e);
                return None;
            }
        };
        let present = std::fs::metadata(&reference.path).map(|m| m.len() > 0).unwrap_or(false);
        present.then_some(reference)
    }

    fn write_entry(
        &self,
        key: &AudioKey,
        digest: &str,
        audio: &[u8],
        duration_ms: u64,
    ) -> Result<AudioReference, AudioError> {
        let path = self.wav_path(digest);
        write_atomically(&self.dir, &path, audio)?;

        let reference = AudioReference {
            path,
            surface: key.surface.clone(),
            engine: key.engine.clone(),
            voice: key.voice.clone(),
            language: key.language.clone(),
            level: key.level,
            duration_ms,
            key: digest.to_string(),
        };
        let sidecar = serde_json::to_vec_pretty(&reference).map_err(|e| AudioError::Io(e.to_string()))?;
        // Sidecar last: its presence marks a complete entry
        write_atomically(&self.dir, &self.sidecar_path(digest), &sidecar)?;

        debug!("Cached {} ms of {} audio for {:?}", duration_ms, key.engine, key.surface);
        Ok(reference)
    }
}

fn write_atomically(dir: &Path, target: &Path, contents: &[u8]) -> Result<(), AudioError> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.persist(target).map_err(|e| AudioError::Io(e.error.to_string()))?;
    Ok(())
}
