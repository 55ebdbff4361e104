/*!
 * Content addressing for synthesized audio.
 */

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Level of the node an audio clip belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioLevel {
    Token,
    Segment,
    Page,
}

impl fmt::Display for AudioLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Segment => write!(f, "segment"),
            Self::Page => write!(f, "page"),
        }
    }
}

/// Everything that determines a clip's content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioKey {
    pub level: AudioLevel,
    pub language: String,
    pub voice: String,
    pub engine: String,
    pub surface: String,
    /// Disambiguates homographs ("lead" the verb and "lead" the metal)
    pub lemma: Option<String>,
    pub pos: Option<String>,
    /// Digests of the clips a joined clip is made from, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<String>,
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl AudioKey {
    pub fn new(
        level: AudioLevel,
        language: impl Into<String>,
        voice: impl Into<String>,
        engine: impl Into<String>,
        surface: impl Into<String>,
    ) -> Self {
        Self {
            level,
            language: language.into(),
            voice: voice.into(),
            engine: engine.into(),
            surface: surface.into(),
            lemma: None,
            pos: None,
            parts: Vec::new(),
        }
    }

    pub fn with_lemma(mut self, lemma: Option<String>, pos: Option<String>) -> Self {
        self.lemma = lemma;
        self.pos = pos;
        self
    }

    pub fn with_parts(mut self, parts: Vec<String>) -> Self {
        self.parts = parts;
        self
    }

    /// Same content rendered by another engine
    pub fn with_engine(&self, engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
            ..self.clone()
        }
    }

    /// Text handed to the synthesizer
    pub fn spoken_text(&self) -> String {
        normalize(&self.surface)
    }

    /// Hex SHA-256 over the normalized fields.
    ///
    /// Whitespace is collapsed and codes are lowercased so trivially
    /// different spellings of the same request share one entry.
    pub fn digest(&self) -> String {
        let fields = [
            self.level.to_string(),
            self.language.trim().to_lowercase(),
            self.voice.trim().to_lowercase(),
            self.engine.trim().to_lowercase(),
            normalize(&self.surface),
            self.lemma.as_deref().map(normalize).unwrap_or_default(),
            self.pos.as_deref().map(|p| p.trim().to_uppercase()).unwrap_or_default(),
        ];

        let mut hasher = Sha256::new();
        hasher.update(b"annotext-audio-v1");
        for field in &fields {
            hasher.update([0x1f]);
            hasher.update(field.as_bytes());
        }
        for part in &self.parts {
            hasher.update([0x1e]);
            hasher.update(part.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }
}
