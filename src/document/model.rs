/*!
 * Core document model: Text → Page → Segment → Token.
 *
 * Surfaces are fixed at construction and only readable afterwards. Every
 * node carries an open annotation map that stages grow through `merge`.
 * Parsing from JSON validates the concatenation invariant at every level.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::document::NodePath;
use crate::errors::DocumentError;

/// Open annotation map shared by every node kind
pub type Annotations = BTreeMap<String, Value>;

/// Smallest unit: a word, a punctuation mark or a whitespace run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    surface: String,

    #[serde(default)]
    annotations: Annotations,
}

impl Token {
    /// Create a token with no annotations.
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            annotations: Annotations::new(),
        }
    }

    /// Attach an annotation while building test or fixture trees.
    pub fn with_annotation(mut self, key: &str, value: Value) -> Self {
        self.annotations.insert(key.to_string(), value);
        self
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.get(key)
    }

    /// Whether the token carries lexical content (letters, digits or CJK).
    ///
    /// Whitespace and punctuation tokens never get lemma, gloss or audio.
    pub fn is_lexical(&self) -> bool {
        self.surface.chars().any(char::is_alphanumeric)
    }

    pub(crate) fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

/// A sentence-sized chunk of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    surface: String,

    /// Absent until the tokenization stage has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tokens: Option<Vec<Token>>,

    #[serde(default)]
    annotations: Annotations,
}

impl Segment {
    /// Create an untokenized segment.
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            tokens: None,
            annotations: Annotations::new(),
        }
    }

    /// Create a tokenized segment whose surface is the concatenation of its tokens.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let surface = tokens.iter().map(Token::surface).collect();
        Self {
            surface,
            tokens: Some(tokens),
            annotations: Annotations::new(),
        }
    }

    pub fn with_annotation(mut self, key: &str, value: Value) -> Self {
        self.annotations.insert(key.to_string(), value);
        self
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn tokens(&self) -> Option<&[Token]> {
        self.tokens.as_deref()
    }

    pub fn is_tokenized(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.get(key)
    }

    pub(crate) fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }

    pub(crate) fn tokens_mut(&mut self) -> Option<&mut Vec<Token>> {
        self.tokens.as_mut()
    }

    pub(crate) fn set_tokens(&mut self, tokens: Option<Vec<Token>>) {
        self.tokens = tokens;
    }

    fn validate(&self, path: &str) -> Result<(), DocumentError> {
        if let Some(tokens) = &self.tokens {
            let joined: String = tokens.iter().map(Token::surface).collect();
            if joined != self.surface {
                return Err(DocumentError::Concatenation {
                    path: path.to_string(),
                    expected: self.surface.clone(),
                    actual: joined,
                });
            }
        }
        Ok(())
    }
}

/// One page of a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    surface: String,

    #[serde(default)]
    segments: Vec<Segment>,

    #[serde(default)]
    annotations: Annotations,
}

impl Page {
    /// Create a page whose surface is the concatenation of its segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let surface = segments.iter().map(Segment::surface).collect();
        Self {
            surface,
            segments,
            annotations: Annotations::new(),
        }
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.get(key)
    }

    pub(crate) fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }

    pub(crate) fn segments_mut(&mut self) -> &mut Vec<Segment> {
        &mut self.segments
    }

    fn validate(&self, page_index: usize) -> Result<(), DocumentError> {
        let joined: String = self.segments.iter().map(Segment::surface).collect();
        if joined != self.surface {
            return Err(DocumentError::Concatenation {
                path: format!("p{}", page_index),
                expected: self.surface.clone(),
                actual: joined,
            });
        }
        for (segment_index, segment) in self.segments.iter().enumerate() {
            segment.validate(&NodePath::segment(page_index, segment_index).to_string())?;
        }
        Ok(())
    }
}

/// Root of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    /// Language the text is written in
    #[serde(rename = "l2")]
    source_language: String,

    /// Language translations and glosses are written in
    #[serde(rename = "l1", default, skip_serializing_if = "Option::is_none")]
    target_language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,

    #[serde(default)]
    pages: Vec<Page>,

    #[serde(default)]
    annotations: Annotations,
}

impl Text {
    /// Build a text from pages, rejecting trees that break concatenation.
    pub fn new(source_language: impl Into<String>, pages: Vec<Page>) -> Result<Self, DocumentError> {
        let text = Self {
            source_language: source_language.into(),
            target_language: None,
            title: None,
            pages,
            annotations: Annotations::new(),
        };
        text.validate()?;
        Ok(text)
    }

    /// Parse and validate a text from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let text: Text =
            serde_json::from_str(json).map_err(|e| DocumentError::Json(e.to_string()))?;
        text.validate()?;
        Ok(text)
    }

    /// Validate a text from an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let text: Text =
            serde_json::from_value(value).map_err(|e| DocumentError::Json(e.to_string()))?;
        text.validate()?;
        Ok(text)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).map_err(|e| DocumentError::Json(e.to_string()))
    }

    pub fn with_target_language(mut self, target_language: impl Into<String>) -> Self {
        self.target_language = Some(target_language.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Check the concatenation invariant on every page and segment.
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (page_index, page) in self.pages.iter().enumerate() {
            page.validate(page_index)?;
        }
        Ok(())
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn target_language(&self) -> Option<&str> {
        self.target_language.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Full text, reassembled from the pages.
    pub fn surface(&self) -> String {
        self.pages.iter().map(Page::surface).collect()
    }

    /// Every segment with its path, in document order.
    pub fn segments(&self) -> impl Iterator<Item = (NodePath, &Segment)> {
        self.pages.iter().enumerate().flat_map(|(page_index, page)| {
            page.segments
                .iter()
                .enumerate()
                .map(move |(segment_index, segment)| {
                    (NodePath::segment(page_index, segment_index), segment)
                })
        })
    }

    pub fn segment(&self, path: NodePath) -> Option<&Segment> {
        self.pages.get(path.page)?.segments.get(path.segment)
    }

    pub fn token(&self, path: NodePath) -> Option<&Token> {
        self.segment(path)?.tokens()?.get(path.token?)
    }

    pub fn segment_count(&self) -> usize {
        self.pages.iter().map(|p| p.segments.len()).sum()
    }

    pub(crate) fn pages_mut(&mut self) -> &mut Vec<Page> {
        &mut self.pages
    }

    pub(crate) fn segment_mut(&mut self, path: NodePath) -> Option<&mut Segment> {
        self.pages.get_mut(path.page)?.segments.get_mut(path.segment)
    }

    /// Copy of the text with the given keys dropped from pages, segments and
    /// tokens, and optionally with all tokens removed.
    pub(crate) fn cleared(
        &self,
        page_keys: &[&str],
        segment_keys: &[&str],
        token_keys: &[&str],
        drop_tokens: bool,
    ) -> Text {
        let mut text = self.clone();
        for page in text.pages_mut() {
            page.annotations_mut().retain(|k, _| !page_keys.contains(&k.as_str()));
            for segment in page.segments_mut() {
                if drop_tokens {
                    segment.set_tokens(None);
                }
                segment.annotations_mut().retain(|k, _| !segment_keys.contains(&k.as_str()));
                if let Some(tokens) = segment.tokens_mut() {
                    for token in tokens {
                        token.annotations_mut().retain(|k, _| !token_keys.contains(&k.as_str()));
                    }
                }
            }
        }
        text
    }

    /// Copy of the text with the given keys dropped from the listed segments
    /// and their tokens only.
    pub(crate) fn cleared_at(&self, paths: &[NodePath], segment_keys: &[&str], token_keys: &[&str]) -> Text {
        let mut text = self.clone();
        for path in paths {
            let Some(segment) = text.segment_mut(*path) else {
                continue;
            };
            segment.annotations_mut().retain(|k, _| !segment_keys.contains(&k.as_str()));
            if let Some(tokens) = segment.tokens_mut() {
                for token in tokens {
                    token.annotations_mut().retain(|k, _| !token_keys.contains(&k.as_str()));
                }
            }
        }
        text
    }
}
