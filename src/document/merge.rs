/*!
 * Path-addressed merge of operation results into a text.
 *
 * Merge never edits its input: it clones the tree, applies every patch to the
 * clone and returns it. Patches are applied in path order, so a segment's
 * token list is in place before any of its token annotations are written.
 */

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::document::{Annotations, NodePath, Text, Token};
use crate::errors::DocumentError;

/// New annotations for one node, plus a token list when tokenizing a segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub annotations: Annotations,
    pub tokens: Option<Vec<String>>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that only adds annotations
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.annotations.insert(key.to_string(), value);
        self
    }

    /// Patch that sets a segment's token list
    pub fn tokens(tokens: Vec<String>) -> Self {
        Self {
            annotations: Annotations::new(),
            tokens: Some(tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.tokens.is_none()
    }
}

/// Patches keyed by the node they apply to.
pub type PatchSet = BTreeMap<NodePath, Patch>;

/// How merge treats keys that already hold a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Existing keys may only be rewritten with an identical value
    #[default]
    Additive,
    /// Keys in the allowed set may be replaced (forced re-runs)
    ReplaceOwned,
}

/// Which keys a merge may write and how conflicts are handled.
#[derive(Debug, Clone, Default)]
pub struct MergePolicy {
    /// `None` allows any key
    allowed_keys: Option<BTreeSet<String>>,
    mode: MergeMode,
}

impl MergePolicy {
    /// Any key, never overwrite
    pub fn additive() -> Self {
        Self::default()
    }

    /// Only the listed keys may be written
    pub fn owned<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_keys: Some(keys.into_iter().map(Into::into).collect()),
            mode: MergeMode::Additive,
        }
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    fn check_allowed(&self, path: NodePath, key: &str) -> Result<(), DocumentError> {
        match &self.allowed_keys {
            Some(keys) if !keys.contains(key) => Err(DocumentError::SchemaViolation {
                path,
                reason: format!("key '{}' is not owned by this operation", key),
            }),
            _ => Ok(()),
        }
    }

    fn may_replace(&self, key: &str) -> bool {
        self.mode == MergeMode::ReplaceOwned
            && self.allowed_keys.as_ref().is_some_and(|keys| keys.contains(key))
    }
}

/// Merge `patches` into a copy of `original`.
///
/// Fails with `SchemaViolation` when a patch would change an existing value,
/// write a key outside the policy, or retokenize a segment; fails with
/// `Concatenation` when a token list does not rebuild its segment's surface.
pub fn merge(original: &Text, patches: &PatchSet, policy: &MergePolicy) -> Result<Text, DocumentError> {
    let mut text = original.clone();

    for (path, patch) in patches {
        let path = *path;
        let segment = text
            .segment_mut(path.segment_path())
            .ok_or(DocumentError::UnknownPath(path))?;

        match path.token {
            None => {
                if let Some(pieces) = &patch.tokens {
                    apply_tokens(segment, path, pieces)?;
                }
                apply_annotations(segment.annotations_mut(), path, &patch.annotations, policy)?;
            }
            Some(index) => {
                if patch.tokens.is_some() {
                    return Err(DocumentError::SchemaViolation {
                        path,
                        reason: "tokens can only be set on a segment".to_string(),
                    });
                }
                let token = segment
                    .tokens_mut()
                    .and_then(|tokens| tokens.get_mut(index))
                    .ok_or(DocumentError::UnknownPath(path))?;
                apply_annotations(token.annotations_mut(), path, &patch.annotations, policy)?;
            }
        }
    }

    Ok(text)
}

fn apply_tokens(
    segment: &mut crate::document::Segment,
    path: NodePath,
    pieces: &[String],
) -> Result<(), DocumentError> {
    if let Some(existing) = segment.tokens() {
        let same = existing.len() == pieces.len()
            && existing.iter().zip(pieces).all(|(t, p)| t.surface() == p.as_str());
        if same {
            return Ok(());
        }
        return Err(DocumentError::SchemaViolation {
            path,
            reason: "segment is already tokenized differently".to_string(),
        });
    }

    let joined: String = pieces.concat();
    if joined != segment.surface() {
        return Err(DocumentError::Concatenation {
            path: path.to_string(),
            expected: segment.surface().to_string(),
            actual: joined,
        });
    }

    segment.set_tokens(Some(pieces.iter().map(Token::new).collect()));
    Ok(())
}

fn apply_annotations(
    target: &mut Annotations,
    path: NodePath,
    additions: &Annotations,
    policy: &MergePolicy,
) -> Result<(), DocumentError> {
    for (key, value) in additions {
        policy.check_allowed(path, key)?;
        match target.get(key) {
            Some(existing) if existing == value => {}
            Some(existing) if !policy.may_replace(key) => {
                return Err(DocumentError::SchemaViolation {
                    path,
                    reason: format!(
                        "key '{}' already holds {} and cannot become {}",
                        key, existing, value
                    ),
                });
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}
