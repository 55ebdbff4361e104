/*!
 * Tests for the document model, merge and alignment
 */

use serde_json::json;

use annotext::document::{
    align_pieces, merge, MergeMode, MergePolicy, NodePath, Patch, PatchSet, WhitespacePlacement,
};
use annotext::errors::DocumentError;

use crate::common;

/// A page whose segments do not rebuild its surface is rejected on load
#[test]
fn test_fromJson_withBrokenConcatenation_shouldFail() {
    let json = json!({
        "l2": "en",
        "pages": [{
            "surface": "Hello there. Bye.",
            "segments": [{ "surface": "Hello there." }, { "surface": "Bye." }]
        }]
    })
    .to_string();

    let err = annotext::Text::from_json(&json).unwrap_err();
    assert!(matches!(err, DocumentError::Concatenation { .. }), "got {:?}", err);
}

/// A saved document loads back with all annotations intact
#[test]
fn test_fromJson_withSavedDocument_shouldKeepAnnotations() {
    let text = common::mwe_text();
    let loaded = annotext::Text::from_json(&text.to_json_pretty().unwrap()).unwrap();

    assert_eq!(loaded, text);
    assert_eq!(loaded.target_language(), Some("fr"));
    assert_eq!(loaded.surface(), "She put up with the noise.");
}

/// Merging never touches keys outside the patch
#[test]
fn test_merge_withNewKey_shouldPreserveExistingAnnotations() {
    let text = common::mwe_text();
    let mut patches = PatchSet::new();
    patches.insert(NodePath::token(0, 0, 10), Patch::new().with("gloss", json!("bruit")));

    let merged = merge(&text, &patches, &MergePolicy::owned(["gloss"])).unwrap();

    let segment = merged.segment(NodePath::segment(0, 0)).unwrap();
    assert_eq!(segment.annotation("translation"), text.segment(NodePath::segment(0, 0)).unwrap().annotation("translation"));
    assert_eq!(merged.token(NodePath::token(0, 0, 10)).unwrap().annotation("gloss"), Some(&json!("bruit")));
    assert_eq!(merged.token(NodePath::token(0, 0, 2)).unwrap().annotation("mwe_id"), Some(&json!("m1")));
    // The input is a value and stays as it was
    assert!(text.token(NodePath::token(0, 0, 10)).unwrap().annotation("gloss").is_none());
}

/// Additive merges refuse to change a value; forced merges may replace owned keys
#[test]
fn test_merge_withConflictingValue_shouldRespectMode() {
    let text = common::mwe_text();
    let mut patches = PatchSet::new();
    patches.insert(NodePath::segment(0, 0), Patch::new().with("translation", json!("Autre chose.")));

    let additive = MergePolicy::owned(["translation"]);
    assert!(matches!(
        merge(&text, &patches, &additive),
        Err(DocumentError::SchemaViolation { .. })
    ));

    let forced = MergePolicy::owned(["translation"]).with_mode(MergeMode::ReplaceOwned);
    let merged = merge(&text, &patches, &forced).unwrap();
    assert_eq!(
        merged.segment(NodePath::segment(0, 0)).unwrap().annotation("translation"),
        Some(&json!("Autre chose."))
    );
}

/// A key the operation does not own cannot be written even if absent
#[test]
fn test_merge_withForeignKey_shouldFail() {
    let text = common::mwe_text();
    let mut patches = PatchSet::new();
    patches.insert(NodePath::token(0, 0, 0), Patch::new().with("lemma", json!("she")));

    assert!(merge(&text, &patches, &MergePolicy::owned(["gloss"])).is_err());
}

/// Tokens must rebuild the segment surface exactly
#[test]
fn test_merge_withTokensNotMatchingSurface_shouldFail() {
    let text = common::segmented_text();
    let mut patches = PatchSet::new();
    patches.insert(
        NodePath::segment(0, 1),
        Patch::tokens(vec!["The".to_string(), " ".to_string(), "boy".to_string()]),
    );

    let err = merge(&text, &patches, &MergePolicy::owned(Vec::<String>::new())).unwrap_err();
    assert!(matches!(err, DocumentError::Concatenation { .. }), "got {:?}", err);
}

/// Unknown paths are reported, not ignored
#[test]
fn test_merge_withUnknownPath_shouldFail() {
    let text = common::segmented_text();
    let mut patches = PatchSet::new();
    patches.insert(NodePath::segment(3, 0), Patch::new().with("translation", json!("x")));

    assert!(matches!(
        merge(&text, &patches, &MergePolicy::additive()),
        Err(DocumentError::UnknownPath(_))
    ));
}

/// Hints that dropped whitespace are realigned onto the source text
#[test]
fn test_alignPieces_withTrimmedHints_shouldRebuildSource() {
    let source = "Hello there.  Bye now.";
    let hints = vec!["Hello there.".to_string(), "Bye now.".to_string()];

    let attached = align_pieces(source, &hints, WhitespacePlacement::Attach).unwrap();
    assert_eq!(attached.concat(), source);
    assert_eq!(attached[1], "  Bye now.");

    let separate = align_pieces(source, &hints, WhitespacePlacement::Separate).unwrap();
    assert_eq!(separate.concat(), source);
    assert!(separate.iter().any(|piece| piece == "  "));
}

/// Hints that rewrite the text cannot be aligned
#[test]
fn test_alignPieces_withRewrittenHints_shouldReturnNone() {
    let hints = vec!["Hello their.".to_string()];
    assert!(align_pieces("Hello there.", &hints, WhitespacePlacement::Attach).is_none());
}
