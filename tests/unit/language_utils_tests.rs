/*!
 * Tests for language utility functions
 */

use annotext::language_utils::{
    get_language_name, language_codes_match, normalize_to_part2t, romanization_for, Romanization,
};

/// Test normalization of language codes to ISO 639-2/T format
#[test]
fn test_normalize_to_part2t_withValidCodes_shouldNormalizeCorrectly() {
    assert_eq!(normalize_to_part2t("en").unwrap(), "eng");
    assert_eq!(normalize_to_part2t("fra").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("ger").unwrap(), "deu");
    assert_eq!(normalize_to_part2t(" ZH ").unwrap(), "zho");
    assert!(normalize_to_part2t("e").is_err());
}

/// Codes in different ISO parts name the same language
#[test]
fn test_language_codes_match_withEquivalentCodes_shouldMatch() {
    assert!(language_codes_match("fr", "fre"));
    assert!(language_codes_match("de", "deu"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("en", "not-a-code"));
}

/// Prompts use English language names
#[test]
fn test_get_language_name_withKnownCodes_shouldReturnEnglishName() {
    assert_eq!(get_language_name("fr").unwrap(), "French");
    assert_eq!(get_language_name("deu").unwrap(), "German");
    assert!(get_language_name("zzzz").is_err());
}

/// The romanization stage picks its scheme from the source language
#[test]
fn test_romanization_for_withChineseVarieties_shouldPickScheme() {
    assert_eq!(romanization_for("chi"), Some(Romanization::Pinyin));
    assert_eq!(romanization_for("yue").map(|r| r.annotation_key()), Some("jyutping"));
    assert_eq!(romanization_for("ja"), None);
}
