use anyhow::{anyhow, Result};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// Texts carry ISO 639-1 or 639-3 codes. Prompts want readable names, and
/// the romanization stage needs to know which script scheme applies.

/// ISO 639-2/B codes that differ from their 639-2/T form
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Romanization scheme for a script-specific stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Romanization {
    /// Hanyu pinyin for Mandarin
    Pinyin,
    /// Jyutping for Cantonese
    Jyutping,
}

impl Romanization {
    /// Annotation key the scheme writes on tokens
    pub fn annotation_key(&self) -> &'static str {
        match self {
            Self::Pinyin => "pinyin",
            Self::Jyutping => "jyutping",
        }
    }
}

/// Normalize a language code to ISO 639-3 (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    match normalized_code.len() {
        2 => Language::from_639_1(&normalized_code)
            .map(|lang| lang.to_639_3().to_string())
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
        3 => {
            if Language::from_639_3(&normalized_code).is_some() {
                return Ok(normalized_code);
            }
            BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(b, _)| *b == normalized_code)
                .map(|(_, t)| t.to_string())
                .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))
        }
        _ => Err(anyhow!("Cannot normalize invalid language code: {}", code)),
    }
}

/// Check if two language codes match (represent the same language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// Readable name for prompts, falling back to the raw code
pub fn display_name(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.to_string())
}

/// Romanization scheme used for a source language, if any
pub fn romanization_for(code: &str) -> Option<Romanization> {
    match normalize_to_part2t(code).ok()?.as_str() {
        "zho" | "cmn" => Some(Romanization::Pinyin),
        "yue" => Some(Romanization::Jyutping),
        _ => None,
    }
}
