/*!
 * Built-in prompt templates, used when no template file exists on disk.
 *
 * Placeholders: {source_language}, {source_language_name},
 * {target_language}, {target_language_name}, {operation}, {hints},
 * {payload} and `{hint.<name>}` for each declared hint.
 */

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_][a-z0-9_.]*)\}").expect("placeholder pattern is valid"));

/// Text template with `{placeholder}` substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub const SEGMENTATION: &'static str = r#"You are preparing a {source_language_name} text for language learners.
Split the text into pages and each page into sentence-sized segments.
Copy the text exactly: keep every character, including spaces, line breaks and punctuation.
Whitespace between two segments belongs to the start of the second segment."#;

    pub const TOKENIZE: &'static str = r#"Split the {source_language_name} segment below into tokens.
Words, punctuation marks and whitespace runs are separate tokens.
The tokens must concatenate back to the segment surface exactly."#;

    pub const TRANSLATION: &'static str = r#"Translate the {source_language_name} segment below into {target_language_name}.
Produce a natural, faithful translation of the whole segment."#;

    pub const MWE: &'static str = r#"Find the multi-word expressions in the {source_language_name} segment below:
phrasal verbs, idioms and fixed expressions whose meaning is not the sum of their words.
Refer to tokens by their index. Only lexical tokens can belong to an expression.
Return an empty list when the segment has none.
{hints}"#;

    pub const LEMMA: &'static str = r#"Give the dictionary form (lemma) and part of speech of each lexical unit
of the {source_language_name} segment below. A unit is either a single word or a
multi-word expression; an expression gets one lemma covering the whole expression."#;

    pub const GLOSS: &'static str = r#"Give a short {target_language_name} gloss for each lexical unit of the
{source_language_name} segment below, as used in this context. A multi-word expression
gets one gloss for the whole expression.
{hints}"#;

    pub const TEXT_GEN: &'static str = r#"Write an original {source_language_name} text for language learners that fits the description below.
Keep it natural and self-contained, with ordinary punctuation and paragraphs."#;

    pub const ROMANIZATION: &'static str = r#"Give the {operation} romanization of each lexical unit of the
{source_language_name} segment below, with tone marks."#;

    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Built-in template for an operation, if one exists
    pub fn builtin(operation: &str) -> Option<Self> {
        let template = match operation {
            "segmentation" => Self::SEGMENTATION,
            "tokenize" => Self::TOKENIZE,
            "translation" => Self::TRANSLATION,
            "mwe" => Self::MWE,
            "lemma" => Self::LEMMA,
            "gloss" => Self::GLOSS,
            "pinyin" | "jyutping" => Self::ROMANIZATION,
            "text_gen" => Self::TEXT_GEN,
            _ => return None,
        };
        Some(Self::new(template))
    }

    /// Generic template for operations without a built-in one
    pub fn generic() -> Self {
        Self::new("Annotate the {source_language_name} segment below for the '{operation}' operation.")
    }

    pub fn contains(&self, placeholder: &str) -> bool {
        self.template.contains(placeholder)
    }

    /// Render the template with the given variables.
    ///
    /// Substitution is single-pass, so values containing braces are inserted
    /// verbatim. Unknown placeholders are left as they are.
    pub fn render(&self, variables: &BTreeMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| match variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Human-readable block listing cross-operation hints
pub fn format_hints(hints: &BTreeMap<String, Value>) -> String {
    if hints.is_empty() {
        return String::new();
    }
    let mut out = String::from("Context from earlier steps:");
    for (name, value) in hints {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("\n- {}: {}", name, rendered));
    }
    out
}
