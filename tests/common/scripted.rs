/*!
 * Deterministic answers for every operation, derived from the prompt payload.
 *
 * The responder recognises the operation from the output instructions at the
 * end of the prompt and answers the way a well-behaved model would, so
 * pipeline tests can run end to end without a real service.
 */

use serde_json::{json, Value};

use annotext::prompts::payload_from_prompt;
use annotext::providers::CompletionRequest;

/// Expressions the scripted model recognises
pub const EXPRESSIONS: &[&str] = &["put up with", "once upon a time", "by the sea"];

/// Which operation a prompt belongs to
pub fn operation_of(prompt: &str) -> &'static str {
    if prompt.contains(r#"{"title": string, "surface": string}"#) {
        "text_gen"
    } else if prompt.contains(r#""pages": [{"segments""#) {
        "segmentation"
    } else if prompt.contains(r#"{"tokens": [string"#) {
        "tokenize"
    } else if prompt.contains(r#"{"translation": string}"#) {
        "translation"
    } else if prompt.contains(r#"{"mwes": ["#) {
        "mwe"
    } else if prompt.contains(r#""lemma": string"#) {
        "lemma"
    } else if prompt.contains(r#""gloss": string"#) {
        "gloss"
    } else if prompt.contains(r#""pinyin": string"#) {
        "pinyin"
    } else if prompt.contains(r#""jyutping": string"#) {
        "jyutping"
    } else {
        "unknown"
    }
}

/// Responder for `MockProvider::with_responder`
pub fn respond(request: &CompletionRequest) -> String {
    let payload = payload_from_prompt(&request.prompt).unwrap_or(Value::Null);
    answer(operation_of(&request.prompt), &payload).to_string()
}

/// Answer one operation for one payload
pub fn answer(operation: &str, payload: &Value) -> Value {
    match operation {
        "text_gen" => {
            let description = payload["description"].as_str().unwrap_or_default().trim_end_matches('.');
            json!({
                "title": "Generated",
                "surface": format!("This is a story about {}. It ends by the sea.", description)
            })
        }
        "segmentation" => {
            let text = payload["text"].as_str().unwrap_or_default();
            let segments: Vec<Value> = split_sentences(text)
                .into_iter()
                .map(|surface| json!({ "surface": surface }))
                .collect();
            json!({ "title": "Scripted", "pages": [{ "segments": segments }] })
        }
        "tokenize" => {
            let surface = payload["surface"].as_str().unwrap_or_default();
            json!({ "tokens": split_tokens(surface) })
        }
        "translation" => {
            let surface = payload["surface"].as_str().unwrap_or_default();
            json!({ "translation": format!("[fr]{}", surface.trim()) })
        }
        "mwe" => json!({ "mwes": find_expressions(payload) }),
        "lemma" => units_answer(payload, |surface| {
            json!({ "lemma": surface.to_lowercase(), "pos": if surface.contains(' ') { "VERB" } else { "X" } })
        }),
        "gloss" => units_answer(payload, |surface| json!({ "gloss": format!("gloss({})", surface.to_lowercase()) })),
        "pinyin" | "jyutping" => units_answer(payload, |surface| {
            let mut entry = json!({});
            entry[operation] = json!(format!("rom({})", surface));
            entry
        }),
        _ => json!({}),
    }
}

/// Split after sentence punctuation; whitespace goes with the next sentence
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '。') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

#[derive(PartialEq, Clone, Copy)]
enum Class {
    Word,
    Space,
    Other,
}

fn class_of(c: char) -> Class {
    if c.is_alphanumeric() {
        Class::Word
    } else if c.is_whitespace() {
        Class::Space
    } else {
        Class::Other
    }
}

/// Words and whitespace runs, each punctuation mark on its own
pub fn split_tokens(surface: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut previous: Option<Class> = None;
    for c in surface.chars() {
        let class = class_of(c);
        match tokens.last_mut() {
            Some(last) if previous == Some(class) && class != Class::Other => last.push(c),
            _ => tokens.push(c.to_string()),
        }
        previous = Some(class);
    }
    tokens
}

fn find_expressions(payload: &Value) -> Vec<Value> {
    let lexical: Vec<(u64, String)> = payload["tokens"]
        .as_array()
        .map(|tokens| {
            tokens
                .iter()
                .filter_map(|token| {
                    let surface = token["surface"].as_str()?;
                    surface
                        .chars()
                        .any(char::is_alphanumeric)
                        .then(|| (token["index"].as_u64().unwrap_or_default(), surface.to_lowercase()))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut found = Vec::new();
    for expression in EXPRESSIONS {
        let words: Vec<&str> = expression.split(' ').collect();
        for window in lexical.windows(words.len()) {
            if window.iter().zip(&words).all(|((_, surface), word)| surface == word) {
                let indices: Vec<u64> = window.iter().map(|(index, _)| *index).collect();
                found.push(json!({ "id": (found.len() + 1).to_string(), "tokens": indices, "label": expression }));
            }
        }
    }
    found
}

fn units_answer<F>(payload: &Value, fields: F) -> Value
where
    F: Fn(&str) -> Value,
{
    let units: Vec<Value> = payload["units"]
        .as_array()
        .map(|units| {
            units
                .iter()
                .map(|unit| {
                    let mut entry = fields(unit["surface"].as_str().unwrap_or_default());
                    entry["unit"] = unit["unit"].clone();
                    entry
                })
                .collect()
        })
        .unwrap_or_default();
    json!({ "units": units })
}
