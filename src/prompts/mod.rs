/*!
 * Prompt templates and few-shot examples keyed by (operation, language).
 *
 * On disk a prompt set lives at `{root}/{operation}/{language}/template.txt`
 * with examples as `.json` files under `{root}/{operation}/{language}/fewshots/`,
 * each holding `{"input": ..., "output": ...}`. Missing sets fall back to the
 * built-in templates without examples.
 */

pub mod templates;

use log::{debug, warn};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::language_utils;
pub use templates::{format_hints, PromptTemplate};

/// Label preceding the compact payload JSON in every prompt
pub const PAYLOAD_LABEL: &str = "Input JSON:";

/// One worked example
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FewShot {
    pub input: Value,
    pub output: Value,
}

/// Template plus examples for one (operation, language)
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub template: PromptTemplate,
    pub fewshots: Vec<FewShot>,
}

/// Everything a prompt is rendered from
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub operation: &'a str,
    pub source_language: &'a str,
    pub target_language: Option<&'a str>,
    pub payload: &'a Value,
    pub hints: &'a BTreeMap<String, Value>,
    pub output_instructions: &'a str,
}

/// Loader and cache of prompt sets
#[derive(Debug, Default)]
pub struct PromptLibrary {
    root: Option<PathBuf>,
    cache: RwLock<HashMap<(String, String), Arc<PromptSet>>>,
}

impl PromptLibrary {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Library that only knows the built-in templates
    pub fn builtin() -> Self {
        Self::new(None)
    }

    /// Prompt set for an operation and source language
    pub fn load(&self, operation: &str, language: &str) -> Arc<PromptSet> {
        let key = (operation.to_string(), language.to_string());
        if let Some(set) = self.cache.read().get(&key) {
            return Arc::clone(set);
        }

        let set = Arc::new(
            self.root
                .as_deref()
                .and_then(|root| load_from_disk(root, operation, language))
                .unwrap_or_else(|| PromptSet {
                    template: PromptTemplate::builtin(operation).unwrap_or_else(PromptTemplate::generic),
                    fewshots: Vec::new(),
                }),
        );

        self.cache.write().insert(key, Arc::clone(&set));
        set
    }
}

fn load_from_disk(root: &Path, operation: &str, language: &str) -> Option<PromptSet> {
    let dir = root.join(operation).join(language);
    let template_path = dir.join("template.txt");
    let template = match std::fs::read_to_string(&template_path) {
        Ok(content) => PromptTemplate::new(&content),
        Err(_) => {
            debug!("No prompt template at {}, using built-in", template_path.display());
            return None;
        }
    };

    let mut files: Vec<PathBuf> = WalkDir::new(dir.join("fewshots"))
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let fewshots = files
        .iter()
        .filter_map(|path| {
            let parsed = std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str::<FewShot>(&content).map_err(|e| e.to_string()));
            match parsed {
                Ok(shot) => Some(shot),
                Err(e) => {
                    warn!("Skipping few-shot example {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();

    Some(PromptSet { template, fewshots })
}

/// Assemble the full prompt text.
///
/// Layout: rendered template, the payload block (unless the template placed
/// `{payload}` itself), the few-shot examples, then the output instructions.
pub fn build_prompt(set: &PromptSet, context: &PromptContext<'_>) -> String {
    let payload = context.payload.to_string();
    let target = context.target_language.unwrap_or("en");

    let mut variables = BTreeMap::new();
    variables.insert("operation".to_string(), context.operation.to_string());
    variables.insert("source_language".to_string(), context.source_language.to_string());
    variables.insert(
        "source_language_name".to_string(),
        language_utils::display_name(context.source_language),
    );
    variables.insert("target_language".to_string(), target.to_string());
    variables.insert("target_language_name".to_string(), language_utils::display_name(target));
    variables.insert("hints".to_string(), format_hints(context.hints));
    variables.insert("payload".to_string(), payload.clone());
    for (name, value) in context.hints {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        variables.insert(format!("hint.{}", name), rendered);
    }

    let mut prompt = set.template.render(&variables);

    if !set.template.contains("{payload}") {
        prompt.push_str("\n\n");
        prompt.push_str(PAYLOAD_LABEL);
        prompt.push('\n');
        prompt.push_str(&payload);
    }

    if !set.fewshots.is_empty() {
        prompt.push_str("\n\nFew-shot examples:");
        for (i, shot) in set.fewshots.iter().enumerate() {
            let input = serde_json::to_string_pretty(&shot.input).unwrap_or_else(|_| shot.input.to_string());
            let output = serde_json::to_string_pretty(&shot.output).unwrap_or_else(|_| shot.output.to_string());
            prompt.push_str(&format!("\nExample {} input:\n{}\nExample output:\n{}\n", i + 1, input, output));
        }
    }

    if !context.output_instructions.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(context.output_instructions);
    }

    prompt
}

/// Recover the payload JSON from a prompt built by [`build_prompt`].
pub fn payload_from_prompt(prompt: &str) -> Option<Value> {
    let mut lines = prompt.lines();
    lines.find(|line| line.trim() == PAYLOAD_LABEL)?;
    serde_json::from_str(lines.next()?).ok()
}
