use serde_json::Value;

/// Pull the JSON object out of a model answer.
///
/// Accepts a bare object, a ```json fenced block, an unlabeled fence, or
/// falls back to the span between the first `{` and the last `}`.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    if let Some(start) = trimmed.find("```json") {
        if let Some(end) = trimmed[start + 7..].find("```") {
            return Some(trimmed[start + 7..start + 7 + end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        if let Some(end) = trimmed[start + 3..].find("```") {
            let json = trimmed[start + 3..start + 3 + end].trim();
            if json.starts_with('{') {
                return Some(json);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Extract and parse the first JSON object of a response.
pub fn parse_response(response: &str) -> Result<Value, String> {
    let json = extract_json(response).ok_or_else(|| "no JSON object in response".to_string())?;
    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    if !value.is_object() {
        return Err("response JSON is not an object".to_string());
    }
    Ok(value)
}
