use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("reply is empty")]
    Empty,
    #[error("reply does not contain a JSON object")]
    NoJsonObject,
}

/// Finds the JSON object in a model reply.
///
/// Models wrap JSON in markdown fences or surround it with prose, so this
/// strips a leading fence, tries the whole text, then falls back to the
/// first `{` from which a complete object decodes.
pub fn extract_json_object(reply: &str) -> Result<Value, ExtractError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }

    let text = strip_code_fence(trimmed);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text) {
        return Ok(value);
    }

    for (offset, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[offset..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = stream.next() {
            return Ok(value);
        }
    }

    Err(ExtractError::NoJsonObject)
}

fn strip_code_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }

    let lines = text.lines().collect::<Vec<_>>();
    let body = match lines.last() {
        Some(last) if lines.len() >= 3 && last.trim() == "```" => &lines[1..lines.len() - 1],
        _ => &lines[1..],
    };
    body.join("\n").trim().to_string()
}
