use serde_json::Value;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 65.0;

/// Reads `confidence` from a stage result on a 0-100 scale.
///
/// Missing or non-numeric values count as 0. Fractions in `[0, 1]` are
/// treated as probabilities and scaled to percent.
pub fn normalized_confidence(result: &Value) -> f64 {
    let raw = match result.get("confidence") {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    let raw = if raw.is_finite() { raw } else { 0.0 };
    let scaled = if (0.0..=1.0).contains(&raw) { raw * 100.0 } else { raw };
    scaled.clamp(0.0, 100.0)
}

/// The `assumptions` list of a stage result, if it carries one.
pub fn assumptions(result: &Value) -> Vec<String> {
    result
        .get("assumptions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
