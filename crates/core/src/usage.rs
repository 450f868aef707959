//! Token and latency bookkeeping for model calls.
//!
//! Providers report usage under different envelopes (`usage`,
//! `usage_metadata`, `response_metadata.token_usage`) and with different field
//! names (`prompt_tokens` vs `input_tokens`). Extraction is best effort: a
//! response without usage data yields zeros, never an error.

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// A reported total of zero is replaced by prompt + completion.
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        let total_tokens = if total_tokens == 0 {
            prompt_tokens.saturating_add(completion_tokens)
        } else {
            total_tokens
        };
        Self { prompt_tokens, completion_tokens, total_tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(other.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(other.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(other.total_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a TokenUsage> for TokenUsage {
    fn sum<I: Iterator<Item = &'a TokenUsage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Usage attached to a single stage call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UsageMetrics {
    #[serde(rename = "time_s", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub tokens: TokenUsage,
}

impl UsageMetrics {
    pub fn new(elapsed: Duration, tokens: TokenUsage) -> Self {
        Self { elapsed, tokens }
    }

    /// `time_s=1.234 | tokens_total=.. (prompt=.., completion=..)`
    pub fn summary_line(&self) -> String {
        format!(
            "time_s={:.3} | tokens_total={} (prompt={}, completion={})",
            self.elapsed.as_secs_f64(),
            self.tokens.total_tokens,
            self.tokens.prompt_tokens,
            self.tokens.completion_tokens
        )
    }
}

pub fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Field names tried for prompt and completion counts, first match wins.
type FieldOrder = (&'static [&'static str], &'static [&'static str]);

const INPUT_FIRST: FieldOrder =
    (&["input_tokens", "prompt_tokens"], &["output_tokens", "completion_tokens"]);
const PROMPT_FIRST: FieldOrder =
    (&["prompt_tokens", "input_tokens"], &["completion_tokens", "output_tokens"]);

/// Pulls token counts out of a raw provider response.
pub fn extract_usage(response: &Value) -> TokenUsage {
    let candidates = [
        (response.get("usage_metadata"), INPUT_FIRST),
        (response.get("usage"), PROMPT_FIRST),
        (response.get("response_metadata").and_then(|meta| meta.get("token_usage")), PROMPT_FIRST),
        (response.get("response_metadata").and_then(|meta| meta.get("usage")), PROMPT_FIRST),
    ];

    candidates
        .into_iter()
        .find_map(|(candidate, order)| {
            candidate.filter(|usage| usage.is_object()).map(|usage| usage_from_object(usage, order))
        })
        .unwrap_or_default()
}

fn usage_from_object(usage: &Value, (prompt_keys, completion_keys): FieldOrder) -> TokenUsage {
    let prompt = first_count(usage, prompt_keys);
    let completion = first_count(usage, completion_keys);
    let total = first_count(usage, &["total_tokens"]);
    TokenUsage::new(prompt, completion, total)
}

fn first_count(usage: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .filter_map(|key| usage.get(*key))
        .find(|value| !value.is_null())
        .map(token_count)
        .unwrap_or(0)
}

fn token_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|count| *count >= 0.0).map(|count| count as u64))
            .unwrap_or(0),
        Value::String(raw) => {
            let trimmed = raw.trim();
            trimmed
                .parse::<u64>()
                .ok()
                .or_else(|| {
                    trimmed.parse::<f64>().ok().filter(|count| *count >= 0.0).map(|c| c as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{extract_usage, TokenUsage, UsageMetrics};

    #[test]
    fn openai_usage_envelope_is_read() {
        let usage = extract_usage(&json!({
            "choices": [],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }));
        assert_eq!(usage, TokenUsage::new(120, 30, 150));
    }

    #[test]
    fn anthropic_style_fields_derive_total() {
        let usage = extract_usage(&json!({
            "usage": {"input_tokens": 40, "output_tokens": 2}
        }));
        assert_eq!(usage.prompt_tokens, 40);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn usage_metadata_takes_precedence() {
        let usage = extract_usage(&json!({
            "usage_metadata": {"input_tokens": 7, "output_tokens": 3, "total_tokens": 10},
            "usage": {"prompt_tokens": 999}
        }));
        assert_eq!(usage, TokenUsage::new(7, 3, 10));
    }

    #[test]
    fn field_precedence_depends_on_envelope() {
        let metadata = extract_usage(&json!({
            "usage_metadata": {"prompt_tokens": 1, "input_tokens": 20, "completion_tokens": 2, "output_tokens": 8}
        }));
        assert_eq!(metadata, TokenUsage::new(20, 8, 28));

        let usage = extract_usage(&json!({
            "usage": {"prompt_tokens": 1, "input_tokens": 20, "completion_tokens": 2, "output_tokens": 8}
        }));
        assert_eq!(usage, TokenUsage::new(1, 2, 3));
    }

    #[test]
    fn response_metadata_token_usage_is_read() {
        let usage = extract_usage(&json!({
            "response_metadata": {"token_usage": {"prompt_tokens": "11", "completion_tokens": 4.0}}
        }));
        assert_eq!(usage, TokenUsage::new(11, 4, 15));
    }

    #[test]
    fn missing_usage_degrades_to_zeros() {
        assert_eq!(extract_usage(&json!({"choices": []})), TokenUsage::default());
        assert_eq!(extract_usage(&json!("plain text")), TokenUsage::default());
        assert_eq!(extract_usage(&json!({"usage": "n/a"})), TokenUsage::default());
    }

    #[test]
    fn garbage_counts_become_zero() {
        let usage = extract_usage(&json!({
            "usage": {"prompt_tokens": "many", "completion_tokens": -3, "total_tokens": null}
        }));
        assert_eq!(usage, TokenUsage::default());
    }

    #[test]
    fn usage_sums_across_stages() {
        let total: TokenUsage =
            [TokenUsage::new(1, 2, 0), TokenUsage::new(10, 20, 30)].iter().sum();
        assert_eq!(total, TokenUsage::new(11, 22, 33));
    }

    #[test]
    fn metrics_serialize_with_seconds() {
        let metrics = UsageMetrics::new(Duration::from_millis(1500), TokenUsage::new(3, 4, 0));
        let value = serde_json::to_value(metrics).unwrap_or_default();
        assert_eq!(value["time_s"], 1.5);
        assert_eq!(value["total_tokens"], 7);
        assert_eq!(
            metrics.summary_line(),
            "time_s=1.500 | tokens_total=7 (prompt=3, completion=4)"
        );
    }
}
