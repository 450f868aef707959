use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use intentchain_core::domain::stage::StageKind;
use intentchain_core::usage::TokenUsage;
use serde_json::{json, Value};
use thiserror::Error;

/// One prompt sent to the model on behalf of a stage.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub stage: StageKind,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub system_prompt: String,
}

/// Text reply plus the provider envelope it came in, kept for usage lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: String,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider response could not be read: {0}")]
    InvalidResponse(String),
    #[error("the {0} provider requires an api key")]
    MissingApiKey(&'static str),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

enum ScriptedReply {
    Reply(Completion),
    Failure(LlmError),
}

/// Replays queued replies in order and records every request it receives.
///
/// Running out of replies is reported as an `InvalidResponse` failure so a
/// test that calls more stages than it scripted fails loudly.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(ScriptedReply::Reply(Completion { content: content.into(), raw: json!({}) }))
    }

    /// Queues a reply whose envelope carries an OpenAI-style `usage` object.
    pub fn with_reply_and_usage(self, content: impl Into<String>, usage: TokenUsage) -> Self {
        let raw = json!({
            "usage": {
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total_tokens,
            }
        });
        self.push(ScriptedReply::Reply(Completion { content: content.into(), raw }))
    }

    pub fn with_json_reply(self, value: &Value) -> Self {
        self.with_reply(value.to_string())
    }

    pub fn with_failure(self, error: LlmError) -> Self {
        self.push(ScriptedReply::Failure(error))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|requests| requests.len()).unwrap_or_default()
    }

    /// Stages that reached the model, in call order.
    pub fn called_stages(&self) -> Vec<StageKind> {
        self.requests().iter().map(|request| request.stage).collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|replies| replies.len()).unwrap_or_default()
    }

    fn push(self, reply: ScriptedReply) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .map_err(|_| LlmError::InvalidResponse("scripted request log is poisoned".to_string()))?
            .push(request.clone());

        let next = self
            .replies
            .lock()
            .map_err(|_| LlmError::InvalidResponse("scripted reply queue is poisoned".to_string()))?
            .pop_front();

        match next {
            Some(ScriptedReply::Reply(completion)) => Ok(completion),
            Some(ScriptedReply::Failure(error)) => Err(error),
            None => Err(LlmError::InvalidResponse(format!(
                "no scripted reply left for {}",
                request.stage
            ))),
        }
    }
}
