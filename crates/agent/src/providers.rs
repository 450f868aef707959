//! HTTP clients for hosted and local chat-completion endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use intentchain_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// Client for `POST {base_url}/chat/completions`, used for OpenAI and Ollama.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": [
                {"role": "system", "content": &request.system_prompt}
            ]
        });

        let mut builder = self.http.post(self.endpoint()).timeout(request.timeout).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        debug!(
            event_name = "llm.request.sent",
            stage = request.stage.as_str(),
            model = %request.model,
            "sending chat completion request"
        );
        let raw = send_json(builder).await?;

        let content = raw
            .pointer("/choices/0/message/content")
            .ok_or_else(|| {
                LlmError::InvalidResponse("response has no choices[0].message.content".to_string())
            })?
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(Completion { content, raw })
    }
}

/// Client for the Anthropic messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self { http, base_url: base_url.into(), api_key }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        // The messages API needs at least one user turn; the rendered prompt is it.
        let body = json!({
            "model": &request.model,
            "temperature": request.temperature,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": [
                {"role": "user", "content": &request.system_prompt}
            ]
        });

        let builder = self
            .http
            .post(self.endpoint())
            .timeout(request.timeout)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        debug!(
            event_name = "llm.request.sent",
            stage = request.stage.as_str(),
            model = %request.model,
            "sending messages request"
        );
        let raw = send_json(builder).await?;

        let blocks = raw
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::InvalidResponse("response has no content blocks".to_string()))?;
        let content = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion { content, raw })
    }
}

async fn send_json(builder: reqwest::RequestBuilder) -> Result<Value, LlmError> {
    let response = builder.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Status { status, body });
    }

    response.json::<Value>().await.map_err(|error| LlmError::InvalidResponse(error.to_string()))
}

/// Builds the client for the configured provider.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let http = reqwest::Client::builder().build()?;
    let base_url = config.effective_base_url().to_string();

    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            Arc::new(OpenAiCompatibleClient::new(http, base_url, config.api_key.clone()))
        }
        LlmProvider::Anthropic => {
            let api_key = config
                .api_key
                .clone()
                .ok_or(LlmError::MissingApiKey(config.provider.as_str()))?;
            Arc::new(AnthropicClient::new(http, base_url, api_key))
        }
    };

    Ok(client)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use intentchain_core::domain::stage::StageKind;

    use super::OpenAiCompatibleClient;
    use crate::llm::{CompletionRequest, LlmClient};

    /// Answers one HTTP request with `body` and returns the base url.
    fn serve_once(body: &'static str) -> std::io::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let mut request = Vec::new();
            let mut chunk = [0_u8; 4096];
            loop {
                let Ok(read) = stream.read(&mut chunk) else { return };
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some((head, payload)) = text.split_once("\r\n\r\n") {
                    let length = head
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            if name.eq_ignore_ascii_case("content-length") {
                                value.trim().parse::<usize>().ok()
                            } else {
                                None
                            }
                        })
                        .unwrap_or(0);
                    if payload.len() >= length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        });
        Ok(base_url)
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client =
            OpenAiCompatibleClient::new(reqwest::Client::new(), "http://localhost:11434/v1/", None);
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[tokio::test]
    async fn blank_content_is_returned_for_extraction() -> std::io::Result<()> {
        let base_url = serve_once(
            r#"{"choices":[{"message":{"content":""}}],"usage":{"prompt_tokens":5,"completion_tokens":0}}"#,
        )?;
        let http = reqwest::Client::builder().no_proxy().build().map_err(std::io::Error::other)?;
        let client = OpenAiCompatibleClient::new(http, base_url, None);
        let request = CompletionRequest {
            stage: StageKind::Ihf,
            model: "llama3".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            system_prompt: "hello".to_string(),
        };

        let completion = client.complete(&request).await;
        let completion = match completion {
            Ok(completion) => completion,
            Err(error) => panic!("request failed: {error}"),
        };
        assert_eq!(completion.content, "");
        assert_eq!(completion.raw["usage"]["prompt_tokens"], 5);
        Ok(())
    }
}
