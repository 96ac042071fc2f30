//! HTTP-backed specialist client
//!
//! Thin transport over a messages-style API. The core never talks to this
//! type directly - everything goes through the [`SpecialistClient`] trait,
//! so tests swap in the scripted mock.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::client::SpecialistClient;
use super::error::LlmError;
use super::types::{ChatRequest, ChatResponse, MessageContent, Role, StopReason, TokenUsage, ToolCall};

/// Specialist endpoint configuration
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout: Duration,
}

/// reqwest-based client for one configured endpoint
pub struct HttpSpecialistClient {
    http: reqwest::Client,
    config: EndpointConfig,
    api_key: String,
}

impl HttpSpecialistClient {
    pub fn new(config: EndpointConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| LlmError::MissingApiKey {
            env: config.api_key_env.clone(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, config, api_key })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let content = match &msg.content {
                    MessageContent::Text(text) => json!(text),
                    MessageContent::Blocks(blocks) => serde_json::to_value(blocks).unwrap_or_else(|_| json!([])),
                };
                json!({"role": role, "content": content})
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "system": request.system_prompt,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    }))
                    .collect::<Vec<_>>()
            );
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        body
    }

    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError> {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;

        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str() {
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or_default().to_string();
                    let name = block["name"]
                        .as_str()
                        .ok_or_else(|| LlmError::InvalidResponse("tool_use block without name".to_string()))?;
                    tool_calls.push(ToolCall {
                        id,
                        name: name.to_string(),
                        arguments: block["input"].clone(),
                    });
                }
                other => {
                    debug!(?other, "Skipping unknown content block type");
                }
            }
        }

        let stop_reason = StopReason::parse(body["stop_reason"].as_str().unwrap_or("end_turn"));
        let usage = TokenUsage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        Ok(ChatResponse {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
            stop_reason,
            usage,
        })
    }
}

#[async_trait]
impl SpecialistClient for HttpSpecialistClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = self.build_body(&request);

        debug!(model = %self.config.model, "Sending chat request");
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60));
            warn!(?retry_after, "Rate limited by API");
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        self.parse_response(body)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;
    use serial_test::serial;

    fn client() -> HttpSpecialistClient {
        // SAFETY: tests touching the environment are #[serial]
        unsafe { std::env::set_var("DEVLOOP_TEST_KEY", "sk-test") };
        HttpSpecialistClient::new(EndpointConfig {
            model: "test-model".to_string(),
            base_url: "http://localhost:0".to_string(),
            api_key_env: "DEVLOOP_TEST_KEY".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        let result = HttpSpecialistClient::new(EndpointConfig {
            model: "m".to_string(),
            base_url: "http://localhost".to_string(),
            api_key_env: "DEVLOOP_DEFINITELY_UNSET".to_string(),
            timeout: Duration::from_secs(5),
        });
        assert!(matches!(result, Err(LlmError::MissingApiKey { .. })));
    }

    #[test]
    #[serial]
    fn test_build_body_includes_tools_and_temperature() {
        let client = client();
        let request = ChatRequest::new("sys", "hello")
            .with_tools(vec![ToolDefinition::new("read_file", "read", json!({"type": "object"}))])
            .with_temperature(0.1);

        let body = client.build_body(&request);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["tools"][0]["name"], "read_file");
        assert_eq!(body["temperature"], 0.1);
    }

    #[test]
    #[serial]
    fn test_parse_response_text_and_tool_use() {
        let client = client();
        let body = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_1", "name": "read_file", "input": {"path": "a.rs"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20}
        });

        let response = client.parse_response(body).unwrap();
        assert_eq!(response.content.as_deref(), Some("Let me check."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "read_file");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.output_tokens, 20);
    }

    #[test]
    #[serial]
    fn test_parse_response_missing_content() {
        let client = client();
        let result = client.parse_response(json!({"stop_reason": "end_turn"}));
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }
}
