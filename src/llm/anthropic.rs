//! Anthropic Messages API provider

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, ToolChoice, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicService {
    pub fn new(
        api_key: String,
        model: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> AnthropicRequest {
        let system: Vec<AnthropicSystemBlock> = request
            .system
            .iter()
            .map(|s| AnthropicSystemBlock {
                r#type: "text".to_string(),
                text: s.text.clone(),
                cache_control: s.cache.then(|| CacheControl {
                    r#type: "ephemeral".to_string(),
                }),
            })
            .collect();

        let messages: Vec<AnthropicMessage> =
            request.messages.iter().map(Self::translate_message).collect();

        let tools: Vec<AnthropicTool> = request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        let tool_choice = (!tools.is_empty()).then(|| AnthropicToolChoice {
            r#type: match request.tool_choice {
                ToolChoice::Required => "any",
                ToolChoice::Auto => "auto",
            }
            .to_string(),
        });

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
            tool_choice,
        }
    }

    fn translate_message(msg: &LlmMessage) -> AnthropicMessage {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        let content = msg
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => AnthropicContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    // The Messages API insists on an object here
                    input: if input.is_object() {
                        input.clone()
                    } else {
                        serde_json::json!({})
                    },
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => AnthropicContentBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                },
            })
            .collect();

        AnthropicMessage {
            role: role.to_string(),
            content,
        }
    }

    fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
        let mut content = Vec::new();
        let mut reasoning = Vec::new();
        for block in resp.content {
            match block {
                AnthropicContentBlock::Text { text } => content.push(ContentBlock::Text { text }),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    content.push(ContentBlock::ToolUse { id, name, input });
                }
                AnthropicContentBlock::Thinking { thinking } => reasoning.push(thinking),
                AnthropicContentBlock::ToolResult { .. } => {
                    tracing::warn!("Ignoring tool_result block in model response");
                }
            }
        }

        LlmResponse {
            content,
            reasoning: (!reasoning.is_empty()).then(|| reasoning.join("\n")),
            end_turn: resp.stop_reason.as_deref() == Some("end_turn"),
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
                cache_creation_tokens: resp.usage.cache_creation_input_tokens.unwrap_or(0),
                cache_read_tokens: resp.usage.cache_read_input_tokens.unwrap_or(0),
            },
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(body);
        let mut err = LlmError::from_status(status.as_u16(), message);
        if let Some(retry_after) = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/retry_after"))
            .and_then(serde_json::Value::as_f64)
        {
            err = err.with_retry_after(Duration::from_secs_f64(retry_after.max(0.0)));
        }
        err
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let anthropic_response: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(Self::normalize_response(anthropic_response))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<AnthropicToolChoice>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct AnthropicToolChoice {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{SystemContent, ToolDefinition};
    use serde_json::json;

    fn service() -> AnthropicService {
        AnthropicService::new(
            "test-key".to_string(),
            "claude-sonnet-4-20250514".to_string(),
            "https://api.anthropic.com/v1",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_tool_choice_mapping() {
        let request = LlmRequest {
            system: vec![SystemContent::cached("prompt")],
            messages: vec![LlmMessage::user(vec![ContentBlock::text("Question: x")])],
            tools: vec![ToolDefinition {
                name: "list_paths".to_string(),
                description: "list".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            tool_choice: ToolChoice::Required,
            max_tokens: None,
        };
        let body = serde_json::to_value(service().translate_request(&request)).unwrap();
        assert_eq!(body["tool_choice"]["type"], "any");
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn test_non_object_input_replaced() {
        let msg = LlmMessage::assistant(vec![ContentBlock::tool_use("t", "list_paths", json!("{bad"))]);
        let translated = serde_json::to_value(AnthropicService::translate_message(&msg)).unwrap();
        assert_eq!(translated["content"][0]["input"], json!({}));
    }

    #[test]
    fn test_normalize_collects_thinking() {
        let resp: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "Erst § 573 lesen."},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file_range",
                 "input": {"path": "gesetze/bgb/573.md"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 50, "output_tokens": 12}
        }))
        .unwrap();
        let normalized = AnthropicService::normalize_response(resp);
        assert_eq!(normalized.reasoning.as_deref(), Some("Erst § 573 lesen."));
        assert_eq!(normalized.tool_uses()[0].1, "read_file_range");
        assert_eq!(normalized.usage.output_tokens, 12);
    }

    #[test]
    fn test_classify_rate_limit_with_retry_after() {
        let err = AnthropicService::classify_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "slow down", "retry_after": 2.5}}"#,
        );
        assert_eq!(err.kind, crate::llm::LlmErrorKind::RateLimit);
        assert!(err.message.contains("slow down"));
        assert_eq!(err.retry_after, Some(Duration::from_millis(2500)));
    }
}
