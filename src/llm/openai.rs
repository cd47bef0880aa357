//! `OpenAI`-compatible chat-completions provider
//!
//! Serves `OpenAI` itself plus Nebius, `OpenRouter` and Ollama, which all speak
//! the same wire format and differ only in endpoint, key and headers.

use super::types::{
    ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, ToolChoice, Usage,
};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for one `OpenAI`-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Extra headers sent with every request, e.g. `OpenRouter` attribution
    pub headers: Vec<(String, String)>,
    /// Some local servers reject `tool_choice: "required"`
    pub supports_required_tool_choice: bool,
    pub timeout: Duration,
}

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    endpoint: String,
    settings: OpenAiSettings,
}

impl OpenAIService {
    pub fn new(settings: OpenAiSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        let endpoint = format!(
            "{}/chat/completions",
            settings.base_url.trim_end_matches('/')
        );
        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            let system_text = request
                .system
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_text),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            messages.extend(Self::translate_message(msg));
        }

        let (tools, tool_choice) = if request.tools.is_empty() {
            (None, None)
        } else {
            let tools = request
                .tools
                .iter()
                .map(|t| OpenAITool {
                    r#type: "function".to_string(),
                    function: OpenAIFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect();
            let choice = match request.tool_choice {
                ToolChoice::Required if self.settings.supports_required_tool_choice => "required",
                _ => "auto",
            };
            (Some(tools), Some(choice.to_string()))
        };

        OpenAIRequest {
            model: self.settings.model.clone(),
            messages,
            tools,
            tool_choice,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }

    /// Translate an LLM message to `OpenAI` format.
    /// Returns a Vec because tool results need separate messages with role "tool".
    fn translate_message(msg: &LlmMessage) -> Vec<OpenAIMessage> {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();

        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => {
                    text_parts.push(text.clone());
                }
                ContentBlock::ToolUse { id, name, input } => {
                    let arguments = match input {
                        serde_json::Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    };
                    tool_calls.push(OpenAIToolCall {
                        id: id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: name.clone(),
                            arguments,
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => {
                    tool_results.push((tool_use_id.clone(), content.clone()));
                }
            }
        }

        let mut messages = Vec::new();

        if !text_parts.is_empty() || !tool_calls.is_empty() {
            let content = if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            };

            messages.push(OpenAIMessage {
                role: role.to_string(),
                content,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            });
        }

        // Error results already carry a structured `{"error": ...}` body
        for (tool_use_id, content) in tool_results {
            messages.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(content),
                tool_calls: None,
                tool_call_id: Some(tool_use_id),
            });
        }

        messages
    }

    fn normalize_response(resp: OpenAIResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No choices in response"))?;

        let mut content = Vec::new();

        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }

        for tc in choice.message.tool_calls.unwrap_or_default() {
            if tc.function.name.is_empty() {
                continue;
            }
            // Keep unparsable arguments verbatim so the dispatcher can reject them
            let input = if tc.function.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::String(tc.function.arguments))
            };
            content.push(ContentBlock::tool_use(tc.id, tc.function.name, input));
        }

        let reasoning = choice
            .message
            .reasoning_content
            .or(choice.message.reasoning)
            .filter(|r| !r.trim().is_empty());

        let end_turn = choice.finish_reason.as_deref() == Some("stop");

        Ok(LlmResponse {
            content,
            reasoning,
            end_turn,
            usage: Usage {
                input_tokens: resp.usage.prompt_tokens,
                output_tokens: resp.usage.completion_tokens,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            },
        })
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let openai_request = self.translate_request(request);

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }
        for (name, value) in &self.settings.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            let mut err = LlmError::from_status(status.as_u16(), &message);
            if let Some(delay) = retry_after {
                err = err.with_retry_after(delay);
            }
            return Err(err);
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.settings.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{SystemContent, ToolDefinition};
    use serde_json::json;

    fn service(supports_required: bool) -> OpenAIService {
        OpenAIService::new(OpenAiSettings {
            base_url: "http://localhost:11434/v1/".to_string(),
            api_key: None,
            model: "qwen3:4b".to_string(),
            headers: Vec::new(),
            supports_required_tool_choice: supports_required,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request(choice: ToolChoice) -> LlmRequest {
        LlmRequest {
            system: vec![SystemContent::cached("You are a legal researcher.")],
            messages: vec![
                LlmMessage::user(vec![ContentBlock::text("Question: Kündigung?")]),
                LlmMessage::assistant(vec![ContentBlock::tool_use(
                    "call_1",
                    "file_search",
                    json!({"query": "Kündigung"}),
                )]),
                LlmMessage::user(vec![ContentBlock::tool_result(
                    "call_1",
                    "{\"matches\":[]}",
                    false,
                )]),
            ],
            tools: vec![ToolDefinition {
                name: "file_search".to_string(),
                description: "search".to_string(),
                input_schema: json!({"type": "object"}),
            }],
            tool_choice: choice,
            max_tokens: Some(1024),
        }
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            service(true).endpoint,
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_translate_request_roles() {
        let body = serde_json::to_value(service(true).translate_request(&request(ToolChoice::Required)))
            .unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"Kündigung\"}"
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(body["tool_choice"], "required");
    }

    #[test]
    fn test_required_downgraded_when_unsupported() {
        let body =
            serde_json::to_value(service(false).translate_request(&request(ToolChoice::Required)))
                .unwrap();
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_normalize_reads_reasoning_and_tools() {
        let resp: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "reasoning_content": "Ich suche zuerst im BGB.",
                    "tool_calls": [
                        {"id": "a", "type": "function",
                         "function": {"name": "file_search", "arguments": "{\"query\":\"Miete\"}"}},
                        {"id": "b", "type": "function",
                         "function": {"name": "list_paths", "arguments": ""}},
                        {"id": "c", "type": "function",
                         "function": {"name": "read_file_range", "arguments": "{broken"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        }))
        .unwrap();

        let normalized = OpenAIService::normalize_response(resp).unwrap();
        assert_eq!(normalized.reasoning.as_deref(), Some("Ich suche zuerst im BGB."));
        let uses = normalized.tool_uses();
        assert_eq!(uses.len(), 3);
        assert_eq!(uses[0].2, &json!({"query": "Miete"}));
        assert_eq!(uses[1].2, &json!({}));
        assert_eq!(uses[2].2, &json!("{broken"));
        assert_eq!(normalized.usage.input_tokens, 100);
        assert!(!normalized.end_turn);
    }

    #[test]
    fn test_normalize_without_usage() {
        let resp: OpenAIResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "Antwort"}, "finish_reason": "stop"}]
        }))
        .unwrap();
        let normalized = OpenAIService::normalize_response(resp).unwrap();
        assert_eq!(normalized.text(), "Antwort");
        assert!(normalized.end_turn);
        assert_eq!(normalized.usage, Usage::default());
    }

    #[test]
    fn test_no_choices_is_error() {
        let resp: OpenAIResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(OpenAIService::normalize_response(resp).is_err());
    }
}
