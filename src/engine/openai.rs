//! Reasoning engine backed by an OpenAI-compatible chat-completions API.
//!
//! Supports tool-use (function calling) in the OpenAI format.

use super::ReasoningEngine;
use crate::agent::{context, system_prompt};
use crate::config::ProxyConfig;
use crate::error::EngineError;
use crate::tools::ToolDescriptor;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Engine client for `{base_url}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiEngine {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    log_requests: bool,
    log_responses: bool,
    operator_prompt: String,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    role: ChatRole,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'a str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCallPayload {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: FunctionCallPayload,
}

fn function_type() -> String {
    "function".into()
}

/// `arguments` is a JSON-encoded string on the wire. Some compatible
/// servers send the object itself, so any value is accepted here and
/// classified in [`parse_response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCallPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Kept raw so a bad entry is reported as a malformed call rather than
    /// an unreadable response.
    #[serde(default)]
    tool_calls: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UsagePayload {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAiEngine {
    /// Create an engine client with default sampling settings.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let defaults = ProxyConfig::default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            log_requests: false,
            log_responses: false,
            operator_prompt: String::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, pool settings).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Create an engine client from the proxy config.
    pub fn from_config(config: &ProxyConfig, api_key: &str) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            log_requests: config.log_requests,
            log_responses: config.log_responses,
            operator_prompt: config.system_prompt.clone(),
            ..Self::new(&config.base_url, api_key, &config.model)
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(
        &'a self,
        messages: &[ChatMessage],
        tools: &'a [ToolDescriptor],
    ) -> ChatRequest<'a> {
        let msg_payloads = messages
            .iter()
            .map(|m| MessagePayload {
                role: m.role,
                content: m.content.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(m.tool_calls.iter().map(to_call_payload).collect())
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect();

        let tool_payloads = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ToolPayload {
                        r#type: "function",
                        function: FunctionPayload {
                            name: &t.name,
                            description: &t.description,
                            parameters: t.parameters_schema(),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: &self.model,
            messages: msg_payloads,
            tools: tool_payloads,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

fn to_call_payload(call: &ToolCallRequest) -> ToolCallPayload {
    let arguments = if call.arguments.is_null() {
        "{}".to_string()
    } else {
        call.arguments.to_string()
    };
    let arguments = serde_json::Value::String(arguments);
    ToolCallPayload {
        id: call.id.clone(),
        r#type: function_type(),
        function: FunctionCallPayload {
            name: call.name.clone(),
            arguments,
        },
    }
}

/// Turn a chat-completions response into a decision.
fn parse_response(body: ChatResponse) -> Result<EngineDecision, EngineError> {
    let choice = body.choices.into_iter().next().unwrap_or(Choice {
        message: ResponseMessage {
            content: None,
            tool_calls: None,
        },
    });

    let raw_calls = choice.message.tool_calls.unwrap_or_default();
    let mut tool_calls = Vec::with_capacity(raw_calls.len());
    for (index, raw) in raw_calls.into_iter().enumerate() {
        let tc: ToolCallPayload = serde_json::from_value(raw).map_err(|e| {
            EngineError::Malformed(format!("tool call #{} is not a function call: {}", index, e))
        })?;
        if tc.function.name.trim().is_empty() {
            return Err(EngineError::Malformed("tool call without a function name".into()));
        }

        let arguments = parse_arguments(&tc.function.name, tc.function.arguments)?;
        let id = if tc.id.is_empty() {
            ulid::Ulid::new().to_string()
        } else {
            tc.id
        };
        tool_calls.push(ToolCallRequest {
            id,
            name: tc.function.name,
            arguments,
        });
    }

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(EngineDecision {
        content: choice.message.content,
        tool_calls,
        usage,
    })
}

/// Arguments arrive as a JSON string, an inline object, or nothing at all.
/// Anything that does not end up as an object is malformed.
fn parse_arguments(
    name: &str,
    raw: serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let arguments = match raw {
        serde_json::Value::Null => return Ok(serde_json::Value::Object(Default::default())),
        serde_json::Value::String(text) if text.trim().is_empty() => {
            return Ok(serde_json::Value::Object(Default::default()))
        }
        serde_json::Value::String(text) => {
            serde_json::from_str::<serde_json::Value>(text.trim()).map_err(|e| {
                EngineError::Malformed(format!(
                    "arguments for '{}' are not valid JSON: {}",
                    name, e
                ))
            })?
        }
        other => other,
    };
    if !arguments.is_object() {
        return Err(EngineError::Malformed(format!(
            "arguments for '{}' must be a JSON object",
            name
        )));
    }
    Ok(arguments)
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn decide(
        &self,
        _request: &str,
        tools: &[ToolDescriptor],
        turn: &ConversationTurn,
    ) -> Result<EngineDecision, EngineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let prompt = system_prompt::build_system_prompt(&self.operator_prompt, tools);
        let messages = context::build_messages(&prompt, turn);
        let request = self.build_request(&messages, tools);

        if self.log_requests {
            info!(
                "Engine request: {}",
                serde_json::to_string(&request).unwrap_or_default()
            );
        } else {
            debug!("Engine request to model: {}", self.model);
        }

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if self.log_responses {
            info!("Engine response ({}): {}", status, text);
        }
        if !status.is_success() {
            return Err(EngineError::Unavailable(format!(
                "engine request failed ({}): {}",
                status, text
            )));
        }

        let body: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            EngineError::Unavailable(format!("failed to parse engine response: {}", e))
        })?;
        parse_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ParameterKind;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn parse(value: serde_json::Value) -> Result<EngineDecision, EngineError> {
        parse_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn plain_content_is_a_final_answer() {
        let decision = parse(json!({
            "choices": [{"message": {"content": "Today is 2024-05-17."}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 6, "total_tokens": 18}
        }))
        .unwrap();
        assert!(decision.is_final());
        assert_eq!(decision.content.as_deref(), Some("Today is 2024-05-17."));
        assert_eq!(decision.usage.total_tokens, 18);
    }

    #[test]
    fn tool_calls_are_parsed_in_order() {
        let decision = parse(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "getCurrentDate", "arguments": "{}"}},
                    {"id": "call_2", "type": "function",
                     "function": {"name": "getWeather", "arguments": "{\"city\":\"Oslo\"}"}}
                ]
            }}]
        }))
        .unwrap();
        assert_eq!(decision.tool_calls.len(), 2);
        assert_eq!(decision.tool_calls[0].name, "getCurrentDate");
        assert_eq!(decision.tool_calls[1].id, "call_2");
        assert_eq!(decision.tool_calls[1].arguments, json!({"city": "Oslo"}));
    }

    #[test]
    fn unparseable_arguments_are_malformed() {
        let err = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "type": "function",
                 "function": {"name": "getWeather", "arguments": "{city: Oslo"}}
            ]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Malformed(ref m) if m.contains("getWeather")));
    }

    #[test]
    fn non_object_arguments_and_missing_names_are_malformed() {
        let err = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "function": {"name": "getWeather", "arguments": "[1,2]"}}
            ]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Malformed(_)));

        let err = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "function": {"name": "", "arguments": "{}"}}
            ]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Malformed(_)));
    }

    #[test]
    fn inline_object_arguments_are_accepted() {
        let decision = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "type": "function",
                 "function": {"name": "getCurrentDate", "arguments": {"tz": "UTC"}}}
            ]}}]
        }))
        .unwrap();
        assert_eq!(decision.tool_calls[0].name, "getCurrentDate");
        assert_eq!(decision.tool_calls[0].arguments, json!({"tz": "UTC"}));
    }

    #[test]
    fn calls_without_a_function_are_malformed() {
        let err = parse(json!({
            "choices": [{"message": {"tool_calls": [{"id": "c", "type": "function"}]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Malformed(ref m) if m.contains("#0")));

        let err = parse(json!({
            "choices": [{"message": {"tool_calls": ["getCurrentDate"]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Malformed(_)));

        let err = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "function": {"name": "getWeather", "arguments": 7}}
            ]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Malformed(ref m) if m.contains("getWeather")));
    }

    #[test]
    fn null_tool_calls_mean_a_final_answer() {
        let decision = parse(json!({
            "choices": [{"message": {"content": "done", "tool_calls": null}}]
        }))
        .unwrap();
        assert!(decision.is_final());
        assert_eq!(decision.content.as_deref(), Some("done"));
    }

    #[test]
    fn missing_call_ids_are_generated() {
        let decision = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"function": {"name": "getCurrentTime", "arguments": ""}}
            ]}}]
        }))
        .unwrap();
        assert!(!decision.tool_calls[0].id.is_empty());
        assert_eq!(decision.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn request_carries_tools_history_and_sampling_settings() {
        let config = ProxyConfig {
            temperature: 0.0,
            max_tokens: 256,
            ..ProxyConfig::default()
        };
        let engine = OpenAiEngine::from_config(&config, "sk-test");
        let tools = vec![ToolDescriptor::new("getWeather", "Weather.").param(
            "city",
            ParameterKind::String,
            "City",
        )];

        let mut turn = ConversationTurn::new("Weather in Oslo?");
        let call = ToolCallRequest::new("call_1", "getWeather", json!({"city": "Oslo"}));
        turn.push(TurnMessage::ToolCall(call.clone()));
        turn.push(TurnMessage::ToolResult(ToolCallResult::success(&call, json!("sunny"))));
        let messages = context::build_messages("system", &turn);

        let body = serde_json::to_value(engine.build_request(&messages, &tools)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["tools"][0]["function"]["name"], "getWeather");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["city"]));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Oslo\"}"
        );
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["messages"][3]["content"], "sunny");
    }

    #[test]
    fn no_tools_means_no_tools_field() {
        let engine = OpenAiEngine::new("http://localhost:1/", "k", "m");
        let turn = ConversationTurn::new("hi");
        let messages = context::build_messages("", &turn);
        let body = serde_json::to_value(engine.build_request(&messages, &[])).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(engine.base_url, "http://localhost:1");
    }

    // -- HTTP round-trips against a local listener -------------------------

    /// Accept one connection, answer it with `status` and `body`, and hand
    /// back the raw request text.
    async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&received).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (key, value) = line.split_once(':')?;
                            key.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if received.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    fn local_engine(base_url: &str) -> OpenAiEngine {
        let config = ProxyConfig {
            base_url: base_url.to_string(),
            log_requests: true,
            log_responses: true,
            ..ProxyConfig::default()
        };
        OpenAiEngine::from_config(&config, "sk-test")
            .with_http_client(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    fn date_tool() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new("getCurrentDate", "Today's date.")]
    }

    #[tokio::test]
    async fn tool_calls_come_back_over_http() {
        let body = json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "getCurrentDate", "arguments": "{}"}}
            ]}}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 7, "total_tokens": 47}
        });
        let (url, server) = serve_once("200 OK", body.to_string()).await;

        let decision = local_engine(&url)
            .decide("date?", &date_tool(), &ConversationTurn::new("date?"))
            .await
            .unwrap();

        assert_eq!(decision.tool_calls.len(), 1);
        assert_eq!(decision.tool_calls[0].id, "call_1");
        assert_eq!(decision.tool_calls[0].name, "getCurrentDate");
        assert_eq!(decision.usage.total_tokens, 47);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions "));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"getCurrentDate\""));
    }

    #[tokio::test]
    async fn inline_arguments_over_http_reach_the_decision() {
        let body = json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "type": "function",
                 "function": {"name": "getCurrentDate", "arguments": {"tz": "UTC"}}}
            ]}}]
        });
        let (url, server) = serve_once("200 OK", body.to_string()).await;

        let decision = local_engine(&url)
            .decide("date?", &date_tool(), &ConversationTurn::new("date?"))
            .await
            .unwrap();
        assert_eq!(decision.tool_calls[0].arguments, json!({"tz": "UTC"}));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let (url, server) =
            serve_once("500 Internal Server Error", r#"{"error":"overloaded"}"#.into()).await;

        let err = local_engine(&url)
            .decide("date?", &date_tool(), &ConversationTurn::new("date?"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Unavailable(ref m) if m.contains("500") && m.contains("overloaded")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_servers_are_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = local_engine(&format!("http://{}", addr))
            .decide("date?", &date_tool(), &ConversationTurn::new("date?"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[tokio::test]
    async fn garbage_bodies_are_unavailable() {
        let (url, server) = serve_once("200 OK", "<html>gateway</html>".into()).await;

        let err = local_engine(&url)
            .decide("date?", &date_tool(), &ConversationTurn::new("date?"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Unavailable(ref m) if m.contains("failed to parse")));
        server.await.unwrap();
    }
}
