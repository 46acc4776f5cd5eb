//! Shared types used across the proxy.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Proxy state machine
// ---------------------------------------------------------------------------

/// States a single `converse` call moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyState {
    /// Waiting for the reasoning engine to answer or request tools.
    AwaitingEngineDecision,
    /// Running the tools requested in the current round.
    ExecutingTools,
    /// Final answer produced.
    Done,
    /// Terminated with an error. The [`ConverseError`](crate::error::ConverseError)
    /// itself is the `Err` that `converse` returns; the state only marks the
    /// transition in the log.
    Failed,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingEngineDecision => write!(f, "awaiting_engine_decision"),
            Self::ExecutingTools => write!(f, "executing_tools"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl Default for ProxyState {
    fn default() -> Self {
        Self::AwaitingEngineDecision
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// A tool call request emitted by the reasoning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of a single tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure(String),
}

/// Result of executing a [`ToolCallRequest`], correlated by call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    pub fn success(call: &ToolCallRequest, value: serde_json::Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Success(value),
        }
    }

    pub fn failure(call: &ToolCallRequest, reason: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: ToolOutcome::Failure(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// Text handed back to the reasoning engine.
    ///
    /// String values are passed through verbatim, other JSON values are
    /// serialized, failures become `Error: <reason>`.
    pub fn render(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(serde_json::Value::String(s)) => s.clone(),
            ToolOutcome::Success(value) => value.to_string(),
            ToolOutcome::Failure(reason) => format!("Error: {}", reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation turn
// ---------------------------------------------------------------------------

/// Role tag of a message inside a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Request,
    ToolCall,
    ToolResult,
    FinalAnswer,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::FinalAnswer => write!(f, "final_answer"),
        }
    }
}

/// One message of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnMessage {
    Request { content: String },
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
    FinalAnswer { content: String },
}

impl TurnMessage {
    pub fn role(&self) -> TurnRole {
        match self {
            Self::Request { .. } => TurnRole::Request,
            Self::ToolCall(_) => TurnRole::ToolCall,
            Self::ToolResult(_) => TurnRole::ToolResult,
            Self::FinalAnswer { .. } => TurnRole::FinalAnswer,
        }
    }
}

impl fmt::Display for TurnMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { content } | Self::FinalAnswer { content } => {
                write!(f, "[{}] {}", self.role(), content)
            }
            Self::ToolCall(call) => write!(f, "[{}] {}({})", self.role(), call.name, call.arguments),
            Self::ToolResult(result) => {
                write!(f, "[{}] {} -> {}", self.role(), result.tool_name, result.render())
            }
        }
    }
}

/// Append-only message history of one `converse` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    messages: Vec<TurnMessage>,
}

impl ConversationTurn {
    /// Start a turn with the caller's request as its first message.
    pub fn new(request: &str) -> Self {
        Self {
            messages: vec![TurnMessage::Request {
                content: request.to_string(),
            }],
        }
    }

    pub fn push(&mut self, message: TurnMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[TurnMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The original request text, if the turn has one.
    pub fn request(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match m {
            TurnMessage::Request { content } => Some(content.as_str()),
            _ => None,
        })
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.messages.iter().filter_map(|m| match m {
            TurnMessage::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolCallResult> {
        self.messages.iter().filter_map(|m| match m {
            TurnMessage::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Engine decisions
// ---------------------------------------------------------------------------

/// What the reasoning engine decided for one round.
///
/// An empty `tool_calls` list means `content` is the final answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineDecision {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
}

impl EngineDecision {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn call_tools(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }

    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Token usage from an engine call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Completed `converse` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub answer: String,
    pub turn: ConversationTurn,
    /// Rounds in which tools were executed.
    pub rounds: u32,
    pub usage: TokenUsage,
}

// ---------------------------------------------------------------------------
// Engine-facing chat messages
// ---------------------------------------------------------------------------

/// A chat message in the provider-neutral form engines consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}
