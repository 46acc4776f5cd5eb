//! Reasoning engines: whatever decides between answering and calling tools.

pub mod openai;

pub use openai::OpenAiEngine;

use crate::error::EngineError;
use crate::tools::ToolDescriptor;
use crate::types::{ConversationTurn, EngineDecision};
use async_trait::async_trait;

/// The decision-making collaborator of the proxy.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Decide the next step given the request, the available tools, and the
    /// turn so far (which starts with the request itself).
    async fn decide(
        &self,
        request: &str,
        tools: &[ToolDescriptor],
        turn: &ConversationTurn,
    ) -> Result<EngineDecision, EngineError>;
}
