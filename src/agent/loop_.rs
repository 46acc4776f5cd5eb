//! Tool-invocation loop: Decide → Invoke → Reconcile.
//!
//! For one request the proxy:
//! 1. Asks the engine for a decision
//! 2. Returns the answer if no tools were requested
//! 3. Otherwise executes the requested tools in order
//! 4. Appends calls and results to the turn
//! 5. Repeats, bounded by `max_rounds`

use crate::config::ProxyConfig;
use crate::engine::ReasoningEngine;
use crate::error::ConverseError;
use crate::tools::{self, ToolRegistry};
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Limits and execution mode of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyOptions {
    pub max_rounds: u32,
    pub engine_timeout: Duration,
    pub tool_timeout: Duration,
    pub parallel_tools: bool,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for ProxyOptions {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            engine_timeout: config.engine_timeout(),
            tool_timeout: config.tool_timeout(),
            parallel_tools: config.parallel_tools,
        }
    }
}

/// Drives one engine through request → tool calls → final answer.
///
/// Cheap to clone; concurrent `converse` calls share the engine and may
/// share one registry.
#[derive(Clone)]
pub struct ToolInvocationProxy {
    engine: Arc<dyn ReasoningEngine>,
    options: ProxyOptions,
}

impl ToolInvocationProxy {
    pub fn new(engine: Arc<dyn ReasoningEngine>, options: ProxyOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &ProxyOptions {
        &self.options
    }

    /// Answer `request`, calling tools from `registry` as the engine asks.
    pub async fn converse(
        &self,
        request: &str,
        registry: &ToolRegistry,
    ) -> Result<String, ConverseError> {
        let conversation = self
            .converse_detailed(request, registry, &CancellationToken::new())
            .await?;
        Ok(conversation.answer)
    }

    /// Like [`converse`](Self::converse), returning the whole turn. `cancel`
    /// is checked before every engine round, never while tools run.
    pub async fn converse_detailed(
        &self,
        request: &str,
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<Conversation, ConverseError> {
        if request.trim().is_empty() {
            return Err(ConverseError::EmptyRequest);
        }

        let descriptors = registry.descriptors();
        let mut turn = ConversationTurn::new(request);
        let mut usage = TokenUsage::default();
        let mut rounds: u32 = 0;
        let mut state = ProxyState::AwaitingEngineDecision;

        info!("Conversation started with {} tools available", descriptors.len());

        let result = loop {
            if cancel.is_cancelled() {
                break Err(ConverseError::Cancelled { rounds });
            }

            let decision = match tokio::time::timeout(
                self.options.engine_timeout,
                self.engine.decide(request, &descriptors, &turn),
            )
            .await
            {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) => break Err(ConverseError::from(e)),
                Err(_) => {
                    break Err(ConverseError::EngineUnavailable(format!(
                        "no decision within {} ms",
                        self.options.engine_timeout.as_millis()
                    )))
                }
            };
            usage.add(&decision.usage);

            if decision.is_final() {
                let answer = decision.content.unwrap_or_default();
                turn.push(TurnMessage::FinalAnswer {
                    content: answer.clone(),
                });
                transition(&mut state, ProxyState::Done);
                info!("Final answer after {} rounds ({} chars)", rounds, answer.len());
                return Ok(Conversation {
                    answer,
                    turn,
                    rounds,
                    usage,
                });
            }

            if let Err(e) = check_calls(&decision.tool_calls) {
                break Err(e);
            }

            if rounds >= self.options.max_rounds {
                break Err(ConverseError::LoopLimitExceeded {
                    limit: self.options.max_rounds,
                    turn: turn.clone(),
                });
            }
            rounds += 1;

            transition(&mut state, ProxyState::ExecutingTools);
            for call in &decision.tool_calls {
                info!("[Round {}] Tool: {}({})", rounds, call.name, call.arguments);
                turn.push(TurnMessage::ToolCall(call.clone()));
            }

            let results = if self.options.parallel_tools && decision.tool_calls.len() > 1 {
                self.execute_parallel(&decision.tool_calls, registry).await
            } else {
                self.execute_sequential(&decision.tool_calls, registry).await
            };

            for result in results {
                if result.is_success() {
                    info!("[Round {}] Tool result: {} chars", rounds, result.render().len());
                } else {
                    warn!("[Round {}] Tool error: {}", rounds, result.render());
                }
                turn.push(TurnMessage::ToolResult(result));
            }
            transition(&mut state, ProxyState::AwaitingEngineDecision);
        };

        transition(&mut state, ProxyState::Failed);
        if let Err(e) = &result {
            warn!("Conversation failed: {}", e);
        }
        result
    }

    async fn execute_sequential(
        &self,
        calls: &[ToolCallRequest],
        registry: &ToolRegistry,
    ) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(registry.execute(call, self.options.tool_timeout).await);
        }
        results
    }

    /// Run every call on its own task, then collect results in request order.
    /// Dropping the returned future aborts the tasks still running.
    async fn execute_parallel(
        &self,
        calls: &[ToolCallRequest],
        registry: &ToolRegistry,
    ) -> Vec<ToolCallResult> {
        let timeout = self.options.tool_timeout;
        let mut slots: Vec<Option<ToolCallResult>> = vec![None; calls.len()];
        let mut tasks = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            match registry.resolve(call) {
                Ok(tool) => {
                    let call = call.clone();
                    tasks.spawn(async move { (index, tools::run_tool(tool, &call, timeout).await) });
                }
                Err(e) => slots[index] = Some(ToolCallResult::failure(call, e.to_string())),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!("Tool task failed: {}", e),
            }
        }

        calls
            .iter()
            .zip(slots)
            .map(|(call, slot)| {
                slot.unwrap_or_else(|| ToolCallResult::failure(call, "tool task failed"))
            })
            .collect()
    }
}

/// Every requested call needs a name and object (or absent) arguments.
fn check_calls(calls: &[ToolCallRequest]) -> Result<(), ConverseError> {
    for call in calls {
        if call.name.trim().is_empty() {
            return Err(ConverseError::MalformedToolCall(format!(
                "call '{}' has no tool name",
                call.id
            )));
        }
        if !(call.arguments.is_object() || call.arguments.is_null()) {
            return Err(ConverseError::MalformedToolCall(format!(
                "arguments for '{}' must be a JSON object",
                call.name
            )));
        }
    }
    Ok(())
}

fn transition(state: &mut ProxyState, next: ProxyState) {
    debug!("Proxy state: {} -> {}", state, next);
    *state = next;
}
