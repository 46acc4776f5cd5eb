//! System prompt builder.
//!
//! Layers (in order):
//! 1. Core instructions (how to use tools and read failures)
//! 2. Operator-supplied prompt from the config
//! 3. Tool summary

use crate::tools::ToolDescriptor;

const CORE_INSTRUCTIONS: &str = r#"
You are a helpful assistant that can call tools.

When a question needs information you do not have, call the most relevant tool.
Tool results are returned to you as tool messages. A result that starts with
"Error:" means the call failed: you may retry, pick another tool, or answer
directly without it. Never invent tool names that were not offered to you.
When you have enough information, reply with the final answer as plain text.
"#;

/// Build the system prompt for an engine call.
pub fn build_system_prompt(operator_prompt: &str, tools: &[ToolDescriptor]) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(CORE_INSTRUCTIONS.trim());

    if !operator_prompt.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(operator_prompt.trim());
    }

    if tools.is_empty() {
        prompt.push_str("\n\nNo tools are available for this conversation.");
    } else {
        prompt.push_str("\n\nAvailable tools:\n");
        for t in tools {
            prompt.push_str(&format!("- {}: {}\n", t.name, t.description));
        }
    }

    prompt
}
