//! Configuration schema for toolproxy.toml.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Chat-completions API base URL.
    pub base_url: String,

    /// API key. `OPENAI_API_KEY` takes over when this is empty.
    pub api_key: String,

    /// Model name sent with every engine request.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum tokens per engine response.
    pub max_tokens: u32,

    /// Log outgoing engine requests.
    pub log_requests: bool,

    /// Log raw engine responses.
    pub log_responses: bool,

    /// Extra instructions appended to the system prompt.
    pub system_prompt: String,

    /// Maximum tool rounds per conversation.
    pub max_rounds: u32,

    /// Timeout for a single engine decision.
    pub engine_timeout_ms: u64,

    /// Timeout for a single tool invocation.
    pub tool_timeout_ms: u64,

    /// Run the tools of one round concurrently.
    pub parallel_tools: bool,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: 1024,
            log_requests: false,
            log_responses: false,
            system_prompt: String::new(),
            max_rounds: 5,
            engine_timeout_ms: 60_000,
            tool_timeout_ms: 10_000,
            parallel_tools: false,
            log_level: "info".into(),
        }
    }
}

impl ProxyConfig {
    /// Reject values the proxy cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            bail!("max_rounds must be at least 1");
        }
        if self.engine_timeout_ms == 0 || self.tool_timeout_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("temperature must be between 0.0 and 2.0, got {}", self.temperature);
        }
        Ok(())
    }

    /// API key from the config, falling back to `OPENAI_API_KEY`.
    pub fn effective_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}
