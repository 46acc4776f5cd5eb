//! toolproxy: capability-resolving tool-invocation proxy.
//!
//! A request goes to a reasoning engine together with the registered tools.
//! The engine either answers or asks for tool calls; the proxy runs those,
//! feeds the results back, and repeats until an answer arrives.

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod tools;
pub mod types;

pub use agent::{ProxyOptions, ToolInvocationProxy};
pub use engine::{OpenAiEngine, ReasoningEngine};
pub use error::{ConverseError, EngineError, RegistryError, ToolError};
pub use tools::{Tool, ToolDescriptor, ToolRegistry};
