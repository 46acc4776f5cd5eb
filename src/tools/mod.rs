pub mod builtin;
pub mod intercept;
pub mod traits;

pub use intercept::{Intercepted, Interceptor, RecordingInterceptor};
pub use traits::{ParameterKind, ParameterSpec, Tool, ToolDescriptor};

use crate::error::{RegistryError, ToolError};
use crate::types::{ToolCallRequest, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Closure-backed tools
// ---------------------------------------------------------------------------

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
type ToolHandler = Box<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A tool whose invocation target is an async closure.
pub struct FnTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

impl FnTool {
    pub fn new<F, Fut>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            descriptor,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        (self.handler)(args).await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only name → tool mapping, fixed at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    /// Find the tool a call refers to.
    pub fn resolve(&self, call: &ToolCallRequest) -> Result<Arc<dyn Tool>, ToolError> {
        self.get(&call.name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))
    }

    /// Resolve and run a tool call. Never fails: every fault becomes a
    /// failure result.
    pub async fn execute(&self, call: &ToolCallRequest, timeout: Duration) -> ToolCallResult {
        match self.resolve(call) {
            Ok(tool) => run_tool(tool, call, timeout).await,
            Err(e) => {
                warn!("Engine requested unknown tool '{}'", call.name);
                ToolCallResult::failure(call, e.to_string())
            }
        }
    }
}

/// Run an already-resolved tool with argument validation and a timeout.
///
/// The invocation runs on its own task inside a [`JoinSet`], so a panic in
/// the tool becomes a `Failure` and the task is aborted on timeout or when
/// this future is dropped.
pub async fn run_tool(
    tool: Arc<dyn Tool>,
    call: &ToolCallRequest,
    timeout: Duration,
) -> ToolCallResult {
    if let Err(e) = tool.descriptor().validate_arguments(&call.arguments) {
        warn!("Rejected arguments for '{}': {}", call.name, e);
        return ToolCallResult::failure(call, e.to_string());
    }

    let mut task = JoinSet::new();
    let args = call.arguments.clone();
    task.spawn(async move { tool.invoke(args).await });

    let outcome = match tokio::time::timeout(timeout, task.join_next()).await {
        Ok(Some(Ok(res))) => res,
        Ok(Some(Err(e))) => Err(join_failure(e)),
        Ok(None) => Err(ToolError::ExecutionFailed("tool task vanished".into())),
        Err(_) => Err(ToolError::TimedOut(timeout.as_millis() as u64)),
    };

    match outcome {
        Ok(value) => {
            debug!("Tool '{}' returned {} bytes", call.name, value.to_string().len());
            ToolCallResult::success(call, value)
        }
        Err(e) => {
            warn!("Tool '{}' failed: {}", call.name, e);
            ToolCallResult::failure(call, e.to_string())
        }
    }
}

/// Turn a failed tool task into a [`ToolError`], keeping the panic message.
fn join_failure(err: JoinError) -> ToolError {
    if !err.is_panic() {
        return ToolError::ExecutionFailed(format!("tool task failed: {}", err));
    }
    let payload = err.into_panic();
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    ToolError::Panicked(message)
}

/// Collects tools, then freezes them into a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn register<T: Tool + 'static>(self, tool: T) -> Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut index = HashMap::with_capacity(self.tools.len());
        for (i, tool) in self.tools.iter().enumerate() {
            let name = tool.name();
            if name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if index.insert(name.to_string(), i).is_some() {
                return Err(RegistryError::DuplicateTool(name.to_string()));
            }
        }
        Ok(ToolRegistry {
            tools: self.tools,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(name: &str) -> FnTool {
        FnTool::new(
            ToolDescriptor::new(name, "Echo the text back.").param(
                "text",
                ParameterKind::String,
                "Text to echo",
            ),
            |args| async move { Ok(args["text"].clone()) },
        )
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ToolRegistry::builder()
            .register(echo("echo"))
            .register(echo("echo"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("echo".into()));
    }

    #[test]
    fn empty_names_are_rejected() {
        let err = ToolRegistry::builder().register(echo(" ")).build().unwrap_err();
        assert_eq!(err, RegistryError::EmptyName);
    }

    #[test]
    fn descriptors_follow_registration_order() {
        let registry = ToolRegistry::builder()
            .register(echo("b"))
            .register(echo("a"))
            .build()
            .unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(registry.descriptors()[1].name, "a");
    }

    #[tokio::test]
    async fn execute_unknown_tool_yields_failure() {
        let registry = ToolRegistry::empty();
        let call = ToolCallRequest::new("c1", "getWeather", json!({}));
        let result = registry.execute(&call, TIMEOUT).await;
        assert_eq!(
            result.outcome,
            crate::types::ToolOutcome::Failure("tool not found: getWeather".into())
        );
        assert_eq!(result.call_id, "c1");
    }

    #[tokio::test]
    async fn invalid_arguments_skip_the_callable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let tool = FnTool::new(
            ToolDescriptor::new("count", "Counts").param("n", ParameterKind::Integer, "n"),
            move |_| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("ok"))
                }
            },
        );
        let registry = ToolRegistry::builder().register(tool).build().unwrap();

        let bad = ToolCallRequest::new("c1", "count", json!({"n": "seven"}));
        assert!(!registry.execute(&bad, TIMEOUT).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let good = ToolCallRequest::new("c2", "count", json!({"n": 7}));
        assert!(registry.execute(&good, TIMEOUT).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_tools_time_out_as_failures() {
        let tool = FnTool::new(ToolDescriptor::new("slow", "Sleeps"), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        });
        let registry = ToolRegistry::builder().register(tool).build().unwrap();
        let call = ToolCallRequest::new("c1", "slow", json!({}));

        let result = registry.execute(&call, Duration::from_millis(20)).await;
        assert_eq!(result.render(), "Error: tool timed out after 20 ms");
    }

    #[tokio::test]
    async fn execution_errors_are_captured() {
        let tool = FnTool::new(ToolDescriptor::new("broken", "Always fails"), |_| async {
            Err(ToolError::ExecutionFailed("disk on fire".into()))
        });
        let registry = ToolRegistry::builder().register(tool).build().unwrap();
        let call = ToolCallRequest::new("c1", "broken", Value::Null);

        let result = registry.execute(&call, TIMEOUT).await;
        assert_eq!(result.render(), "Error: disk on fire");
    }

    fn crash() -> Result<Value, ToolError> {
        panic!("callable crashed")
    }

    fn crash_with(message: String) -> Result<Value, ToolError> {
        panic!("{}", message)
    }

    #[tokio::test]
    async fn panics_are_captured_as_failures() {
        let tool = FnTool::new(ToolDescriptor::new("boom", "Panics"), |_| async {
            crash()
        });
        let formatted = FnTool::new(ToolDescriptor::new("boom_fmt", "Panics"), |args| async move {
            crash_with(format!("bad input {}", args["n"]))
        });
        let registry = ToolRegistry::builder()
            .register(tool)
            .register(formatted)
            .build()
            .unwrap();

        let result = registry
            .execute(&ToolCallRequest::new("c1", "boom", json!({})), TIMEOUT)
            .await;
        assert_eq!(result.render(), "Error: tool panicked: callable crashed");

        let result = registry
            .execute(&ToolCallRequest::new("c2", "boom_fmt", json!({"n": 3})), TIMEOUT)
            .await;
        assert_eq!(result.render(), "Error: tool panicked: bad input 3");
    }

    #[tokio::test]
    async fn timed_out_tools_are_aborted() {
        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        let tool = FnTool::new(ToolDescriptor::new("slow", "Sleeps"), move |_| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(json!("late"))
            }
        });
        let registry = ToolRegistry::builder().register(tool).build().unwrap();
        let call = ToolCallRequest::new("c1", "slow", json!({}));

        let result = registry.execute(&call, Duration::from_millis(10)).await;
        assert!(!result.is_success());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
