//! Interceptors: decorators composed around a tool at registration time.
//!
//! An [`Interceptor`] sees every invocation of the tool it wraps but cannot
//! change its arguments or its result.

use super::traits::{Tool, ToolDescriptor};
use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Hooks run around a wrapped tool.
pub trait Interceptor: Send + Sync {
    /// Called once when the interceptor is composed around a tool.
    fn attached(&self, _descriptor: &ToolDescriptor) {}

    fn before(&self, _descriptor: &ToolDescriptor, _args: &Value) {}

    fn after(&self, _descriptor: &ToolDescriptor, _outcome: &Result<Value, ToolError>) {}
}

/// A tool wrapped by an interceptor. Exposes the inner tool's descriptor.
pub struct Intercepted<T> {
    inner: T,
    interceptor: Arc<dyn Interceptor>,
}

impl<T: Tool> Intercepted<T> {
    pub fn new(inner: T, interceptor: Arc<dyn Interceptor>) -> Self {
        interceptor.attached(inner.descriptor());
        Self { inner, interceptor }
    }
}

#[async_trait]
impl<T: Tool> Tool for Intercepted<T> {
    fn descriptor(&self) -> &ToolDescriptor {
        self.inner.descriptor()
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let descriptor = self.inner.descriptor();
        self.interceptor.before(descriptor, &args);
        let outcome = self.inner.invoke(args).await;
        self.interceptor.after(descriptor, &outcome);
        outcome
    }
}

/// Records what it has seen: whether it is attached to anything, the
/// descriptions of invoked tools, and how many invocations completed.
#[derive(Debug, Default)]
pub struct RecordingInterceptor {
    enabled: AtomicBool,
    invocations: AtomicUsize,
    descriptions: Mutex<Vec<String>>,
}

impl RecordingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the interceptor wraps at least one tool.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Descriptions of invoked tools, in invocation order.
    pub fn tool_descriptions(&self) -> Vec<String> {
        self.descriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Interceptor for RecordingInterceptor {
    fn attached(&self, descriptor: &ToolDescriptor) {
        debug!("Interceptor attached to '{}'", descriptor.name);
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn before(&self, descriptor: &ToolDescriptor, _args: &Value) {
        self.descriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(descriptor.description.clone());
    }

    fn after(&self, descriptor: &ToolDescriptor, outcome: &Result<Value, ToolError>) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Intercepted '{}' ({})",
            descriptor.name,
            if outcome.is_ok() { "ok" } else { "failed" }
        );
    }
}
