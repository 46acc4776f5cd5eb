//! Built-in tools: current date, current time, and the `@Aspect` package
//! lookup (registered behind a [`RecordingInterceptor`]).

use super::intercept::{Intercepted, RecordingInterceptor};
use super::traits::{Tool, ToolDescriptor};
use super::ToolRegistry;
use crate::error::{RegistryError, ToolError};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveTime};
use serde_json::{json, Value};
use std::sync::Arc;

pub const CURRENT_DATE_TOOL: &str = "getCurrentDate";
pub const CURRENT_TIME_TOOL: &str = "getCurrentTime";
pub const ASPECT_PACKAGE_TOOL: &str = "getAspectPackage";

pub const ASPECT_PACKAGE: &str = "org.aspectj.lang.annotation";
pub const ASPECT_TOOL_DESCRIPTION: &str = "Find the package directory where @Aspect is located.";

/// Today's date as `YYYY-MM-DD`.
pub struct CurrentDateTool {
    descriptor: ToolDescriptor,
    fixed: Option<NaiveDate>,
}

impl CurrentDateTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(CURRENT_DATE_TOOL, "Get the current date."),
            fixed: None,
        }
    }

    /// Always report `date`.
    pub fn fixed(date: NaiveDate) -> Self {
        Self {
            fixed: Some(date),
            ..Self::new()
        }
    }
}

impl Default for CurrentDateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentDateTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        let date = self.fixed.unwrap_or_else(|| Local::now().date_naive());
        Ok(json!(date.format("%Y-%m-%d").to_string()))
    }
}

/// Local wall-clock time as `HH:MM:SS`.
pub struct CurrentTimeTool {
    descriptor: ToolDescriptor,
    fixed: Option<NaiveTime>,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(CURRENT_TIME_TOOL, "Get the current time."),
            fixed: None,
        }
    }

    pub fn fixed(time: NaiveTime) -> Self {
        Self {
            fixed: Some(time),
            ..Self::new()
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        let time = self.fixed.unwrap_or_else(|| Local::now().time());
        Ok(json!(time.format("%H:%M:%S").to_string()))
    }
}

pub struct AspectPackageTool {
    descriptor: ToolDescriptor,
}

impl AspectPackageTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(ASPECT_PACKAGE_TOOL, ASPECT_TOOL_DESCRIPTION),
        }
    }
}

impl Default for AspectPackageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AspectPackageTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(json!(ASPECT_PACKAGE))
    }
}

/// Registry with all built-in tools; the aspect lookup is wrapped by `recorder`.
pub fn builtin_registry(recorder: Arc<RecordingInterceptor>) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::builder()
        .register(CurrentDateTool::new())
        .register(CurrentTimeTool::new())
        .register(Intercepted::new(AspectPackageTool::new(), recorder))
        .build()
}
