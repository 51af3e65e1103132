//! Tool trait and registry
//!
//! The registry is the contract boundary to everything the agent can do:
//! it advertises tool schemas and invokes tools by name. Tools receive
//! already-coerced arguments and are the final arbiter of their validity.

use crate::error::AgentError;
use crate::models::{ParamSpec, ToolContent, ToolResult, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod canvas;
pub mod math;

pub use canvas::CanvasSession;

/// A single named tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Parameters in positional order
    fn parameters(&self) -> Vec<ParamSpec>;
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolContent>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// External catalogue of invocable tools
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn list_tools(&self) -> Vec<ToolSpec>;

    /// Fails with `ToolNotFound` for unknown names, or with the tool's own error
    async fn call(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult>;

    async fn get_spec(&self, name: &str) -> Option<ToolSpec> {
        self.list_tools().await.into_iter().find(|t| t.name == name)
    }
}

/// In-process registry backed by `Tool` trait objects
pub struct LocalToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in name order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for LocalToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for LocalToolRegistry {
    async fn list_tools(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    async fn call(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        let content = tool.execute(arguments).await?;
        Ok(ToolResult::ok(content))
    }

    async fn get_spec(&self, name: &str) -> Option<ToolSpec> {
        self.tools.get(name).map(|t| t.spec())
    }
}

// =============================
// Argument accessors
// =============================

fn require<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
    arguments
        .get(name)
        .ok_or_else(|| AgentError::InvalidToolInput(format!("missing parameter '{}'", name)))
}

pub(crate) fn arg_i64(arguments: &Map<String, Value>, name: &str) -> Result<i64> {
    let value = require(arguments, name)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| invalid(name, "integer", value))
}

pub(crate) fn arg_f64(arguments: &Map<String, Value>, name: &str) -> Result<f64> {
    let value = require(arguments, name)?;
    value.as_f64().ok_or_else(|| invalid(name, "number", value))
}

pub(crate) fn arg_str<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    let value = require(arguments, name)?;
    value.as_str().ok_or_else(|| invalid(name, "string", value))
}

pub(crate) fn arg_array<'a>(
    arguments: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a Vec<Value>> {
    let value = require(arguments, name)?;
    value.as_array().ok_or_else(|| invalid(name, "array", value))
}

fn invalid(name: &str, expected: &str, got: &Value) -> AgentError {
    AgentError::InvalidToolInput(format!(
        "parameter '{}' expects {}, got {}",
        name, expected, got
    ))
}

/// Registry with the math tools and a fresh canvas session
pub fn create_default_registry() -> LocalToolRegistry {
    create_registry_with_canvas(CanvasSession::shared())
}

/// Registry with the math tools drawing on the given canvas session
pub fn create_registry_with_canvas(session: Arc<CanvasSession>) -> LocalToolRegistry {
    let mut registry = LocalToolRegistry::new();

    for tool in math::math_tools() {
        registry.register(tool);
    }

    for tool in canvas::canvas_tools(session) {
        registry.register(tool);
    }

    registry
}
