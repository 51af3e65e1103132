//! Action dispatcher
//!
//! Turns an approved decision into a side effect: either the final answer is
//! written to memory, or the action clause is resolved against the tool
//! registry, its parameters coerced, the tool invoked under a deadline and
//! the normalized result appended to memory.

pub mod coercion;

use crate::error::AgentError;
use crate::memory::{render_value, MemoryState, LAST_FAILED_CALL_KEY};
use crate::models::{ActionClause, ActionResult, Decision, ToolCall, ToolContent};
use crate::tools::ToolRegistry;
use crate::Result;
use coercion::coerce;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Result of one dispatch plus whether the loop may go on
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub result: ActionResult,
    pub should_continue: bool,
}

impl ActionOutcome {
    fn stop(result: ActionResult) -> Self {
        Self {
            result,
            should_continue: false,
        }
    }
}

pub struct ActionDispatcher {
    registry: Arc<dyn ToolRegistry>,
    tool_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(registry: Arc<dyn ToolRegistry>, tool_timeout: Duration) -> Self {
        Self {
            registry,
            tool_timeout,
        }
    }

    /// Execute a decision against `memory`. Never fails; failures come back as
    /// an unsuccessful `ActionResult` with `should_continue == false`.
    pub async fn execute(&self, decision: &Decision, memory: &mut MemoryState) -> ActionOutcome {
        if !decision.should_execute {
            return ActionOutcome::stop(ActionResult::failed(
                format!("decision '{}' is not executable", decision.kind),
                None,
                Vec::new(),
            ));
        }

        let Some(action) = decision.action.as_deref() else {
            return ActionOutcome::stop(ActionResult::failed(
                "decision carries no action",
                None,
                Vec::new(),
            ));
        };

        match ActionClause::classify(action) {
            Some(ActionClause::Answer(payload)) => self.provide_answer(payload, memory),
            Some(ActionClause::Call(body)) => self.call_tool(body, decision, memory).await,
            None => ActionOutcome::stop(ActionResult::failed(
                format!("unrecognized action clause '{}'", action),
                None,
                Vec::new(),
            )),
        }
    }

    fn provide_answer(&self, payload: &str, memory: &mut MemoryState) -> ActionOutcome {
        let answer = Value::String(payload.trim().to_string());
        let mut warnings = Vec::new();

        if memory.set_final_answer(answer.clone()) {
            info!(answer = %payload, "Final answer recorded");
        } else {
            warn!("Final answer already set for this run; keeping the first one");
            warnings.push("final answer already set".to_string());
        }

        ActionOutcome::stop(ActionResult::succeeded(answer, None, warnings))
    }

    async fn call_tool(
        &self,
        body: &str,
        decision: &Decision,
        memory: &mut MemoryState,
    ) -> ActionOutcome {
        let (tool_name, raw_params) = match parse_call(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return ActionOutcome::stop(ActionResult::failed(e.to_string(), None, Vec::new()))
            }
        };

        let Some(spec) = self.registry.get_spec(&tool_name).await else {
            let error = AgentError::ToolNotFound(tool_name.clone());
            let call = ToolCall {
                tool_name,
                arguments: Map::new(),
            };
            record_failure(memory, &call, &error.to_string());
            return ActionOutcome::stop(ActionResult::failed(
                error.to_string(),
                Some(call),
                Vec::new(),
            ));
        };

        let mut warnings = Vec::new();
        let mut arguments = Map::new();

        for (index, raw) in raw_params.iter().enumerate() {
            let Some(param) = spec.parameters.get(index) else {
                let note = format!(
                    "dropped extra parameter #{} '{}' for {} (expects {})",
                    index + 1,
                    raw,
                    tool_name,
                    spec.parameters.len()
                );
                warn!(tool_name = %tool_name, "{}", note);
                warnings.push(note);
                continue;
            };

            let coerced = coerce(raw, param.kind);
            if coerced.is_raw() {
                let note = format!(
                    "parameter '{}' could not be read as {}; passing '{}' through",
                    param.name, param.kind, raw
                );
                debug!(tool_name = %tool_name, "{}", note);
                warnings.push(note);
            }
            arguments.insert(param.name.clone(), coerced.into_value());
        }

        let call = ToolCall {
            tool_name: tool_name.clone(),
            arguments,
        };

        let shown = Value::Object(call.arguments.clone());
        info!(tool_name = %tool_name, arguments = %shown, "Invoking tool");
        let start = Instant::now();

        let invocation = timeout(
            self.tool_timeout,
            self.registry.call(&tool_name, &call.arguments),
        )
        .await;

        let error = match invocation {
            Err(_) => AgentError::Timeout(format!(
                "tool '{}' exceeded {:?}",
                tool_name, self.tool_timeout
            ))
            .to_string(),
            Ok(Err(e)) => AgentError::ToolInvocation(format!("{}: {}", tool_name, e)).to_string(),
            Ok(Ok(result)) if !result.success => AgentError::ToolInvocation(format!(
                "{}: {}",
                tool_name,
                result.error.unwrap_or_else(|| "tool reported failure".to_string())
            ))
            .to_string(),
            Ok(Ok(result)) => {
                let value = normalize(result.value);
                debug!(
                    tool_name = %tool_name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    result = %render_value(&value),
                    "Tool succeeded"
                );

                memory.record(
                    tool_name,
                    call.arguments.clone(),
                    value.clone(),
                    decision.rationale.clone(),
                );

                return ActionOutcome {
                    result: ActionResult::succeeded(value, Some(call), warnings),
                    should_continue: decision.continue_loop,
                };
            }
        };

        warn!(tool_name = %call.tool_name, error = %error, "Tool execution failed");
        record_failure(memory, &call, &error);
        ActionOutcome::stop(ActionResult::failed(error, Some(call), warnings))
    }
}

/// Split `tool|a|b` into name and raw parameters, skipping labels such as
/// `TOOL_USE:` that a model put in front of the tool name
pub fn parse_call(body: &str) -> Result<(String, Vec<String>)> {
    let mut rest = body.trim();

    while let Some((label, tail)) = rest.split_once(':') {
        if !is_label(label.trim()) {
            break;
        }
        rest = tail.trim();
    }

    let mut parts = rest.split('|').map(str::trim);
    let tool_name = parts.next().unwrap_or_default();

    if tool_name.is_empty() {
        return Err(AgentError::Parse(format!("no tool name in '{}'", body)));
    }

    Ok((tool_name.to_string(), parts.map(str::to_string).collect()))
}

fn is_label(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Collapse tool output to a scalar, string or list
pub fn normalize(content: Option<ToolContent>) -> Value {
    match content {
        None => Value::Null,
        Some(ToolContent::Scalar(value)) => value,
        Some(ToolContent::Opaque(value)) => Value::String(render_value(&value)),
        Some(ToolContent::Items(items)) => {
            let mut values: Vec<Value> = items
                .into_iter()
                .map(|item| Value::String(item.text.unwrap_or_else(|| item.raw.to_string())))
                .collect();

            if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            }
        }
    }
}

fn record_failure(memory: &mut MemoryState, call: &ToolCall, error: &str) {
    memory.set_intermediate(
        LAST_FAILED_CALL_KEY,
        json!({
            "tool": call.tool_name,
            "arguments": call.arguments,
            "error": error,
        }),
    );
}
