//! Run memory storage
//!
//! Append-only history of executed tool steps plus scratch state for one run

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Scratch key holding the note fed into the next prompt after a recoverable failure
pub const LAST_ERROR_KEY: &str = "last_error";
/// Scratch key holding the last tool call that failed, kept for inspection
pub const LAST_FAILED_CALL_KEY: &str = "last_failed_call";

const SUMMARY_RESULT_CHARS: usize = 100;

/// One successfully dispatched tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub iteration: u32,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub result: Value,
    pub rationale: String,
    /// Unix seconds
    pub timestamp: f64,
}

/// Memory for a single run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryState {
    entries: Vec<MemoryEntry>,
    current_iteration: u32,
    intermediate_results: BTreeMap<String, Value>,
    final_answer: Option<Value>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and advance the iteration counter
    pub fn add_entry(&mut self, entry: MemoryEntry) {
        self.entries.push(entry);
        self.current_iteration += 1;
    }

    /// Build an entry for the next iteration and append it
    pub fn record(
        &mut self,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
        result: Value,
        rationale: impl Into<String>,
    ) {
        let entry = MemoryEntry {
            iteration: self.current_iteration + 1,
            tool_name: tool_name.into(),
            arguments,
            result,
            rationale: rationale.into(),
            timestamp: unix_now(),
        };
        self.add_entry(entry);
    }

    // =============================
    // Read views
    // =============================

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn last_entry(&self) -> Option<&MemoryEntry> {
        self.entries.last()
    }

    pub fn entries_for_tool<'a>(
        &'a self,
        tool_name: &'a str,
    ) -> impl Iterator<Item = &'a MemoryEntry> {
        self.entries.iter().filter(move |e| e.tool_name == tool_name)
    }

    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }

    pub fn final_answer(&self) -> Option<&Value> {
        self.final_answer.as_ref()
    }

    /// One line per entry, oldest first. Calling again restarts from the beginning.
    pub fn context_summary(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|e| {
            format!(
                "Iteration {}: Called {}({}) -> {}",
                e.iteration,
                e.tool_name,
                Value::Object(e.arguments.clone()),
                render_value(&e.result)
            )
        })
    }

    /// Exact-match lookup; with `arguments == None` any call to the tool counts
    pub fn has_called(&self, tool_name: &str, arguments: Option<&Map<String, Value>>) -> bool {
        self.entries_for_tool(tool_name)
            .any(|e| arguments.map_or(true, |args| &e.arguments == args))
    }

    // =============================
    // Writes
    // =============================

    /// Write-once; returns false if an answer is already set
    pub fn set_final_answer(&mut self, value: Value) -> bool {
        if self.final_answer.is_some() {
            return false;
        }
        self.final_answer = Some(value);
        true
    }

    pub fn set_intermediate(&mut self, key: impl Into<String>, value: Value) {
        self.intermediate_results.insert(key.into(), value);
    }

    pub fn intermediate(&self, key: &str) -> Option<&Value> {
        self.intermediate_results.get(key)
    }

    pub fn clear_intermediate(&mut self, key: &str) -> Option<Value> {
        self.intermediate_results.remove(key)
    }

    /// Human-readable recap of the run
    pub fn execution_summary(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len() + 3);
        lines.push(format!("Total iterations: {}", self.current_iteration));

        for e in &self.entries {
            let result: String = render_value(&e.result)
                .chars()
                .take(SUMMARY_RESULT_CHARS)
                .collect();
            lines.push(format!(
                "Step {}: {}({}) → {}",
                e.iteration,
                e.tool_name,
                render_arguments(&e.arguments),
                result
            ));
        }

        if let Some(Value::Object(failed)) = self.intermediate(LAST_FAILED_CALL_KEY) {
            let tool = failed.get("tool").map(render_value).unwrap_or_default();
            let args = match failed.get("arguments") {
                Some(Value::Object(args)) => render_arguments(args),
                _ => String::new(),
            };
            let error = failed.get("error").map(render_value).unwrap_or_default();
            lines.push(format!("Failed: {}({}) → {}", tool, args, error));
        }

        if let Some(answer) = &self.final_answer {
            lines.push(format!("Final Answer: {}", render_value(answer)));
        }

        lines
    }

    /// Drop all state so the value can serve a fresh run
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Strings render bare, everything else as JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_arguments(arguments: &Map<String, Value>) -> String {
    arguments
        .iter()
        .map(|(k, v)| format!("{}={}", k, render_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_record_advances_iteration() {
        let mut memory = MemoryState::new();
        memory.record("add", args(json!({"a": 5, "b": 3})), json!(8), "sum first");
        memory.record("multiply", args(json!({"a": 8, "b": 2})), json!(16), "then double");

        assert_eq!(memory.current_iteration(), 2);
        assert_eq!(memory.entries()[0].iteration, 1);
        assert_eq!(memory.last_entry().unwrap().tool_name, "multiply");
        assert!(memory.last_entry().unwrap().timestamp > 0.0);
    }

    #[test]
    fn test_context_summary_is_restartable() {
        let mut memory = MemoryState::new();
        memory.record("add", args(json!({"a": 5, "b": 3})), json!(8), "");

        let first: Vec<String> = memory.context_summary().collect();
        let second: Vec<String> = memory.context_summary().collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![r#"Iteration 1: Called add({"a":5,"b":3}) -> 8"#.to_string()]);
    }

    #[test]
    fn test_has_called() {
        let mut memory = MemoryState::new();
        memory.record("add", args(json!({"a": 5, "b": 3})), json!(8), "");

        assert!(memory.has_called("add", None));
        assert!(memory.has_called("add", Some(&args(json!({"a": 5, "b": 3})))));
        assert!(!memory.has_called("add", Some(&args(json!({"a": 1, "b": 3})))));
        assert!(!memory.has_called("subtract", None));
    }

    #[test]
    fn test_final_answer_write_once() {
        let mut memory = MemoryState::new();
        assert!(memory.set_final_answer(json!("8")));
        assert!(!memory.set_final_answer(json!("9")));
        assert_eq!(memory.final_answer(), Some(&json!("8")));

        memory.reset();
        assert!(memory.final_answer().is_none());
        assert!(memory.set_final_answer(json!("9")));
    }

    #[test]
    fn test_execution_summary() {
        let mut memory = MemoryState::new();
        memory.record("add", args(json!({"a": 5, "b": 3})), json!(8), "");
        memory.record("echo", Map::new(), json!("x".repeat(150)), "");
        memory.set_final_answer(json!("8"));

        let summary = memory.execution_summary();
        assert_eq!(summary[0], "Total iterations: 2");
        assert_eq!(summary[1], "Step 1: add(a=5, b=3) → 8");
        assert_eq!(summary[2], format!("Step 2: echo() → {}", "x".repeat(100)));
        assert_eq!(summary[3], "Final Answer: 8");
    }

    #[test]
    fn test_failed_call_in_summary() {
        let mut memory = MemoryState::new();
        memory.set_intermediate(
            LAST_FAILED_CALL_KEY,
            json!({"tool": "divide", "arguments": {"a": 1, "b": 0}, "error": "Division by zero"}),
        );

        let summary = memory.execution_summary();
        assert_eq!(summary.last().unwrap(), "Failed: divide(a=1, b=0) → Division by zero");
    }
}
