//! Core data models for the reasoning agent

use crate::memory::MemoryState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Leading keyword of a tool-call action clause: `CALL tool|arg1|arg2`
pub const CALL_KEYWORD: &str = "CALL";
/// Leading keyword of a terminal action clause: `ANSWER value`
pub const ANSWER_KEYWORD: &str = "ANSWER";

/// Drawing color used when no preference is given
pub const DEFAULT_FAVORITE_COLOR: &str = "blue";
pub const DEFAULT_LANGUAGE: &str = "English";

//
// ================= User Preferences =================
//

/// Personal settings applied to the prompt and to anything drawn during a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserPreferences {
    pub favorite_color: String,
    pub preferred_language: String,
}

impl UserPreferences {
    pub fn new(favorite_color: &str, preferred_language: &str) -> Self {
        let language = preferred_language.trim();
        Self {
            favorite_color: normalize_color(favorite_color),
            preferred_language: if language.is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                language.to_string()
            },
        }
    }
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self::new(DEFAULT_FAVORITE_COLOR, DEFAULT_LANGUAGE)
    }
}

/// Trimmed, lowercase color name; blank input falls back to the default color
pub fn normalize_color(raw: &str) -> String {
    let color = raw.trim().to_lowercase();
    if color.is_empty() {
        DEFAULT_FAVORITE_COLOR.to_string()
    } else {
        color
    }
}

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningCategory {
    Arithmetic,
    #[default]
    Logic,
    ToolUse,
    Planning,
    Verification,
    FinalAnswer,
}

impl ReasoningCategory {
    /// Map a model-supplied token; unknown tokens fall back to `Logic`.
    pub fn from_token(token: &str) -> Self {
        let normalized = token
            .trim()
            .trim_matches(|c: char| c == '[' || c == ']')
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");

        match normalized.as_str() {
            "arithmetic" => ReasoningCategory::Arithmetic,
            "logic" => ReasoningCategory::Logic,
            "tool_use" => ReasoningCategory::ToolUse,
            "planning" => ReasoningCategory::Planning,
            "verification" => ReasoningCategory::Verification,
            "final_answer" => ReasoningCategory::FinalAnswer,
            _ => ReasoningCategory::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    ExecuteTool,
    ProvideAnswer,
    RequestVerification,
    HandleError,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionKind::ExecuteTool => "execute_tool",
            DecisionKind::ProvideAnswer => "provide_answer",
            DecisionKind::RequestVerification => "request_verification",
            DecisionKind::HandleError => "handle_error",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Action Clause =================
//

/// Borrowed view of a canonical action clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClause<'a> {
    /// Everything after `CALL`, e.g. `add|5|3`
    Call(&'a str),
    /// Everything after `ANSWER`
    Answer(&'a str),
}

impl<'a> ActionClause<'a> {
    pub fn classify(action: &'a str) -> Option<Self> {
        let action = action.trim();
        if let Some(rest) = strip_keyword(action, CALL_KEYWORD) {
            return Some(ActionClause::Call(rest));
        }
        strip_keyword(action, ANSWER_KEYWORD).map(ActionClause::Answer)
    }

    /// Tool name of a call clause, ignoring any label a model glued in front of it
    pub fn tool_name(&self) -> Option<&'a str> {
        match self {
            ActionClause::Call(body) => {
                let head = body.split('|').next().unwrap_or_default();
                let name = head.rsplit(':').next().unwrap_or(head).trim();
                (!name.is_empty()).then_some(name)
            }
            ActionClause::Answer(_) => None,
        }
    }
}

fn strip_keyword<'a>(action: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = action.strip_prefix(keyword)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

//
// ================= Proposal / Decision =================
//

/// The model's intent before policy evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub reasoning_category: ReasoningCategory,
    pub rationale: String,
    /// Always `CALL <tool>|<args>...` or `ANSWER <value>`
    pub candidate_action: String,
    pub confidence: f64,
    pub needs_verification: bool,
    pub error_flag: bool,
}

impl Proposal {
    pub fn action(&self) -> Option<ActionClause<'_>> {
        ActionClause::classify(&self.candidate_action)
    }

    pub fn is_answer(&self) -> bool {
        matches!(self.action(), Some(ActionClause::Answer(_)))
    }
}

/// Policy outcome for one proposal, kept for the audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub kind: DecisionKind,
    pub should_execute: bool,
    pub action: Option<String>,
    pub rationale: String,
    pub continue_loop: bool,
    pub fallback_action: Option<String>,
}

//
// ================= Tool Contract =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Number,
    Boolean,
    Array,
    String,
    #[serde(other)]
    Other,
}

impl ParamType {
    /// Map a JSON-schema `type` name
    pub fn from_schema(type_name: &str) -> Self {
        match type_name.trim().to_lowercase().as_str() {
            "integer" | "int" => ParamType::Integer,
            "number" | "float" => ParamType::Number,
            "boolean" | "bool" => ParamType::Boolean,
            "array" | "list" => ParamType::Array,
            "string" | "str" => ParamType::String,
            _ => ParamType::Other,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::String => "string",
            ParamType::Other => "any",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A tool as advertised by the registry; parameters are in positional order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

impl ToolSpec {
    /// `add(a: integer, b: integer): Add two numbers`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.kind))
            .collect();
        format!("{}({}): {}", self.name, params.join(", "), self.description)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// One element of a list-shaped tool output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub text: Option<String>,
    pub raw: Value,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: Value::String(text.clone()),
            text: Some(text),
        }
    }
}

/// Raw output shapes a tool may hand back
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ToolContent {
    Scalar(Value),
    Items(Vec<ContentItem>),
    Opaque(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub value: Option<ToolContent>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(content: ToolContent) -> Self {
        Self {
            success: true,
            value: Some(content),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(message.into()),
        }
    }
}

//
// ================= Action / Run Results =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub tool_call: Option<ToolCall>,
    /// Non-fatal notes such as dropped extra parameters
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ActionResult {
    pub fn succeeded(value: Value, tool_call: Option<ToolCall>, warnings: Vec<String>) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            tool_call,
            warnings,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        tool_call: Option<ToolCall>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
            tool_call,
            warnings,
        }
    }
}

/// Structured outcome of a run; returned for failed runs too
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub run_id: Uuid,
    pub success: bool,
    pub final_answer: Option<Value>,
    pub total_iterations: u32,
    pub execution_summary: Vec<String>,
    pub errors: Vec<String>,
    pub memory: MemoryState,
    pub user_preferences_used: UserPreferences,
}
