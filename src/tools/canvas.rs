//! In-memory drawing canvas
//!
//! The canvas state lives in a [`CanvasSession`] shared by the canvas tools
//! of one registry. Two registries never see each other's drawings.

use super::{arg_i64, arg_str, Tool};
use crate::error::AgentError;
use crate::models::{normalize_color, ParamSpec, ParamType, ToolContent, DEFAULT_FAVORITE_COLOR};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rectangle {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanvasState {
    pub open: bool,
    /// Drawing color chosen when the canvas was opened
    pub color: Option<String>,
    pub rectangle: Option<Rectangle>,
    pub text: Option<String>,
}

/// Canvas state owned by one registry
#[derive(Debug, Default)]
pub struct CanvasSession {
    state: Mutex<CanvasState>,
}

impl CanvasSession {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn snapshot(&self) -> CanvasState {
        self.state.lock().await.clone()
    }
}

#[derive(Debug, Clone, Copy)]
enum CanvasOp {
    Open,
    DrawRectangle,
    AddText,
    Clear,
}

pub struct CanvasTool {
    op: CanvasOp,
    session: Arc<CanvasSession>,
}

pub fn canvas_tools(session: Arc<CanvasSession>) -> Vec<Arc<dyn Tool>> {
    [
        CanvasOp::Open,
        CanvasOp::DrawRectangle,
        CanvasOp::AddText,
        CanvasOp::Clear,
    ]
    .into_iter()
    .map(|op| {
        Arc::new(CanvasTool {
            op,
            session: session.clone(),
        }) as Arc<dyn Tool>
    })
    .collect()
}

#[async_trait]
impl Tool for CanvasTool {
    fn name(&self) -> &'static str {
        match self.op {
            CanvasOp::Open => "open_canvas",
            CanvasOp::DrawRectangle => "draw_rectangle",
            CanvasOp::AddText => "add_text_to_canvas",
            CanvasOp::Clear => "clear_canvas",
        }
    }

    fn description(&self) -> &'static str {
        match self.op {
            CanvasOp::Open => "Open a blank canvas that draws in the user's favorite color",
            CanvasOp::DrawRectangle => "Draw a rectangle from (x1, y1) to (x2, y2)",
            CanvasOp::AddText => "Write text inside the drawn rectangle",
            CanvasOp::Clear => "Erase everything on the canvas",
        }
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        match self.op {
            CanvasOp::DrawRectangle => ["x1", "y1", "x2", "y2"]
                .into_iter()
                .map(|n| ParamSpec::new(n, ParamType::Integer))
                .collect(),
            CanvasOp::Open => vec![ParamSpec::new("favorite_color", ParamType::String)],
            CanvasOp::AddText => vec![ParamSpec::new("text", ParamType::String)],
            CanvasOp::Clear => Vec::new(),
        }
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolContent> {
        let mut state = self.session.state.lock().await;

        match self.op {
            CanvasOp::Open => {
                let color = match arguments.get("favorite_color") {
                    Some(_) => normalize_color(arg_str(arguments, "favorite_color")?),
                    None => DEFAULT_FAVORITE_COLOR.to_string(),
                };

                if state.open {
                    let message = format!("Canvas already open; drawing color set to {}", color);
                    state.color = Some(color);
                    return Ok(ToolContent::Scalar(json!(message)));
                }

                info!(color = %color, "Canvas opened");
                let message = format!("Canvas opened with drawing color {}", color);
                *state = CanvasState {
                    open: true,
                    color: Some(color),
                    ..CanvasState::default()
                };
                Ok(ToolContent::Scalar(json!(message)))
            }
            CanvasOp::DrawRectangle => {
                require_open(&state)?;
                let rect = Rectangle {
                    x1: arg_i64(arguments, "x1")?,
                    y1: arg_i64(arguments, "y1")?,
                    x2: arg_i64(arguments, "x2")?,
                    y2: arg_i64(arguments, "y2")?,
                };
                if rect.x1 >= rect.x2 || rect.y1 >= rect.y2 {
                    return Err(AgentError::InvalidToolInput(
                        "rectangle corners must satisfy x1 < x2 and y1 < y2".to_string(),
                    ));
                }
                state.rectangle = Some(rect);
                Ok(ToolContent::Opaque(json!({ "rectangle": rect, "color": state.color })))
            }
            CanvasOp::AddText => {
                require_open(&state)?;
                if state.rectangle.is_none() {
                    return Err(AgentError::ToolInvocation(
                        "Draw a rectangle before adding text".to_string(),
                    ));
                }
                let text = arg_str(arguments, "text")?.to_string();
                let message = format!("Text '{}' added to canvas", text);
                state.text = Some(text);
                Ok(ToolContent::Scalar(json!(message)))
            }
            CanvasOp::Clear => {
                require_open(&state)?;
                state.rectangle = None;
                state.text = None;
                Ok(ToolContent::Scalar(json!("Canvas cleared")))
            }
        }
    }
}

fn require_open(state: &CanvasState) -> Result<()> {
    if state.open {
        Ok(())
    } else {
        Err(AgentError::ToolInvocation(
            "Canvas is not open; call open_canvas first".to_string(),
        ))
    }
}
