//! Perception layer
//!
//! Builds the prompt for one tick, asks the model under a deadline and
//! parses what comes back into a [`Proposal`].

pub mod parser;

pub use parser::ProposalParser;

use crate::error::AgentError;
use crate::llm::LanguageModel;
use crate::memory::{render_value, MemoryState, LAST_ERROR_KEY};
use crate::models::{Proposal, ToolSpec, UserPreferences};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

const INSTRUCTIONS: &str = r#"You are a careful step-by-step problem solver. You work in a loop:
each turn you either call exactly one tool or give the final answer.

Respond with these lines and nothing else:

REASONING_TYPE: one of ARITHMETIC, LOGIC, TOOL_USE, PLANNING, VERIFICATION, FINAL_ANSWER
THOUGHT_PROCESS: your reasoning for this step
VERIFICATION: what result you expect and how you will check it
ACTION: CALL tool_name|param1|param2  or  ANSWER value
CONFIDENCE: a number between 0.0 and 1.0
ERROR_CHECK: true if you suspect a problem, otherwise false

Rules:
- Parameters are positional and separated by '|'. Lists are written like [1, 2, 3].
- Use results from previous iterations instead of recomputing them.
- Do not repeat a call with identical parameters.
- If a tool failed, say so, then try another tool, other parameters, or answer with what you have.
- If you are unsure, lower CONFIDENCE and explain what is missing.

Example:
REASONING_TYPE: ARITHMETIC
THOUGHT_PROCESS: I need the sum of 5 and 3.
VERIFICATION: The result should be 8.
ACTION: CALL add|5|3
CONFIDENCE: 1.0
ERROR_CHECK: false"#;

const FIRST_ITERATION: &str = "This is the first iteration.";

pub struct Perception {
    model: Arc<dyn LanguageModel>,
    llm_timeout: Duration,
    preferences: UserPreferences,
}

impl Perception {
    pub fn new(model: Arc<dyn LanguageModel>, llm_timeout: Duration) -> Self {
        Self {
            model,
            llm_timeout,
            preferences: UserPreferences::default(),
        }
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// One model round-trip: prompt, complete under the deadline, parse
    pub async fn perceive(
        &self,
        task: &str,
        tools: &[ToolSpec],
        parser: &ProposalParser,
        memory: &MemoryState,
    ) -> Result<Proposal> {
        let prompt = build_prompt(task, tools, memory, &self.preferences);
        debug!(model = self.model.name(), prompt_chars = prompt.len(), "Prompting model");

        let raw = timeout(self.llm_timeout, self.model.complete(&prompt))
            .await
            .map_err(|_| {
                AgentError::Timeout(format!(
                    "model '{}' did not answer within {:?}",
                    self.model.name(),
                    self.llm_timeout
                ))
            })??;

        let proposal = parser.parse(&raw)?;
        info!(
            reasoning = ?proposal.reasoning_category,
            action = %proposal.candidate_action,
            confidence = proposal.confidence,
            "Model proposal"
        );
        Ok(proposal)
    }
}

pub fn build_prompt(
    task: &str,
    tools: &[ToolSpec],
    memory: &MemoryState,
    preferences: &UserPreferences,
) -> String {
    let mut prompt = String::with_capacity(INSTRUCTIONS.len() + 512);
    prompt.push_str(INSTRUCTIONS);

    prompt.push_str("\n\nAvailable tools:\n");
    for tool in tools {
        prompt.push_str("- ");
        prompt.push_str(&tool.signature());
        prompt.push('\n');
    }

    prompt.push_str("\nUser preferences (apply them throughout):\n");
    prompt.push_str(&format!(
        "- Favorite color: {} (use it for anything you draw, e.g. open_canvas|{})\n",
        preferences.favorite_color, preferences.favorite_color
    ));
    prompt.push_str(&format!(
        "- Language: {} (write THOUGHT_PROCESS and answers in this language)\n",
        preferences.preferred_language
    ));

    prompt.push_str("\nTask: ");
    prompt.push_str(task);

    prompt.push_str("\n\nPrevious iterations:\n");
    let mut history = memory.context_summary().peekable();
    if history.peek().is_none() {
        prompt.push_str(FIRST_ITERATION);
        prompt.push('\n');
    }
    for line in history {
        prompt.push_str(&line);
        prompt.push('\n');
    }

    if let Some(note) = memory.intermediate(LAST_ERROR_KEY) {
        prompt.push_str("\nNotes:\n");
        prompt.push_str(&render_value(note));
        prompt.push('\n');
    }

    prompt.push_str("\nWhat is your next step?");
    prompt
}
