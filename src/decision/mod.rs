//! Decision engine
//!
//! Pure policy over a proposal and the run's memory. Rules are checked in a
//! fixed order and the first match wins:
//!
//! 1. iteration ceiling (forces a best-effort answer)
//! 2. terminal proposal (`ANSWER ...`)
//! 3. safety gate (confidence below [`SAFETY_THRESHOLD`] is never dispatched)
//! 4. verification routing
//! 5. plain tool execution
//!
//! An error-flagged proposal is not rejected. The flag is carried forward as
//! a caution in the rationale and routes the call through verification.

use crate::config::AgentConfig;
use crate::memory::{render_value, MemoryState};
use crate::models::{ActionClause, Decision, DecisionKind, Proposal, ANSWER_KEYWORD};
use tracing::{debug, info, warn};

/// Tool proposals below this confidence are rejected
pub const SAFETY_THRESHOLD: f64 = 0.3;
/// Tool proposals below this confidence are routed through verification
pub const VERIFICATION_THRESHOLD: f64 = 0.6;
/// Below this confidence the fallback asks the user for clarification
pub const CLARIFICATION_THRESHOLD: f64 = 0.5;

pub const CEILING_ANSWER: &str = "Maximum iterations reached";
pub const FALLBACK_BEST_EFFORT: &str = "continue_with_best_effort";
pub const FALLBACK_CLARIFY: &str = "request_user_clarification";

#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    enable_verification: bool,
    enable_fallbacks: bool,
}

impl DecisionEngine {
    pub fn new(enable_verification: bool, enable_fallbacks: bool) -> Self {
        Self {
            enable_verification,
            enable_fallbacks,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.enable_verification, config.enable_fallbacks)
    }

    pub fn decide(
        &self,
        proposal: &Proposal,
        memory: &MemoryState,
        max_iterations: u32,
    ) -> Decision {
        if memory.current_iteration() >= max_iterations {
            info!(
                iteration = memory.current_iteration(),
                max_iterations, "Iteration ceiling reached"
            );
            return self.ceiling_decision(memory);
        }

        let clause = proposal.action();

        if let Some(ActionClause::Answer(_)) = clause {
            return Decision {
                kind: DecisionKind::ProvideAnswer,
                should_execute: true,
                action: Some(proposal.candidate_action.clone()),
                rationale: proposal.rationale.clone(),
                continue_loop: false,
                fallback_action: None,
            };
        }

        let fallback_action = self.fallback_for(proposal);
        let mut cautions = Vec::new();

        if let Some(clause) = clause {
            if let Some(note) = repetition_caution(&clause, memory) {
                warn!(action = %proposal.candidate_action, "{}", note);
                cautions.push(note);
            }
        }

        let confidence_ok = proposal.confidence >= SAFETY_THRESHOLD;
        if clause.is_none() || !confidence_ok {
            let reason = if clause.is_none() {
                format!("Unrecognized action clause '{}'", proposal.candidate_action)
            } else {
                format!(
                    "Confidence {:.2} is below the safety threshold {:.2}",
                    proposal.confidence, SAFETY_THRESHOLD
                )
            };
            warn!(
                confidence = proposal.confidence,
                fallback = ?fallback_action,
                "Rejecting proposal: {}",
                reason
            );
            return Decision {
                kind: DecisionKind::HandleError,
                should_execute: false,
                action: Some(proposal.candidate_action.clone()),
                rationale: reason,
                continue_loop: fallback_action.is_some(),
                fallback_action,
            };
        }

        if proposal.error_flag {
            cautions.push("Caution: the model flagged a possible error; proceeding".to_string());
        }

        let needs_verification = proposal.needs_verification
            || proposal.confidence < VERIFICATION_THRESHOLD
            || proposal.error_flag;

        let kind = if self.enable_verification && needs_verification {
            DecisionKind::RequestVerification
        } else {
            DecisionKind::ExecuteTool
        };

        let rationale = if cautions.is_empty() {
            proposal.rationale.clone()
        } else {
            format!("{} | {}", proposal.rationale, cautions.join(" | "))
        };

        debug!(
            decision_kind = %kind,
            confidence = proposal.confidence,
            "Tool proposal approved"
        );

        Decision {
            kind,
            should_execute: true,
            action: Some(proposal.candidate_action.clone()),
            rationale,
            continue_loop: true,
            fallback_action,
        }
    }

    /// Forced answer once the iteration budget is spent
    pub fn ceiling_decision(&self, memory: &MemoryState) -> Decision {
        let best_effort = memory
            .final_answer()
            .or_else(|| memory.last_entry().map(|e| &e.result))
            .map(render_value)
            .unwrap_or_else(|| CEILING_ANSWER.to_string());

        Decision {
            kind: DecisionKind::ProvideAnswer,
            should_execute: true,
            action: Some(format!("{} {}", ANSWER_KEYWORD, best_effort)),
            rationale: format!(
                "{} after {} iterations; answering with best effort",
                CEILING_ANSWER,
                memory.current_iteration()
            ),
            continue_loop: false,
            fallback_action: None,
        }
    }

    pub fn should_continue(&self, decision: &Decision, _memory: &MemoryState) -> bool {
        if !decision.continue_loop || decision.kind == DecisionKind::ProvideAnswer {
            return false;
        }
        !(decision.kind == DecisionKind::HandleError && decision.fallback_action.is_none())
    }

    fn fallback_for(&self, proposal: &Proposal) -> Option<String> {
        if !self.enable_fallbacks {
            return None;
        }
        if proposal.error_flag {
            Some(FALLBACK_BEST_EFFORT.to_string())
        } else if !(proposal.confidence >= CLARIFICATION_THRESHOLD) {
            Some(FALLBACK_CLARIFY.to_string())
        } else {
            None
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// Best-effort repetition check. Never blocks.
fn repetition_caution(clause: &ActionClause<'_>, memory: &MemoryState) -> Option<String> {
    let ActionClause::Call(body) = clause else {
        return None;
    };
    let tool = clause.tool_name()?;
    if !memory.has_called(tool, None) {
        return None;
    }

    let mut proposed: Vec<String> = body.split('|').skip(1).map(|p| p.trim().to_string()).collect();
    proposed.sort();

    let identical = memory.entries_for_tool(tool).any(|entry| {
        let mut previous: Vec<String> = entry.arguments.values().map(render_value).collect();
        previous.sort();
        previous == proposed
    });

    Some(if identical {
        format!("Caution: {} was already called with the same arguments", tool)
    } else {
        format!("Caution: {} was already called earlier in this run", tool)
    })
}
