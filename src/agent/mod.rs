//! Main orchestrator - implements the bounded control loop
//!
//! PROMPT → PARSE → DECIDE → DISPATCH → UPDATE MEMORY → CONTINUE?

use crate::audit::{compute_memory_hash, AuditLog, RunRecord};
use crate::config::AgentConfig;
use crate::decision::DecisionEngine;
use crate::error::AgentError;
use crate::execution::ActionDispatcher;
use crate::llm::LanguageModel;
use crate::memory::{MemoryState, LAST_ERROR_KEY};
use crate::models::{AgentResponse, Decision};
use crate::perception::{Perception, ProposalParser};
use crate::tools::ToolRegistry;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Finished,
    Failed,
    Cancelled,
}

/// Drives one task at a time; every run gets its own memory
pub struct Agent {
    model: Arc<dyn LanguageModel>,
    registry: Arc<dyn ToolRegistry>,
    audit_log: Option<Arc<AuditLog>>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<dyn ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            registry,
            audit_log: None,
            config,
        }
    }

    pub fn with_audit_log(mut self, audit_log: Arc<AuditLog>) -> Self {
        self.audit_log = Some(audit_log);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run with the agent's own configuration and no external cancellation
    pub async fn run(&self, task: &str) -> AgentResponse {
        self.run_with(task, &self.config, CancellationToken::new()).await
    }

    /// Run the loop. Failures end up in `errors`; this never returns early without a response.
    pub async fn run_with(
        &self,
        task: &str,
        config: &AgentConfig,
        cancel: CancellationToken,
    ) -> AgentResponse {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();
        let mut memory = MemoryState::new();
        let mut errors: Vec<String> = Vec::new();
        let mut decisions: Vec<Decision> = Vec::new();

        info!(
            run_id = %run_id,
            task = %task,
            max_iterations = config.max_iterations,
            "Agent: starting run"
        );

        if let Err(e) = config.validate() {
            error!(run_id = %run_id, error = %e, "Rejecting run configuration");
            errors.push(e.to_string());
            return self
                .finish(run_id, task, config, memory, errors, decisions, start_time)
                .await;
        }

        let engine = DecisionEngine::from_config(config);
        let perception = Perception::new(self.model.clone(), config.llm_timeout)
            .with_preferences(config.preferences.clone());
        let dispatcher = ActionDispatcher::new(self.registry.clone(), config.tool_timeout);

        let tools = self.registry.list_tools().await;
        let parser = ProposalParser::new(tools.iter().map(|t| t.name.clone()));

        let mut state = LoopState::Running;

        for tick in 1..=config.max_iterations {
            if cancel.is_cancelled() {
                state = LoopState::Cancelled;
                break;
            }

            debug!(run_id = %run_id, tick, iteration = memory.current_iteration(), "Tick");

            // === PERCEIVE ===
            let perceived = tokio::select! {
                _ = cancel.cancelled() => None,
                result = perception.perceive(task, &tools, &parser, &memory) => Some(result),
            };
            let Some(perceived) = perceived else {
                state = LoopState::Cancelled;
                break;
            };

            let proposal = match perceived {
                Ok(proposal) => {
                    memory.clear_intermediate(LAST_ERROR_KEY);
                    proposal
                }
                Err(e) if e.is_recoverable() => {
                    warn!(
                        run_id = %run_id,
                        tick,
                        error = %e,
                        "Recoverable failure; asking the model again"
                    );
                    errors.push(format!("Iteration {}: {}", tick, e));
                    memory.set_intermediate(
                        LAST_ERROR_KEY,
                        json!(format!(
                            "Your previous reply was unusable ({}). Follow the format exactly.",
                            e
                        )),
                    );
                    continue;
                }
                Err(e) => {
                    error!(run_id = %run_id, tick, error = %e, "Perception failed");
                    errors.push(format!("Iteration {}: {}", tick, e));
                    state = LoopState::Failed;
                    break;
                }
            };

            // === DECIDE ===
            let decision = engine.decide(&proposal, &memory, config.max_iterations);
            decisions.push(decision.clone());

            if !decision.should_execute {
                let rejection = AgentError::PolicyRejection(decision.rationale.clone());
                errors.push(format!("Iteration {}: {}", tick, rejection));

                if engine.should_continue(&decision, &memory) {
                    let fallback = decision.fallback_action.as_deref().unwrap_or_default();
                    info!(
                        run_id = %run_id,
                        tick,
                        fallback = %fallback,
                        "Proposal rejected; continuing with fallback"
                    );
                    memory.set_intermediate(
                        LAST_ERROR_KEY,
                        json!(format!(
                            "Your last proposal '{}' was rejected: {}. Fallback: {}.",
                            proposal.candidate_action, decision.rationale, fallback
                        )),
                    );
                    continue;
                }

                warn!(run_id = %run_id, tick, "Proposal rejected with no fallback; stopping");
                state = LoopState::Failed;
                break;
            }

            // === DISPATCH ===
            let dispatched = tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = dispatcher.execute(&decision, &mut memory) => Some(outcome),
            };
            let Some(outcome) = dispatched else {
                state = LoopState::Cancelled;
                break;
            };

            if !outcome.result.success {
                let detail = outcome
                    .result
                    .error
                    .unwrap_or_else(|| "action failed".to_string());
                errors.push(format!("Iteration {}: {}", tick, detail));
                state = LoopState::Failed;
                break;
            }

            if !outcome.should_continue || !engine.should_continue(&decision, &memory) {
                state = LoopState::Finished;
                break;
            }
        }

        match state {
            LoopState::Running => {
                // Ticks exhausted without an answer
                let ceiling = engine.ceiling_decision(&memory);
                info!(run_id = %run_id, action = ?ceiling.action, "Applying iteration ceiling");
                let outcome = dispatcher.execute(&ceiling, &mut memory).await;
                decisions.push(ceiling);
                if let Some(e) = outcome.result.error {
                    errors.push(e);
                }
            }
            LoopState::Cancelled => {
                warn!(run_id = %run_id, "Run cancelled");
                errors.push(AgentError::Cancelled.to_string());
            }
            LoopState::Finished | LoopState::Failed => {}
        }

        self.finish(run_id, task, config, memory, errors, decisions, start_time)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        run_id: Uuid,
        task: &str,
        config: &AgentConfig,
        memory: MemoryState,
        errors: Vec<String>,
        decisions: Vec<Decision>,
        start_time: Instant,
    ) -> AgentResponse {
        let final_answer = memory.final_answer().cloned();
        let success = final_answer.is_some() && errors.is_empty();

        let response = AgentResponse {
            run_id,
            success,
            final_answer,
            total_iterations: memory.current_iteration(),
            execution_summary: memory.execution_summary(),
            errors,
            memory,
            user_preferences_used: config.preferences.clone(),
        };

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            success,
            total_iterations = response.total_iterations,
            error_count = response.errors.len(),
            execution_time_ms,
            "Agent: run complete"
        );

        if let Some(audit_log) = &self.audit_log {
            match compute_memory_hash(&response.memory) {
                Ok(memory_hash) => {
                    let record = RunRecord {
                        run_id,
                        task: task.to_string(),
                        config: config.clone(),
                        decisions,
                        response: response.clone(),
                        memory_hash,
                        created_at: Utc::now(),
                        execution_time_ms,
                    };
                    if let Err(e) = audit_log.record(record).await {
                        warn!(run_id = %run_id, error = %e, "Failed to record run");
                    }
                }
                Err(e) => warn!(run_id = %run_id, error = %e, "Failed to hash run memory"),
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::models::UserPreferences;
    use crate::tools::create_default_registry;
    use std::time::Duration;

    fn agent(model: ScriptedModel) -> Agent {
        Agent::new(
            Arc::new(model),
            Arc::new(create_default_registry()),
            AgentConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_agent_run() {
        let model = ScriptedModel::new(
            ["ACTION: CALL add|5|3\nCONFIDENCE: 1.0", "ACTION: ANSWER 8\nCONFIDENCE: 1.0"],
            "ACTION: ANSWER 8",
        );
        let response = agent(model).run("add 5 and 3").await;

        assert!(response.success, "errors: {:?}", response.errors);
        assert_eq!(response.final_answer, Some(json!("8")));
        assert_eq!(response.total_iterations, 1);
        assert_eq!(response.memory.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_with_fallback_feeds_next_prompt() {
        let model = Arc::new(ScriptedModel::new(
            [
                "ACTION: CALL add|5|3\nCONFIDENCE: 0.1",
                "ACTION: CALL add|5|3\nCONFIDENCE: 0.9",
                "ACTION: ANSWER 8",
            ],
            "ACTION: ANSWER 8",
        ));
        let agent = Agent::new(
            model.clone(),
            Arc::new(create_default_registry()),
            AgentConfig::default(),
        );

        let response = agent.run("add 5 and 3").await;

        assert_eq!(response.final_answer, Some(json!("8")));
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].contains("Policy rejection"));
        assert!(!response.success);
        assert!(model.prompts()[1].contains("request_user_clarification"));
    }

    #[tokio::test]
    async fn test_rejection_without_fallback_stops() {
        let model = Arc::new(ScriptedModel::repeating("ACTION: CALL add|5|3\nCONFIDENCE: 0.1"));
        let agent = Agent::new(
            model.clone(),
            Arc::new(create_default_registry()),
            AgentConfig::default(),
        );
        let config = AgentConfig {
            enable_fallbacks: false,
            ..AgentConfig::default()
        };

        let response = agent
            .run_with("add 5 and 3", &config, CancellationToken::new())
            .await;

        assert!(!response.success);
        assert!(response.final_answer.is_none());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_returns_structured_error() {
        let agent = agent(ScriptedModel::repeating("ACTION: ANSWER 1"));
        let config = AgentConfig {
            max_iterations: 0,
            ..AgentConfig::default()
        };

        let response = agent
            .run_with("anything", &config, CancellationToken::new())
            .await;
        assert!(!response.success);
        assert!(response.errors[0].contains("Configuration error"));
    }

    #[tokio::test]
    async fn test_precancelled_run() {
        let agent = agent(ScriptedModel::repeating("ACTION: ANSWER 1"));
        let token = CancellationToken::new();
        token.cancel();

        let response = agent
            .run_with("anything", &AgentConfig::default(), token)
            .await;
        assert!(!response.success);
        assert_eq!(response.errors, vec![AgentError::Cancelled.to_string()]);
    }

    #[tokio::test]
    async fn test_preferences_reach_prompt_and_response() {
        let model = Arc::new(ScriptedModel::repeating("ACTION: ANSWER 8"));
        let agent = Agent::new(
            model.clone(),
            Arc::new(create_default_registry()),
            AgentConfig::default(),
        );
        let config = AgentConfig {
            preferences: UserPreferences::new("Orange", "French"),
            ..AgentConfig::default()
        };

        let response = agent
            .run_with("add 5 and 3", &config, CancellationToken::new())
            .await;

        assert!(model.prompts()[0].contains("- Favorite color: orange"));
        assert!(model.prompts()[0].contains("- Language: French"));
        assert_eq!(response.user_preferences_used.favorite_color, "orange");
        assert_eq!(response.user_preferences_used.preferred_language, "French");
    }

    #[tokio::test]
    async fn test_run_is_audited() {
        let audit_log = Arc::new(AuditLog::new());
        let agent =
            agent(ScriptedModel::repeating("ACTION: ANSWER 42")).with_audit_log(audit_log.clone());

        let response = agent.run("what is the answer").await;
        let record = audit_log.get(response.run_id).await.unwrap().unwrap();

        assert_eq!(record.task, "what is the answer");
        assert_eq!(record.decisions.len(), 1);
        assert!(audit_log.verify_integrity(response.run_id).await.unwrap());
        assert!(record.execution_time_ms < Duration::from_secs(5).as_millis() as u64);
    }
}
