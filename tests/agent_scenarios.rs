use async_trait::async_trait;
use reasoning_agent::{
    agent::Agent,
    config::AgentConfig,
    decision::CEILING_ANSWER,
    error::AgentError,
    llm::{LanguageModel, ScriptedModel},
    memory::LAST_FAILED_CALL_KEY,
    models::{ParamSpec, ParamType, ToolResult, ToolSpec, UserPreferences},
    tools::{create_default_registry, create_registry_with_canvas, CanvasSession, ToolRegistry},
    Result,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn default_agent(model: Arc<dyn LanguageModel>) -> Agent {
    Agent::new(model, Arc::new(create_default_registry()), AgentConfig::default())
}

/// Advertises `add` but every call blows up
struct BrokenRegistry;

#[async_trait]
impl ToolRegistry for BrokenRegistry {
    async fn list_tools(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "add".into(),
            description: "Add two integers".into(),
            parameters: vec![
                ParamSpec::new("a", ParamType::Integer),
                ParamSpec::new("b", ParamType::Integer),
            ],
        }]
    }

    async fn call(&self, name: &str, _arguments: &Map<String, Value>) -> Result<ToolResult> {
        Err(AgentError::ToolInvocation(format!("{} backend unavailable", name)))
    }
}

/// Never answers in time
struct HangingModel;

#[async_trait]
impl LanguageModel for HangingModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("ACTION: ANSWER too late".into())
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// Endpoint error on the first call, a clean answer afterwards
#[derive(Default)]
struct FlakyModel {
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for FlakyModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(AgentError::Llm("503 from model endpoint".into()));
        }
        Ok("ACTION: ANSWER 8\nCONFIDENCE: 1.0".into())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn add_five_and_three() {
    let model = Arc::new(ScriptedModel::new(
        [
            "REASONING_TYPE: ARITHMETIC\n\
             THOUGHT_PROCESS: Need to add 5 and 3.\n\
             ACTION: CALL add|5|3\n\
             CONFIDENCE: 1.0\n\
             ERROR_CHECK: false",
            "REASONING_TYPE: FINAL_ANSWER\n\
             THOUGHT_PROCESS: add returned 8.\n\
             ACTION: ANSWER 8\n\
             CONFIDENCE: 1.0\n\
             ERROR_CHECK: false",
        ],
        "ACTION: ANSWER 8",
    ));

    let response = default_agent(model.clone()).run("add 5 and 3").await;

    assert!(response.success, "errors: {:?}", response.errors);
    assert_eq!(response.final_answer, Some(json!("8")));
    assert_eq!(response.total_iterations, 1);
    assert!(response.errors.is_empty());

    let entry = &response.memory.entries()[0];
    assert_eq!(entry.tool_name, "add");
    assert_eq!(entry.result, json!(8));

    assert_eq!(
        response.execution_summary,
        vec![
            "Total iterations: 1".to_string(),
            "Step 1: add(a=5, b=3) → 8".to_string(),
            "Final Answer: 8".to_string(),
        ]
    );

    // Second prompt carries the first step as context
    assert!(model.prompts()[1].contains(r#"Iteration 1: Called add({"a":5,"b":3}) -> 8"#));
}

#[tokio::test]
async fn tool_failure_ends_run_with_errors() {
    let agent = Agent::new(
        Arc::new(ScriptedModel::repeating("ACTION: CALL add|5|3\nCONFIDENCE: 1.0")),
        Arc::new(BrokenRegistry),
        AgentConfig::default(),
    );

    let response = agent.run("add 5 and 3").await;

    assert!(!response.success);
    assert!(!response.errors.is_empty());
    assert!(response.errors[0].contains("backend unavailable"));
    assert!(response.final_answer.is_none());

    let failed = response.memory.intermediate(LAST_FAILED_CALL_KEY).unwrap();
    assert_eq!(failed["tool"], "add");
    assert_eq!(failed["arguments"], json!({"a": 5, "b": 3}));
    assert!(response
        .execution_summary
        .iter()
        .any(|line| line.starts_with("Failed: add(a=5, b=3)")));
}

#[tokio::test]
async fn noise_every_iteration_hits_ceiling() {
    let model = Arc::new(ScriptedModel::repeating("I am not sure what you mean."));
    let config = AgentConfig {
        max_iterations: 3,
        ..AgentConfig::default()
    };

    let response = default_agent(model.clone())
        .run_with("add 5 and 3", &config, CancellationToken::new())
        .await;

    assert_eq!(model.calls(), 3);
    assert_eq!(response.final_answer, Some(json!(CEILING_ANSWER)));
    assert_eq!(response.total_iterations, 0);
    assert_eq!(response.errors.len(), 3);
    assert!(response.errors.iter().all(|e| e.contains("Parse error")));
    assert!(!response.success);

    // Later prompts tell the model what went wrong
    assert!(model.prompts()[1].contains("Notes:"));
}

#[tokio::test]
async fn ceiling_answers_with_last_result() {
    let model = Arc::new(ScriptedModel::repeating("ACTION: CALL add|1|1\nCONFIDENCE: 1.0"));
    let config = AgentConfig {
        max_iterations: 2,
        ..AgentConfig::default()
    };

    let response = default_agent(model)
        .run_with("keep adding", &config, CancellationToken::new())
        .await;

    assert_eq!(response.total_iterations, 2);
    assert_eq!(response.final_answer, Some(json!("2")));
    assert!(response.success);
}

#[tokio::test]
async fn prose_with_legacy_markers_is_recovered() {
    let model = Arc::new(ScriptedModel::new(
        ["Sure, let me compute that. FUNCTION_CALL: multiply|6|7"],
        "Done! FINAL_ANSWER: 42",
    ));

    let response = default_agent(model).run("multiply 6 by 7").await;

    assert!(response.success, "errors: {:?}", response.errors);
    assert_eq!(response.final_answer, Some(json!("42")));
    assert_eq!(response.memory.entries()[0].result, json!(42));
}

#[tokio::test]
async fn array_parameters_reach_the_tool() {
    let model = Arc::new(ScriptedModel::new(
        [
            "ACTION: CALL add_list|[1, 2, 3]\nCONFIDENCE: 0.9",
            "ACTION: CALL add_list|1,2,3\nCONFIDENCE: 0.9",
            "ACTION: CALL add_list|{'x': [1,2,3]}\nCONFIDENCE: 0.9",
        ],
        "ACTION: ANSWER 6",
    ));

    let response = default_agent(model).run("sum 1, 2 and 3 three ways").await;

    assert_eq!(response.total_iterations, 3);
    for entry in response.memory.entries() {
        assert_eq!(entry.arguments.get("l"), Some(&json!([1, 2, 3])));
        assert_eq!(entry.result, json!(6));
    }
}

#[tokio::test]
async fn model_timeouts_are_recoverable() {
    let agent = Agent::new(
        Arc::new(HangingModel),
        Arc::new(create_default_registry()),
        AgentConfig::default(),
    );
    let config = AgentConfig {
        max_iterations: 2,
        llm_timeout: Duration::from_millis(1),
        ..AgentConfig::default()
    };

    let response = agent
        .run_with("anything", &config, CancellationToken::new())
        .await;

    assert_eq!(response.errors.len(), 2);
    assert!(response.errors.iter().all(|e| e.contains("Timeout")));
    assert_eq!(response.final_answer, Some(json!(CEILING_ANSWER)));
}

#[tokio::test]
async fn cancellation_aborts_inflight_model_call() {
    let agent = Agent::new(
        Arc::new(HangingModel),
        Arc::new(create_default_registry()),
        AgentConfig::default(),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let response = agent
        .run_with("anything", &AgentConfig::default(), token)
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!response.success);
    assert!(response.final_answer.is_none());
    assert_eq!(response.errors, vec![AgentError::Cancelled.to_string()]);
}

#[tokio::test]
async fn concurrent_runs_keep_separate_memory() {
    let agent = Arc::new(default_agent(Arc::new(ScriptedModel::repeating(
        "ACTION: ANSWER 1",
    ))));

    let (first, second) = tokio::join!(agent.run("first task"), agent.run("second task"));

    assert_ne!(first.run_id, second.run_id);
    assert!(first.memory.entries().is_empty());
    assert!(second.memory.entries().is_empty());
    assert_eq!(first.final_answer, Some(json!("1")));
    assert_eq!(second.final_answer, Some(json!("1")));
}

#[tokio::test]
async fn drawing_uses_favorite_color() {
    let session = CanvasSession::shared();
    let model = Arc::new(ScriptedModel::new(
        [
            "ACTION: CALL open_canvas|Red\nCONFIDENCE: 0.95",
            "ACTION: CALL draw_rectangle|100|100|600|400\nCONFIDENCE: 0.95",
            "ACTION: CALL add_text_to_canvas|8\nCONFIDENCE: 0.95",
        ],
        "ACTION: ANSWER 8",
    ));
    let config = AgentConfig {
        preferences: UserPreferences::new("red", "English"),
        ..AgentConfig::default()
    };
    let agent = Agent::new(
        model.clone(),
        Arc::new(create_registry_with_canvas(session.clone())),
        config,
    );

    let response = agent.run("draw the number 8").await;

    assert!(response.success, "errors: {:?}", response.errors);
    assert_eq!(response.total_iterations, 3);
    assert_eq!(response.user_preferences_used.favorite_color, "red");
    assert!(model.prompts()[0].contains("- Favorite color: red"));

    let canvas = session.snapshot().await;
    assert_eq!(canvas.color.as_deref(), Some("red"));
    assert!(canvas.rectangle.is_some());
    assert_eq!(canvas.text.as_deref(), Some("8"));
}

#[tokio::test]
async fn model_endpoint_errors_are_retried() {
    let model = Arc::new(FlakyModel::default());
    let response = default_agent(model.clone()).run("add 5 and 3").await;

    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert_eq!(response.final_answer, Some(json!("8")));
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].contains("503 from model endpoint"));
}
