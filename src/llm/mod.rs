//! Language model collaborator
//!
//! The control loop only needs `complete(prompt) -> text`. Deadlines are
//! applied by the caller, so implementations stay plain async functions.

use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiClient;

/// Black-box text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return raw model text; it may be malformed
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Replays canned responses in order, then repeats a fallback forever.
/// Every prompt it receives is kept for inspection.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: fallback.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Same response on every call
    pub fn repeating(response: impl Into<String>) -> Self {
        Self::new(Vec::<String>::new(), response)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_then_falls_back() {
        let model = ScriptedModel::new(["first", "second"], "again");

        assert_eq!(model.complete("p1").await.unwrap(), "first");
        assert_eq!(model.complete("p2").await.unwrap(), "second");
        assert_eq!(model.complete("p3").await.unwrap(), "again");
        assert_eq!(model.complete("p4").await.unwrap(), "again");

        assert_eq!(model.calls(), 4);
        assert_eq!(model.prompts()[0], "p1");
    }
}
