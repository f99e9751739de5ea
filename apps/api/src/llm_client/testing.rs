//! Scripted generation backend for tests. Records every instruction it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerationBackend, LlmError};

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// Replies with `responses` in order, then fails with `EmptyContent`.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(responses.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            fallback: None,
            instructions: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the same text forever.
    pub fn repeating(response: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.into()),
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.instructions.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, instruction: &str) -> Result<String, LlmError> {
        self.instructions
            .lock()
            .unwrap()
            .push(instruction.to_string());

        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => self.fallback.clone().ok_or(LlmError::EmptyContent),
        }
    }
}

/// Answers each instruction with a closure, for tests where call order is not fixed.
pub struct FnBackend<F>(pub F);

#[async_trait]
impl<F> GenerationBackend for FnBackend<F>
where
    F: Fn(&str) -> Result<String, LlmError> + Send + Sync,
{
    async fn generate(&self, instruction: &str) -> Result<String, LlmError> {
        (self.0)(instruction)
    }
}
