use std::future::Future;
use std::sync::Arc;

use crate::agent::parser::{Action, parse_agent_output};
use crate::agent::prompt::Prompt;
use crate::llm::provider::{AssistantInput, LlmProvider, LlmResult};

/// Start of a model-invented observation. Generation stops there.
pub const OBSERVATION_STOP: &str = "\nObservation:";

pub const DEFAULT_AGENT_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub log: String,
}

pub trait Decider {
    fn decide(&self, prompt: &Prompt) -> impl Future<Output = LlmResult<Decision>> + Send;
}

#[derive(Debug)]
pub struct LlmDecider<P> {
    provider: Arc<P>,
    temperature: f32,
}

impl<P> LlmDecider<P> {
    pub fn new(provider: Arc<P>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }
}

impl<P: LlmProvider + Send + Sync> Decider for LlmDecider<P> {
    async fn decide(&self, prompt: &Prompt) -> LlmResult<Decision> {
        let output = self
            .provider
            .generate(AssistantInput {
                system_instruction: Some(prompt.system.clone()),
                user_message: prompt.human.clone(),
                temperature: Some(self.temperature),
                stop_sequences: vec![OBSERVATION_STOP.to_string()],
            })
            .await?;

        let log = truncate_at_stop(&output.text).to_string();
        Ok(Decision {
            action: parse_agent_output(&log),
            log,
        })
    }
}

fn truncate_at_stop(text: &str) -> &str {
    text.find(OBSERVATION_STOP).map_or(text, |idx| &text[..idx])
}
