use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::agent::decide::{DEFAULT_AGENT_TEMPERATURE, Decider, Decision, LlmDecider};
use crate::agent::dispatch::{dispatch_action, input_as_text};
use crate::agent::parser::Action;
use crate::agent::prompt::{PromptBuilder, PromptOptions};
use crate::db::SqlDatabase;
use crate::llm::provider::{LlmError, LlmProvider};
use crate::tools::sql::DEFAULT_CHECKER_TEMPERATURE;
use crate::tools::SqlToolkit;

pub const DEFAULT_MAX_ITERATIONS: usize = 15;

pub const PARSE_ERROR_TOOL: &str = "_Exception";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub max_iterations: Option<usize>,
    pub max_execution_time: Option<Duration>,
    pub handle_parsing_errors: bool,
    pub agent_temperature: f32,
    pub checker_temperature: f32,
    pub prompt: PromptOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            max_execution_time: None,
            handle_parsing_errors: false,
            agent_temperature: DEFAULT_AGENT_TEMPERATURE,
            checker_temperature: DEFAULT_CHECKER_TEMPERATURE,
            prompt: PromptOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub tool: String,
    pub tool_input: String,
    pub log: String,
    pub observation: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInput {
    pub input: String,
}

impl AgentInput {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    pub output: String,
    pub transcript: Vec<TranscriptEntry>,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentProgressEvent {
    StepStarted {
        step: usize,
    },
    ModelOutput {
        step: usize,
        log: String,
    },
    ToolRequest {
        step: usize,
        tool: String,
        input: String,
    },
    ToolResult {
        step: usize,
        tool: String,
        observation: String,
        is_error: bool,
    },
    ParseError {
        step: usize,
        error: String,
    },
    Finished {
        step: usize,
        output: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetLimit {
    Iterations(usize),
    ExecutionTime(Duration),
}

impl Display for BudgetLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Iterations(max) => write!(f, "iteration limit of {max}"),
            Self::ExecutionTime(max) => write!(f, "time limit of {} ms", max.as_millis()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    Connection(String),
    Llm(LlmError),
    Parse { error: String, output: String },
    BudgetExceeded {
        limit: BudgetLimit,
        transcript: Vec<TranscriptEntry>,
    },
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "database connection error: {msg}"),
            Self::Llm(err) => write!(f, "model request failed: {err}"),
            Self::Parse { error, .. } => write!(f, "{error}"),
            Self::BudgetExceeded { limit, transcript } => write!(
                f,
                "agent stopped after reaching its {limit} ({} steps recorded)",
                transcript.len()
            ),
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Llm(err) => Some(err),
            _ => None,
        }
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;


enum LoopState {
    Thinking,
    Parsing(Decision),
    Acting {
        tool: String,
        input: Value,
        log: String,
    },
    Done(String),
}

struct Budget {
    max_iterations: Option<usize>,
    max_execution_time: Option<Duration>,
    started: Instant,
}

impl Budget {
    fn start(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_execution_time: config.max_execution_time,
            started: Instant::now(),
        }
    }

    fn exhausted(&self, iterations: usize) -> Option<BudgetLimit> {
        if let Some(max) = self.max_iterations
            && iterations >= max
        {
            return Some(BudgetLimit::Iterations(max));
        }
        if let Some(max) = self.max_execution_time
            && self.started.elapsed() >= max
        {
            return Some(BudgetLimit::ExecutionTime(max));
        }
        None
    }

    async fn run<T>(&self, fut: impl Future<Output = T>) -> Result<T, BudgetLimit> {
        let Some(max) = self.max_execution_time else {
            return Ok(fut.await);
        };
        let remaining = max.saturating_sub(self.started.elapsed());
        timeout(remaining, fut)
            .await
            .map_err(|_| BudgetLimit::ExecutionTime(max))
    }
}

pub async fn run_question_with_events<D, P, R, F>(
    toolkit: &SqlToolkit<D, P>,
    decider: &R,
    prompt: &PromptBuilder,
    question: &str,
    config: &AgentConfig,
    on_event: &mut F,
) -> AgentResult<AgentOutput>
where
    D: SqlDatabase,
    P: LlmProvider + Send + Sync,
    R: Decider,
    F: FnMut(AgentProgressEvent),
{
    let budget = Budget::start(config);
    let mut transcript = Vec::new();
    let mut step = 0usize;
    let mut state = LoopState::Thinking;

    loop {
        state = match state {
            LoopState::Thinking => {
                if let Some(limit) = budget.exhausted(step) {
                    return Err(AgentError::BudgetExceeded { limit, transcript });
                }
                step += 1;
                on_event(AgentProgressEvent::StepStarted { step });

                let request = prompt.build(question, &transcript);
                let decision = match budget.run(decider.decide(&request)).await {
                    Ok(result) => result.map_err(AgentError::Llm)?,
                    Err(limit) => return Err(AgentError::BudgetExceeded { limit, transcript }),
                };
                on_event(AgentProgressEvent::ModelOutput {
                    step,
                    log: decision.log.clone(),
                });
                LoopState::Parsing(decision)
            }
            LoopState::Parsing(Decision { action, log }) => match action {
                Action::FinalAnswer { output } => LoopState::Done(output),
                Action::ToolCall { tool, input } => LoopState::Acting { tool, input, log },
                Action::Unparseable { error } => {
                    on_event(AgentProgressEvent::ParseError {
                        step,
                        error: error.clone(),
                    });
                    if !config.handle_parsing_errors {
                        return Err(AgentError::Parse { error, output: log });
                    }
                    transcript.push(TranscriptEntry {
                        tool: PARSE_ERROR_TOOL.to_string(),
                        tool_input: error.clone(),
                        log,
                        observation: error,
                        is_error: true,
                    });
                    LoopState::Thinking
                }
            },
            LoopState::Acting { tool, input, log } => {
                on_event(AgentProgressEvent::ToolRequest {
                    step,
                    tool: tool.clone(),
                    input: input_as_text(&input),
                });

                let observation = match budget.run(dispatch_action(toolkit, &tool, &input)).await {
                    Ok(result) => result?,
                    Err(limit) => return Err(AgentError::BudgetExceeded { limit, transcript }),
                };
                on_event(AgentProgressEvent::ToolResult {
                    step,
                    tool: tool.clone(),
                    observation: observation.text.clone(),
                    is_error: observation.is_error,
                });

                transcript.push(TranscriptEntry {
                    tool,
                    tool_input: observation.tool_input,
                    log,
                    observation: observation.text,
                    is_error: observation.is_error,
                });
                LoopState::Thinking
            }
            LoopState::Done(output) => {
                on_event(AgentProgressEvent::Finished {
                    step,
                    output: output.clone(),
                });
                return Ok(AgentOutput {
                    output,
                    transcript,
                    iterations: step,
                });
            }
        };
    }
}

pub struct SqlAgent<D, P, R = LlmDecider<P>> {
    toolkit: SqlToolkit<D, P>,
    decider: R,
    prompt: PromptBuilder,
    config: AgentConfig,
}

impl<D, P> SqlAgent<D, P>
where
    D: SqlDatabase,
    P: LlmProvider + Send + Sync,
{
    pub fn new(db: Arc<D>, llm: Arc<P>, config: AgentConfig) -> Self {
        let decider = LlmDecider::new(Arc::clone(&llm), config.agent_temperature);
        Self::with_decider(db, llm, decider, config)
    }
}

impl<D, P, R> SqlAgent<D, P, R>
where
    D: SqlDatabase,
    P: LlmProvider + Send + Sync,
    R: Decider,
{
    pub fn with_decider(db: Arc<D>, llm: Arc<P>, decider: R, config: AgentConfig) -> Self {
        let toolkit = SqlToolkit::new(db, llm, config.checker_temperature);
        let prompt = PromptBuilder::new(toolkit.catalogue(), toolkit.dialect(), &config.prompt);
        Self {
            toolkit,
            decider,
            prompt,
            config,
        }
    }

    pub fn system_message(&self) -> &str {
        self.prompt.system_message()
    }

    pub async fn invoke(&self, input: AgentInput) -> AgentResult<AgentOutput> {
        self.invoke_with_events(input, &mut |_| {}).await
    }

    pub async fn invoke_with_events<F: FnMut(AgentProgressEvent)>(
        &self,
        input: AgentInput,
        on_event: &mut F,
    ) -> AgentResult<AgentOutput> {
        run_question_with_events(
            &self.toolkit,
            &self.decider,
            &self.prompt,
            &input.input,
            &self.config,
            on_event,
        )
        .await
    }
}
