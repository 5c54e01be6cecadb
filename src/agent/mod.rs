pub mod decide;
pub mod dispatch;
mod loop_impl;
pub mod parser;
pub mod prompt;

pub use decide::{Decider, Decision, LlmDecider};
pub use loop_impl::{
    AgentConfig, AgentError, AgentInput, AgentOutput, AgentProgressEvent, AgentResult,
    BudgetLimit, DEFAULT_MAX_ITERATIONS, PARSE_ERROR_TOOL, SqlAgent, TranscriptEntry,
    run_question_with_events,
};
pub use parser::Action;
pub use prompt::{Prompt, PromptBuilder, PromptOptions};
