use crate::agent::{AgentError, AgentProgressEvent};

const STEP_PADDING: &str = "  ";
const MAX_OBSERVATION_CHARS: usize = 400;

pub(crate) fn progress_lines(event: &AgentProgressEvent) -> Vec<String> {
    match event {
        AgentProgressEvent::StepStarted { step } => {
            vec![format!("{STEP_PADDING}Thinking... (step {step})")]
        }
        AgentProgressEvent::ModelOutput { log, .. } => log
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| format!("{STEP_PADDING}{STEP_PADDING}{line}"))
            .collect(),
        AgentProgressEvent::ToolRequest { tool, input, .. } => {
            vec![format!("{STEP_PADDING}-> {tool}: {}", one_line(input))]
        }
        AgentProgressEvent::ToolResult {
            observation,
            is_error,
            ..
        } => {
            let marker = if *is_error { "<! " } else { "<- " };
            let body = if observation.is_empty() {
                "<empty>".to_string()
            } else {
                clip(&one_line(observation))
            };
            vec![format!("{STEP_PADDING}{marker}{body}")]
        }
        AgentProgressEvent::ParseError { error, .. } => {
            vec![format!("{STEP_PADDING}<! {}", clip(&one_line(error)))]
        }
        AgentProgressEvent::Finished { step, .. } => {
            vec![format!("{STEP_PADDING}Done after {step} step(s)")]
        }
    }
}

pub(crate) fn error_details(err: &AgentError) -> Vec<String> {
    match err {
        AgentError::BudgetExceeded { transcript, .. } => transcript
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                format!(
                    "{STEP_PADDING}{}. {}: {}",
                    idx + 1,
                    entry.tool,
                    clip(&one_line(&entry.tool_input))
                )
            })
            .collect(),
        AgentError::Parse { output, .. } => vec![format!(
            "{STEP_PADDING}model output: {}",
            clip(&one_line(output))
        )],
        AgentError::Connection(_) | AgentError::Llm(_) => Vec::new(),
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_OBSERVATION_CHARS {
        return text.to_string();
    }
    let head = text.chars().take(MAX_OBSERVATION_CHARS).collect::<String>();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::{error_details, progress_lines};
    use crate::agent::{AgentError, AgentProgressEvent, BudgetLimit, TranscriptEntry};

    #[test]
    fn tool_events_render_on_single_lines() {
        assert_eq!(
            progress_lines(&AgentProgressEvent::ToolRequest {
                step: 1,
                tool: "sql_db_query".to_string(),
                input: "SELECT COUNT(*)\n  FROM orders".to_string(),
            }),
            vec!["  -> sql_db_query: SELECT COUNT(*) FROM orders".to_string()]
        );
        assert_eq!(
            progress_lines(&AgentProgressEvent::ToolResult {
                step: 1,
                tool: "sql_db_query".to_string(),
                observation: "Error: no such table: order".to_string(),
                is_error: true,
            }),
            vec!["  <! Error: no such table: order".to_string()]
        );
        assert_eq!(
            progress_lines(&AgentProgressEvent::ToolResult {
                step: 1,
                tool: "sql_db_query".to_string(),
                observation: String::new(),
                is_error: false,
            }),
            vec!["  <- <empty>".to_string()]
        );
    }

    #[test]
    fn model_output_is_indented_without_blank_lines() {
        let lines = progress_lines(&AgentProgressEvent::ModelOutput {
            step: 2,
            log: "Thought: count\n\nAction:".to_string(),
        });
        assert_eq!(lines, vec!["    Thought: count", "    Action:"]);
    }

    #[test]
    fn long_observations_are_clipped() {
        let lines = progress_lines(&AgentProgressEvent::ToolResult {
            step: 1,
            tool: "sql_db_query".to_string(),
            observation: "x".repeat(1_000),
            is_error: false,
        });
        assert!(lines[0].ends_with("..."));
        assert_eq!(lines[0].chars().count(), 2 + 3 + 400 + 3);
    }

    #[test]
    fn budget_errors_list_the_partial_transcript() {
        let err = AgentError::BudgetExceeded {
            limit: BudgetLimit::Iterations(1),
            transcript: vec![TranscriptEntry {
                tool: "sql_db_list_tables".to_string(),
                tool_input: String::new(),
                log: String::new(),
                observation: "orders".to_string(),
                is_error: false,
            }],
        };
        assert_eq!(error_details(&err), vec!["  1. sql_db_list_tables: "]);
    }
}
