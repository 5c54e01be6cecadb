use crate::agent::TranscriptEntry;
use crate::tools::{ToolCatalogue, ToolDescriptor};

pub const SYSTEM_SQL_PREFIX: &str = "You are an agent designed to interact with a SQL database.
Given an question, create a syntactically correct {dialect} query to run, then look at the results of the query and return the answer.

DO NOT generate DROP/DELETE sql query!!!

Remember!
1. Only use the information returned by the given tools to construct your final answer.
2. Do not generate delete query or create a new table if table already existed.

For interacting with the database, you have access to following tools:
";

pub const SYSTEM_SQL_SUFFIX: &str = "You MUST double check your query before executing it. If you get an error while executing a query, rewrite the query and try again.";

pub const HUMAN_MESSAGE: &str = "
Question: {input}
{agent_scratchpad}
";

/// Rendered twice (tool names, then dialect), so literal braces are quadrupled.
pub const FORMAT_INSTRUCTIONS: &str = r#"
Use a json blob to specify a tool by providing an action key (tool name) and an action_input key (tool input).

Valid "action" values: "Final Answer" or '{tool_names}'

The $JSON_BLOB should only contain a SINGLE action, do NOT return a list of multiple actions. Here is an example of a valid $JSON_BLOB:
```json
{{{{
"action": $TOOL_NAME,
"action_input": $INPUT
}}}}
```

ALWAYS use the following format:

Thought: you should always think about what to do
Action:
```json
$JSON_BLOB
```
Observation: The actual result of the action
... (this Thought/Action/Observation can repeat N times)
Thought: I now know the final answer
Action:
```json
{{{{
"action": "Final Answer",
"action_input": "Final response to human based on your observation"
}}}}
```
Begin! Reminder to ALWAYS respond with a valid json blob of a single action. Use tools if necessary. Respond directly if appropriate. Format is Action:```$JSON_BLOB```then Observation
"#;

pub const QUERY_CHECKER: &str = "
{query}
Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for join

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.

SQL Query: ";

pub const DEFAULT_DESCRIPTION_DELIMITER: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    pub description_delimiter: Option<String>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            description_delimiter: Some(DEFAULT_DESCRIPTION_DELIMITER.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub human: String,
}

impl Prompt {
    pub fn messages(&self) -> [(MessageRole, &str); 2] {
        [
            (MessageRole::System, self.system.as_str()),
            (MessageRole::Human, self.human.as_str()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
}

impl PromptBuilder {
    pub fn new(catalogue: &ToolCatalogue, dialect: &str, options: &PromptOptions) -> Self {
        let tool_block = catalogue
            .tools()
            .iter()
            .map(|tool| render_tool_line(tool, options))
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = catalogue.tool_names();
        let format_instructions =
            render_template(FORMAT_INSTRUCTIONS, &[("tool_names", tool_names.as_str())]);
        let template = [
            SYSTEM_SQL_PREFIX,
            tool_block.as_str(),
            SYSTEM_SQL_SUFFIX,
            format_instructions.as_str(),
        ]
        .join("\n\n");

        Self {
            system: render_template(&template, &[("dialect", dialect)]),
        }
    }

    pub fn system_message(&self) -> &str {
        &self.system
    }

    pub fn build(&self, question: &str, transcript: &[TranscriptEntry]) -> Prompt {
        let scratchpad = format_scratchpad(transcript);
        Prompt {
            system: self.system.clone(),
            human: render_template(
                HUMAN_MESSAGE,
                &[("input", question), ("agent_scratchpad", scratchpad.as_str())],
            ),
        }
    }
}

pub fn render_tool_line(tool: &ToolDescriptor, options: &PromptOptions) -> String {
    let description = tool_description(tool.description, options.description_delimiter.as_deref());
    format!(
        "{}: {}, args: {}",
        tool.name,
        escape_braces(&description),
        escape_braces(tool.args_schema)
    )
}

fn tool_description(raw: &str, delimiter: Option<&str>) -> String {
    let text = match delimiter.filter(|d| !d.is_empty()) {
        Some(delimiter) => raw
            .split_once(delimiter)
            .map_or(raw, |(_, rest)| rest),
        None => raw,
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_scratchpad(transcript: &[TranscriptEntry]) -> String {
    let mut thoughts = String::new();
    for entry in transcript {
        thoughts.push_str(&entry.log);
        thoughts.push_str("\nObservation: ");
        thoughts.push_str(&entry.observation);
        thoughts.push('\n');
    }
    thoughts
}

pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{')
            && let Some(end) = tail.find('}')
            && let Some((_, value)) = vars.iter().find(|(name, _)| *name == &tail[1..end])
        {
            out.push_str(value);
            rest = &tail[end + 1..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::{
        MessageRole, PromptBuilder, PromptOptions, escape_braces, format_scratchpad,
        render_template, render_tool_line,
    };
    use crate::agent::TranscriptEntry;
    use crate::tools::{ToolCatalogue, ToolDescriptor, ToolKind};

    fn entry(log: &str, observation: &str) -> TranscriptEntry {
        TranscriptEntry {
            tool: "sql_db_query".to_string(),
            tool_input: "SELECT 1".to_string(),
            log: log.to_string(),
            observation: observation.to_string(),
            is_error: false,
        }
    }

    #[test]
    fn render_template_substitutes_known_names_once() {
        let out = render_template(
            "{a} and {b} with {{literal}} and {unknown}",
            &[("a", "{b}"), ("b", "B")],
        );
        assert_eq!(out, "{b} and B with {literal} and {unknown}");
    }

    #[test]
    fn render_template_keeps_stray_braces() {
        assert_eq!(render_template("a } b { c", &[]), "a } b { c");
    }

    #[test]
    fn escaped_text_survives_one_render() {
        let raw = r#"{"query": {"title": "Query"}} {dialect}"#;
        assert_eq!(
            render_template(&escape_braces(raw), &[("dialect", "sqlite")]),
            raw
        );
    }

    #[test]
    fn tool_line_trims_multiline_descriptions() {
        let line = render_tool_line(
            &ToolKind::QueryChecker.descriptor(),
            &PromptOptions::default(),
        );
        insta::assert_snapshot!(line, @r#"sql_db_query_checker: Use this tool to double check if your query is correct before executing it. Always use this tool before executing a query with sql_db_query!, args: {{"query": {{"title": "Query", "type": "string"}}}}"#);
    }

    #[test]
    fn description_delimiter_is_configurable() {
        let tool = ToolDescriptor {
            kind: ToolKind::Query,
            name: "sql_db_query",
            description: "sql_db_query(query) -> str - Run a query.",
            args_schema: "{}",
        };

        let cut = render_tool_line(&tool, &PromptOptions::default());
        assert_eq!(cut, "sql_db_query: Run a query., args: {{}}");

        let verbatim = render_tool_line(
            &tool,
            &PromptOptions {
                description_delimiter: None,
            },
        );
        assert_eq!(
            verbatim,
            "sql_db_query: sql_db_query(query) -> str - Run a query., args: {{}}"
        );
    }

    #[test]
    fn system_message_lists_same_tools_as_format_instructions() {
        let catalogue = ToolCatalogue::default();
        let builder = PromptBuilder::new(&catalogue, "sqlite", &PromptOptions::default());
        let system = builder.system_message();

        let listed = system
            .lines()
            .filter_map(|line| line.split_once(": ").map(|(name, _)| name))
            .filter(|name| name.starts_with("sql_db_"))
            .collect::<Vec<_>>()
            .join(", ");
        assert_eq!(listed, catalogue.tool_names());
        assert!(system.contains(&format!(
            "Valid \"action\" values: \"Final Answer\" or '{}'",
            catalogue.tool_names()
        )));
    }

    #[test]
    fn system_message_substitutes_dialect_and_keeps_literal_braces() {
        let catalogue = ToolCatalogue::default();
        let builder = PromptBuilder::new(&catalogue, "sqlite", &PromptOptions::default());
        let system = builder.system_message();

        assert!(system.contains("create a syntactically correct sqlite query"));
        assert!(!system.contains("{dialect}"));
        assert!(system.contains(r#"args: {"query": {"title": "Query", "type": "string"}}"#));
        assert!(system.contains("```json\n{\n\"action\": $TOOL_NAME,"));
        assert!(!system.contains("{{"));
    }

    #[test]
    fn placeholder_like_text_in_tools_is_not_substituted() {
        let catalogue = ToolCatalogue::from_descriptors(vec![ToolDescriptor {
            kind: ToolKind::Query,
            name: "sql_db_query",
            description: "Runs {dialect} text",
            args_schema: r#"{"query": {"default": "{dialect}"}}"#,
        }]);
        let system = PromptBuilder::new(&catalogue, "sqlite", &PromptOptions::default())
            .system_message()
            .to_string();

        assert!(system.contains(
            r#"sql_db_query: Runs {dialect} text, args: {"query": {"default": "{dialect}"}}"#
        ));
    }

    #[test]
    fn build_is_idempotent_and_formats_scratchpad() {
        let catalogue = ToolCatalogue::default();
        let builder = PromptBuilder::new(&catalogue, "sqlite", &PromptOptions::default());
        let transcript = vec![entry("Action: {\"action\": \"sql_db_query\"}", "[(42,)]")];

        let first = builder.build("How many {rows}?", &transcript);
        let second = builder.build("How many {rows}?", &transcript);

        assert_eq!(first, second);
        assert_eq!(
            first.human,
            "\nQuestion: How many {rows}?\nAction: {\"action\": \"sql_db_query\"}\nObservation: [(42,)]\n\n"
        );
        let roles = first.messages().map(|(role, _)| role);
        assert_eq!(roles, [MessageRole::System, MessageRole::Human]);
    }

    #[test]
    fn empty_transcript_yields_empty_scratchpad() {
        assert_eq!(format_scratchpad(&[]), "");
        assert_eq!(
            format_scratchpad(&[entry("a", "b"), entry("c", "d")]),
            "a\nObservation: b\nc\nObservation: d\n"
        );
    }
}
