use serde_json::{Map, Value};

pub const FINAL_ANSWER_ACTION: &str = "Final Answer";

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ToolCall { tool: String, input: Value },
    FinalAnswer { output: String },
    Unparseable { error: String },
}

pub fn parse_agent_output(text: &str) -> Action {
    let Some(value) = extract_json(text) else {
        return unparseable(text);
    };

    let value = match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return unparseable(text),
        },
        other => other,
    };

    let Value::Object(map) = value else {
        return unparseable(text);
    };
    action_from_object(map).unwrap_or_else(|| unparseable(text))
}

fn action_from_object(mut map: Map<String, Value>) -> Option<Action> {
    let action = match map.remove("action")? {
        Value::String(action) => action,
        _ => return None,
    };
    let input = map.remove("action_input");

    if action == FINAL_ANSWER_ACTION {
        let output = match input? {
            Value::String(text) => text,
            other => other.to_string(),
        };
        return Some(Action::FinalAnswer { output });
    }

    Some(Action::ToolCall {
        tool: action,
        input: input.unwrap_or_else(|| Value::Object(Map::new())),
    })
}

fn unparseable(text: &str) -> Action {
    Action::Unparseable {
        error: format!("Could not parse LLM output: {text}"),
    }
}

fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Some(block) = fenced_block(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(block.trim())
    {
        return Some(value);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
    {
        return Some(value);
    }

    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let after = after
        .strip_prefix("json")
        .or_else(|| after.strip_prefix("JSON"))
        .unwrap_or(after);
    let end = after.find("```")?;
    Some(&after[..end])
}
