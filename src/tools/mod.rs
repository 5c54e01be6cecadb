pub mod sql;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;

use serde_json::Value;

use crate::db::DbError;

pub use sql::SqlToolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Query,
    Schema,
    ListTables,
    QueryChecker,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Query,
        ToolKind::Schema,
        ToolKind::ListTables,
        ToolKind::QueryChecker,
    ];

    pub fn descriptor(self) -> ToolDescriptor {
        match self {
            Self::Query => ToolDescriptor {
                kind: self,
                name: "sql_db_query",
                description: "Input to this tool is a detailed and correct SQL query, output is a \
                    result from the database. If the query is not correct, an error message will \
                    be returned. If an error is returned, rewrite the query, check the query, and \
                    try again. If you encounter an issue with Unknown column 'xxxx' in 'field \
                    list', use sql_db_schema to query the correct table fields.",
                args_schema: r#"{"query": {"title": "Query", "type": "string"}}"#,
            },
            Self::Schema => ToolDescriptor {
                kind: self,
                name: "sql_db_schema",
                description: "Input to this tool is a comma-separated list of tables, output is \
                    the schema and sample rows for those tables. Be sure that the tables actually \
                    exist by calling sql_db_list_tables first! Example Input: table1, table2, \
                    table3",
                args_schema: r#"{"table_names": {"title": "Table Names", "type": "string"}}"#,
            },
            Self::ListTables => ToolDescriptor {
                kind: self,
                name: "sql_db_list_tables",
                description: "Input is an empty string, output is a comma-separated list of \
                    tables in the database.",
                args_schema: r#"{"tool_input": {"title": "Tool Input", "type": "string", "default": ""}}"#,
            },
            Self::QueryChecker => ToolDescriptor {
                kind: self,
                name: "sql_db_query_checker",
                description: "
    Use this tool to double check if your query is correct before executing it.
    Always use this tool before executing a query with sql_db_query!
    ",
                args_schema: r#"{"query": {"title": "Query", "type": "string"}}"#,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub kind: ToolKind,
    pub name: &'static str,
    pub description: &'static str,
    pub args_schema: &'static str,
}

impl ToolDescriptor {
    pub fn primary_arg(&self) -> Option<String> {
        let schema = serde_json::from_str::<serde_json::Map<String, Value>>(self.args_schema).ok()?;
        schema.keys().next().cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCatalogue {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalogue {
    pub fn new(kinds: &[ToolKind]) -> Self {
        Self {
            tools: kinds.iter().map(|kind| kind.descriptor()).collect(),
        }
    }

    pub(crate) fn from_descriptors(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn resolve(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name).collect()
    }

    pub fn tool_names(&self) -> String {
        self.names().join(", ")
    }
}

impl Default for ToolCatalogue {
    fn default() -> Self {
        Self::new(&ToolKind::ALL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    Connection(String),
    NotFound(Vec<String>),
    QueryExecution(String),
    Checker(String),
}

impl Display for ToolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "Error: {msg}"),
            Self::NotFound(names) => write!(
                f,
                "Error: table_names {{{}}} not found in database",
                names.join(", ")
            ),
            Self::QueryExecution(msg) => write!(f, "Error: {msg}"),
            Self::Checker(msg) => write!(f, "Error: query checker failed: {msg}"),
        }
    }
}

impl Error for ToolError {}

impl From<DbError> for ToolError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(msg) => Self::Connection(msg),
            DbError::NotFound(names) => Self::NotFound(names),
            DbError::Execution(msg) => Self::QueryExecution(msg),
        }
    }
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

pub trait Tool {
    fn descriptor(&self) -> ToolDescriptor;

    fn invoke(&self, input: &str) -> impl Future<Output = ToolResult<String>> + Send;
}

pub fn tool_input_text(descriptor: &ToolDescriptor, input: &Value) -> String {
    match input {
        Value::String(text) => text.clone(),
        Value::Object(map) => descriptor
            .primary_arg()
            .and_then(|arg| map.get(&arg))
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| input.to_string()),
        other => other.to_string(),
    }
}
