use serde_json::Value;

use crate::agent::{AgentError, AgentResult};
use crate::db::SqlDatabase;
use crate::llm::provider::LlmProvider;
use crate::tools::{SqlToolkit, ToolError, tool_input_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub tool_input: String,
    pub text: String,
    pub is_error: bool,
}

impl Observation {
    fn ok(tool_input: String, text: String) -> Self {
        Self {
            tool_input,
            text,
            is_error: false,
        }
    }

    fn error(tool_input: String, text: String) -> Self {
        Self {
            tool_input,
            text,
            is_error: true,
        }
    }
}

/// Runs one requested tool. Errors the model can act on come back as
/// observations; a lost database is returned as `Err`.
pub async fn dispatch_action<D, P>(
    toolkit: &SqlToolkit<D, P>,
    tool: &str,
    input: &Value,
) -> AgentResult<Observation>
where
    D: SqlDatabase,
    P: LlmProvider + Send + Sync,
{
    let catalogue = toolkit.catalogue();
    let Some(descriptor) = catalogue.resolve(tool) else {
        return Ok(Observation::error(
            input_as_text(input),
            format!(
                "{tool} is not a valid tool, try one of [{}].",
                catalogue.tool_names()
            ),
        ));
    };

    let tool_input = tool_input_text(descriptor, input);
    match toolkit.invoke(descriptor.kind, &tool_input).await {
        Ok(text) => Ok(Observation::ok(tool_input, text)),
        Err(ToolError::Connection(msg)) => Err(AgentError::Connection(msg)),
        Err(
            err @ (ToolError::NotFound(_) | ToolError::QueryExecution(_) | ToolError::Checker(_)),
        ) => Ok(Observation::error(tool_input, err.to_string())),
    }
}

pub(crate) fn input_as_text(input: &Value) -> String {
    match input {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::dispatch_action;
    use crate::agent::AgentError;
    use crate::db::{DbError, DbResult, SqlDatabase, SqliteDatabase};
    use crate::llm::provider::{AssistantInput, AssistantOutput, LlmError, LlmProvider};
    use crate::tools::SqlToolkit;

    struct NoModel;

    impl LlmProvider for NoModel {
        async fn generate(&self, _input: AssistantInput) -> Result<AssistantOutput, LlmError> {
            Err(LlmError::EmptyResponse)
        }
    }

    struct UnreachableDb;

    impl SqlDatabase for UnreachableDb {
        fn dialect(&self) -> &str {
            "sqlite"
        }

        fn usable_table_names(&self) -> DbResult<Vec<String>> {
            Err(DbError::Connection("unable to open database file".to_string()))
        }

        fn table_info(&self, _table_names: &[String]) -> DbResult<String> {
            Err(DbError::Connection("unable to open database file".to_string()))
        }

        fn run(&self, _sql: &str) -> DbResult<String> {
            Err(DbError::Connection("unable to open database file".to_string()))
        }
    }

    fn memory_toolkit() -> SqlToolkit<SqliteDatabase, NoModel> {
        let db = SqliteDatabase::from_uri("sqlite://").expect("memory db");
        db.run("CREATE TABLE orders (id INTEGER PRIMARY KEY)")
            .expect("create");
        SqlToolkit::new(Arc::new(db), Arc::new(NoModel), 0.0)
    }

    #[tokio::test]
    async fn unknown_tool_becomes_observation() {
        let toolkit = memory_toolkit();
        let observation = dispatch_action(&toolkit, "sql_db_drop", &json!("orders"))
            .await
            .expect("observation");
        assert!(observation.is_error);
        assert_eq!(
            observation.text,
            "sql_db_drop is not a valid tool, try one of [sql_db_query, sql_db_schema, sql_db_list_tables, sql_db_query_checker]."
        );
    }

    #[tokio::test]
    async fn object_input_is_unwrapped_to_primary_argument() {
        let toolkit = memory_toolkit();
        let observation = dispatch_action(
            &toolkit,
            "sql_db_query",
            &json!({"query": "SELECT COUNT(*) FROM orders"}),
        )
        .await
        .expect("observation");
        assert_eq!(observation.tool_input, "SELECT COUNT(*) FROM orders");
        assert_eq!(observation.text, "[(0,)]");
        assert!(!observation.is_error);
    }

    #[tokio::test]
    async fn query_errors_are_flagged_observations() {
        let toolkit = memory_toolkit();
        let observation = dispatch_action(&toolkit, "sql_db_query", &json!("SELEC 1"))
            .await
            .expect("observation");
        assert!(observation.is_error);
        assert!(observation.text.starts_with("Error: "));
    }

    #[tokio::test]
    async fn connection_errors_are_fatal() {
        let toolkit = SqlToolkit::new(Arc::new(UnreachableDb), Arc::new(NoModel), 0.0);
        let err = dispatch_action(&toolkit, "sql_db_list_tables", &json!(""))
            .await
            .expect_err("fatal");
        assert_eq!(
            err,
            AgentError::Connection("unable to open database file".to_string())
        );
    }

    #[tokio::test]
    async fn missing_tables_and_empty_queries_stay_recoverable() {
        let toolkit = memory_toolkit();
        let schema = dispatch_action(&toolkit, "sql_db_schema", &json!(" , "))
            .await
            .expect("observation");
        assert!(schema.is_error);
        assert_eq!(
            schema.text,
            "Error: no table names given, expected a comma-separated list of tables"
        );

        let query = dispatch_action(&toolkit, "sql_db_query", &json!(""))
            .await
            .expect("observation");
        assert!(query.is_error);
        assert_eq!(query.text, "Error: empty query, expected one SQL statement");
    }
}
