use std::sync::Arc;

use super::{Tool, ToolCatalogue, ToolDescriptor, ToolError, ToolKind, ToolResult};
use crate::agent::prompt::{QUERY_CHECKER, render_template};
use crate::db::SqlDatabase;
use crate::llm::provider::{AssistantInput, LlmProvider};

pub const DEFAULT_CHECKER_TEMPERATURE: f32 = 0.0;

/// Executes one statement. Nothing stops a destructive statement from
/// reaching the database.
pub struct QuerySqlTool<D> {
    db: Arc<D>,
}

impl<D: SqlDatabase> Tool for QuerySqlTool<D> {
    fn descriptor(&self) -> ToolDescriptor {
        ToolKind::Query.descriptor()
    }

    async fn invoke(&self, input: &str) -> ToolResult<String> {
        Ok(self.db.run(input)?)
    }
}

pub struct InfoSqlTool<D> {
    db: Arc<D>,
}

impl<D: SqlDatabase> Tool for InfoSqlTool<D> {
    fn descriptor(&self) -> ToolDescriptor {
        ToolKind::Schema.descriptor()
    }

    async fn invoke(&self, input: &str) -> ToolResult<String> {
        let table_names = input
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        Ok(self.db.table_info(&table_names)?)
    }
}

pub struct ListTablesTool<D> {
    db: Arc<D>,
}

impl<D: SqlDatabase> Tool for ListTablesTool<D> {
    fn descriptor(&self) -> ToolDescriptor {
        ToolKind::ListTables.descriptor()
    }

    async fn invoke(&self, _input: &str) -> ToolResult<String> {
        Ok(self.db.usable_table_names()?.join(", "))
    }
}

pub struct QueryCheckerTool<D, P> {
    db: Arc<D>,
    llm: Arc<P>,
    temperature: f32,
}

impl<D, P> QueryCheckerTool<D, P>
where
    D: SqlDatabase,
{
    pub fn render_prompt(&self, query: &str) -> String {
        render_template(
            QUERY_CHECKER,
            &[("query", query), ("dialect", self.db.dialect())],
        )
    }
}

impl<D, P> Tool for QueryCheckerTool<D, P>
where
    D: SqlDatabase,
    P: LlmProvider + Send + Sync,
{
    fn descriptor(&self) -> ToolDescriptor {
        ToolKind::QueryChecker.descriptor()
    }

    async fn invoke(&self, input: &str) -> ToolResult<String> {
        let output = self
            .llm
            .generate(AssistantInput {
                temperature: Some(self.temperature),
                ..AssistantInput::user(self.render_prompt(input))
            })
            .await
            .map_err(|err| ToolError::Checker(err.to_string()))?;
        Ok(output.text.trim().to_string())
    }
}

pub struct SqlToolkit<D, P> {
    db: Arc<D>,
    catalogue: ToolCatalogue,
    query: QuerySqlTool<D>,
    schema: InfoSqlTool<D>,
    list_tables: ListTablesTool<D>,
    checker: QueryCheckerTool<D, P>,
}

impl<D, P> SqlToolkit<D, P>
where
    D: SqlDatabase,
    P: LlmProvider + Send + Sync,
{
    pub fn new(db: Arc<D>, llm: Arc<P>, checker_temperature: f32) -> Self {
        let query = QuerySqlTool {
            db: Arc::clone(&db),
        };
        let schema = InfoSqlTool {
            db: Arc::clone(&db),
        };
        let list_tables = ListTablesTool {
            db: Arc::clone(&db),
        };
        let checker = QueryCheckerTool {
            db: Arc::clone(&db),
            llm,
            temperature: checker_temperature,
        };
        let catalogue = ToolCatalogue::from_descriptors(vec![
            query.descriptor(),
            schema.descriptor(),
            list_tables.descriptor(),
            checker.descriptor(),
        ]);

        Self {
            db,
            catalogue,
            query,
            schema,
            list_tables,
            checker,
        }
    }

    pub fn dialect(&self) -> &str {
        self.db.dialect()
    }

    pub fn catalogue(&self) -> &ToolCatalogue {
        &self.catalogue
    }

    pub async fn invoke(&self, kind: ToolKind, input: &str) -> ToolResult<String> {
        match kind {
            ToolKind::Query => self.query.invoke(input).await,
            ToolKind::Schema => self.schema.invoke(input).await,
            ToolKind::ListTables => self.list_tables.invoke(input).await,
            ToolKind::QueryChecker => self.checker.invoke(input).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::SqlToolkit;
    use crate::db::{SqlDatabase, SqliteDatabase};
    use crate::llm::provider::{AssistantInput, AssistantOutput, LlmError, LlmProvider};
    use crate::tools::{ToolCatalogue, ToolError, ToolKind};

    struct FakeProvider {
        responses: Mutex<VecDeque<Result<AssistantOutput, LlmError>>>,
        seen_inputs: Mutex<Vec<AssistantInput>>,
    }

    impl FakeProvider {
        fn new(responses: Vec<Result<AssistantOutput, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
                seen_inputs: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for FakeProvider {
        async fn generate(&self, input: AssistantInput) -> Result<AssistantOutput, LlmError> {
            self.seen_inputs.lock().expect("lock").push(input);
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .expect("queued response")
        }
    }

    fn toolkit(llm: FakeProvider) -> (SqlToolkit<SqliteDatabase, FakeProvider>, Arc<FakeProvider>) {
        let db = SqliteDatabase::from_uri("sqlite://").expect("memory db");
        db.run("CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL)")
            .expect("create orders");
        db.run("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)")
            .expect("create customers");
        db.run("INSERT INTO orders (amount) VALUES (9.5), (12.0)")
            .expect("seed orders");
        let llm = Arc::new(llm);
        (SqlToolkit::new(Arc::new(db), Arc::clone(&llm), 0.0), llm)
    }

    #[test]
    fn catalogue_is_built_from_the_bound_tools() {
        let (toolkit, _) = toolkit(FakeProvider::new(vec![]));
        assert_eq!(toolkit.catalogue(), &ToolCatalogue::default());
        assert_eq!(toolkit.dialect(), "sqlite");
    }

    #[tokio::test]
    async fn list_tables_joins_sorted_names() {
        let (toolkit, _) = toolkit(FakeProvider::new(vec![]));
        let out = toolkit
            .invoke(ToolKind::ListTables, "")
            .await
            .expect("list tables");
        assert_eq!(out, "customers, orders");
    }

    #[tokio::test]
    async fn schema_trims_comma_separated_names() {
        let (toolkit, _) = toolkit(FakeProvider::new(vec![]));
        let out = toolkit
            .invoke(ToolKind::Schema, " orders ,customers ")
            .await
            .expect("schema");
        assert!(out.starts_with("CREATE TABLE orders"));
        assert!(out.contains("3 rows from orders table:\nid\tamount\n1\t9.5\n2\t12.0\n*/"));
        assert!(out.contains("CREATE TABLE customers"));
    }

    #[tokio::test]
    async fn schema_reports_unknown_tables() {
        let (toolkit, _) = toolkit(FakeProvider::new(vec![]));
        let err = toolkit
            .invoke(ToolKind::Schema, "orders, order_items")
            .await
            .expect_err("unknown table");
        assert_eq!(err, ToolError::NotFound(vec!["order_items".to_string()]));
    }

    #[tokio::test]
    async fn query_renders_rows_and_returns_execution_errors() {
        let (toolkit, _) = toolkit(FakeProvider::new(vec![]));
        let out = toolkit
            .invoke(ToolKind::Query, "SELECT COUNT(*) FROM orders")
            .await
            .expect("count");
        assert_eq!(out, "[(2,)]");

        let err = toolkit
            .invoke(ToolKind::Query, "SELECT * FROM order_items")
            .await
            .expect_err("missing table");
        assert_eq!(err, ToolError::QueryExecution("no such table: order_items".to_string()));
        assert_eq!(err.to_string(), "Error: no such table: order_items");
    }

    #[tokio::test]
    async fn checker_renders_template_with_dialect_and_temperature() {
        let (toolkit, llm) = toolkit(FakeProvider::new(vec![Ok(AssistantOutput {
            text: "  SELECT COUNT(*) FROM orders;\n".to_string(),
        })]));

        let out = toolkit
            .invoke(ToolKind::QueryChecker, "SELECT COUNT(*) FROM orders")
            .await
            .expect("checked");
        assert_eq!(out, "SELECT COUNT(*) FROM orders;");

        let seen = llm.seen_inputs.lock().expect("lock");
        let input = seen.first().expect("checker call");
        assert_eq!(input.temperature, Some(0.0));
        assert!(input.system_instruction.is_none());
        assert!(input.user_message.starts_with("\nSELECT COUNT(*) FROM orders\n"));
        assert!(input.user_message.contains("Double check the sqlite query above"));
        assert!(input.user_message.ends_with("SQL Query: "));
    }

    #[tokio::test]
    async fn checker_failures_are_observations() {
        let (toolkit, _) = toolkit(FakeProvider::new(vec![Err(LlmError::EmptyResponse)]));
        let err = toolkit
            .invoke(ToolKind::QueryChecker, "SELECT 1")
            .await
            .expect_err("checker failed");
        assert_eq!(
            err.to_string(),
            "Error: query checker failed: provider returned empty response text"
        );
        assert!(matches!(err, ToolError::Checker(_)));
    }
}
