//! The database tool set exposed to the reasoning model: three guarded,
//! read-only capabilities plus the dispatcher that maps model-issued
//! tool calls onto them.
//!
//! Nothing on this path raises past the dispatcher. Every failure mode
//! (refused SQL, unknown table, unreachable database, unknown tool name,
//! malformed arguments) becomes a `success: false` result value the
//! model can read and recover from.

pub mod guard;

use std::sync::Arc;

use ai::{ToolExecutor, ToolInvocation, ToolOutput, ToolSpec, create_tool};
use async_trait::async_trait;
use db::Database;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// System instructions the assistant is registered with.
pub const INSTRUCTIONS: &str = "\
You are a helpful database assistant that can help users query and understand their PostgreSQL database.

You have access to three tools:
1. get_table_names() - Lists all tables in the database
2. summarize_table(table_name) - Shows table schema and sample data
3. run_query(sql) - Executes SELECT queries (limited to 5 rows for safety)

When users ask questions:
- Start by understanding what tables are available if needed
- Use summarize_table to understand table structure before writing queries
- Write clear, efficient SQL queries
- Always explain what the query does and what the results mean
- Be helpful in interpreting the data and suggesting follow-up questions

Security notes:
- Only SELECT queries are allowed
- Results are limited to 5 rows to protect sensitive data
- Email addresses and other PII may be present but should be handled carefully

Be conversational and helpful while being precise about database operations.";

const SAMPLE_ROWS: usize = 3;

/// The three tool declarations advertised to the model. Names, parameter
/// schemas and descriptions are wire contract: the model invokes tools
/// by exactly these shapes.
#[must_use]
pub fn specs() -> Vec<ToolSpec> {
    vec![
        create_tool(
            "run_query",
            "Execute a SQL SELECT query on the database. Only SELECT queries are allowed for security. Results are limited to 5 rows.",
            json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "The SQL SELECT query to execute",
                    },
                },
                "required": ["sql"],
            }),
        ),
        create_tool(
            "get_table_names",
            "Get a list of all table names in the database.",
            json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        ),
        create_tool(
            "summarize_table",
            "Get detailed information about a table including schema, column types, and sample data.",
            json!({
                "type": "object",
                "properties": {
                    "table_name": {
                        "type": "string",
                        "description": "The name of the table to summarize",
                    },
                },
                "required": ["table_name"],
            }),
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct RunQueryArgs {
    sql: String,
}

#[derive(Debug, Deserialize)]
struct SummarizeTableArgs {
    table_name: String,
}

/// The capabilities behind the tool declarations, over an injected
/// connection provider.
pub struct Toolbox {
    db: Arc<dyn Database>,
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox").finish_non_exhaustive()
    }
}

impl Toolbox {
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    async fn get_table_names(&self) -> Value {
        match self.db.table_names().await {
            Ok(tables) => {
                let count = tables.len();
                json!({
                    "success": true,
                    "error": null,
                    "tables": tables,
                    "count": count,
                })
            }
            Err(e) => json!({
                "success": false,
                "error": e.to_string(),
                "tables": null,
                "count": 0,
            }),
        }
    }

    async fn summarize_table(&self, table_name: &str) -> Value {
        let columns = match self.db.table_columns(table_name).await {
            Ok(columns) => columns,
            Err(e) => return summarize_failure(e.to_string()),
        };

        // An unknown table yields no column rows; connectivity failures
        // took the error path above, so the two stay distinguishable.
        if columns.is_empty() {
            return summarize_failure(format!("Table '{table_name}' not found."));
        }

        let total_rows = match self.db.count_rows(table_name).await {
            Ok(count) => count,
            Err(e) => return summarize_failure(e.to_string()),
        };

        let sample = match self.db.sample_rows(table_name, SAMPLE_ROWS).await {
            Ok(sample) => sample,
            Err(e) => return summarize_failure(e.to_string()),
        };

        let sample_count = sample.rows.len();
        json!({
            "success": true,
            "error": null,
            "table_name": table_name,
            "schema": columns,
            "sample_data": sample.rows,
            "total_rows": total_rows,
            "sample_rows": sample_count,
        })
    }

    async fn run_query(&self, sql: &str) -> Value {
        let guarded = match guard::validate(sql) {
            Ok(guarded) => guarded,
            Err(rejected) => {
                debug!(sql, "query refused by guard");
                return json!({
                    "success": false,
                    "error": rejected.to_string(),
                    "data": null,
                });
            }
        };

        match self.db.fetch(guarded.as_str()).await {
            Ok(results) => {
                let row_count = results.rows.len();
                json!({
                    "success": true,
                    "error": null,
                    "data": results.rows,
                    "row_count": row_count,
                    "columns": results.columns,
                })
            }
            Err(e) => json!({
                "success": false,
                "error": e.to_string(),
                "data": null,
            }),
        }
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> Value {
        match invocation.name.as_str() {
            "run_query" => match parse_args::<RunQueryArgs>(&invocation.arguments) {
                Ok(args) => self.run_query(&args.sql).await,
                Err(error) => failure(error),
            },
            "get_table_names" => self.get_table_names().await,
            "summarize_table" => match parse_args::<SummarizeTableArgs>(&invocation.arguments) {
                Ok(args) => self.summarize_table(&args.table_name).await,
                Err(error) => failure(error),
            },
            other => failure(format!("Unknown function: {other}")),
        }
    }
}

#[async_trait]
impl ToolExecutor for Toolbox {
    async fn execute(&self, invocation: &ToolInvocation) -> ToolOutput {
        debug!(tool = %invocation.name, id = %invocation.id, "executing tool call");
        let result = self.dispatch(invocation).await;
        if result["success"] == Value::Bool(false) {
            warn!(tool = %invocation.name, error = %result["error"], "tool call failed");
        }
        ToolOutput {
            tool_call_id: invocation.id.clone(),
            output: serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid arguments: {e}"))
}

fn failure(error: String) -> Value {
    json!({ "success": false, "error": error })
}

fn summarize_failure(error: String) -> Value {
    json!({
        "success": false,
        "error": error,
        "schema": null,
        "sample_data": null,
        "row_count": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::{ColumnInfo, DbError, QueryRows};
    use serde_json::Map;
    use std::sync::Mutex;

    struct FakeDb {
        queries: Mutex<Vec<String>>,
    }

    impl FakeDb {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                queries: Mutex::new(vec![]),
            })
        }

        fn recorded(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Database for FakeDb {
        async fn fetch(&self, query: &str) -> Result<QueryRows, DbError> {
            self.queries.lock().unwrap().push(query.to_string());
            let mut row = Map::new();
            row.insert("count".to_string(), json!(42));
            Ok(QueryRows {
                columns: vec!["count".to_string()],
                rows: vec![row],
            })
        }

        async fn table_names(&self) -> Result<Vec<String>, DbError> {
            Ok(vec![
                "orders".to_string(),
                "products".to_string(),
                "users".to_string(),
            ])
        }

        async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
            if table != "users" {
                return Ok(vec![]);
            }
            Ok(vec![
                ColumnInfo {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: false,
                    default: Some("nextval('users_id_seq')".to_string()),
                },
                ColumnInfo {
                    name: "email".to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    default: None,
                },
            ])
        }

        async fn count_rows(&self, _table: &str) -> Result<i64, DbError> {
            Ok(1234)
        }

        async fn sample_rows(&self, _table: &str, limit: usize) -> Result<QueryRows, DbError> {
            let rows = (0..limit.min(2))
                .map(|i| {
                    let mut row = Map::new();
                    row.insert("id".to_string(), json!(i));
                    row
                })
                .collect();
            Ok(QueryRows {
                columns: vec!["id".to_string()],
                rows,
            })
        }
    }

    /// Fake standing in for an unreachable database.
    struct UnreachableDb;

    #[async_trait]
    impl Database for UnreachableDb {
        async fn fetch(&self, _query: &str) -> Result<QueryRows, DbError> {
            Err(DbError::Connection("connection refused".to_string()))
        }

        async fn table_names(&self) -> Result<Vec<String>, DbError> {
            Err(DbError::Connection("connection refused".to_string()))
        }

        async fn table_columns(&self, _table: &str) -> Result<Vec<ColumnInfo>, DbError> {
            Err(DbError::Connection("connection refused".to_string()))
        }

        async fn count_rows(&self, _table: &str) -> Result<i64, DbError> {
            Err(DbError::Connection("connection refused".to_string()))
        }

        async fn sample_rows(&self, _table: &str, _limit: usize) -> Result<QueryRows, DbError> {
            Err(DbError::Connection("connection refused".to_string()))
        }
    }

    async fn call(toolbox: &Toolbox, name: &str, arguments: &str) -> Value {
        let invocation = ToolInvocation {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        };
        let output = toolbox.execute(&invocation).await;
        assert_eq!(output.tool_call_id, "call_1");
        serde_json::from_str(&output.output).unwrap()
    }

    #[tokio::test]
    async fn lists_tables_in_ascending_order() {
        let toolbox = Toolbox::new(FakeDb::new());
        let result = call(&toolbox, "get_table_names", "{}").await;

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["tables"], json!(["orders", "products", "users"]));
        assert_eq!(result["count"], json!(3));
    }

    #[tokio::test]
    async fn summarize_reports_schema_counts_and_samples() {
        let toolbox = Toolbox::new(FakeDb::new());
        let result = call(&toolbox, "summarize_table", r#"{"table_name": "users"}"#).await;

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["table_name"], json!("users"));
        assert_eq!(result["schema"][0]["name"], json!("id"));
        assert_eq!(result["schema"][0]["nullable"], json!(false));
        assert_eq!(result["schema"][1]["type"], json!("text"));
        assert_eq!(result["total_rows"], json!(1234));
        assert_eq!(result["sample_rows"], json!(2));
        assert_eq!(result["sample_data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn summarize_distinguishes_missing_table_from_connectivity() {
        let toolbox = Toolbox::new(FakeDb::new());
        let result = call(&toolbox, "summarize_table", r#"{"table_name": "nonexistent"}"#).await;

        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"], json!("Table 'nonexistent' not found."));
        assert_eq!(result["schema"], json!(null));
        assert_eq!(result["row_count"], json!(0));

        let down = Toolbox::new(Arc::new(UnreachableDb));
        let result = call(&down, "summarize_table", r#"{"table_name": "users"}"#).await;

        assert_eq!(result["success"], json!(false));
        let error = result["error"].as_str().unwrap();
        assert!(error.contains("could not connect"));
        assert!(!error.contains("not found"));
    }

    #[tokio::test]
    async fn run_query_refuses_writes_with_fixed_message() {
        let toolbox = Toolbox::new(FakeDb::new());
        let result = call(&toolbox, "run_query", r#"{"sql": "DROP TABLE users"}"#).await;

        assert_eq!(result["success"], json!(false));
        assert_eq!(
            result["error"],
            json!("Only SELECT queries are allowed for security reasons.")
        );
        assert_eq!(result["data"], json!(null));
    }

    #[tokio::test]
    async fn run_query_executes_the_guarded_text() {
        let fake = FakeDb::new();
        let toolbox = Toolbox::new(fake.clone());
        let result = call(
            &toolbox,
            "run_query",
            r#"{"sql": "SELECT COUNT(*) FROM users"}"#,
        )
        .await;

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["data"][0]["count"], json!(42));
        assert_eq!(result["row_count"], json!(1));
        assert_eq!(result["columns"], json!(["count"]));
        assert_eq!(
            fake.recorded(),
            vec!["SELECT COUNT(*) FROM users LIMIT 5".to_string()]
        );
    }

    #[tokio::test]
    async fn run_query_surfaces_execution_failure_as_result() {
        let toolbox = Toolbox::new(Arc::new(UnreachableDb));
        let result = call(&toolbox, "run_query", r#"{"sql": "SELECT 1"}"#).await;

        assert_eq!(result["success"], json!(false));
        assert_eq!(result["data"], json!(null));
        assert!(result["error"].as_str().unwrap().contains("could not connect"));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_a_result_not_a_fault() {
        let toolbox = Toolbox::new(FakeDb::new());
        let result = call(&toolbox, "drop_database", "{}").await;

        assert_eq!(result["success"], json!(false));
        assert_eq!(result["error"], json!("Unknown function: drop_database"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_a_result_not_a_fault() {
        let toolbox = Toolbox::new(FakeDb::new());

        let result = call(&toolbox, "run_query", "not json").await;
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("Invalid arguments"));

        let result = call(&toolbox, "summarize_table", "{}").await;
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("Invalid arguments"));
    }
}
