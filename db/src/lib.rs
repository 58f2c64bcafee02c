pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The database could not be reached or refused the connection.
    #[error("could not connect to database: {0}")]
    Connection(String),
    /// The database accepted the connection but the statement failed.
    #[error("{0}")]
    Query(String),
}

/// Rows fetched from a query. Each row is a JSON object keyed by column
/// name; `columns` carries the select-list order.
#[derive(Debug, Default, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// One column of a table, as declared.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Trait defining the interface for database operations.
///
/// Every call stands alone: implementations open their own connection and
/// release it before returning, so callers may invoke methods from
/// independent tasks without shared state.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a query and collect the rows as JSON values.
    async fn fetch(&self, query: &str) -> Result<QueryRows, DbError>;

    /// Names of the base tables in the default schema, ascending.
    async fn table_names(&self) -> Result<Vec<String>, DbError>;

    /// Column descriptors for a table in declaration order. An unknown
    /// table yields an empty list, not an error.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError>;

    /// Exact number of rows in a table.
    async fn count_rows(&self, table: &str) -> Result<i64, DbError>;

    /// Up to `limit` rows of a table, all columns. Builder-controlled:
    /// this path never carries model-authored SQL.
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryRows, DbError>;
}
