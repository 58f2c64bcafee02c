use crate::{ColumnInfo, DbError, QueryRows};

use super::Database;
use serde_json::{Map, Value, json};
use sqlx::postgres::PgRow;
use sqlx::{Column, Connection, PgConnection, Row, TypeInfo};
use std::fmt::Display;

pub struct PostgresDatabase {
    url: String,
}

impl std::fmt::Debug for PostgresDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDatabase").finish_non_exhaustive()
    }
}

impl PostgresDatabase {
    pub fn new(url: impl Display) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    /// Open a fresh connection. Dropped at the end of each call, so no
    /// connection outlives the operation that opened it.
    async fn connect(&self) -> Result<PgConnection, DbError> {
        PgConnection::connect(&self.url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Database for PostgresDatabase {
    async fn fetch(&self, query: &str) -> Result<QueryRows, DbError> {
        let mut connection = self.connect().await?;
        let rows = sqlx::query(query)
            .fetch_all(&mut connection)
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(rows_to_json(&rows))
    }

    async fn table_names(&self) -> Result<Vec<String>, DbError> {
        let mut connection = self.connect().await?;
        sqlx::query_scalar(
            r"SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
              AND table_type = 'BASE TABLE'
            ORDER BY table_name",
        )
        .fetch_all(&mut connection)
        .await
        .map_err(|e| DbError::Query(e.to_string()))
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        let mut connection = self.connect().await?;
        let rows = sqlx::query(
            r"SELECT
                column_name,
                data_type,
                is_nullable,
                column_default
            FROM information_schema.columns
            WHERE table_name = $1
              AND table_schema = 'public'
            ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut connection)
        .await
        .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.get("column_name"),
                data_type: row.get("data_type"),
                nullable: row.get::<String, _>("is_nullable") == "YES",
                default: row.try_get("column_default").unwrap_or(None),
            })
            .collect())
    }

    async fn count_rows(&self, table: &str) -> Result<i64, DbError> {
        let mut connection = self.connect().await?;
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&mut connection)
            .await
            .map_err(|e| DbError::Query(e.to_string()))
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryRows, DbError> {
        let mut connection = self.connect().await?;
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} LIMIT {limit}",
            quote_ident(table)
        ))
        .fetch_all(&mut connection)
        .await
        .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(rows_to_json(&rows))
    }
}

fn rows_to_json(rows: &[PgRow]) -> QueryRows {
    let mut results = QueryRows::default();

    let Some(first) = rows.first() else {
        return results;
    };

    for col in first.columns() {
        results.columns.push(col.name().to_string());
    }

    for row in rows {
        let mut object = Map::new();

        for (i, col) in row.columns().iter().enumerate() {
            let value = column_value(row, i, col.type_info().name());
            object.insert(col.name().to_string(), value);
        }

        results.rows.push(object);
    }

    results
}

/// Decode a single column to JSON by Postgres type name. Anything not
/// covered falls back to the raw bytes interpreted as UTF-8.
fn column_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "UUID" => row
            .try_get::<uuid::Uuid, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "BPCHAR" => row
            .try_get::<String, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .map(|v| json!(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(|dt| json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|dt| json!(dt.to_rfc3339()))
            .unwrap_or(Value::Null),

        "INT2" => row
            .try_get::<i16, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT4" => row
            .try_get::<i32, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT8" => row
            .try_get::<i64, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "JSON" | "JSONB" => row.try_get::<Value, _>(index).unwrap_or(Value::Null),

        "BOOL" => row
            .try_get::<bool, _>(index)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        _ => row
            .try_get_raw(index)
            .ok()
            .and_then(|raw| raw.as_bytes().ok().map(<[u8]>::to_vec))
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map_or(Value::Null, |s| json!(s)),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::quote_ident;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("od\"d"), "\"od\"\"d\"");
    }
}
