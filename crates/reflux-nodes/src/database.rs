//! `nodes.database.query` — parameterized SQL against Postgres
//!
//! SELECT-shaped queries are wrapped in `json_agg(row_to_json(...))` so rows
//! come back as JSON without per-column decoding; other statements report the
//! affected row count. Params bind positionally, never interpolate.

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::{Query, QueryScalar};
use sqlx::{PgPool, Postgres};
use std::time::Duration;

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

pub struct DatabaseQueryNode {
    default_pool: Option<PgPool>,
}

impl DatabaseQueryNode {
    pub fn new(default_pool: Option<PgPool>) -> Self {
        Self { default_pool }
    }

    async fn pool_for(&self, connection_string: Option<&str>) -> Result<PgPool, NodeError> {
        match connection_string {
            Some(url) => PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
                .map_err(|err| NodeError::execution(format!("could not connect: {err}"))),
            None => self
                .default_pool
                .clone()
                .ok_or_else(|| NodeError::validation("no database configured")),
        }
    }
}

fn bind_query<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(sqlx::types::Json(other.clone())),
    }
}

fn bind_scalar<'q>(
    query: QueryScalar<'q, Postgres, Value, PgArguments>,
    param: &'q Value,
) -> QueryScalar<'q, Postgres, Value, PgArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(sqlx::types::Json(other.clone())),
    }
}

fn is_row_returning(sql: &str) -> bool {
    let head = sql.trim_start().to_lowercase();
    head.starts_with("select") || head.starts_with("with") || head.starts_with("values")
}

#[async_trait]
impl NodeHandler for DatabaseQueryNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new(
            "nodes.database.query",
            SemVer::V1,
            "Run parameterized SQL",
        )
        .with_params(vec![
            ParamSpec::optional("connectionString", ParamType::String)
                .with_description("Overrides the default database"),
            ParamSpec::required("query", ParamType::String),
            ParamSpec::optional("params", ParamType::Array),
        ])
    }

    async fn execute(&self, params: Value, _meta: DispatchMeta) -> Result<Value, NodeError> {
        let sql = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("query is required"))?;
        let empty = Vec::new();
        let bind_values = params
            .get("params")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let pool = self
            .pool_for(params.get("connectionString").and_then(Value::as_str))
            .await?;

        if is_row_returning(sql) {
            let wrapped = format!(
                "SELECT COALESCE(json_agg(row_to_json(reflux_q)), '[]'::json) FROM ({sql}) reflux_q"
            );
            let mut scalar = sqlx::query_scalar::<_, Value>(&wrapped);
            for param in bind_values {
                scalar = bind_scalar(scalar, param);
            }
            let rows: Value = scalar
                .fetch_one(&pool)
                .await
                .map_err(|err| NodeError::execution(format!("query failed: {err}")))?;

            let count = rows.as_array().map(Vec::len).unwrap_or(0);
            let fields: Vec<String> = rows
                .as_array()
                .and_then(|a| a.first())
                .and_then(Value::as_object)
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default();
            Ok(json!({ "rows": rows, "rowCount": count, "fields": fields }))
        } else {
            let mut query = sqlx::query(sql);
            for param in bind_values {
                query = bind_query(query, param);
            }
            let result = query
                .execute(&pool)
                .await
                .map_err(|err| NodeError::execution(format!("statement failed: {err}")))?;
            Ok(json!({
                "rows": [],
                "rowCount": result.rows_affected(),
                "fields": [],
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn detects_row_returning_statements() {
        assert!(is_row_returning("SELECT 1"));
        assert!(is_row_returning("  with x as (select 1) select * from x"));
        assert!(is_row_returning("VALUES (1)"));
        assert!(!is_row_returning("INSERT INTO t VALUES (1)"));
        assert!(!is_row_returning("DELETE FROM t"));
    }

    #[tokio::test]
    async fn missing_query_is_rejected() {
        let node = DatabaseQueryNode::new(None);
        let err = node
            .execute(json!({}), DispatchMeta::new(Uuid::now_v7(), "db"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }

    #[tokio::test]
    async fn unconfigured_database_is_rejected() {
        let node = DatabaseQueryNode::new(None);
        let err = node
            .execute(
                json!({ "query": "SELECT 1" }),
                DispatchMeta::new(Uuid::now_v7(), "db"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }
}
