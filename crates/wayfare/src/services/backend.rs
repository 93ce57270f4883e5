//! Opaque backend access for the domain services

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use wayfare_core::{ApiError, Result};

/// A result row, column name to value
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// A read against one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    /// Column to sort by, descending
    pub order_by: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    fn filter(mut self, column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Runs queries against the hosted backend
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    async fn execute(&self, query: Query) -> Result<Vec<Row>>;
}

#[async_trait]
impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    async fn execute(&self, query: Query) -> Result<Vec<Row>> {
        (**self).execute(query).await
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let Some(value) = row.get(&filter.column) else {
        return false;
    };
    match (filter.op, compare(value, &filter.value)) {
        (FilterOp::Eq, Some(ordering)) => ordering == Ordering::Equal,
        (FilterOp::Gte, Some(ordering)) => ordering != Ordering::Less,
        (FilterOp::Lte, Some(ordering)) => ordering != Ordering::Greater,
        (_, None) => false,
    }
}

/// Tables held in memory, for demos and tests
///
/// Cloning creates a new handle to the SAME tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutor {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
    failure: Arc<RwLock<Option<ApiError>>>,
    calls: Arc<AtomicU64>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to a table; each value must serialize to a JSON object
    pub fn insert<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<()> {
        let mut converted = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::to_value(row) {
                Ok(Value::Object(map)) => converted.push(map),
                Ok(_) => return Err(ApiError::invalid_response("row is not an object")),
                Err(e) => return Err(ApiError::invalid_response(e.to_string())),
            }
        }
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(converted);
        Ok(())
    }

    /// Make every query fail with `err` until cleared
    pub fn fail_with(&self, err: Option<ApiError>) {
        *self.failure.write() = err;
    }

    /// Queries executed so far
    pub fn calls(&self) -> u64 {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    async fn execute(&self, query: Query) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(err) = self.failure.read().clone() {
            return Err(err);
        }

        let tables = self.tables.read();
        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(column) = &query.order_by {
            rows.sort_by(|a, b| match (a.get(column), b.get(column)) {
                (Some(x), Some(y)) => compare(y, x).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

/// Text column; numbers are rendered as text
pub fn row_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric column; numeric strings are parsed
pub fn row_f64(row: &Row, column: &str) -> Option<f64> {
    match row.get(column)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn row_bool(row: &Row, column: &str) -> Option<bool> {
    row.get(column)?.as_bool()
}

/// Required text column
pub fn require_str(row: &Row, column: &str) -> Result<String> {
    row_str(row, column)
        .ok_or_else(|| ApiError::invalid_response(format!("row is missing `{column}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> InMemoryExecutor {
        let executor = InMemoryExecutor::new();
        executor
            .insert(
                "pois",
                &[
                    json!({"id": 1, "name": "Museu Picasso", "category": "museum", "rating": 4.6}),
                    json!({"id": 2, "name": "MACBA", "category": "museum", "rating": 4.1}),
                    json!({"id": 3, "name": "Boqueria", "category": "market", "rating": 4.4}),
                ],
            )
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_filters_order_and_limit() {
        let executor = executor();
        let rows = executor
            .execute(
                Query::table("pois")
                    .eq("category", "museum")
                    .gte("rating", 4.0)
                    .order_by_desc("rating")
                    .limit(5),
            )
            .await
            .unwrap();
        let names: Vec<String> = rows.iter().filter_map(|r| row_str(r, "name")).collect();
        assert_eq!(names, vec!["Museu Picasso", "MACBA"]);

        let top = executor
            .execute(Query::table("pois").order_by_desc("rating").limit(1))
            .await
            .unwrap();
        assert_eq!(row_str(&top[0], "id").as_deref(), Some("1"));
        assert_eq!(executor.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        assert!(executor().execute(Query::table("events")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let executor = executor();
        executor.fail_with(Some(ApiError::from_backend_code("08006", "connection failure")));
        let err = executor.execute(Query::table("pois")).await.unwrap_err();
        assert!(err.is_retryable());

        executor.fail_with(None);
        assert_eq!(executor.execute(Query::table("pois")).await.unwrap().len(), 3);
    }

    #[test]
    fn test_row_helpers() {
        let row = json!({"id": 7, "lat": "41.38", "free": true});
        let row = row.as_object().unwrap();
        assert_eq!(require_str(row, "id").unwrap(), "7");
        assert_eq!(row_f64(row, "lat"), Some(41.38));
        assert_eq!(row_bool(row, "free"), Some(true));
        assert!(require_str(row, "name").is_err());
    }
}
