//! Data source adapters.
//!
//! A data source exposes a fixed set of allow-listed tables. Every query goes
//! through the [`QueryGuard`](crate::guard::QueryGuard) before it reaches the
//! backend, and results are capped at the configured row limit.

pub mod csv;
pub mod mysql;

pub use self::csv::{CsvOptions, CsvSource};
pub use self::mysql::MySqlSource;

use crate::dataset::{DatasetSchema, QueryResult};
use crate::error::Result;

/// Rows returned when no limit is configured
pub const DEFAULT_ROW_LIMIT: usize = 1000;

/// A queryable, allow-listed tabular dataset
#[allow(async_fn_in_trait)]
pub trait DataSource {
    /// Backend name for logs and banners ("mysql", "csv")
    fn name(&self) -> &str;

    /// Schema discovered when the source was opened
    fn schema(&self) -> &DatasetSchema;

    /// Validate and run a read-only query
    async fn execute(&self, query: &str) -> Result<QueryResult>;

    /// First `n` rows of an allow-listed table
    async fn sample_rows(&self, table: &str, n: usize) -> Result<QueryResult> {
        self.execute(&format!("SELECT * FROM `{}` LIMIT {}", table.replace('`', ""), n))
            .await
    }
}

/// Mark a result as truncated when the backend returned more than `limit` rows
pub(crate) fn apply_row_limit(mut result: QueryResult, limit: usize) -> QueryResult {
    if result.rows.len() > limit {
        result.rows.truncate(limit);
        result.truncated = true;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_row_limit() {
        let result = QueryResult::new(
            vec!["n".into()],
            vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]],
        );
        let limited = apply_row_limit(result.clone(), 2);
        assert_eq!(limited.len(), 2);
        assert!(limited.truncated);

        let untouched = apply_row_limit(result, 3);
        assert!(!untouched.truncated);
    }
}
