//! MySQL-backed data source

use super::{apply_row_limit, DataSource};
use crate::config::DatabaseConfig;
use crate::dataset::{Column, DatasetSchema, QueryResult, TableSchema};
use crate::error::{from_sqlx, Error, Result};
use crate::guard::QueryGuard;
use futures_util::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as _, Executor, Row, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::{debug, info};

/// One connection for the process lifetime, read-only queries only.
pub struct MySqlSource {
    pool: MySqlPool,
    guard: QueryGuard,
    row_limit: usize,
    database: String,
}

impl MySqlSource {
    /// Connect and discover the schema of every allow-listed table.
    pub async fn connect(config: &DatabaseConfig, row_limit: usize) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                from_sqlx(e)
                    .with_operation("mysql::connect")
                    .with_context("host", format!("{}:{}", config.host, config.port))
                    .with_context("database", config.database.clone())
            })?;

        info!(host = %config.host, database = %config.database, "connected to MySQL");

        let mut tables = Vec::with_capacity(config.tables.len());
        for name in &config.tables {
            tables.push(discover_table(&pool, name).await?);
        }

        Ok(Self {
            pool,
            guard: QueryGuard::new(DatasetSchema::new(tables)),
            row_limit,
            database: config.database.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Connectivity check: `SELECT 1`
    pub async fn ping(&self) -> Result<QueryResult> {
        self.execute("SELECT 1").await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn discover_table(pool: &MySqlPool, name: &str) -> Result<TableSchema> {
    let columns: Vec<(String, String)> = sqlx::query_as(
        "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR) \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
         ORDER BY ORDINAL_POSITION",
    )
    .bind(name)
    .fetch_all(pool)
    .await
    .map_err(|e| from_sqlx(e).with_operation("mysql::discover_table"))?;

    if columns.is_empty() {
        return Err(Error::config_invalid(
            "WAVEQ_TABLES",
            format!("table '{}' does not exist in the database", name),
        ));
    }

    let row_count: Option<i64> = sqlx::query_scalar(
        "SELECT CAST(TABLE_ROWS AS SIGNED) FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|e| from_sqlx(e).with_operation("mysql::discover_table"))?
    .flatten();

    debug!(table = name, columns = columns.len(), ?row_count, "discovered table");

    let table = TableSchema::new(
        name,
        columns.into_iter().map(|(n, t)| Column::new(n, t)).collect(),
    );
    Ok(match row_count {
        Some(rows) if rows >= 0 => table.with_row_count(rows as u64),
        _ => table,
    })
}

impl DataSource for MySqlSource {
    fn name(&self) -> &str {
        "mysql"
    }

    fn schema(&self) -> &DatasetSchema {
        self.guard.schema()
    }

    async fn execute(&self, query: &str) -> Result<QueryResult> {
        let sql = self.guard.check(query)?;
        debug!(%sql, "executing query");

        let mut stream = sqlx::query(&sql).persistent(false).fetch(&self.pool);
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        while let Some(row) = stream
            .try_next()
            .await
            .map_err(|e| from_sqlx(e).with_operation("mysql::execute"))?
        {
            if columns.is_none() {
                columns = Some(row.columns().iter().map(|c| c.name().to_string()).collect());
            }
            rows.push(decode_row(&row)?);
            if rows.len() > self.row_limit {
                break;
            }
        }
        drop(stream);

        let columns = match columns {
            Some(columns) => columns,
            // no rows came back; ask the server for the column list
            None => (&self.pool)
                .describe(&sql)
                .await
                .map_err(|e| from_sqlx(e).with_operation("mysql::describe"))?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
        };

        Ok(apply_row_limit(QueryResult::new(columns, rows), self.row_limit))
    }
}

fn decode_row(row: &MySqlRow) -> Result<Vec<Value>> {
    let mut cells = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i).map_err(from_sqlx)?;
        if raw.is_null() {
            cells.push(Value::Null);
            continue;
        }
        let type_name = column.type_info().name().to_uppercase();
        cells.push(decode_cell(row, i, &type_name).map_err(|e| {
            from_sqlx(e)
                .with_operation("mysql::decode")
                .with_context("column", column.name().to_string())
                .with_context("type", type_name.clone())
        })?);
    }
    Ok(cells)
}

fn decode_cell(row: &MySqlRow, i: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(i)?),
        t if t.ends_with("UNSIGNED") => Value::from(row.try_get_unchecked::<u64, _>(i)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::from(row.try_get_unchecked::<i64, _>(i)?)
        }
        "FLOAT" | "DOUBLE" => serde_json::json!(row.try_get_unchecked::<f64, _>(i)?),
        "DECIMAL" => {
            let text = row.try_get_unchecked::<String, _>(i)?;
            match text.parse::<f64>() {
                Ok(n) => serde_json::json!(n),
                Err(_) => Value::String(text),
            }
        }
        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(i)?.to_string()),
        "TIME" => Value::String(row.try_get::<chrono::NaiveTime, _>(i)?.to_string()),
        "DATETIME" | "TIMESTAMP" => {
            Value::String(row.try_get::<chrono::NaiveDateTime, _>(i)?.to_string())
        }
        "JSON" => row.try_get::<Value, _>(i)?,
        _ => match row.try_get_unchecked::<String, _>(i) {
            Ok(text) => Value::String(text),
            Err(_) => Value::String(String::from_utf8_lossy(&row.try_get_unchecked::<Vec<u8>, _>(i)?).into_owned()),
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Needs a MySQL server with the `waveforms` table; run with `--ignored`
    /// after exporting the MYSQL_* variables.
    #[tokio::test]
    #[ignore]
    async fn test_live_ping_and_average() {
        let config = DatabaseConfig::from_lookup(|k| std::env::var(k).ok()).unwrap();
        let source = MySqlSource::connect(&config, 10).await.unwrap();

        let ping = source.ping().await.unwrap();
        assert_eq!(ping.rows, vec![vec![Value::from(1)]]);

        let avg = source.execute("SELECT AVG(RPM) FROM waveforms").await.unwrap();
        assert_eq!(avg.columns.len(), 1);
        assert!(avg.rows[0][0].is_number());
    }
}
