//! CSV file loaded into an in-memory SQLite table

use super::{apply_row_limit, DataSource};
use crate::dataset::{Column, DatasetSchema, QueryResult, TableSchema};
use crate::error::{from_sqlite, Error, Result};
use crate::guard::QueryGuard;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// How to read the file
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Numbers use `,` as the decimal separator (`0,013`)
    pub decimal_comma: bool,
    /// Columns dropped before loading (matched case-insensitively)
    pub drop_columns: Vec<String>,
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            decimal_comma: true,
            drop_columns: vec!["Load_kW".to_string()],
            delimiter: b',',
        }
    }
}

impl CsvOptions {
    pub fn plain() -> Self {
        Self {
            decimal_comma: false,
            drop_columns: Vec::new(),
            delimiter: b',',
        }
    }

    pub fn with_decimal_comma(mut self, on: bool) -> Self {
        self.decimal_comma = on;
        self
    }

    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    fn as_sql(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
        }
    }
}

#[derive(Debug)]
pub struct CsvSource {
    conn: Mutex<Connection>,
    guard: QueryGuard,
    row_limit: usize,
}

impl CsvSource {
    /// Parse `path` and load it into a table named after the file stem.
    pub fn load(path: impl AsRef<Path>, options: &CsvOptions, row_limit: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::file_not_found(path.display().to_string()));
        }

        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .trim(::csv::Trim::All)
            .from_path(path)
            .map_err(|e| csv_error(e, path))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(e, path))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if headers.is_empty() {
            return Err(Error::parse_failed("CSV file has no header row")
                .with_context("path", path.display().to_string()));
        }

        let keep: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !options.drop_columns.iter().any(|d| d.eq_ignore_ascii_case(h)))
            .map(|(i, _)| i)
            .collect();
        let names: Vec<String> = keep.iter().map(|&i| headers[i].clone()).collect();

        let mut records: Vec<Vec<Option<String>>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(e, path))?;
            records.push(
                keep.iter()
                    .map(|&i| {
                        record
                            .get(i)
                            .filter(|s| !s.is_empty())
                            .map(|s| normalize_number(s, options.decimal_comma))
                    })
                    .collect(),
            );
        }

        let affinities: Vec<Affinity> = (0..names.len())
            .map(|c| infer_affinity(records.iter().filter_map(|r| r[c].as_deref())))
            .collect();

        let table = table_name(path);
        let conn = Connection::open_in_memory().map_err(from_sqlite)?;
        create_and_fill(&conn, &table, &names, &affinities, &records)?;

        info!(table = %table, rows = records.len(), columns = names.len(), "loaded CSV");

        let schema = TableSchema::new(
            table,
            names
                .iter()
                .zip(&affinities)
                .map(|(n, a)| Column::new(n.clone(), a.as_sql()))
                .collect(),
        )
        .with_row_count(records.len() as u64);

        Ok(Self {
            conn: Mutex::new(conn),
            guard: QueryGuard::new(DatasetSchema::new(vec![schema])),
            row_limit,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.guard.schema().tables()[0].name
    }

    fn run(&self, sql: &str) -> Result<QueryResult> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::unexpected("SQLite connection lock poisoned"))?;
        let mut stmt = conn.prepare(sql).map_err(from_sqlite)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(from_sqlite)?;
        while let Some(row) = cursor.next().map_err(from_sqlite)? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(sqlite_value(row.get_ref(i).map_err(from_sqlite)?));
            }
            rows.push(cells);
            if rows.len() > self.row_limit {
                break;
            }
        }

        Ok(apply_row_limit(QueryResult::new(columns, rows), self.row_limit))
    }
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn schema(&self) -> &DatasetSchema {
        self.guard.schema()
    }

    async fn execute(&self, query: &str) -> Result<QueryResult> {
        let sql = self.guard.check(query)?;
        debug!(%sql, "executing query");
        self.run(&sql).map_err(|e| e.with_operation("csv::execute"))
    }
}

fn create_and_fill(
    conn: &Connection,
    table: &str,
    names: &[String],
    affinities: &[Affinity],
    records: &[Vec<Option<String>>],
) -> Result<()> {
    let defs: Vec<String> = names
        .iter()
        .zip(affinities)
        .map(|(n, a)| format!("{} {}", quote_ident(n), a.as_sql()))
        .collect();
    conn.execute_batch(&format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", ")))
        .map_err(from_sqlite)?;

    let placeholders = vec!["?"; names.len()].join(", ");
    let insert = format!("INSERT INTO {} VALUES ({})", quote_ident(table), placeholders);

    conn.execute_batch("BEGIN").map_err(from_sqlite)?;
    {
        let mut stmt = conn.prepare(&insert).map_err(from_sqlite)?;
        for record in records {
            let values = record.iter().zip(affinities).map(|(cell, a)| to_sql(cell.as_deref(), *a));
            stmt.execute(params_from_iter(values)).map_err(from_sqlite)?;
        }
    }
    conn.execute_batch("COMMIT").map_err(from_sqlite)?;
    Ok(())
}

fn to_sql(cell: Option<&str>, affinity: Affinity) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match (cell, affinity) {
        (None, _) => Sql::Null,
        (Some(s), Affinity::Integer) => s.parse().map(Sql::Integer).unwrap_or_else(|_| Sql::Text(s.to_string())),
        (Some(s), Affinity::Real) => s.parse().map(Sql::Real).unwrap_or_else(|_| Sql::Text(s.to_string())),
        (Some(s), Affinity::Text) => Sql::Text(s.to_string()),
    }
}

fn infer_affinity<'a>(values: impl Iterator<Item = &'a str>) -> Affinity {
    let mut affinity = None;
    for value in values {
        let this = if value.parse::<i64>().is_ok() {
            Affinity::Integer
        } else if value.parse::<f64>().is_ok() {
            Affinity::Real
        } else {
            return Affinity::Text;
        };
        affinity = Some(match (affinity, this) {
            (Some(Affinity::Real), _) | (_, Affinity::Real) => Affinity::Real,
            _ => Affinity::Integer,
        });
    }
    affinity.unwrap_or(Affinity::Text)
}

/// `1.234,5` stays text; `0,013` becomes `0.013`
fn normalize_number(raw: &str, decimal_comma: bool) -> String {
    if decimal_comma && raw.matches(',').count() == 1 && !raw.contains('.') {
        let candidate = raw.replace(',', ".");
        if candidate.parse::<f64>().is_ok() {
            return candidate;
        }
    }
    raw.to_string()
}

fn sqlite_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

fn table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        name = "data".to_string();
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "t_");
    }
    name
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn csv_error(err: ::csv::Error, path: &Path) -> Error {
    Error::parse_failed(format!("cannot read CSV: {}", err))
        .with_operation("csv::load")
        .with_context("path", path.display().to_string())
        .set_source(err)
}
