//! Dataset schema and query results.
//!
//! The schema is discovered once when a data source is opened and stays fixed
//! for the life of the process. Query results are plain owned values: rows of
//! JSON cells aligned positionally with the result's column list.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// A column as declared by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Backend type name, e.g. `double`, `varchar`, `INTEGER`
    pub declared_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// One allow-listed table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    /// Row count as reported by the backend (may be an estimate)
    pub row_count: Option<u64>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            row_count: None,
        }
    }

    pub fn with_row_count(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `CREATE TABLE`-style description used in prompts
    pub fn describe(&self) -> String {
        let mut out = format!("CREATE TABLE `{}` (\n", self.name);
        for (i, col) in self.columns.iter().enumerate() {
            let sep = if i + 1 < self.columns.len() { "," } else { "" };
            let _ = writeln!(out, "\t`{}` {}{}", col.name, col.declared_type.to_uppercase(), sep);
        }
        out.push(')');
        if let Some(rows) = self.row_count {
            let _ = write!(out, "\n/* approximately {} rows */", rows);
        }
        out
    }
}

/// The set of tables a data source exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    tables: Vec<TableSchema>,
}

impl DatasetSchema {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Case-insensitive lookup, as MySQL table names are on most installs
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Column names are case-insensitive in both MySQL and SQLite
    pub fn has_column(&self, name: &str) -> bool {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Describe the named tables; unknown names are an error
    pub fn describe_tables(&self, names: &[&str]) -> Result<String> {
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let table = self.table(name).ok_or_else(|| {
                Error::query_rejected(format!(
                    "table '{}' is not available; known tables: {}",
                    name,
                    self.table_names().join(", ")
                ))
                .with_context("table", name.to_string())
            })?;
            parts.push(table.describe());
        }
        Ok(parts.join("\n\n"))
    }
}

/// Rows returned by a data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Set when the row limit cut the result short
    pub truncated: bool,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a Python list of tuples, the shape the agent is told to expect
    pub fn render(&self) -> String {
        let mut out = String::from("[");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push('(');
            for (j, cell) in row.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                out.push_str(&python_literal(cell));
            }
            if row.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        out.push(']');
        out
    }

    /// JSON value injected into the sandbox as `data`
    pub fn to_binding(&self) -> Value {
        Value::Array(self.rows.iter().map(|r| Value::Array(r.clone())).collect())
    }

    /// Rebuild a result from a `data` binding, checking arity against `columns`
    #[cfg(test)]
    pub(crate) fn from_binding(columns: Vec<String>, data: &Value) -> Result<Self> {
        let rows = data
            .as_array()
            .ok_or_else(|| Error::parse_failed("binding is not a list of rows"))?;
        let mut out = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let cells = row
                .as_array()
                .ok_or_else(|| Error::parse_failed(format!("row {} is not a tuple", i)))?;
            if cells.len() != columns.len() {
                return Err(Error::parse_failed(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    cells.len(),
                    columns.len()
                )));
            }
            out.push(cells.clone());
        }
        Ok(Self::new(columns, out))
    }
}

fn python_literal(cell: &Value) -> String {
    match cell {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn waveforms() -> TableSchema {
        TableSchema::new(
            "waveforms",
            vec![
                Column::new("X-Axis", "double"),
                Column::new("Ch1 Y-Axis", "double"),
                Column::new("Sample_id", "int"),
                Column::new("Condition", "varchar"),
                Column::new("RPM", "double"),
            ],
        )
        .with_row_count(40_000_000)
    }

    #[test]
    fn test_describe_quotes_columns_with_spaces() {
        let text = waveforms().describe();
        assert!(text.starts_with("CREATE TABLE `waveforms` ("));
        assert!(text.contains("`Ch1 Y-Axis` DOUBLE,"));
        assert!(text.contains("`RPM` DOUBLE\n)"));
        assert!(text.contains("approximately 40000000 rows"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = DatasetSchema::new(vec![waveforms()]);
        assert!(schema.has_table("WAVEFORMS"));
        assert!(schema.has_column("rpm"));
        assert!(!schema.has_column("Load_kW"));
    }

    #[test]
    fn test_describe_unknown_table_is_rejected() {
        let schema = DatasetSchema::new(vec![waveforms()]);
        let err = schema.describe_tables(&["users"]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::QueryRejected);
    }

    #[test]
    fn test_render_as_list_of_tuples() {
        let result = QueryResult::new(
            vec!["Condition".into(), "avg".into()],
            vec![
                vec![json!("HEALTHY"), json!(1780.5)],
                vec![json!("INNER_RACEWAY"), Value::Null],
            ],
        );
        assert_eq!(result.render(), "[('HEALTHY', 1780.5), ('INNER_RACEWAY', None)]");

        let single = QueryResult::new(vec!["n".into()], vec![vec![json!(3)]]);
        assert_eq!(single.render(), "[(3,)]");
    }

    #[test]
    fn test_binding_reproduces_rows_in_order() {
        let columns: Vec<String> = waveforms().column_names().iter().map(|s| s.to_string()).collect();
        let result = QueryResult::new(
            columns.clone(),
            vec![
                vec![json!(0.0), json!(0.013), json!(1), json!("HEALTHY"), json!(1780)],
                vec![json!(0.0002), json!(-0.021), json!(1), json!("HEALTHY"), json!(1780)],
                vec![json!(0.0004), json!(0.5), json!(2), json!("OUTER_RACEWAY"), json!(1500)],
            ],
        );

        let rebuilt = QueryResult::from_binding(columns, &result.to_binding()).unwrap();
        assert_eq!(rebuilt, result);
    }

    #[test]
    fn test_from_binding_checks_arity() {
        let err = QueryResult::from_binding(vec!["a".into(), "b".into()], &json!([[1]])).unwrap_err();
        assert!(err.message().contains("expected 2"));
    }
}
