//! Validation applied to agent-produced SQL and Python before execution.
//!
//! The agent is driven by free user text, so nothing it emits reaches MySQL,
//! SQLite or the Python interpreter without passing through here first.

use crate::dataset::DatasetSchema;
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::debug;

/// Statements that may start a query
const READ_ONLY_STARTS: &[&str] = &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN"];

/// Keywords that never appear in a read-only query
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "RENAME", "LOAD", "OUTFILE", "DUMPFILE", "CALL", "HANDLER", "LOCK", "UNLOCK", "SET",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "LOAD_FILE", "SLEEP", "BENCHMARK",
    "LOAD_EXTENSION", "READFILE", "WRITEFILE",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Unquoted identifier or keyword
    Word(String),
    /// Backtick-quoted identifier
    Quoted(String),
    /// String or numeric literal
    Literal,
    Symbol(char),
}

impl Token {
    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    fn identifier(&self) -> Option<&str> {
        match self {
            Token::Word(w) | Token::Quoted(w) => Some(w),
            _ => None,
        }
    }
}

fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '#' || (c == '-' && chars.get(i + 1) == Some(&'-')) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            if i >= chars.len() {
                return Err(Error::query_rejected("unterminated comment"));
            }
            i += 2;
        } else if c == '\'' || c == '"' || c == '`' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(Error::query_rejected(format!("unterminated {} quote", quote)))
                    }
                    Some('\\') if quote != '`' => {
                        i += 2;
                    }
                    Some(&ch) if ch == quote => {
                        // doubled quote is an escaped quote
                        if chars.get(i + 1) == Some(&quote) {
                            text.push(quote);
                            i += 2;
                        } else {
                            i += 1;
                            break;
                        }
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(if quote == '`' { Token::Quoted(text) } else { Token::Literal });
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Literal);
        } else if c.is_alphanumeric() || c == '_' || c == '@' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Symbol(c));
            i += 1;
        }
    }

    Ok(tokens)
}

/// Read-only, allow-list-aware SQL validation.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    schema: DatasetSchema,
}

impl QueryGuard {
    pub fn new(schema: DatasetSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    /// Validate `sql` and return it with trailing semicolons removed.
    ///
    /// Unquoted identifiers are left for the backend to resolve; an unknown
    /// column there comes back as a `QueryFailed` from the adapter.
    pub fn check(&self, sql: &str) -> Result<String> {
        let trimmed = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if trimmed.is_empty() {
            return Err(Error::query_rejected("empty query"));
        }

        let tokens = tokenize(trimmed)?;

        if tokens.iter().any(|t| *t == Token::Symbol(';')) {
            return Err(Error::query_rejected("only one statement per query is allowed"));
        }

        let first = match tokens.first() {
            Some(Token::Word(w)) => w.to_uppercase(),
            _ => return Err(Error::query_rejected("query must start with a statement keyword")),
        };
        if !READ_ONLY_STARTS.contains(&first.as_str()) {
            return Err(Error::query_rejected(format!(
                "only read-only queries are allowed, got {}",
                first
            )));
        }

        if let Some(kw) = tokens.iter().find_map(|t| match t {
            Token::Word(w) if FORBIDDEN_KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) => Some(w),
            _ => None,
        }) {
            return Err(Error::query_rejected(format!("keyword {} is not allowed", kw.to_uppercase()))
                .with_context("keyword", kw.to_uppercase()));
        }

        if first == "SHOW" {
            self.check_show(&tokens)?;
        }

        let ctes = cte_names(&tokens);
        let aliases = alias_names(&tokens);

        for table in table_references(&tokens, &first)? {
            if !ctes.contains(&table.to_lowercase()) && !self.schema.has_table(&table) {
                return Err(Error::query_rejected(format!(
                    "table '{}' is not allow-listed; available: {}",
                    table,
                    self.schema.table_names().join(", ")
                ))
                .with_context("table", table));
            }
        }

        for token in &tokens {
            if let Token::Quoted(name) = token {
                let known = self.schema.has_table(name)
                    || self.schema.has_column(name)
                    || ctes.contains(&name.to_lowercase())
                    || aliases.contains(&name.to_lowercase());
                if !known {
                    return Err(Error::query_rejected(format!(
                        "unknown identifier `{}`; check the table schema",
                        name
                    ))
                    .with_context("identifier", name.clone()));
                }
            }
        }

        debug!(sql = %trimmed, "query passed guard");
        Ok(trimmed.to_string())
    }

    fn check_show(&self, tokens: &[Token]) -> Result<()> {
        let allowed = match tokens.get(1) {
            Some(t) if t.is_keyword("COLUMNS") || t.is_keyword("FIELDS") => true,
            Some(t) if t.is_keyword("CREATE") => false,
            Some(t) if t.is_keyword("FULL") => tokens.get(2).map_or(false, |t| t.is_keyword("COLUMNS")),
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::query_rejected(
                "only SHOW COLUMNS FROM <table> is allowed; use sql_db_list_tables to list tables",
            ))
        }
    }
}

/// Names declared as `name AS (` in a WITH clause
fn cte_names(tokens: &[Token]) -> HashSet<String> {
    tokens
        .windows(3)
        .filter(|w| w[1].is_keyword("AS") && w[2] == Token::Symbol('('))
        .filter_map(|w| w[0].identifier().map(str::to_lowercase))
        .collect()
}

/// Names introduced by `AS name`
fn alias_names(tokens: &[Token]) -> HashSet<String> {
    tokens
        .windows(2)
        .filter(|w| w[0].is_keyword("AS"))
        .filter_map(|w| w[1].identifier().map(str::to_lowercase))
        .collect()
}

/// Tables named after FROM / JOIN (and after DESCRIBE)
fn table_references(tokens: &[Token], first: &str) -> Result<Vec<String>> {
    let mut tables = Vec::new();
    let mut i = 0;

    if first == "DESCRIBE" || first == "DESC" {
        i = 1;
        if let Some(name) = read_table(tokens, &mut i)? {
            tables.push(name);
        }
    }

    while i < tokens.len() {
        let introduces = tokens[i].is_keyword("FROM")
            || tokens[i].is_keyword("JOIN")
            || tokens[i].is_keyword("STRAIGHT_JOIN");
        i += 1;
        if !introduces {
            continue;
        }
        loop {
            match read_table(tokens, &mut i)? {
                Some(name) => tables.push(name),
                None => break,
            }
            // optional alias, then a comma continues the FROM list
            if let Some(Token::Word(w)) = tokens.get(i) {
                if w.eq_ignore_ascii_case("AS") {
                    i += 2;
                } else if !is_clause_keyword(w) {
                    i += 1;
                }
            } else if let Some(Token::Quoted(_)) = tokens.get(i) {
                i += 1;
            }
            if tokens.get(i) == Some(&Token::Symbol(',')) {
                i += 1;
            } else {
                break;
            }
        }
    }

    Ok(tables)
}

/// Read one table reference at `i`, unwrapping `(name)` and `((name))`.
///
/// Returns `None` for a derived table (`(SELECT ...)`) or an expression;
/// the tables inside a derived table are picked up by the outer scan.
fn read_table(tokens: &[Token], i: &mut usize) -> Result<Option<String>> {
    let mut depth = 0;
    while tokens.get(*i + depth) == Some(&Token::Symbol('(')) {
        depth += 1;
    }
    let at = *i + depth;
    if depth > 0 {
        if let Some(t) = tokens.get(at) {
            if t.is_keyword("SELECT") || t.is_keyword("WITH") {
                return Ok(None);
            }
        }
    }

    let name = match tokens.get(at).and_then(Token::identifier) {
        Some(name) => name.to_string(),
        None if depth > 0 => return Err(parenthesized_reference()),
        None => return Ok(None),
    };
    if tokens.get(at + 1) == Some(&Token::Symbol('.')) {
        return Err(Error::query_rejected(format!(
            "qualified table names are not allowed ('{}.…')",
            name
        )));
    }
    for k in 0..depth {
        if tokens.get(at + 1 + k) != Some(&Token::Symbol(')')) {
            return Err(parenthesized_reference());
        }
    }
    *i = at + 1 + depth;
    Ok(Some(name))
}

fn parenthesized_reference() -> Error {
    Error::query_rejected("parenthesized table references must name a single table")
}

fn is_clause_keyword(word: &str) -> bool {
    const CLAUSES: &[&str] = &[
        "WHERE", "GROUP", "ORDER", "LIMIT", "HAVING", "JOIN", "INNER", "LEFT", "RIGHT", "CROSS",
        "NATURAL", "OUTER", "ON", "USING", "UNION", "WINDOW", "FOR", "OFFSET", "EXCEPT",
        "INTERSECT", "STRAIGHT_JOIN",
    ];
    CLAUSES.iter().any(|c| word.eq_ignore_ascii_case(c))
}

/// Facilities a plotting fragment has no business touching
const FORBIDDEN_CODE: &[&str] = &[
    "subprocess", "os.system", "os.popen", "os.remove", "os.unlink", "os.rmdir", "os.rename",
    "os.replace", "os.kill", "os.truncate", "os.exec", "os.spawn", "os.fork", "shutil", "socket",
    "importlib", "builtins", "__import__", "exec(", "eval(", "plt.show(", "write_text(",
    "write_bytes(",
];

/// `os` functions that must not be imported by name
const FORBIDDEN_OS_NAMES: &[&str] = &[
    "system", "popen", "remove", "removedirs", "unlink", "rmdir", "rename", "renames", "replace",
    "kill", "killpg", "truncate", "fork", "forkpty", "startfile",
];

/// Static checks on Python fragments before they reach the sandbox.
///
/// Matching runs on the fragment with whitespace before `(` removed, so
/// `exec (...)` is caught the same as `exec(...)`.
#[derive(Debug, Clone)]
pub struct CodeGuard {
    artifact_name: String,
}

impl CodeGuard {
    /// `artifact_name` is the only file a fragment may save a figure to
    pub fn new(artifact_name: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
        }
    }

    /// The exact string a fragment must pass to `savefig`
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Whether the fragment calls `savefig`
    pub fn saves_figure(&self, code: &str) -> bool {
        normalize_calls(code).contains("savefig(")
    }

    pub fn check(&self, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(Error::sandbox_rejected("empty code fragment"));
        }

        let code = normalize_calls(code);

        if let Some(pattern) = FORBIDDEN_CODE.iter().find(|p| code.contains(*p)) {
            return Err(Error::sandbox_rejected(format!("'{}' is not allowed in the sandbox", pattern))
                .with_context("pattern", pattern.to_string()));
        }

        check_os_imports(&code)?;

        for (pos, _) in code.match_indices("savefig(") {
            let args = call_arguments(&code[pos + "savefig(".len()..]);
            let target = args
                .first()
                .and_then(|a| string_literal(keyword_value(a, "fname").unwrap_or(a.as_str())));
            if target.as_deref() != Some(self.artifact_name.as_str()) {
                return Err(Error::sandbox_rejected(format!(
                    "figures must be saved with savefig(\"{}\")",
                    self.artifact_name
                ))
                .with_context("target", target.unwrap_or_default()));
            }
        }

        for (pos, _) in code.match_indices("open(") {
            let before = code[..pos].chars().next_back();
            if before.map_or(false, |c| c.is_alphanumeric() || c == '_') {
                continue;
            }
            let method = before == Some('.');
            let args = call_arguments(&code[pos + "open(".len()..]);
            if opens_for_writing(&args, method) {
                let target = args.first().and_then(|a| string_literal(a));
                if target.as_deref() != Some(self.artifact_name.as_str()) {
                    return Err(Error::sandbox_rejected(
                        "files may not be opened for writing in the sandbox",
                    )
                    .with_context("target", target.unwrap_or_default()));
                }
            }
        }

        Ok(())
    }
}

/// Drop whitespace that sits between a name and its `(`
fn normalize_calls(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for c in code.chars() {
        if c == '(' {
            let kept = out.trim_end_matches([' ', '\t']).len();
            out.truncate(kept);
        }
        out.push(c);
    }
    out
}

/// Reject `from os import system` and `import os as o`
fn check_os_imports(code: &str) -> Result<()> {
    for stmt in statements(code) {
        let stmt = stmt.replace(['(', ')'], " ");
        let words: Vec<&str> = stmt.split_whitespace().collect();
        match words.as_slice() {
            ["import", rest @ ..] => {
                let names = rest.join(" ");
                for name in names.split(',') {
                    let parts: Vec<&str> = name.split_whitespace().collect();
                    if parts.len() >= 2 && parts[0] == "os" && parts[1] == "as" {
                        return Err(Error::sandbox_rejected("aliasing the os module is not allowed"));
                    }
                }
            }
            ["from", "os", "import", rest @ ..] => {
                let names = rest.join(" ");
                for name in names.split(',') {
                    let name = name.split_whitespace().next().unwrap_or_default();
                    let forbidden = name == "*"
                        || FORBIDDEN_OS_NAMES.contains(&name)
                        || name.starts_with("exec")
                        || name.starts_with("spawn");
                    if forbidden {
                        return Err(Error::sandbox_rejected(format!(
                            "importing '{}' from os is not allowed",
                            name
                        ))
                        .with_context("pattern", name.to_string()));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Split on newlines and `;`, keeping bracketed continuations together
fn statements(code: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in code.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '\n' | ';' if depth == 0 => {
                out.push(std::mem::take(&mut current));
                continue;
            }
            '\n' => {
                current.push(' ');
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    out.push(current);
    out
}

/// Top-level arguments of a call, given the text after its `(`
fn call_arguments(after_paren: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in after_paren.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Contents of a plain, raw or byte string literal
fn string_literal(arg: &str) -> Option<String> {
    let body = arg.trim().trim_start_matches(['r', 'R', 'b', 'B', 'u', 'U']);
    let quote = body.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = body.strip_prefix(quote)?.strip_suffix(quote)?;
    (!inner.contains(quote)).then(|| inner.to_string())
}

/// Value of a `name=value` argument
fn keyword_value<'a>(arg: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = arg.split_once('=')?;
    (key.trim() == name).then(|| value.trim())
}

/// `open(path, mode)` or, for `.open(mode)` methods, a mode in either slot
fn opens_for_writing(args: &[String], method: bool) -> bool {
    let writable = |mode: &str| mode.contains(['w', 'a', 'x', '+']);
    let is_mode = |s: &str| !s.is_empty() && s.chars().all(|c| "rwabxt+".contains(c));

    if let Some(mode) = args.iter().find_map(|a| keyword_value(a, "mode")) {
        return string_literal(mode).map_or(true, |m| writable(&m));
    }

    let slots: &[usize] = if method { &[0, 1] } else { &[1] };
    slots.iter().filter_map(|&n| args.get(n)).any(|arg| {
        if arg.contains('=') {
            return false;
        }
        match string_literal(arg) {
            Some(m) if is_mode(&m) => writable(&m),
            Some(_) => false,
            // a computed mode cannot be checked
            None => !method,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, TableSchema};

    fn guard() -> QueryGuard {
        QueryGuard::new(DatasetSchema::new(vec![TableSchema::new(
            "waveforms",
            vec![
                Column::new("X-Axis", "double"),
                Column::new("Ch1 Y-Axis", "double"),
                Column::new("Ch2 Y-Axis", "double"),
                Column::new("Ch3 Y-Axis", "double"),
                Column::new("Sample_id", "int"),
                Column::new("Condition", "varchar"),
                Column::new("RPM", "double"),
                Column::new("Load_kW", "double"),
            ],
        )]))
    }

    #[test]
    fn test_accepts_aggregate() {
        let sql = guard().check("SELECT AVG(RPM) FROM waveforms;").unwrap();
        assert_eq!(sql, "SELECT AVG(RPM) FROM waveforms");
    }

    #[test]
    fn test_accepts_backticked_columns_and_aliases() {
        let g = guard();
        g.check("SELECT `X-Axis`, `Ch1 Y-Axis` FROM `waveforms` LIMIT 100").unwrap();
        g.check("SELECT `Condition`, AVG(`RPM`) AS `avg_rpm` FROM waveforms w GROUP BY `Condition` ORDER BY `avg_rpm` DESC")
            .unwrap();
        g.check("SELECT COUNT(*) FROM waveforms WHERE `Condition` = 'HEALTHY'").unwrap();
    }

    #[test]
    fn test_accepts_cte_and_subquery() {
        let g = guard();
        g.check("WITH s AS (SELECT `RPM` FROM waveforms LIMIT 10) SELECT AVG(`RPM`) FROM s").unwrap();
        g.check("SELECT MAX(m) FROM (SELECT AVG(RPM) AS m FROM waveforms GROUP BY Sample_id) t").unwrap();
    }

    #[test]
    fn test_rejects_writes() {
        let g = guard();
        for sql in [
            "DROP TABLE waveforms",
            "DELETE FROM waveforms",
            "UPDATE waveforms SET RPM = 0",
            "SELECT * FROM waveforms INTO OUTFILE '/tmp/x'",
            "REPLACE INTO waveforms VALUES (1)",
        ] {
            let err = g.check(sql).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::QueryRejected, "{}", sql);
        }
    }

    #[test]
    fn test_keywords_inside_strings_are_ignored() {
        guard().check("SELECT COUNT(*) FROM waveforms WHERE `Condition` = 'DROP TABLE'").unwrap();
    }

    #[test]
    fn test_rejects_multiple_statements() {
        let err = guard().check("SELECT 1 FROM waveforms; SELECT 2 FROM waveforms").unwrap_err();
        assert!(err.message().contains("one statement"));
    }

    #[test]
    fn test_rejects_tables_outside_allow_list() {
        let g = guard();
        assert!(g.check("SELECT * FROM users").is_err());
        assert!(g.check("SELECT * FROM waveforms JOIN secrets ON 1 = 1").is_err());
        assert!(g.check("SELECT * FROM waveforms, secrets").is_err());
        assert!(g.check("SELECT * FROM mysql.user").is_err());
        assert!(g.check("DESCRIBE users").is_err());
    }

    #[test]
    fn test_rejects_join_variants_and_parenthesized_tables() {
        let g = guard();
        for sql in [
            "SELECT * FROM waveforms STRAIGHT_JOIN secrets",
            "SELECT * FROM waveforms STRAIGHT_JOIN secrets ON 1 = 1",
            "SELECT * FROM (secrets)",
            "SELECT * FROM ((secrets)) s",
            "SELECT * FROM (mysql.user)",
            "SELECT name, sql FROM (sqlite_master)",
            "SELECT * FROM waveforms, (secrets)",
            "SELECT * FROM (waveforms JOIN secrets ON 1 = 1)",
        ] {
            let err = g.check(sql).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::QueryRejected, "{}", sql);
        }

        g.check("SELECT COUNT(*) FROM (waveforms) w").unwrap();
        g.check("SELECT * FROM waveforms a STRAIGHT_JOIN waveforms b ON a.Sample_id = b.Sample_id")
            .unwrap();
    }

    #[test]
    fn test_rejects_file_and_timing_functions() {
        let g = guard();
        for sql in [
            "SELECT LOAD_FILE('/etc/passwd')",
            "SELECT load_file('/etc/passwd') FROM waveforms",
            "SELECT SLEEP(10) FROM waveforms",
            "SELECT BENCHMARK(1000000, MD5('x'))",
        ] {
            let err = g.check(sql).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::QueryRejected, "{}", sql);
        }
    }

    #[test]
    fn test_rejects_unknown_quoted_identifier() {
        let err = guard().check("SELECT `password` FROM waveforms").unwrap_err();
        assert!(err.message().contains("password"));
    }

    #[test]
    fn test_show_is_limited_to_columns() {
        let g = guard();
        g.check("SHOW COLUMNS FROM waveforms").unwrap();
        assert!(g.check("SHOW TABLES").is_err());
        assert!(g.check("SHOW DATABASES").is_err());
        g.check("DESCRIBE waveforms").unwrap();
    }

    #[test]
    fn test_code_guard_accepts_plot() {
        let code = r#"
import pandas as pd
import matplotlib.pyplot as plt
df = pd.DataFrame(data, columns=columns)
df.plot(x='X-Axis', y='Ch1 Y-Axis')
plt.savefig("grafico.png")
print("saved")
"#;
        CodeGuard::new("grafico.png").check(code).unwrap();
    }

    #[test]
    fn test_code_guard_rejects_other_targets_and_shell() {
        let g = CodeGuard::new("grafico.png");
        assert!(g.check("plt.savefig('/etc/evil.png')").is_err());
        assert!(g.check("plt.savefig(path)").is_err());
        assert!(g.check("import subprocess; subprocess.run(['ls'])").is_err());
        assert!(g.check("plt.show()").is_err());
        assert!(g.check("   ").is_err());
    }

    #[test]
    fn test_code_guard_sees_through_spacing_and_imports() {
        let g = CodeGuard::new("grafico.png");
        for code in [
            "from os import system\nsystem('id')",
            "from os import (popen, path)",
            "from os import execv",
            "from os import (\n    path,\n    system,\n)",
            "from os import *",
            "import numpy as np, os as o\no.system('id')",
            "exec ('print(1)')",
            "eval\t('1')",
            "plt.show ()",
            "plt.savefig ('/tmp/x.png')",
        ] {
            let err = g.check(code).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::SandboxRejected, "{}", code);
        }

        g.check("from os import path\nprint(path.exists('grafico.png'))").unwrap();
        g.check("import os\nprint(os.getcwd())").unwrap();
    }

    #[test]
    fn test_code_guard_rejects_writes_outside_artifact() {
        let g = CodeGuard::new("grafico.png");
        for code in [
            "open('/tmp/pwn','w').write('x')",
            "open('/tmp/pwn', mode = 'a')",
            "with open(\"notes.txt\", \"x\") as f:\n    f.write('x')",
            "open('data.bin', 'r+b')",
            "open(target, mode)",
            "from pathlib import Path\nPath('/tmp/pwn').open('w')",
            "io.open('/tmp/pwn', 'wb')",
            "Path('/tmp/pwn').write_text('x')",
        ] {
            let err = g.check(code).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::SandboxRejected, "{}", code);
        }

        g.check("print(open('manual.txt').read())").unwrap();
        g.check("print(open('manual.txt', 'r', encoding='utf-8').read())").unwrap();
        g.check("with open('grafico.png', 'wb') as f:\n    f.write(b'')").unwrap();
    }

    #[test]
    fn test_code_guard_savefig_detection() {
        let g = CodeGuard::new("charts/x.png");
        assert_eq!(g.artifact_name(), "charts/x.png");
        g.check("plt.savefig(fname='charts/x.png')").unwrap();
        assert!(g.check("plt.savefig('x.png')").is_err());
        assert!(g.saves_figure("plt.savefig ('charts/x.png')"));
        assert!(!g.saves_figure("print(42)"));
    }
}
