//! Environment-driven configuration.
//!
//! Values come from the process environment after `.env` is loaded. Every
//! section reads through a lookup closure so tests never touch the real
//! environment. Missing required variables are collected and reported
//! together in one `ConfigMissing` error.

use crate::error::{Error, Result};
use crate::provider::{ProviderConfig, DEFAULT_MODEL, GROQ_BASE_URL};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const MYSQL_USER: &str = "MYSQL_USER";
pub const MYSQL_PASSWORD: &str = "MYSQL_PASSWORD";
pub const MYSQL_HOST: &str = "MYSQL_HOST";
pub const MYSQL_PORT: &str = "MYSQL_PORT";
pub const MYSQL_DB_NAME: &str = "MYSQL_DB_NAME";
pub const GROQ_API_KEY: &str = "GROQ_API_KEY";

/// Required for a database session, in reporting order
pub const DATABASE_VARS: [&str; 5] = [MYSQL_USER, MYSQL_PASSWORD, MYSQL_HOST, MYSQL_PORT, MYSQL_DB_NAME];

const SECRET_VARS: [&str; 2] = [MYSQL_PASSWORD, GROQ_API_KEY];

/// Load `.env` from the working directory; a missing file is fine.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "loaded .env");
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable .env");
            None
        }
    }
}

/// Reads variables and remembers which required ones were absent.
struct Vars<F> {
    lookup: F,
    missing: Vec<&'static str>,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
        }
    }

    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&mut self, name: &'static str) -> String {
        match self.get(name) {
            Some(value) => value,
            None => {
                self.missing.push(name);
                String::new()
            }
        }
    }

    fn parsed<T: FromStr>(&self, name: &'static str, default: T) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| Error::config_invalid(name, format!("'{}': {}", raw, e))),
        }
    }

    fn finish(self) -> Result<()> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(Error::config_missing(&self.missing))
        }
    }
}

/// MySQL connection parameters and the table allow-list
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tables: Vec<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &mask(&self.password))
            .field("database", &self.database)
            .field("tables", &self.tables)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vars::new(lookup);
        let config = Self::read(&mut vars)?;
        vars.finish()?;
        Ok(config)
    }

    fn read<F>(vars: &mut Vars<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = vars.required(MYSQL_USER);
        let password = vars.required(MYSQL_PASSWORD);
        let host = vars.required(MYSQL_HOST);
        let port = vars.required(MYSQL_PORT);
        let database = vars.required(MYSQL_DB_NAME);

        let port = if port.is_empty() {
            0
        } else {
            port.trim()
                .parse()
                .map_err(|e| Error::config_invalid(MYSQL_PORT, format!("'{}': {}", port, e)))?
        };

        let tables: Vec<String> = vars
            .get("WAVEQ_TABLES")
            .unwrap_or_else(|| "waveforms".to_string())
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.is_empty() {
            return Err(Error::config_invalid("WAVEQ_TABLES", "allow-list is empty"));
        }

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            tables,
        })
    }
}

/// Language model endpoint
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &mask(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LlmConfig {
    fn read<F>(vars: &mut Vars<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = vars.required(GROQ_API_KEY);
        let temperature: f32 = vars.parsed("WAVEQ_TEMPERATURE", 0.2)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::config_invalid(
                "WAVEQ_TEMPERATURE",
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }
        Ok(Self {
            api_key,
            model: vars.get("WAVEQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            base_url: vars.get("WAVEQ_LLM_BASE_URL").unwrap_or_else(|| GROQ_BASE_URL.to_string()),
        })
    }

    /// Groq unless `WAVEQ_LLM_BASE_URL` points elsewhere
    pub fn provider_config(&self) -> ProviderConfig {
        if self.base_url == GROQ_BASE_URL {
            return ProviderConfig::groq(self.api_key.clone()).with_model(self.model.clone());
        }
        ProviderConfig {
            api_key: Some(self.api_key.clone()),
            ..ProviderConfig::local(self.base_url.clone(), self.model.clone())
        }
    }
}

/// Agent loop limits
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub turn_timeout: Duration,
    pub row_limit: usize,
    pub sample_rows: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            turn_timeout: Duration::from_secs(300),
            row_limit: crate::source::DEFAULT_ROW_LIMIT,
            sample_rows: 3,
        }
    }
}

impl AgentSettings {
    fn read<F>(vars: &Vars<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_iterations = vars.parsed("WAVEQ_MAX_ITERATIONS", defaults.max_iterations)?;
        if max_iterations == 0 {
            return Err(Error::config_invalid("WAVEQ_MAX_ITERATIONS", "must be at least 1"));
        }
        let row_limit = vars.parsed("WAVEQ_ROW_LIMIT", defaults.row_limit)?;
        if row_limit == 0 {
            return Err(Error::config_invalid("WAVEQ_ROW_LIMIT", "must be at least 1"));
        }
        Ok(Self {
            max_iterations,
            turn_timeout: Duration::from_secs(
                vars.parsed("WAVEQ_TURN_TIMEOUT_SECS", defaults.turn_timeout.as_secs())?,
            ),
            row_limit,
            sample_rows: vars.parsed("WAVEQ_SAMPLE_ROWS", defaults.sample_rows)?,
        })
    }
}

/// Python interpreter used by the sandbox
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub python: String,
    pub timeout: Duration,
    /// Chart path, relative to the working directory
    pub artifact: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout: Duration::from_secs(60),
            artifact: PathBuf::from("grafico.png"),
        }
    }
}

impl SandboxConfig {
    fn read<F>(vars: &Vars<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            python: vars.get("WAVEQ_PYTHON").unwrap_or(defaults.python),
            timeout: Duration::from_secs(
                vars.parsed("WAVEQ_SANDBOX_TIMEOUT_SECS", defaults.timeout.as_secs())?,
            ),
            artifact: vars.get("WAVEQ_ARTIFACT").map(PathBuf::from).unwrap_or(defaults.artifact),
        })
    }
}

/// Everything a session needs
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    /// Absent for flat-file sessions
    pub database: Option<DatabaseConfig>,
    pub agent: AgentSettings,
    pub sandbox: SandboxConfig,
}

impl Config {
    /// Read from the process environment
    pub fn from_env(with_database: bool) -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), with_database)
    }

    /// Read through `lookup`. With `with_database` the MySQL variables are
    /// required too; missing ones are reported together with `GROQ_API_KEY`.
    pub fn from_lookup<F>(lookup: F, with_database: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = Vars::new(lookup);
        let database = if with_database {
            Some(DatabaseConfig::read(&mut vars)?)
        } else {
            None
        };
        let llm = LlmConfig::read(&mut vars)?;
        let agent = AgentSettings::read(&vars)?;
        let sandbox = SandboxConfig::read(&vars)?;
        vars.finish()?;

        debug!(?database, ?llm, "configuration loaded");
        Ok(Self {
            llm,
            database,
            agent,
            sandbox,
        })
    }
}

/// `NAME=value` lines for the given variables, secrets masked
pub fn describe_environment<F>(names: &[&str], lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .map(|name| match lookup(*name).filter(|v| !v.trim().is_empty()) {
            None => format!("{}=<missing>", name),
            Some(value) if SECRET_VARS.contains(name) => format!("{}={}", name, mask(&value)),
            Some(value) => format!("{}={}", name, value),
        })
        .collect()
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderType;
    use crate::ErrorKind;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn full() -> HashMap<String, String> {
        env(&[
            ("MYSQL_USER", "root"),
            ("MYSQL_PASSWORD", "hunter2"),
            ("MYSQL_HOST", "localhost"),
            ("MYSQL_PORT", "3306"),
            ("MYSQL_DB_NAME", "vibration"),
            ("GROQ_API_KEY", "gsk_test"),
        ])
    }

    #[test]
    fn test_full_config_with_defaults() {
        let vars = full();
        let config = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap();

        let db = config.database.unwrap();
        assert_eq!(db.port, 3306);
        assert_eq!(db.tables, vec!["waveforms"]);
        assert_eq!(config.llm.model, "llama3-70b-8192");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.llm.base_url, GROQ_BASE_URL);
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.sandbox.artifact, PathBuf::from("grafico.png"));
    }

    #[test]
    fn test_missing_password_is_fatal() {
        let mut vars = full();
        vars.remove("MYSQL_PASSWORD");
        let err = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigMissing);
        assert!(err.is_fatal());
        assert!(err.message().contains("MYSQL_PASSWORD"));
    }

    #[test]
    fn test_all_missing_reported_together() {
        let vars = env(&[("MYSQL_USER", "root"), ("MYSQL_PORT", "3306")]);
        let err = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap_err();
        for name in ["MYSQL_PASSWORD", "MYSQL_HOST", "MYSQL_DB_NAME", "GROQ_API_KEY"] {
            assert!(err.message().contains(name), "{} not reported", name);
        }
        assert!(!err.message().contains("MYSQL_USER"));
    }

    #[test]
    fn test_flat_file_mode_needs_only_api_key() {
        let vars = env(&[("GROQ_API_KEY", "gsk_test")]);
        let config = Config::from_lookup(|k| vars.get(k).cloned(), false).unwrap();
        assert!(config.database.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let mut vars = full();
        vars.insert("MYSQL_PORT".into(), "mysql".into());
        let err = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let mut vars = full();
        vars.insert("WAVEQ_MAX_ITERATIONS".into(), "0".into());
        let err = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_overrides() {
        let mut vars = full();
        vars.insert("WAVEQ_TABLES".into(), "waveforms, runs".into());
        vars.insert("WAVEQ_MODEL".into(), "llama-3.3-70b-versatile".into());
        vars.insert("WAVEQ_ROW_LIMIT".into(), "50".into());
        let config = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap();
        assert_eq!(config.database.unwrap().tables, vec!["waveforms", "runs"]);
        assert_eq!(config.llm.provider_config().default_model.as_deref(), Some("llama-3.3-70b-versatile"));
        assert_eq!(config.agent.row_limit, 50);
    }

    #[test]
    fn test_custom_endpoint_is_local_provider() {
        let config = Config::from_lookup(|k| full().get(k).cloned(), false).unwrap();
        assert_eq!(config.llm.provider_config().provider_type, ProviderType::Groq);

        let mut vars = full();
        vars.insert("WAVEQ_LLM_BASE_URL".into(), "http://localhost:11434/v1".into());
        let provider = Config::from_lookup(|k| vars.get(k).cloned(), false)
            .unwrap()
            .llm
            .provider_config();
        assert_eq!(provider.provider_type, ProviderType::Local);
        assert_eq!(provider.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(provider.api_key.as_deref(), Some("gsk_test"));
    }

    #[test]
    fn test_secrets_are_masked() {
        let vars = full();
        let lines = describe_environment(&DATABASE_VARS, |k| vars.get(k).cloned());
        assert!(lines.contains(&"MYSQL_PASSWORD=****".to_string()));
        assert!(lines.contains(&"MYSQL_HOST=localhost".to_string()));

        let config = Config::from_lookup(|k| vars.get(k).cloned(), true).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("gsk_test"));
    }
}
