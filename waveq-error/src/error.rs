//! The main Error type for waveq

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all waveq operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use waveq_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::QueryFailed, "Unknown column 'rpm'")
///     .with_operation("mysql::execute")
///     .with_status(ErrorStatus::Permanent)
///     .with_context("table", "waveforms");
///
/// assert_eq!(err.kind(), ErrorKind::QueryFailed);
/// assert!(!err.status().is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the error status
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }

    /// Check if this error must stop the process
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

// =============================================================================
// std::error::Error implementation
// =============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Convenient From implementations (be careful not to leak raw errors!)
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a ConfigMissing error listing every absent variable
    pub fn config_missing(names: &[&str]) -> Self {
        Self::new(
            ErrorKind::ConfigMissing,
            format!("missing required variables: {}", names.join(", ")),
        )
        .with_context("missing", names.join(","))
    }

    /// Create a ConfigInvalid error
    pub fn config_invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, reason).with_context("variable", name)
    }

    /// Create a ConnectionFailed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, message)
    }

    /// Create a QueryFailed error carrying the backend's message
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryFailed, message)
    }

    /// Create a QueryRejected error
    pub fn query_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryRejected, message)
    }

    /// Create a SandboxFailed error
    pub fn sandbox_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SandboxFailed, message)
    }

    /// Create a SandboxRejected error
    pub fn sandbox_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SandboxRejected, message)
    }

    /// Create a SandboxTimeout error
    pub fn sandbox_timeout(secs: u64) -> Self {
        Self::new(
            ErrorKind::SandboxTimeout,
            format!("code did not finish within {}s", secs),
        )
        .with_context("timeout_secs", secs.to_string())
    }

    /// Create an AgentExhausted error
    pub fn agent_exhausted(steps: usize) -> Self {
        Self::new(
            ErrorKind::AgentExhausted,
            format!("agent stopped after {} steps without a final answer", steps),
        )
        .with_context("steps", steps.to_string())
    }

    /// Create an AgentTimeout error
    pub fn agent_timeout(secs: u64) -> Self {
        Self::new(
            ErrorKind::AgentTimeout,
            format!("agent did not answer within {}s", secs),
        )
        .with_context("timeout_secs", secs.to_string())
    }

    /// Create an InferenceFailed error
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    /// Create a FileNotFound error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorKind::FileNotFound, format!("file '{}' not found", path))
            .with_context("path", path)
    }

    /// Create an ExtractionFailed error
    pub fn extraction_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExtractionFailed, message)
    }

    /// Create a ParseFailed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::QueryFailed, "Unknown column 'rpm'");
        assert_eq!(err.kind(), ErrorKind::QueryFailed);
        assert_eq!(err.message(), "Unknown column 'rpm'");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::SandboxFailed, "NameError: name 'df' is not defined")
            .with_operation("sandbox::run")
            .with_context("interpreter", "python3")
            .with_context("exit_code", "1");

        assert_eq!(err.operation(), "sandbox::run");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("interpreter", "python3".to_string()));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::QueryFailed, "syntax error")
            .with_operation("mysql::execute")
            .with_operation("agent::sql_db_query");

        assert_eq!(err.operation(), "agent::sql_db_query");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "mysql::execute".to_string()));
    }

    #[test]
    fn test_temporary_status() {
        let err = Error::new(ErrorKind::RateLimited, "slow down");
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::QueryRejected, "DROP is not allowed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection refused").temporary();
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::InferenceFailed, "model unavailable")
            .with_operation("provider::complete")
            .with_context("model", "llama3-70b-8192");

        let display = format!("{}", err);
        assert!(display.contains("InferenceFailed"));
        assert!(display.contains("temporary"));
        assert!(display.contains("provider::complete"));
        assert!(display.contains("model: llama3-70b-8192"));
        assert!(display.ends_with("=> model unavailable"));
    }

    #[test]
    fn test_config_missing_lists_all_names() {
        let err = Error::config_missing(&["MYSQL_PASSWORD", "GROQ_API_KEY"]);
        assert!(err.is_fatal());
        assert!(err.message().contains("MYSQL_PASSWORD"));
        assert!(err.message().contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_per_call_errors_are_not_fatal() {
        assert!(!Error::connection_failed("gone").is_fatal());
        assert!(!Error::query_rejected("nope").is_fatal());
        assert!(!Error::sandbox_timeout(5).is_fatal());
        assert!(!Error::agent_exhausted(15).is_fatal());
    }

    #[test]
    fn test_set_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::file_not_found("manual.pdf").set_source(io_err);

        assert!(err.source_ref().is_some());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.operation(), "io");
    }
}
