//! Error kinds for waveq operations

use std::fmt;

/// The kind of error that occurred.
///
/// Users can match on ErrorKind to decide how to handle specific error cases.
/// The session loop only treats the configuration kinds as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    // =========================================================================
    // Configuration errors (fatal at startup)
    // =========================================================================
    /// A required setting is absent
    ConfigMissing,

    /// A setting is present but unusable
    ConfigInvalid,

    // =========================================================================
    // Data source errors
    // =========================================================================
    /// The backing data store is unreachable or the connection dropped
    ConnectionFailed,

    /// The backend refused or failed to run a query
    QueryFailed,

    /// The query was refused before reaching the backend
    QueryRejected,

    // =========================================================================
    // Sandbox errors
    // =========================================================================
    /// The code fragment raised or produced no output
    SandboxFailed,

    /// The code fragment was refused before execution
    SandboxRejected,

    /// The code fragment ran past its time limit
    SandboxTimeout,

    // =========================================================================
    // Agent / LLM errors
    // =========================================================================
    /// The agent spent its step budget without a final answer
    AgentExhausted,

    /// The agent call ran past its wall-clock bound
    AgentTimeout,

    /// LLM inference failed
    InferenceFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Text extraction from a document failed
    ExtractionFailed,

    /// Invalid argument passed to function
    InvalidArgument,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",

            // Config
            ErrorKind::ConfigMissing => "ConfigMissing",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            // Data source
            ErrorKind::ConnectionFailed => "ConnectionFailed",
            ErrorKind::QueryFailed => "QueryFailed",
            ErrorKind::QueryRejected => "QueryRejected",

            // Sandbox
            ErrorKind::SandboxFailed => "SandboxFailed",
            ErrorKind::SandboxRejected => "SandboxRejected",
            ErrorKind::SandboxTimeout => "SandboxTimeout",

            // Agent
            ErrorKind::AgentExhausted => "AgentExhausted",
            ErrorKind::AgentTimeout => "AgentTimeout",
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::ExtractionFailed => "ExtractionFailed",
            ErrorKind::InvalidArgument => "InvalidArgument",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ConnectionFailed
                | ErrorKind::ProviderUnavailable
                | ErrorKind::AgentTimeout
        )
    }

    /// Configuration errors stop the process before any interaction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::ConfigMissing | ErrorKind::ConfigInvalid)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::QueryRejected.to_string(), "QueryRejected");
        assert_eq!(ErrorKind::AgentExhausted.to_string(), "AgentExhausted");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::ConnectionFailed.is_retryable());
        assert!(!ErrorKind::QueryRejected.is_retryable());
        assert!(!ErrorKind::SandboxFailed.is_retryable());
    }

    #[test]
    fn test_only_config_is_fatal() {
        assert!(ErrorKind::ConfigMissing.is_fatal());
        assert!(ErrorKind::ConfigInvalid.is_fatal());
        assert!(!ErrorKind::ConnectionFailed.is_fatal());
        assert!(!ErrorKind::AgentExhausted.is_fatal());
        assert!(!ErrorKind::SandboxFailed.is_fatal());
    }
}
