//! waveq-core error types
//!
//! Re-exports waveq-error and converts backend errors without leaking their
//! raw types past this crate.

pub use waveq_error::{Error, ErrorKind, ErrorStatus, Result};

use crate::provider::ProviderError;

/// Classify a MySQL driver error as a connection or query failure
pub fn from_sqlx(err: sqlx::Error) -> Error {
    let message = match &err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    };
    let kind = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ErrorKind::ConnectionFailed,
        sqlx::Error::Configuration(_) => ErrorKind::ConfigInvalid,
        _ => ErrorKind::QueryFailed,
    };
    Error::new(kind, message).set_source(err)
}

/// Errors from the embedded SQLite store are always query failures
pub fn from_sqlite(err: rusqlite::Error) -> Error {
    Error::query_failed(err.to_string()).set_source(err)
}

/// Map an LLM provider failure onto the unified kinds
pub fn from_provider(err: ProviderError) -> Error {
    let kind = match &err {
        ProviderError::Network(_) => ErrorKind::NetworkFailed,
        ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
        ProviderError::AuthenticationFailed => ErrorKind::ConfigInvalid,
        ProviderError::Api { status, .. } if *status >= 500 => ErrorKind::ProviderUnavailable,
        _ => ErrorKind::InferenceFailed,
    };
    let mut error = Error::new(kind, err.to_string()).with_operation("provider::complete");
    if let ProviderError::RateLimited { retry_after: Some(secs) } = &err {
        error = error.with_context("retry_after", secs.to_string());
    }
    error.set_source(err)
}
