//! # waveq-error
//!
//! Unified error handling for waveq.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., QueryRejected, SandboxFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! Only configuration errors are fatal. Everything else is reported for the
//! current question and the session keeps accepting input.
//!
//! ## Usage
//!
//! ```rust
//! use waveq_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::QueryRejected, "table 'users' is not allow-listed")
//!         .with_operation("guard::check_query")
//!         .with_context("table", "users"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, waveq_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using waveq Error
pub type Result<T> = std::result::Result<T, Error>;
