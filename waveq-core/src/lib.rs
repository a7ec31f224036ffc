//! # waveq core
//!
//! The pieces an agent session is assembled from.
//!
//! ## Core Concepts
//! - **Data sources**: allow-listed tables behind one trait (MySQL, or a CSV
//!   file loaded into in-memory SQLite)
//! - **Guards**: static checks on SQL and Python before anything runs
//! - **Sandbox**: one Python process per code fragment, bindings injected
//! - **Provider**: trait-based LLM communication (Groq, OpenAI, local servers)

pub mod config;
pub mod dataset;
pub mod document;
pub mod error;
pub mod guard;
pub mod provider;
pub mod sandbox;
pub mod source;

pub use config::{AgentSettings, Config, DatabaseConfig, LlmConfig, SandboxConfig};
pub use dataset::{Column, DatasetSchema, QueryResult, TableSchema};
pub use document::{extract_pdf_text, save_text, DEFAULT_TEXT_OUTPUT};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use guard::{CodeGuard, QueryGuard};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    OpenAIProvider, ProviderConfig, ProviderError, ProviderType, Role, ToolCall, ToolChoice,
    ToolDefinition, Usage, UsageTracker,
};
pub use sandbox::{Bindings, PythonSandbox, Sandbox, SandboxOutput};
pub use source::{CsvOptions, CsvSource, DataSource, MySqlSource};
