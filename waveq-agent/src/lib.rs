//! # waveq agent
//!
//! The agent answers questions about the vibration dataset:
//! 1. The session loop reads a question and passes it with the history
//! 2. The LLM decides: a final answer, or a tool call
//! 3. Tools query the data source or run Python in the sandbox
//! 4. The observation goes back to the LLM and the loop repeats
//! 5. Until a final answer, or the step budget runs out
//!
//! A failed question never touches the history; the user just asks again.

mod agent;
pub mod prompt;
mod session;

pub use agent::{
    parse_response, parse_text, Agent, AgentConfig, Decision, ReasoningAgent, Step, ToolOrigin,
};
pub use session::{is_exit, LoopExit, Role, Session, SessionLoop, Turn, EXIT_TOKENS};
