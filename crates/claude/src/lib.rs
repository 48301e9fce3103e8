//! Claude Code CLI as the reasoning oracle.

pub mod output;
pub mod process;

pub use output::{ClaudeInput, ClaudeOutput, ContentBlock, Usage};
pub use process::{ClaudeOracle, DECISION_SYSTEM_PROMPT};
