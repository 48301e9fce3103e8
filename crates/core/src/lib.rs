//! Core thread model and step dispatcher for the Linear assistant.
//!
//! A thread is driven by oracle decisions until it needs a human. At that
//! point its full state is handed to the approval platform, which returns it
//! in a callback; the resumption handlers pick the thread up from there.

use std::time::Duration;

pub mod decision;
pub mod dispatcher;
pub mod event;
pub mod issue;
pub mod prompt;
pub mod resume;
pub mod thread;

#[cfg(test)]
mod fakes;

pub use decision::{ApprovalFunction, Decision, INTENTS};
pub use dispatcher::{
    ApprovalPlatform, Budget, Dispatch, DispatchState, FunctionApprovalRequest,
    HumanContactRequest, IssueTracker, Oracle, ReplyTo, StepDispatcher,
};
pub use event::{EmailMessage, EmailPayload, Event, EventData, EventType};
pub use issue::{Issue, IssueDraft, Team};
pub use prompt::{project, PROMPT_FORMAT};
pub use resume::ApprovalOutcome;
pub use thread::{OpaqueState, Thread, STATE_VERSION};

/// Error types for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("issue tracker error: {0}")]
    Tracker(String),

    #[error("approval platform error: {0}")]
    Platform(String),

    #[error("{call} timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },

    #[error("unknown intent: {0}")]
    UnknownIntent(String),

    #[error("invalid decision: {0}")]
    InvalidDecision(String),

    #[error("unknown function call: {0}")]
    UnknownFunction(String),

    #[error("got function call webhook with null status")]
    MissingApprovalStatus,

    #[error("state is required")]
    MissingState,

    #[error("invalid thread state: {0}")]
    InvalidState(String),

    #[error("invalid function arguments: {0}")]
    InvalidArguments(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Contract violations are never retried; everything else is transient.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::UnknownIntent(_)
                | Error::InvalidDecision(_)
                | Error::UnknownFunction(_)
                | Error::MissingApprovalStatus
                | Error::MissingState
                | Error::InvalidState(_)
                | Error::InvalidArguments(_)
        )
    }
}
