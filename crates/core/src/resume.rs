//! Resumption of suspended threads from platform callbacks.
//!
//! Both entry points rebuild the exact thread that was suspended, append one
//! event describing what the human did, and re-enter the dispatcher.

use serde_json::Value;
use tracing::{info, warn};

use crate::decision::ApprovalFunction;
use crate::dispatcher::{ApprovalPlatform, Dispatch, IssueTracker, Oracle, StepDispatcher};
use crate::event::Event;
use crate::issue::IssueDraft;
use crate::thread::{OpaqueState, Thread};
use crate::Error;

/// What the human decided on an approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied { comment: Option<String> },
}

impl ApprovalOutcome {
    /// Map the platform's `approved` flag; `None` means no decision was made.
    pub fn from_status(approved: Option<bool>, comment: Option<String>) -> Option<Self> {
        if approved? {
            Some(ApprovalOutcome::Approved)
        } else {
            Some(ApprovalOutcome::Denied { comment })
        }
    }
}

fn restore(state: Option<&OpaqueState>) -> Result<Thread, Error> {
    let state = state.ok_or(Error::MissingState)?;
    let thread = Thread::from_state(state)?;
    info!(
        thread_id = %thread.id,
        events = thread.len(),
        last_event = ?thread.last_event_type(),
        "Restored thread from callback state"
    );
    Ok(thread)
}

impl<O, T, P> StepDispatcher<O, T, P>
where
    O: Oracle,
    T: IssueTracker,
    P: ApprovalPlatform,
{
    /// Resume a thread with a free-text reply from the human.
    pub async fn resume_with_message(
        &self,
        state: Option<&OpaqueState>,
        message: &str,
    ) -> Result<Dispatch, Error> {
        let mut thread = restore(state)?;
        thread.push(Event::human_response(message));
        self.run(thread).await
    }

    /// Resume a thread with the outcome of an approval request.
    ///
    /// Unknown functions, missing outcomes and missing state fail before any
    /// external call is made. An approved `create_issue` creates the issue
    /// exactly once; a denial never does.
    pub async fn resume_with_approval(
        &self,
        state: Option<&OpaqueState>,
        function: &str,
        kwargs: &Value,
        outcome: Option<ApprovalOutcome>,
    ) -> Result<Dispatch, Error> {
        let mut thread = restore(state)?;
        let function = ApprovalFunction::parse(function)?;
        let outcome = outcome.ok_or(Error::MissingApprovalStatus)?;

        let event = match (function, outcome) {
            (ApprovalFunction::CreateIssue, ApprovalOutcome::Approved) => {
                let draft = IssueDraft::from_arguments(kwargs)?;
                info!(thread_id = %thread.id, title = %draft.title, "Creating approved issue");
                match self
                    .guarded("create_issue", self.tracker.create_issue(&draft))
                    .await
                {
                    Ok(issue) => Event::issue_create_result(serde_json::to_value(&issue)?),
                    Err(e) => {
                        warn!(thread_id = %thread.id, error = %e, "Issue creation failed");
                        Event::error(format!("error running create_issue: {e}"))
                    }
                }
            }
            (function, ApprovalOutcome::Denied { comment }) => {
                info!(thread_id = %thread.id, function = %function, "Approval denied");
                Event::denial(function, comment.as_deref())
            }
        };

        thread.push(event);
        self.run(thread).await
    }
}
