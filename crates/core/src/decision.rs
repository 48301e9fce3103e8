//! Oracle decisions and the approval allow-list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventType;
use crate::issue::IssueDraft;
use crate::Error;

/// Intents the dispatcher knows how to act on.
pub const INTENTS: &[&str] = &[
    "request_more_information",
    "create_issue",
    "list_issues",
    "list_teams",
    "done_for_now",
];

/// The oracle's structured output for one dispatcher iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Decision {
    /// Ask the human a question and wait for the reply.
    RequestMoreInformation { message: String },

    /// Propose an issue; requires approval before it is created.
    CreateIssue { issue: IssueDraft },

    /// Read-only issue listing, optionally bounded in time.
    ListIssues {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_time: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to_time: Option<String>,
    },

    /// Read-only team listing.
    ListTeams {},

    /// Final notification to the human.
    DoneForNow { message: String },
}

impl Decision {
    /// Classify a raw oracle output.
    ///
    /// An intent outside [`INTENTS`] is [`Error::UnknownIntent`]; a known
    /// intent with missing or malformed fields is [`Error::InvalidDecision`].
    pub fn classify(raw: Value) -> Result<Self, Error> {
        let intent = raw
            .get("intent")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidDecision("missing intent".into()))?
            .to_owned();

        if !INTENTS.contains(&intent.as_str()) {
            return Err(Error::UnknownIntent(intent));
        }

        serde_json::from_value(raw).map_err(|e| Error::InvalidDecision(format!("{intent}: {e}")))
    }

    pub fn intent(&self) -> &'static str {
        self.event_type().as_str()
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Decision::RequestMoreInformation { .. } => EventType::RequestMoreInformation,
            Decision::CreateIssue { .. } => EventType::CreateIssue,
            Decision::ListIssues { .. } => EventType::ListIssues,
            Decision::ListTeams {} => EventType::ListTeams,
            Decision::DoneForNow { .. } => EventType::DoneForNow,
        }
    }
}

/// Functions that may be sent out for human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalFunction {
    CreateIssue,
}

impl ApprovalFunction {
    pub const ALL: &'static [ApprovalFunction] = &[ApprovalFunction::CreateIssue];

    pub fn name(&self) -> &'static str {
        match self {
            ApprovalFunction::CreateIssue => "create_issue",
        }
    }

    /// Look up a function name in the allow-list.
    pub fn parse(name: &str) -> Result<Self, Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| Error::UnknownFunction(name.to_owned()))
    }
}

impl std::fmt::Display for ApprovalFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
