//! Event types for thread history.
//!
//! A thread's history is an append-only list of events:
//! - The inbound email that started the thread
//! - Each decision returned by the oracle
//! - Results of lookups and approved mutations
//! - Human responses and denials
//!
//! Events are created once and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::{ApprovalFunction, Decision};

/// Inbound email that starts a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub message_id: String,
    /// Earlier messages of the email conversation, oldest first.
    #[serde(default)]
    pub previous_thread: Vec<EmailMessage>,
    #[serde(default)]
    pub raw_email: String,
    #[serde(default)]
    pub is_test: Option<bool>,
}

impl EmailPayload {
    pub fn is_test(&self) -> bool {
        self.is_test.unwrap_or(false)
    }
}

/// A message quoted from an earlier part of the email conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from_address: String,
    #[serde(default)]
    pub to_address: Vec<String>,
    #[serde(default)]
    pub cc_address: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub datetime: String,
}

/// Semantic kind of an event. Rendered as the tag name in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EmailReceived,
    RequestMoreInformation,
    CreateIssue,
    ListIssues,
    ListTeams,
    DoneForNow,
    ListIssuesResult,
    ListTeamsResult,
    IssueCreateResult,
    HumanResponse,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EmailReceived => "email_received",
            EventType::RequestMoreInformation => "request_more_information",
            EventType::CreateIssue => "create_issue",
            EventType::ListIssues => "list_issues",
            EventType::ListTeams => "list_teams",
            EventType::DoneForNow => "done_for_now",
            EventType::ListIssuesResult => "list_issues_result",
            EventType::ListTeamsResult => "list_teams_result",
            EventType::IssueCreateResult => "issue_create_result",
            EventType::HumanResponse => "human_response",
            EventType::Error => "error",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "value", rename_all = "snake_case")]
pub enum EventData {
    /// The inbound email.
    Email(EmailPayload),

    /// Free-text reply from a human.
    HumanMessage { message: String },

    /// A decision returned by the oracle.
    Decision(Decision),

    /// Free-text status, denial or error.
    Text(String),

    /// Serialized result of a tracker call.
    ToolResult(serde_json::Value),
}

/// A timestamped event in a thread's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub data: EventData,
    pub recorded_at: DateTime<Utc>,
}

impl Event {
    fn new(kind: EventType, data: EventData) -> Self {
        Self {
            kind,
            data,
            recorded_at: Utc::now(),
        }
    }

    pub fn email_received(email: EmailPayload) -> Self {
        Self::new(EventType::EmailReceived, EventData::Email(email))
    }

    /// Record an oracle decision. The event type is the decision's intent.
    pub fn decision(decision: Decision) -> Self {
        Self::new(decision.event_type(), EventData::Decision(decision))
    }

    pub fn list_issues_result(result: serde_json::Value) -> Self {
        Self::new(EventType::ListIssuesResult, EventData::ToolResult(result))
    }

    pub fn list_teams_result(result: serde_json::Value) -> Self {
        Self::new(EventType::ListTeamsResult, EventData::ToolResult(result))
    }

    pub fn issue_create_result(result: serde_json::Value) -> Self {
        Self::new(EventType::IssueCreateResult, EventData::ToolResult(result))
    }

    pub fn human_response(message: impl Into<String>) -> Self {
        Self::new(
            EventType::HumanResponse,
            EventData::HumanMessage {
                message: message.into(),
            },
        )
    }

    /// A human denied an approval request.
    pub fn denial(function: ApprovalFunction, comment: Option<&str>) -> Self {
        let text = match comment {
            Some(comment) => format!(
                "User denied {} with feedback: {comment}",
                function.name()
            ),
            None => format!("User denied {} without feedback", function.name()),
        };
        Self::new(EventType::HumanResponse, EventData::Text(text))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventType::Error, EventData::Text(message.into()))
    }

    /// Check that the payload variant is one the event type may carry.
    ///
    /// Events built through the constructors above always pass. Events
    /// decoded from externally held state are checked before use.
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            EventType::EmailReceived => matches!(self.data, EventData::Email(_)),
            EventType::RequestMoreInformation
            | EventType::CreateIssue
            | EventType::ListIssues
            | EventType::ListTeams
            | EventType::DoneForNow => {
                matches!(&self.data, EventData::Decision(d) if d.event_type() == self.kind)
            }
            EventType::ListIssuesResult
            | EventType::ListTeamsResult
            | EventType::IssueCreateResult => matches!(self.data, EventData::ToolResult(_)),
            EventType::HumanResponse => matches!(
                self.data,
                EventData::HumanMessage { .. } | EventData::Text(_)
            ),
            EventType::Error => matches!(self.data, EventData::Text(_)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueDraft;

    fn email() -> EmailPayload {
        EmailPayload {
            from_address: "dana@example.com".into(),
            to_address: "assistant@example.com".into(),
            subject: "Login broken".into(),
            body: "Cannot log in since this morning".into(),
            message_id: "<abc@mail>".into(),
            previous_thread: vec![],
            raw_email: String::new(),
            is_test: None,
        }
    }

    #[test]
    fn test_event_serialization_uses_type_field() {
        let event = Event::human_response("yes please");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "human_response");
        assert_eq!(json["data"]["variant"], "human_message");
        assert_eq!(json["data"]["value"]["message"], "yes please");

        let parsed: Event = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_decision_event_takes_intent_as_type() {
        let event = Event::decision(Decision::CreateIssue {
            issue: IssueDraft {
                title: "Bug X".into(),
                description: "Steps".into(),
                team_id: "T1".into(),
            },
        });
        assert_eq!(event.kind, EventType::CreateIssue);
        assert!(event.is_well_formed());
    }

    #[test]
    fn test_denial_text() {
        let event = Event::denial(ApprovalFunction::CreateIssue, Some("not now"));
        assert_eq!(event.kind, EventType::HumanResponse);
        assert_eq!(
            event.data,
            EventData::Text("User denied create_issue with feedback: not now".into())
        );

        let silent = Event::denial(ApprovalFunction::CreateIssue, None);
        assert_eq!(
            silent.data,
            EventData::Text("User denied create_issue without feedback".into())
        );
    }

    #[test]
    fn test_mismatched_payload_is_not_well_formed() {
        let mut event = Event::email_received(email());
        assert!(event.is_well_formed());

        event.kind = EventType::ListTeams;
        assert!(!event.is_well_formed());

        let mut decision = Event::decision(Decision::ListTeams {});
        decision.kind = EventType::ListIssues;
        assert!(!decision.is_well_formed());
    }

    #[test]
    fn test_email_defaults() {
        let json = r#"{
            "from_address": "a@example.com",
            "to_address": "b@example.com",
            "subject": "hi",
            "body": "hello"
        }"#;
        let email: EmailPayload = serde_json::from_str(json).unwrap();
        assert!(!email.is_test());
        assert!(email.previous_thread.is_empty());
        assert_eq!(email.message_id, "");
    }
}
