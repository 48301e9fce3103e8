//! HumanLayer wire types: outbound requests, completed callbacks and the
//! typed webhook envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use linear_assistant_core::{ApprovalOutcome, EmailPayload, OpaqueState, ReplyTo};

/// Where a request is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactChannel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailChannel>,
}

/// Email channel replying inside the originating conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailChannel {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental_subject_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental_in_reply_to_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental_references_message_id: Option<String>,
}

impl ContactChannel {
    pub fn in_reply_to(reply_to: &ReplyTo) -> Self {
        let message_id = Some(reply_to.message_id.clone()).filter(|id| !id.is_empty());
        let subject = if reply_to.subject.to_ascii_lowercase().starts_with("re:") {
            reply_to.subject.clone()
        } else {
            format!("Re: {}", reply_to.subject)
        };
        Self {
            email: Some(EmailChannel {
                address: reply_to.address.clone(),
                experimental_subject_line: Some(subject),
                experimental_in_reply_to_message_id: message_id.clone(),
                experimental_references_message_id: message_id,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanContactSpec {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ContactChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<OpaqueState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HumanContactStatus {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub requested_at: Option<String>,
    #[serde(default)]
    pub responded_at: Option<String>,
}

/// A human contact request, outbound or completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanContact {
    pub run_id: String,
    pub call_id: String,
    pub spec: HumanContactSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HumanContactStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallSpec {
    #[serde(rename = "fn")]
    pub function: String,
    #[serde(default)]
    pub kwargs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ContactChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<OpaqueState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallStatus {
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub requested_at: Option<String>,
    #[serde(default)]
    pub responded_at: Option<String>,
}

/// A function approval request, outbound or completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub run_id: String,
    pub call_id: String,
    pub spec: FunctionCallSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FunctionCallStatus>,
}

impl FunctionCall {
    /// The human's decision, if one was recorded.
    pub fn outcome(&self) -> Option<ApprovalOutcome> {
        let status = self.status.as_ref()?;
        ApprovalOutcome::from_status(status.approved, status.comment.clone())
    }
}

/// Body of a completed-call callback on the direct route.
///
/// Function calls are tried first; they are the only shape with `spec.fn`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompletedCall {
    FunctionCall(FunctionCall),
    HumanContact(HumanContact),
}

/// Typed envelope delivered on the generic webhook route.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookEnvelope {
    #[serde(rename = "agent_email.received")]
    EmailReceived {
        #[serde(default)]
        is_test: bool,
        event: EmailPayload,
    },

    #[serde(rename = "human_contact.completed")]
    HumanContactCompleted {
        #[serde(default)]
        is_test: bool,
        event: HumanContact,
    },

    #[serde(rename = "function_call.completed")]
    FunctionCallCompleted {
        #[serde(default)]
        is_test: bool,
        event: FunctionCall,
    },
}

impl WebhookEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEnvelope::EmailReceived { .. } => "agent_email.received",
            WebhookEnvelope::HumanContactCompleted { .. } => "human_contact.completed",
            WebhookEnvelope::FunctionCallCompleted { .. } => "function_call.completed",
        }
    }
}

/// Reduce `Name <addr@host>` to `addr@host`.
pub fn normalize_address(address: &str) -> &str {
    let trimmed = address.trim();
    match (trimmed.find('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start + 1 < end => trimmed[start + 1..end].trim(),
        _ => trimmed,
    }
}
