//! Issue tracker records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Issue fields proposed by the oracle, pending approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    /// Destination team (queue) in the tracker.
    pub team_id: String,
}

impl IssueDraft {
    /// Read a draft back from approval arguments.
    ///
    /// Accepts the draft fields at the top level or nested under `issue`.
    pub fn from_arguments(kwargs: &Value) -> Result<Self, Error> {
        let fields = kwargs.get("issue").unwrap_or(kwargs);
        serde_json::from_value(fields.clone())
            .map_err(|e| Error::InvalidArguments(format!("create_issue: {e}")))
    }
}

/// An issue as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A team as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}
