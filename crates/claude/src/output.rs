//! Claude Code output parsing.
//!
//! Parses the stream-json output format from Claude Code CLI and pulls the
//! decision object out of the final result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use linear_assistant_core::Error;

/// Input message to send to Claude Code.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeInput {
    User { message: InputMessage },
}

#[derive(Debug, Clone, Serialize)]
pub struct InputMessage {
    pub role: &'static str,
    pub content: String,
}

impl ClaudeInput {
    pub fn user(content: String) -> Self {
        ClaudeInput::User {
            message: InputMessage {
                role: "user",
                content,
            },
        }
    }
}

/// Output message from Claude Code (stream-json format).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeOutput {
    /// System information at start.
    System {
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },

    /// Assistant message content.
    Assistant {
        #[serde(default)]
        message: Option<AssistantMessage>,
    },

    /// Echoed user message.
    User {},

    /// Result/completion message.
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        usage: Option<Usage>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl ClaudeOutput {
    /// Check if this is a result/completion message.
    pub fn is_result(&self) -> bool {
        matches!(self, ClaudeOutput::Result { .. })
    }

    /// Extract text content if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match self {
            ClaudeOutput::Assistant {
                message: Some(msg),
            } => msg.content.iter().find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }
}

/// Text of the final result, or the last assistant text if the result
/// carried none.
pub fn final_text(outputs: &[ClaudeOutput]) -> Result<String, Error> {
    let result = outputs.iter().rev().find(|o| o.is_result());

    match result {
        Some(ClaudeOutput::Result {
            is_error: true,
            subtype,
            result,
            ..
        }) => Err(Error::Oracle(format!(
            "Claude returned an error ({subtype}): {}",
            result.as_deref().unwrap_or("no details")
        ))),
        Some(ClaudeOutput::Result {
            result: Some(text), ..
        }) if !text.trim().is_empty() => Ok(text.clone()),
        Some(_) => outputs
            .iter()
            .rev()
            .find_map(ClaudeOutput::text)
            .map(str::to_owned)
            .ok_or_else(|| Error::Oracle("Claude result carried no text".into())),
        None => Err(Error::Oracle("Claude exited without a result".into())),
    }
}

/// Extract the decision object from free-form model text.
///
/// Tolerates code fences and prose around a single JSON object.
pub fn parse_decision(text: &str) -> Result<Value, Error> {
    let start = text.find('{');
    let end = text.rfind('}');
    let candidate = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(Error::Oracle(format!(
                "no JSON object in Claude response: {}",
                preview(text)
            )));
        }
    };

    let value: Value = serde_json::from_str(candidate).map_err(|e| {
        Error::Oracle(format!("invalid JSON in Claude response ({e}): {}", preview(text)))
    })?;

    if !value.is_object() {
        return Err(Error::Oracle("Claude decision is not an object".into()));
    }
    Ok(value)
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
