//! Claude Code process management.
//!
//! Spawns Claude Code CLI in stream-json mode for each decision. The process
//! gets the projected thread as its only user message, is limited to a
//! single turn, and must answer with one JSON decision object.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use linear_assistant_core::{Error, Oracle, INTENTS};

use crate::output::{self, ClaudeInput, ClaudeOutput};

/// Output contract handed to Claude on every call.
pub const DECISION_SYSTEM_PROMPT: &str = r###"You triage inbound email requests into Linear issues.

You receive the history of one thread as tagged events, oldest first. Decide the single next step and answer with exactly one JSON object and nothing else.

Allowed shapes:

{"intent": "list_teams"}
{"intent": "list_issues", "from_time": "<ISO-8601 or null>", "to_time": "<ISO-8601 or null>"}
{"intent": "create_issue", "issue": {"title": "...", "description": "...", "team_id": "..."}}
{"intent": "request_more_information", "message": "..."}
{"intent": "done_for_now", "message": "..."}

Creating an issue is sent to a human for approval. Look up team ids with list_teams before proposing an issue.
"###;

/// Reasoning oracle backed by the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeOracle {
    binary: String,
    model: Option<String>,
}

impl ClaudeOracle {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--print")
            .args(["--input-format", "stream-json"])
            .args(["--output-format", "stream-json"])
            .arg("--verbose")
            .args(["--max-turns", "1"])
            .args(["--append-system-prompt", DECISION_SYSTEM_PROMPT]);
        if let Some(model) = &self.model {
            cmd.args(["--model", model]);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    /// Send one user message and collect all outputs until the result.
    pub async fn send(&self, content: &str) -> Result<Vec<ClaudeOutput>, Error> {
        info!(content_len = content.len(), "Spawning Claude Code for next step");

        let mut child = self.command().spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Oracle("Failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Oracle("Failed to capture stdout".into()))?;

        let input = ClaudeInput::user(content.to_owned());
        let mut line = serde_json::to_string(&input)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        // Closing stdin ends the stream-json conversation after one turn.
        drop(stdin);

        let mut outputs = Vec::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<ClaudeOutput>(trimmed) {
                Ok(output) => {
                    if let ClaudeOutput::Result {
                        is_error,
                        total_cost_usd,
                        usage,
                        ..
                    } = &output
                    {
                        let tokens = usage
                            .as_ref()
                            .map(|u| u.input_tokens + u.output_tokens)
                            .unwrap_or(0);
                        info!(
                            is_error = %is_error,
                            cost_usd = ?total_cost_usd,
                            total_tokens = tokens,
                            "Claude completed"
                        );
                    }

                    let is_result = output.is_result();
                    outputs.push(output);
                    if is_result {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, line = trimmed, "Skipping unrecognised Claude output line");
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            warn!(status = %status, "Claude Code exited with failure status");
        }

        Ok(outputs)
    }
}

#[async_trait]
impl Oracle for ClaudeOracle {
    async fn determine_next_step(&self, prompt: &str) -> Result<Value, Error> {
        let outputs = self.send(prompt).await?;
        let text = output::final_text(&outputs)?;
        let decision = output::parse_decision(&text)?;

        match decision.get("intent").and_then(Value::as_str) {
            Some(intent) if INTENTS.contains(&intent) => debug!(intent, "Claude decided"),
            intent => warn!(intent = ?intent, "Claude returned an unexpected intent"),
        }

        Ok(decision)
    }
}
