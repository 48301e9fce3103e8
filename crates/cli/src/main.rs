//! Linear Assistant CLI
//!
//! Operator tool for a running server and for suspended thread states.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use linear_assistant_core::{
    project, Decision, EmailPayload, EventData, EventType, OpaqueState, Thread,
};
use linear_assistant_server::payload::{
    FunctionCall, FunctionCallSpec, FunctionCallStatus, HumanContact, HumanContactSpec,
    HumanContactStatus,
};

const CLI_RUN_ID: &str = "linear-assistant-cli";

#[derive(Parser)]
#[command(name = "linear-assistant")]
#[command(about = "Linear assistant CLI for submitting emails and inspecting threads")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "LINEAR_ASSISTANT_URL", default_value = "http://127.0.0.1:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is up
    Health,

    /// Submit an inbound email as a new thread
    Submit {
        /// Sender address
        #[arg(long)]
        from: String,

        /// Recipient address
        #[arg(long, default_value = "assistant@localhost")]
        to: String,

        #[arg(long)]
        subject: String,

        /// Email body (reads stdin when omitted)
        #[arg(long)]
        body: Option<String>,

        #[arg(long, default_value = "")]
        message_id: String,
    },

    /// Print the prompt the oracle would see for a suspended thread
    Prompt {
        /// State file (raw state or a HumanLayer request carrying spec.state)
        #[arg(long)]
        state: PathBuf,
    },

    /// Summarise the events of a suspended thread
    Inspect {
        #[arg(long)]
        state: PathBuf,
    },

    /// Answer a suspended thread's question with a message
    Respond {
        #[arg(long)]
        state: PathBuf,

        /// Reply text
        #[arg(long)]
        message: String,
    },

    /// Approve or deny the pending create_issue of a suspended thread
    Approve {
        #[arg(long)]
        state: PathBuf,

        /// Deny instead of approving
        #[arg(long)]
        deny: bool,

        /// Feedback sent with a denial
        #[arg(long)]
        comment: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Health => {
            let resp = reqwest::get(format!("{base}/health"))
                .await
                .with_context(|| format!("Failed to reach {base}"))?;
            let status = resp.status();
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            println!("{status} {body}");
            if !status.is_success() {
                bail!("Server is unhealthy");
            }
        }

        Commands::Submit {
            from,
            to,
            subject,
            body,
            message_id,
        } => {
            let body = match body {
                Some(body) => body,
                None => std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?,
            };
            let email = EmailPayload {
                from_address: from,
                to_address: to,
                subject,
                body,
                message_id,
                previous_thread: vec![],
                raw_email: String::new(),
                is_test: None,
            };
            let reply = post(&base, "/webhook/new-email-thread", &serde_json::to_value(&email)?).await?;
            print_reply(&reply);
        }

        Commands::Prompt { state } => {
            let thread = load_thread(&state)?;
            print!("{}", project(&thread));
        }

        Commands::Inspect { state } => {
            let thread = load_thread(&state)?;
            print_summary(&thread);
        }

        Commands::Respond { state, message } => {
            let state = load_state(&state)?;
            let thread = Thread::from_state(&state)?;
            let callback = HumanContact {
                run_id: CLI_RUN_ID.into(),
                call_id: format!("{}-{}", thread.id, thread.len()),
                spec: HumanContactSpec {
                    msg: last_message(&thread).unwrap_or_default(),
                    channel: None,
                    state: Some(state),
                },
                status: Some(HumanContactStatus {
                    response: Some(message),
                    ..Default::default()
                }),
            };
            let reply = post(
                &base,
                "/webhook/human-response-on-existing-thread",
                &serde_json::to_value(&callback)?,
            )
            .await?;
            print_reply(&reply);
        }

        Commands::Approve {
            state,
            deny,
            comment,
        } => {
            let state = load_state(&state)?;
            let thread = Thread::from_state(&state)?;
            let kwargs = pending_issue(&thread)
                .context("Thread is not waiting on a create_issue approval")?;
            let callback = FunctionCall {
                run_id: CLI_RUN_ID.into(),
                call_id: format!("{}-{}", thread.id, thread.len()),
                spec: FunctionCallSpec {
                    function: "create_issue".into(),
                    kwargs,
                    channel: None,
                    state: Some(state),
                },
                status: Some(FunctionCallStatus {
                    approved: Some(!deny),
                    comment,
                    ..Default::default()
                }),
            };
            let reply = post(
                &base,
                "/webhook/human-response-on-existing-thread",
                &serde_json::to_value(&callback)?,
            )
            .await?;
            print_reply(&reply);
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn post(base: &str, endpoint: &str, body: &Value) -> Result<WebhookReply> {
    let url = format!("{base}{endpoint}");
    debug!(url = %url, "Posting to server");

    let resp = reqwest::Client::new()
        .post(&url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;

    let status = resp.status();
    let reply: WebhookReply = resp
        .json()
        .await
        .context("Failed to parse server response")?;
    if !status.is_success() {
        bail!(
            "Server rejected request ({status}): {}",
            reply.error.as_deref().unwrap_or("no details")
        );
    }
    Ok(reply)
}

fn print_reply(reply: &WebhookReply) {
    match (&reply.status, &reply.intent) {
        (Some(status), Some(intent)) => println!("{status} ({intent})"),
        (Some(status), None) => println!("{status}"),
        _ => println!("{reply:?}"),
    }
}

/// Read a state file: either the raw envelope or an object carrying
/// `spec.state`.
fn load_state(path: &Path) -> Result<OpaqueState> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not JSON", path.display()))?;
    Ok(state_from_value(value))
}

fn state_from_value(mut value: Value) -> OpaqueState {
    match value.pointer_mut("/spec/state").map(Value::take) {
        Some(state) if !state.is_null() => OpaqueState::from_value(state),
        _ => OpaqueState::from_value(value),
    }
}

fn load_thread(path: &Path) -> Result<Thread> {
    let state = load_state(path)?;
    Thread::from_state(&state).with_context(|| format!("Invalid thread state in {}", path.display()))
}

/// Arguments of the create_issue decision the thread suspended on.
fn pending_issue(thread: &Thread) -> Option<Value> {
    match &thread.last_event()?.data {
        EventData::Decision(Decision::CreateIssue { issue }) => serde_json::to_value(issue).ok(),
        _ => None,
    }
}

fn last_message(thread: &Thread) -> Option<String> {
    match &thread.last_event()?.data {
        EventData::Decision(Decision::RequestMoreInformation { message })
        | EventData::Decision(Decision::DoneForNow { message }) => Some(message.clone()),
        _ => None,
    }
}

fn print_summary(thread: &Thread) {
    let email = &thread.initial_email;
    println!("Thread {}", thread.id);
    println!("  From:     {}", email.from_address);
    println!("  Subject:  {}", email.subject);
    println!("  Events:   {}", thread.len());
    println!();
    for (i, event) in thread.events.iter().enumerate() {
        println!(
            "  {i:>3}  {}  {:<26} {}",
            event.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            event.kind.as_str(),
            describe(&event.data)
        );
    }
    if let Some(kind) = thread.last_event_type() {
        println!();
        println!("  Waiting:  {}", waiting_on(kind));
    }
}

fn waiting_on(kind: EventType) -> &'static str {
    match kind {
        EventType::RequestMoreInformation => "human reply",
        EventType::CreateIssue => "create_issue approval",
        EventType::DoneForNow => "nothing (done)",
        _ => "unknown (thread was not suspended here)",
    }
}

fn describe(data: &EventData) -> String {
    let text = match data {
        EventData::Email(email) => format!("{} <{}>", email.subject, email.from_address),
        EventData::HumanMessage { message } => message.clone(),
        EventData::Decision(decision) => serde_json::to_string(decision).unwrap_or_default(),
        EventData::Text(text) => text.clone(),
        EventData::ToolResult(value) => match value.as_array() {
            Some(items) => format!("{} item(s)", items.len()),
            None => value.to_string(),
        },
    };
    truncate(&text, 80)
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        format!("{}...", line.chars().take(max).collect::<String>())
    } else {
        line.to_string()
    }
}
