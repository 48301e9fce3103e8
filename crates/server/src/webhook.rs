//! Webhook HTTP handlers.
//!
//! Every route acknowledges immediately and runs the thread on a spawned
//! task. Anything that can be rejected without calling out (missing or
//! corrupt state, unknown functions, empty responses) is rejected with 400
//! before the task is spawned.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use linear_assistant_core::{
    ApprovalFunction, ApprovalOutcome, ApprovalPlatform, Dispatch, EmailPayload, Error,
    IssueTracker, OpaqueState, Oracle, StepDispatcher, Thread,
};

use crate::payload::{normalize_address, CompletedCall, FunctionCall, HumanContact, WebhookEnvelope};

/// Entry points the webhook routes drive.
///
/// Arguments are owned so a run can move onto a spawned task.
#[async_trait]
pub trait ThreadRunner: Send + Sync + 'static {
    async fn start_thread(&self, email: EmailPayload) -> Result<Dispatch, Error>;

    async fn resume_message(&self, state: OpaqueState, message: String) -> Result<Dispatch, Error>;

    async fn resume_approval(
        &self,
        state: OpaqueState,
        function: String,
        kwargs: Value,
        outcome: Option<ApprovalOutcome>,
    ) -> Result<Dispatch, Error>;
}

#[async_trait]
impl<O, T, P> ThreadRunner for StepDispatcher<O, T, P>
where
    O: Oracle + 'static,
    T: IssueTracker + 'static,
    P: ApprovalPlatform + 'static,
{
    async fn start_thread(&self, email: EmailPayload) -> Result<Dispatch, Error> {
        self.start(email).await
    }

    async fn resume_message(&self, state: OpaqueState, message: String) -> Result<Dispatch, Error> {
        self.resume_with_message(Some(&state), &message).await
    }

    async fn resume_approval(
        &self,
        state: OpaqueState,
        function: String,
        kwargs: Value,
        outcome: Option<ApprovalOutcome>,
    ) -> Result<Dispatch, Error> {
        self.resume_with_approval(Some(&state), &function, &kwargs, outcome)
            .await
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn ThreadRunner>,
    /// Allowed senders (empty = allow all)
    pub allowed_source_emails: Vec<String>,
    /// Allowed recipients (empty = allow all)
    pub allowed_target_emails: Vec<String>,
    /// Liveness probes arrive from this sender and are never run.
    pub test_sender: String,
}

impl AppState {
    fn is_test_sender(&self, from_address: &str) -> bool {
        normalize_address(from_address).eq_ignore_ascii_case(&self.test_sender)
    }

    fn is_sender_allowed(&self, from_address: &str) -> bool {
        is_listed(&self.allowed_source_emails, normalize_address(from_address))
    }

    fn is_recipient_allowed(&self, to_address: &str) -> bool {
        is_listed(&self.allowed_target_emails, normalize_address(to_address))
    }
}

fn is_listed(list: &[String], address: &str) -> bool {
    list.is_empty() || list.iter().any(|a| a.eq_ignore_ascii_case(address))
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(envelope_handler))
        .route("/webhook/new-email-thread", post(new_email_thread_handler))
        .route(
            "/webhook/human-response-on-existing-thread",
            post(human_response_handler),
        )
        .with_state(Arc::new(state))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub(crate) struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<&'static str>,
}

type Reply = Result<(StatusCode, Json<WebhookResponse>), AppError>;

fn accepted() -> (StatusCode, Json<WebhookResponse>) {
    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "ok",
            intent: None,
        }),
    )
}

fn acknowledged(intent: &'static str) -> (StatusCode, Json<WebhookResponse>) {
    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "ok",
            intent: Some(intent),
        }),
    )
}

async fn new_email_thread_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Reply {
    let raw: Value = parse_body(&body)?;
    if is_test_probe(&state, &raw) {
        info!("Test probe received, skipping");
        return Ok(acknowledged("test"));
    }
    handle_email(&state, decode(raw)?, false)
}

async fn human_response_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    match parse_body(&body)? {
        CompletedCall::FunctionCall(call) => handle_function_call(&state, call),
        CompletedCall::HumanContact(contact) => handle_human_contact(&state, contact),
    }
}

/// Generic route accepting the platform's typed envelope.
async fn envelope_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Reply {
    let raw: Value = parse_body(&body)?;
    if is_test_probe(&state, &raw)
        || (raw["type"] == "agent_email.received" && is_test_probe(&state, &raw["event"]))
    {
        info!(kind = raw["type"].as_str().unwrap_or("unknown"), "Test probe received, skipping");
        return Ok(acknowledged("test"));
    }

    let envelope: WebhookEnvelope = decode(raw)?;
    info!(kind = envelope.kind(), "Webhook received");

    match envelope {
        WebhookEnvelope::EmailReceived { is_test, event } => handle_email(&state, event, is_test),
        WebhookEnvelope::HumanContactCompleted { event, .. } => handle_human_contact(&state, event),
        WebhookEnvelope::FunctionCallCompleted { event, .. } => {
            handle_function_call(&state, event)
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        if let Ok(s) = std::str::from_utf8(body) {
            debug!(error = %e, body = %s, "Failed to parse webhook body");
        }
        AppError::BadRequest(format!("Invalid webhook payload: {e}"))
    })
}

fn decode<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, AppError> {
    serde_json::from_value(raw).map_err(|e| {
        debug!(error = %e, "Webhook body has the wrong shape");
        AppError::BadRequest(format!("Invalid webhook payload: {e}"))
    })
}

/// Probes only need `is_test` or the sentinel sender, not a whole email.
fn is_test_probe(state: &AppState, raw: &Value) -> bool {
    raw.get("is_test").and_then(Value::as_bool).unwrap_or(false)
        || raw
            .get("from_address")
            .and_then(Value::as_str)
            .is_some_and(|from| state.is_test_sender(from))
}

fn handle_email(state: &AppState, email: EmailPayload, is_test: bool) -> Reply {
    if is_test || email.is_test() || state.is_test_sender(&email.from_address) {
        info!(from = %email.from_address, "Test email received, skipping");
        return Ok(acknowledged("test"));
    }

    if !state.is_sender_allowed(&email.from_address) {
        info!(
            from = %email.from_address,
            parsed = normalize_address(&email.from_address),
            "Email from non-allowed sender, skipping"
        );
        return Ok(acknowledged("ignored"));
    }

    if !state.is_recipient_allowed(&email.to_address) {
        info!(
            to = %email.to_address,
            parsed = normalize_address(&email.to_address),
            "Email to non-target address, skipping"
        );
        return Ok(acknowledged("ignored"));
    }

    info!(
        from = %email.from_address,
        to = %email.to_address,
        subject = %email.subject,
        "New email received"
    );

    let runner = state.runner.clone();
    tokio::spawn(async move {
        log_outcome("new thread", runner.start_thread(email).await);
    });
    Ok(accepted())
}

fn handle_human_contact(state: &AppState, contact: HumanContact) -> Reply {
    let thread_state = require_state(contact.spec.state)?;
    let thread = validate_state(&thread_state)?;

    let message = contact
        .status
        .and_then(|s| s.response)
        .ok_or_else(|| AppError::BadRequest("human contact completed without a response".into()))?;

    info!(
        thread_id = %thread.id,
        call_id = %contact.call_id,
        events = thread.len(),
        "Human response received"
    );

    let runner = state.runner.clone();
    tokio::spawn(async move {
        log_outcome(
            "human response",
            runner.resume_message(thread_state, message).await,
        );
    });
    Ok(accepted())
}

fn handle_function_call(state: &AppState, call: FunctionCall) -> Reply {
    let outcome = call.outcome();
    let thread_state = require_state(call.spec.state)?;
    let thread = validate_state(&thread_state)?;
    ApprovalFunction::parse(&call.spec.function)?;
    if outcome.is_none() {
        return Err(Error::MissingApprovalStatus.into());
    }

    info!(
        thread_id = %thread.id,
        call_id = %call.call_id,
        function = %call.spec.function,
        approved = matches!(outcome, Some(ApprovalOutcome::Approved)),
        events = thread.len(),
        "Function call response received"
    );

    let runner = state.runner.clone();
    let function = call.spec.function;
    let kwargs = call.spec.kwargs;
    tokio::spawn(async move {
        log_outcome(
            "approval response",
            runner
                .resume_approval(thread_state, function, kwargs, outcome)
                .await,
        );
    });
    Ok(accepted())
}

fn require_state(state: Option<OpaqueState>) -> Result<OpaqueState, AppError> {
    state.ok_or_else(|| {
        warn!("Received human response without state");
        Error::MissingState.into()
    })
}

fn validate_state(state: &OpaqueState) -> Result<Thread, AppError> {
    Thread::from_state(state).map_err(|e| {
        warn!(error = %e, "Received human response with unreadable state");
        e.into()
    })
}

fn log_outcome(kind: &str, result: Result<Dispatch, Error>) {
    match result {
        Ok(dispatch) => info!(
            thread_id = %dispatch.thread.id,
            state = ?dispatch.state,
            iterations = dispatch.iterations,
            events = dispatch.thread.len(),
            "Finished processing {kind}"
        ),
        Err(e) => error!(
            error = %e,
            contract_violation = e.is_contract_violation(),
            "Error processing {kind}"
        ),
    }
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        if err.is_contract_violation() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use linear_assistant_core::{
        FunctionApprovalRequest, HumanContactRequest, Issue, IssueDraft, Team,
    };
    use serde_json::json;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct ScriptedOracle {
        script: Mutex<Vec<Value>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(mut script: Vec<Value>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn determine_next_step(&self, prompt: &str) -> Result<Value, Error> {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            self.script
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Oracle("script exhausted".into()))
        }
    }

    #[derive(Default)]
    struct RecordingTracker {
        created: Mutex<Vec<IssueDraft>>,
    }

    #[async_trait]
    impl IssueTracker for RecordingTracker {
        async fn list_issues(&self, _: Option<&str>, _: Option<&str>) -> Result<Vec<Issue>, Error> {
            Ok(vec![])
        }

        async fn list_teams(&self) -> Result<Vec<Team>, Error> {
            Ok(vec![Team {
                id: "T1".into(),
                name: "Ops".into(),
                key: None,
            }])
        }

        async fn create_issue(&self, draft: &IssueDraft) -> Result<Issue, Error> {
            self.created.lock().unwrap().push(draft.clone());
            Ok(Issue {
                id: "I9".into(),
                identifier: Some("OPS-9".into()),
                title: draft.title.clone(),
                description: Some(draft.description.clone()),
                url: None,
                created_at: None,
            })
        }
    }

    #[derive(Debug)]
    enum Sent {
        Contact(HumanContactRequest),
        Approval(FunctionApprovalRequest),
    }

    struct ChannelPlatform {
        tx: mpsc::UnboundedSender<Sent>,
    }

    #[async_trait]
    impl ApprovalPlatform for ChannelPlatform {
        async fn request_human_contact(&self, request: HumanContactRequest) -> Result<(), Error> {
            let _ = self.tx.send(Sent::Contact(request));
            Ok(())
        }

        async fn request_function_approval(
            &self,
            request: FunctionApprovalRequest,
        ) -> Result<(), Error> {
            let _ = self.tx.send(Sent::Approval(request));
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        oracle: Arc<ScriptedOracle>,
        tracker: Arc<RecordingTracker>,
        sent: mpsc::UnboundedReceiver<Sent>,
    }

    impl Harness {
        fn new(script: Vec<Value>) -> Self {
            Self::with_allow_lists(script, vec![], vec![])
        }

        fn with_allow_lists(script: Vec<Value>, sources: Vec<String>, targets: Vec<String>) -> Self {
            let oracle = ScriptedOracle::new(script);
            let tracker = Arc::new(RecordingTracker::default());
            let (tx, sent) = mpsc::unbounded_channel();
            let dispatcher =
                StepDispatcher::new(oracle.clone(), tracker.clone(), Arc::new(ChannelPlatform { tx }));
            let app = router(AppState {
                runner: Arc::new(dispatcher),
                allowed_source_emails: sources,
                allowed_target_emails: targets,
                test_sender: "overworked-admin@coolcompany.com".into(),
            });
            Self {
                app,
                oracle,
                tracker,
                sent,
            }
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        async fn next_sent(&mut self) -> Sent {
            tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
                .await
                .expect("spawned run did not reach the platform")
                .expect("platform channel closed")
        }
    }

    fn email(from: &str, to: &str) -> Value {
        json!({
            "from_address": from,
            "to_address": to,
            "subject": "Fridge",
            "body": "Please restock the fridge",
            "message_id": "<m1@mail>",
            "previous_thread": [],
            "raw_email": ""
        })
    }

    fn approval_callback(state: &OpaqueState, kwargs: &Value, approved: Option<bool>) -> Value {
        json!({
            "run_id": "linear-assistant",
            "call_id": "c1",
            "spec": {"fn": "create_issue", "kwargs": kwargs, "state": state},
            "status": {"approved": approved, "comment": "not this week"}
        })
    }

    /// Drive a new email to the approval suspension.
    async fn suspend_for_approval(harness: &mut Harness) -> FunctionApprovalRequest {
        let (status, body) = harness
            .post("/webhook/new-email-thread", email("dana@example.com", "bot@example.com"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        match harness.next_sent().await {
            Sent::Approval(request) => request,
            other => panic!("expected approval request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let harness = Harness::new(vec![]);
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_email_to_approval_then_approved() {
        let mut harness = Harness::new(vec![
            json!({"intent": "list_teams"}),
            json!({"intent": "create_issue", "issue": {"title": "Restock", "description": "Fridge empty", "team_id": "T1"}}),
            json!({"intent": "done_for_now", "message": "Filed OPS-9"}),
        ]);

        let request = suspend_for_approval(&mut harness).await;
        assert_eq!(request.reply_to.address, "dana@example.com");
        assert!(harness.tracker.created.lock().unwrap().is_empty());

        let (status, body) = harness
            .post(
                "/webhook/human-response-on-existing-thread",
                approval_callback(&request.state, &request.kwargs, Some(true)),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        match harness.next_sent().await {
            Sent::Contact(contact) => assert_eq!(contact.message, "Filed OPS-9"),
            other => panic!("expected final contact, got {other:?}"),
        }
        assert_eq!(harness.tracker.created.lock().unwrap().len(), 1);
        assert!(harness.oracle.prompts()[2].contains("<issue_create_result>"));
    }

    #[tokio::test]
    async fn test_denial_records_feedback() {
        let mut harness = Harness::new(vec![
            json!({"intent": "create_issue", "issue": {"title": "Restock", "description": "d", "team_id": "T1"}}),
            json!({"intent": "request_more_information", "message": "What should I do instead?"}),
        ]);

        let request = suspend_for_approval(&mut harness).await;
        let (status, _) = harness
            .post(
                "/webhook/human-response-on-existing-thread",
                approval_callback(&request.state, &request.kwargs, Some(false)),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        assert!(matches!(harness.next_sent().await, Sent::Contact(_)));
        assert!(harness.tracker.created.lock().unwrap().is_empty());
        assert!(harness.oracle.prompts()[1]
            .contains("User denied create_issue with feedback: not this week"));
    }

    #[tokio::test]
    async fn test_missing_state_is_rejected() {
        let harness = Harness::new(vec![]);
        let (status, body) = harness
            .post(
                "/webhook/human-response-on-existing-thread",
                json!({
                    "run_id": "r", "call_id": "c",
                    "spec": {"msg": "Which team?"},
                    "status": {"response": "Ops"}
                }),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "state is required");
        assert!(harness.oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_null_approval_status_is_rejected() {
        let mut harness = Harness::new(vec![json!({
            "intent": "create_issue",
            "issue": {"title": "Restock", "description": "d", "team_id": "T1"}
        })]);
        let request = suspend_for_approval(&mut harness).await;

        let (status, body) = harness
            .post(
                "/webhook/human-response-on-existing-thread",
                approval_callback(&request.state, &request.kwargs, None),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "got function call webhook with null status");
        assert!(harness.tracker.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_function_is_rejected() {
        let mut harness = Harness::new(vec![json!({
            "intent": "create_issue",
            "issue": {"title": "Restock", "description": "d", "team_id": "T1"}
        })]);
        let request = suspend_for_approval(&mut harness).await;

        let mut callback = approval_callback(&request.state, &request.kwargs, Some(true));
        callback["spec"]["fn"] = json!("delete_issue");
        let (status, body) = harness
            .post("/webhook/human-response-on-existing-thread", callback)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown function call: delete_issue");
    }

    #[tokio::test]
    async fn test_test_sender_is_acknowledged_and_skipped() {
        let harness = Harness::new(vec![]);
        let (status, body) = harness
            .post(
                "/webhook/new-email-thread",
                email("Admin <overworked-admin@coolcompany.com>", "bot@example.com"),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "intent": "test"}));
        assert!(harness.oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_partial_test_probes_are_acknowledged() {
        let harness = Harness::new(vec![]);

        for probe in [
            json!({"is_test": true}),
            json!({"from_address": "overworked-admin@coolcompany.com"}),
        ] {
            let (status, body) = harness.post("/webhook/new-email-thread", probe).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"status": "ok", "intent": "test"}));
        }

        let (status, body) = harness
            .post("/webhook", json!({"type": "agent_email.received", "is_test": true, "event": {}}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intent"], "test");

        let (status, body) = harness
            .post(
                "/webhook",
                json!({"type": "agent_email.received", "event": {"from_address": "overworked-admin@coolcompany.com"}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intent"], "test");

        // Anything else still needs a complete email.
        let (status, _) = harness
            .post("/webhook/new-email-thread", json!({"from_address": "dana@example.com"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(harness.oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_allow_lists() {
        let harness = Harness::with_allow_lists(
            vec![],
            vec!["dana@example.com".into()],
            vec!["bot@example.com".into()],
        );

        let (_, body) = harness
            .post("/webhook/new-email-thread", email("eve@example.com", "bot@example.com"))
            .await;
        assert_eq!(body["intent"], "ignored");

        let (_, body) = harness
            .post("/webhook/new-email-thread", email("dana@example.com", "other@example.com"))
            .await;
        assert_eq!(body["intent"], "ignored");
        assert!(harness.oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_envelope_routes_human_contact() {
        let mut harness = Harness::new(vec![
            json!({"intent": "request_more_information", "message": "Which team?"}),
            json!({"intent": "done_for_now", "message": "Thanks"}),
        ]);

        let (_, body) = harness
            .post(
                "/webhook",
                json!({"type": "agent_email.received", "is_test": false, "event": email("dana@example.com", "bot@example.com")}),
            )
            .await;
        assert_eq!(body, json!({"status": "ok"}));
        let Sent::Contact(question) = harness.next_sent().await else {
            panic!("expected question");
        };

        let (status, _) = harness
            .post(
                "/webhook",
                json!({
                    "type": "human_contact.completed",
                    "is_test": false,
                    "event": {
                        "run_id": "linear-assistant", "call_id": "c2",
                        "spec": {"msg": question.message, "state": question.state},
                        "status": {"response": "Ops team"}
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let Sent::Contact(done) = harness.next_sent().await else {
            panic!("expected final contact");
        };
        assert_eq!(done.message, "Thanks");
        assert!(harness.oracle.prompts()[1]
            .ends_with("<human_response>\nMessage: Ops team\n</human_response>\n\n"));
    }

    #[tokio::test]
    async fn test_envelope_test_flag_and_unknown_type() {
        let harness = Harness::new(vec![]);

        let (_, body) = harness
            .post(
                "/webhook",
                json!({"type": "agent_email.received", "is_test": true, "event": email("dana@example.com", "bot@example.com")}),
            )
            .await;
        assert_eq!(body["intent"], "test");

        let (status, _) = harness
            .post("/webhook", json!({"type": "agent_slack.received", "event": {}}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_corrupt_state_is_rejected() {
        let harness = Harness::new(vec![]);
        let (status, _) = harness
            .post(
                "/webhook/human-response-on-existing-thread",
                json!({
                    "run_id": "r", "call_id": "c",
                    "spec": {"msg": "?", "state": {"version": 99, "thread": {}}},
                    "status": {"response": "hi"}
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
