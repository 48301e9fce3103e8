//! Step dispatcher - the thread execution loop.
//!
//! Each iteration projects the thread, asks the oracle for the next step,
//! records the decision and acts on it. Read-only lookups run inline and
//! loop; anything needing a human suspends the thread by handing its
//! serialized state to the approval platform.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::decision::{ApprovalFunction, Decision};
use crate::event::{EmailPayload, Event};
use crate::issue::{Issue, IssueDraft, Team};
use crate::prompt;
use crate::thread::{OpaqueState, Thread};
use crate::Error;

/// Default cap on oracle calls per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Default wall-clock budget per run.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(600);

/// Default timeout for a single external call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(180);

/// The reasoning oracle.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Map a projected thread to a raw decision object with an `intent` field.
    async fn determine_next_step(&self, prompt: &str) -> Result<Value, Error>;
}

/// The issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn list_issues(
        &self,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Issue>, Error>;

    async fn list_teams(&self) -> Result<Vec<Team>, Error>;

    /// The only mutating call. Reached only after human approval.
    async fn create_issue(&self, draft: &IssueDraft) -> Result<Issue, Error>;
}

/// The human approval/contact platform.
///
/// Both calls are fire-and-forget; the platform later delivers a callback
/// carrying the request's state back unchanged.
#[async_trait]
pub trait ApprovalPlatform: Send + Sync {
    async fn request_human_contact(&self, request: HumanContactRequest) -> Result<(), Error>;

    async fn request_function_approval(
        &self,
        request: FunctionApprovalRequest,
    ) -> Result<(), Error>;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn determine_next_step(&self, prompt: &str) -> Result<Value, Error> {
        (**self).determine_next_step(prompt).await
    }
}

#[async_trait]
impl<T: IssueTracker + ?Sized> IssueTracker for Arc<T> {
    async fn list_issues(
        &self,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Issue>, Error> {
        (**self).list_issues(from_time, to_time).await
    }

    async fn list_teams(&self) -> Result<Vec<Team>, Error> {
        (**self).list_teams().await
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<Issue, Error> {
        (**self).create_issue(draft).await
    }
}

#[async_trait]
impl<T: ApprovalPlatform + ?Sized> ApprovalPlatform for Arc<T> {
    async fn request_human_contact(&self, request: HumanContactRequest) -> Result<(), Error> {
        (**self).request_human_contact(request).await
    }

    async fn request_function_approval(
        &self,
        request: FunctionApprovalRequest,
    ) -> Result<(), Error> {
        (**self).request_function_approval(request).await
    }
}

/// Where replies to the initiating email should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTo {
    pub address: String,
    pub subject: String,
    pub message_id: String,
}

impl ReplyTo {
    fn from_email(email: &EmailPayload) -> Self {
        Self {
            address: email.from_address.clone(),
            subject: email.subject.clone(),
            message_id: email.message_id.clone(),
        }
    }
}

/// Ask a human for input (or notify them) and suspend.
#[derive(Debug, Clone)]
pub struct HumanContactRequest {
    pub thread_id: String,
    pub message: String,
    pub reply_to: ReplyTo,
    pub state: OpaqueState,
}

/// Ask a human to approve a function call and suspend.
#[derive(Debug, Clone)]
pub struct FunctionApprovalRequest {
    pub thread_id: String,
    pub function: ApprovalFunction,
    pub kwargs: Value,
    pub reply_to: ReplyTo,
    pub state: OpaqueState,
}

/// Bounds on a single run of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_iterations: u32,
    pub max_duration: Option<Duration>,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_duration: Some(DEFAULT_MAX_DURATION),
        }
    }
}

/// Dispatcher state for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Iterating.
    Running,
    /// Waiting for a human message callback.
    SuspendedForInput,
    /// Waiting for an approve/deny callback.
    SuspendedForApproval,
    /// Final notification sent.
    Done,
    /// Gave up after exhausting the run budget.
    BudgetExceeded,
}

impl DispatchState {
    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            DispatchState::SuspendedForInput | DispatchState::SuspendedForApproval
        )
    }
}

/// Outcome of a run: the terminal state and the thread as it was left.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub state: DispatchState,
    pub thread: Thread,
    pub iterations: u32,
}

/// Drives threads until they suspend, finish, or exhaust their budget.
///
/// Holds only stateless capability handles, so one dispatcher can serve any
/// number of concurrent runs.
pub struct StepDispatcher<O, T, P> {
    pub(crate) oracle: O,
    pub(crate) tracker: T,
    pub(crate) platform: P,
    budget: Budget,
    call_timeout: Duration,
}

impl<O, T, P> StepDispatcher<O, T, P>
where
    O: Oracle,
    T: IssueTracker,
    P: ApprovalPlatform,
{
    pub fn new(oracle: O, tracker: T, platform: P) -> Self {
        Self {
            oracle,
            tracker,
            platform,
            budget: Budget::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Start a new thread from an inbound email and run it.
    pub async fn start(&self, email: EmailPayload) -> Result<Dispatch, Error> {
        self.run(Thread::new(email)).await
    }

    /// Run a thread with the dispatcher's default budget.
    pub async fn run(&self, thread: Thread) -> Result<Dispatch, Error> {
        self.run_with_budget(thread, self.budget).await
    }

    /// Run a thread until it suspends, finishes, or exceeds `budget`.
    pub async fn run_with_budget(&self, thread: Thread, budget: Budget) -> Result<Dispatch, Error> {
        let span = info_span!("thread", thread_id = %thread.id);
        self.drive(thread, budget).instrument(span).await
    }

    async fn drive(&self, mut thread: Thread, budget: Budget) -> Result<Dispatch, Error> {
        info!(
            last_event = ?thread.last_event_type(),
            events = thread.len(),
            "Thread received, determining next step"
        );

        let started = Instant::now();
        let mut iterations = 0;

        loop {
            if iterations >= budget.max_iterations
                || budget.max_duration.is_some_and(|d| started.elapsed() >= d)
            {
                warn!(
                    iterations,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Run budget exceeded, stopping"
                );
                return Ok(Dispatch {
                    state: DispatchState::BudgetExceeded,
                    thread,
                    iterations,
                });
            }
            iterations += 1;

            let prompt = prompt::project(&thread);
            debug!(iteration = iterations, prompt_len = prompt.len(), "Asking oracle");
            let raw = self
                .guarded("determine_next_step", self.oracle.determine_next_step(&prompt))
                .await?;
            let decision = Decision::classify(raw)?;
            info!(iteration = iterations, intent = decision.intent(), "Next step");

            thread.push(Event::decision(decision.clone()));

            let state = self.step(&mut thread, decision).await?;
            if state != DispatchState::Running {
                info!(state = ?state, events = thread.len(), "Thread handed off");
                return Ok(Dispatch {
                    state,
                    thread,
                    iterations,
                });
            }
        }
    }

    /// Act on a recorded decision.
    async fn step(&self, thread: &mut Thread, decision: Decision) -> Result<DispatchState, Error> {
        match decision {
            Decision::RequestMoreInformation { message } => {
                let request = self.contact_request(thread, message)?;
                self.guarded(
                    "request_human_contact",
                    self.platform.request_human_contact(request),
                )
                .await?;
                Ok(DispatchState::SuspendedForInput)
            }

            Decision::CreateIssue { issue } => {
                let function = ApprovalFunction::CreateIssue;
                let request = FunctionApprovalRequest {
                    thread_id: thread.id.clone(),
                    function,
                    kwargs: serde_json::to_value(&issue)?,
                    reply_to: ReplyTo::from_email(&thread.initial_email),
                    state: thread.to_state()?,
                };
                self.guarded(
                    "request_function_approval",
                    self.platform.request_function_approval(request),
                )
                .await?;
                Ok(DispatchState::SuspendedForApproval)
            }

            Decision::ListIssues { from_time, to_time } => {
                let result = self
                    .guarded(
                        "list_issues",
                        self.tracker
                            .list_issues(from_time.as_deref(), to_time.as_deref()),
                    )
                    .await;
                let event = match result {
                    Ok(issues) => Event::list_issues_result(serde_json::to_value(&issues)?),
                    Err(e) => lookup_failed("list_issues", &e),
                };
                thread.push(event);
                Ok(DispatchState::Running)
            }

            Decision::ListTeams {} => {
                let event = match self.guarded("list_teams", self.tracker.list_teams()).await {
                    Ok(teams) => Event::list_teams_result(serde_json::to_value(&teams)?),
                    Err(e) => lookup_failed("list_teams", &e),
                };
                thread.push(event);
                Ok(DispatchState::Running)
            }

            Decision::DoneForNow { message } => {
                let request = self.contact_request(thread, message)?;
                self.guarded(
                    "request_human_contact",
                    self.platform.request_human_contact(request),
                )
                .await?;
                Ok(DispatchState::Done)
            }
        }
    }

    fn contact_request(&self, thread: &Thread, message: String) -> Result<HumanContactRequest, Error> {
        Ok(HumanContactRequest {
            thread_id: thread.id.clone(),
            message,
            reply_to: ReplyTo::from_email(&thread.initial_email),
            state: thread.to_state()?,
        })
    }

    /// Bound an external call by the configured timeout.
    pub(crate) async fn guarded<R>(
        &self,
        call: &'static str,
        fut: impl Future<Output = Result<R, Error>>,
    ) -> Result<R, Error> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                call,
                after: self.call_timeout,
            }),
        }
    }
}

fn lookup_failed(call: &str, err: &Error) -> Event {
    warn!(call, error = %err, "Lookup failed, recording error event");
    Event::error(format!("error running {call}: {err}"))
}
