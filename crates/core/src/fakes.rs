//! Recording fakes of the capability traits for dispatcher tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatcher::{
    ApprovalPlatform, FunctionApprovalRequest, HumanContactRequest, IssueTracker, Oracle,
    StepDispatcher,
};
use crate::event::EmailPayload;
use crate::issue::{Issue, IssueDraft, Team};
use crate::Error;

pub(crate) type FakeDispatcher =
    StepDispatcher<Arc<ScriptedOracle>, Arc<RecordingTracker>, Arc<RecordingPlatform>>;

pub(crate) fn dispatcher(
    oracle: &Arc<ScriptedOracle>,
    tracker: &Arc<RecordingTracker>,
    platform: &Arc<RecordingPlatform>,
) -> FakeDispatcher {
    StepDispatcher::new(oracle.clone(), tracker.clone(), platform.clone())
}

pub(crate) fn email() -> EmailPayload {
    EmailPayload {
        from_address: "dana@example.com".into(),
        to_address: "assistant@example.com".into(),
        subject: "Login broken".into(),
        body: "Cannot log in since this morning".into(),
        message_id: "<m1@mail>".into(),
        previous_thread: vec![],
        raw_email: String::new(),
        is_test: None,
    }
}

/// Returns scripted decisions in order, then fails.
pub(crate) struct ScriptedOracle {
    script: Mutex<VecDeque<Value>>,
    repeat: Option<Value>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub(crate) fn new(script: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Returns the same decision forever.
    pub(crate) fn repeating(decision: Value) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(decision),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn determine_next_step(&self, prompt: &str) -> Result<Value, Error> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        self.repeat
            .clone()
            .ok_or_else(|| Error::Oracle("script exhausted".into()))
    }
}

/// Never answers.
pub(crate) struct StalledOracle;

#[async_trait]
impl Oracle for StalledOracle {
    async fn determine_next_step(&self, _prompt: &str) -> Result<Value, Error> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub(crate) struct RecordingTracker {
    teams: Vec<Team>,
    fail: bool,
    calls: Mutex<Vec<String>>,
    created: Mutex<Vec<IssueDraft>>,
}

impl RecordingTracker {
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_teams(teams: Value) -> Arc<Self> {
        Arc::new(Self {
            teams: serde_json::from_value(teams).unwrap(),
            ..Self::default()
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn created(&self) -> Vec<IssueDraft> {
        self.created.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), Error> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(Error::Tracker("tracker unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for RecordingTracker {
    async fn list_issues(
        &self,
        from_time: Option<&str>,
        to_time: Option<&str>,
    ) -> Result<Vec<Issue>, Error> {
        self.record(format!(
            "list_issues {}..{}",
            from_time.unwrap_or(""),
            to_time.unwrap_or("")
        ))?;
        Ok(vec![Issue {
            id: "I1".into(),
            identifier: Some("ENG-1".into()),
            title: "Existing".into(),
            description: None,
            url: None,
            created_at: None,
        }])
    }

    async fn list_teams(&self) -> Result<Vec<Team>, Error> {
        self.record("list_teams".into())?;
        Ok(self.teams.clone())
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<Issue, Error> {
        self.record(format!("create_issue {}", draft.title))?;
        self.created.lock().unwrap().push(draft.clone());
        Ok(Issue {
            id: "I2".into(),
            identifier: Some("ENG-2".into()),
            title: draft.title.clone(),
            description: Some(draft.description.clone()),
            url: Some("https://linear.app/acme/issue/ENG-2".into()),
            created_at: None,
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingPlatform {
    contacts: Mutex<Vec<HumanContactRequest>>,
    approvals: Mutex<Vec<FunctionApprovalRequest>>,
}

impl RecordingPlatform {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn contacts(&self) -> Vec<HumanContactRequest> {
        self.contacts.lock().unwrap().clone()
    }

    pub(crate) fn approvals(&self) -> Vec<FunctionApprovalRequest> {
        self.approvals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalPlatform for RecordingPlatform {
    async fn request_human_contact(&self, request: HumanContactRequest) -> Result<(), Error> {
        self.contacts.lock().unwrap().push(request);
        Ok(())
    }

    async fn request_function_approval(
        &self,
        request: FunctionApprovalRequest,
    ) -> Result<(), Error> {
        self.approvals.lock().unwrap().push(request);
        Ok(())
    }
}
