//! HumanLayer API client.
//!
//! Requests are fire-and-forget: the client only checks that HumanLayer
//! accepted them. The response arrives later on the webhook routes with the
//! request's `state` echoed back.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use linear_assistant_core::{
    ApprovalPlatform, Error, FunctionApprovalRequest, HumanContactRequest, OpaqueState,
};

use crate::http::{client, send_with_retry, Retry};
use crate::payload::{ContactChannel, FunctionCall, FunctionCallSpec, HumanContact, HumanContactSpec};

/// Run id reported to HumanLayer for every request.
pub const RUN_ID: &str = "linear-assistant";

#[derive(Clone)]
pub struct HumanLayerClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HumanLayerClient {
    pub fn new(api_base: &str, api_key: &str) -> Result<Self, Error> {
        let http = client().map_err(|e| Error::Platform(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> Result<(), Error> {
        let url = format!("{}{}", self.api_base, endpoint);
        debug!(url = %url, "HumanLayer API request");

        let resp = send_with_retry("humanlayer", Retry::ConnectOnly, || {
            self.http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
        })
        .await
        .map_err(|e| Error::Platform(format!("Failed to send HumanLayer request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Platform(format!("HumanLayer API error: {status} - {text}")));
        }
        Ok(())
    }
}

/// Call id unique per suspension of a thread.
fn call_id(thread_id: &str, events: usize) -> String {
    format!("{thread_id}-{events}")
}

fn event_count(state: &OpaqueState) -> usize {
    state.as_value()["thread"]["events"]
        .as_array()
        .map_or(0, Vec::len)
}

pub(crate) fn contact_body(request: HumanContactRequest) -> HumanContact {
    HumanContact {
        run_id: RUN_ID.to_string(),
        call_id: call_id(&request.thread_id, event_count(&request.state)),
        spec: HumanContactSpec {
            msg: request.message,
            channel: Some(ContactChannel::in_reply_to(&request.reply_to)),
            state: Some(request.state),
        },
        status: None,
    }
}

pub(crate) fn approval_body(request: FunctionApprovalRequest) -> FunctionCall {
    FunctionCall {
        run_id: RUN_ID.to_string(),
        call_id: call_id(&request.thread_id, event_count(&request.state)),
        spec: FunctionCallSpec {
            function: request.function.name().to_string(),
            kwargs: request.kwargs,
            channel: Some(ContactChannel::in_reply_to(&request.reply_to)),
            state: Some(request.state),
        },
        status: None,
    }
}

#[async_trait]
impl ApprovalPlatform for HumanLayerClient {
    async fn request_human_contact(&self, request: HumanContactRequest) -> Result<(), Error> {
        let thread_id = request.thread_id.clone();
        let body = contact_body(request);
        self.post("/contact_requests", &body).await?;
        info!(thread_id = %thread_id, call_id = %body.call_id, "Requested human contact");
        Ok(())
    }

    async fn request_function_approval(
        &self,
        request: FunctionApprovalRequest,
    ) -> Result<(), Error> {
        let thread_id = request.thread_id.clone();
        let body = approval_body(request);
        self.post("/function_calls", &body).await?;
        info!(
            thread_id = %thread_id,
            call_id = %body.call_id,
            function = %body.spec.function,
            "Requested function approval"
        );
        Ok(())
    }
}
