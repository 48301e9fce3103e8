//! Thread state and its opaque serialized form.
//!
//! The service keeps no database. At every suspension the whole thread is
//! serialized into an [`OpaqueState`] and handed to the approval platform,
//! which returns it unchanged inside the resumption callback.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::event::{EmailPayload, Event, EventType};
use crate::prompt::PROMPT_FORMAT;
use crate::Error;

/// Version of the opaque state envelope.
pub const STATE_VERSION: u64 = 1;

/// One unit of agent work: the initiating email plus its event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Random id used for log correlation only.
    pub id: String,
    pub initial_email: EmailPayload,
    pub events: Vec<Event>,
}

impl Thread {
    /// Start a thread from an inbound email.
    pub fn new(email: EmailPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            initial_email: email.clone(),
            events: vec![Event::email_received(email)],
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn last_event_type(&self) -> Option<EventType> {
        self.last_event().map(|e| e.kind)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize into the versioned envelope handed to the platform.
    pub fn to_state(&self) -> Result<OpaqueState, Error> {
        let envelope = EnvelopeRef {
            version: STATE_VERSION,
            prompt_format: PROMPT_FORMAT,
            thread: self,
        };
        Ok(OpaqueState(serde_json::to_value(envelope)?))
    }

    /// Reconstruct a thread from platform-held state.
    ///
    /// The state is authoritative but untrusted: an unknown version, an
    /// empty event log or an event whose payload does not match its type is
    /// rejected with [`Error::InvalidState`].
    pub fn from_state(state: &OpaqueState) -> Result<Self, Error> {
        let version = state
            .0
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::InvalidState("missing state version".into()))?;
        if version != STATE_VERSION {
            return Err(Error::InvalidState(format!(
                "unsupported state version {version}"
            )));
        }

        let envelope: Envelope = serde_json::from_value(state.0.clone())
            .map_err(|e| Error::InvalidState(e.to_string()))?;
        let thread = envelope.thread;

        if envelope.prompt_format != PROMPT_FORMAT {
            warn!(
                thread_id = %thread.id,
                state_format = envelope.prompt_format,
                current_format = PROMPT_FORMAT,
                "Resuming thread started under a different prompt format"
            );
        }

        if thread.is_empty() {
            return Err(Error::InvalidState("thread has no events".into()));
        }
        if let Some((index, event)) = thread
            .events
            .iter()
            .enumerate()
            .find(|(_, e)| !e.is_well_formed())
        {
            return Err(Error::InvalidState(format!(
                "event {index} of type {} carries a mismatched payload",
                event.kind
            )));
        }

        Ok(thread)
    }
}

/// Serialized thread, opaque to the platform that stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueState(Value);

impl OpaqueState {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u64,
    prompt_format: u32,
    thread: &'a Thread,
}

#[derive(Deserialize)]
struct Envelope {
    #[allow(dead_code)]
    version: u64,
    #[serde(default = "default_prompt_format")]
    prompt_format: u32,
    thread: Thread,
}

fn default_prompt_format() -> u32 {
    PROMPT_FORMAT
}
