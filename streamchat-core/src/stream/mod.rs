//! Incremental response streaming
//!
//! [`decoder`] turns transport bytes into [`StreamEvent`]s, [`session`] holds
//! the per-response state machine and [`controller`] owns the single active
//! response stream.

pub mod controller;
pub mod decoder;
pub mod errors;
pub mod session;

pub use controller::{SessionHandle, StreamController};
pub use decoder::{
    DecoderMetrics, FrameDecoder, StreamEvent, StreamingConfig, TextBuffer, decode_stream,
};
pub use errors::ControllerError;
pub use session::{SessionId, SessionOutcome, SessionState, StreamSession};

use serde::{Deserialize, Serialize};

/// Body of a streaming chat request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Receives everything a UI needs to follow a response stream.
///
/// Callbacks run on the task driving the stream, after the controller has
/// released its locks, so implementations may call back into the controller.
/// Every method has an empty default.
pub trait StreamObserver: Send + Sync {
    /// One call per state change
    fn on_state(&self, _session: SessionId, _state: SessionState) {}

    /// A delta was appended; `text` is the full answer so far
    fn on_delta(&self, _session: SessionId, _delta: &str, _text: &str) {}

    /// The server named the conversation this answer belongs to
    fn on_session_assigned(&self, _session: SessionId, _conversation_id: &str) {}

    /// Server-reported error to show inline; the stream continues
    fn on_server_error(&self, _session: SessionId, _message: &str) {}

    /// Exactly once per session, after the terminal `on_state`
    fn on_finished(&self, _session: SessionId, _outcome: &SessionOutcome) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_omits_unset_fields() {
        let body = serde_json::to_value(ChatRequest::new("hi")).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "hi" }));

        let body = serde_json::to_value(
            ChatRequest::new("hi")
                .with_session_id("s-1")
                .with_system_instruction("be brief"),
        )
        .unwrap();
        assert_eq!(body["session_id"], "s-1");
        assert_eq!(body["system_instruction"], "be brief");
    }
}
