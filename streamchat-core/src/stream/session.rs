use crate::transport::TransportError;
use std::fmt;

/// Lifecycle state of a response stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    /// `Starting` or `Streaming`
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn can_transition_to(self, next: SessionState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Starting) => true,
            (Self::Starting, Self::Streaming) => true,
            (Self::Starting | Self::Streaming, Self::Completed | Self::Cancelled | Self::Failed) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Identifier of one response cycle, unique per controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed {
        text: String,
    },
    /// Cancelled by the user or replaced by a newer session
    Cancelled {
        partial_text: String,
    },
    Failed {
        /// Generic message to show the user
        message: String,
        error: TransportError,
        partial_text: String,
    },
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed { .. } => SessionState::Completed,
            Self::Cancelled { .. } => SessionState::Cancelled,
            Self::Failed { .. } => SessionState::Failed,
        }
    }

    /// Message to render for this outcome; cancellation renders nothing
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Completed { text } => text,
            Self::Cancelled { partial_text } | Self::Failed { partial_text, .. } => partial_text,
        }
    }
}

/// One in-flight response cycle
#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    state: SessionState,
    text: String,
    assigned_id: Option<String>,
}

impl StreamSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            text: String::new(),
            assigned_id: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn assigned_id(&self) -> Option<&str> {
        self.assigned_id.as_deref()
    }

    /// Move to `next`. Returns `false` and leaves the state alone when the
    /// move is not allowed, which makes repeated terminal transitions no-ops.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Append a delta while streaming
    pub fn append(&mut self, delta: &str) -> bool {
        if self.state != SessionState::Streaming {
            return false;
        }
        self.text.push_str(delta);
        true
    }

    /// Record the server-assigned id; only the first assignment counts
    pub fn assign_id(&mut self, id: &str) -> bool {
        if self.assigned_id.is_some() || !self.state.is_active() {
            return false;
        }
        self.assigned_id = Some(id.to_string());
        true
    }

    pub(crate) fn take_text(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut session = StreamSession::new(SessionId(1));
        assert!(session.transition(SessionState::Starting));
        assert!(session.transition(SessionState::Streaming));
        assert!(session.append("abc"));
        assert!(session.transition(SessionState::Completed));
        assert_eq!(session.text(), "abc");
    }

    #[test]
    fn terminal_states_are_final() {
        let mut session = StreamSession::new(SessionId(1));
        session.transition(SessionState::Starting);
        assert!(session.transition(SessionState::Cancelled));
        assert!(!session.transition(SessionState::Cancelled));
        assert!(!session.transition(SessionState::Completed));
        assert!(!session.transition(SessionState::Streaming));
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(!session.append("late"));
    }

    #[test]
    fn cannot_skip_starting() {
        let mut session = StreamSession::new(SessionId(7));
        assert!(!session.transition(SessionState::Streaming));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn only_first_assigned_id_is_kept() {
        let mut session = StreamSession::new(SessionId(1));
        session.transition(SessionState::Starting);
        session.transition(SessionState::Streaming);
        assert!(session.assign_id("first"));
        assert!(!session.assign_id("second"));
        assert_eq!(session.assigned_id(), Some("first"));
    }

    #[test]
    fn outcome_messages() {
        let cancelled = SessionOutcome::Cancelled {
            partial_text: "par".to_string(),
        };
        assert_eq!(cancelled.user_message(), None);
        assert_eq!(cancelled.text(), "par");

        let failed = SessionOutcome::Failed {
            message: "try again".to_string(),
            error: TransportError::Network("reset".to_string()),
            partial_text: String::new(),
        };
        assert_eq!(failed.user_message(), Some("try again"));
        assert_eq!(failed.state(), SessionState::Failed);
    }
}
