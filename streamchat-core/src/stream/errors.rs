use super::session::SessionId;

/// Errors returned by [`super::StreamController`] operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// A session is still starting or streaming; cancel it first
    #[error("a response stream is already active (session {0})")]
    AlreadyActive(SessionId),
}
