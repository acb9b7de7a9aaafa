//! Client-wide state
//!
//! [`ClientState`] is built once at startup and owns every piece of state the
//! chat client shares between operations: the stream controller and the
//! current conversation id it tracks, the verification cache and the session
//! list.

use crate::config::StreamChatConfig;
use crate::history::{ApiError, ChatReply, ConversationApi, SessionSummary};
use crate::stream::{ChatRequest, SessionHandle, StreamController, StreamObserver, StreamingConfig};
use crate::transport::{HttpTransport, Transport};
use crate::verify::{LinkReport, LinkVerifier, VerificationCache, checker, validate_urls_in_message};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub struct ClientState {
    config: StreamChatConfig,
    controller: StreamController,
    verification: VerificationCache,
    api: ConversationApi,
    sessions: Mutex<Vec<SessionSummary>>,
}

impl ClientState {
    /// HTTP-backed client for the configured service
    pub fn from_config(
        config: StreamChatConfig,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Self, ApiError> {
        let transport = Arc::new(HttpTransport::from_config(&config.server));
        let verifier = checker::verifier_from_config(&config);
        Self::with_parts(config, transport, verifier, observer)
    }

    /// Client over caller-supplied collaborators
    pub fn with_parts(
        config: StreamChatConfig,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn LinkVerifier>,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Self, ApiError> {
        let controller = StreamController::new(
            transport,
            observer,
            StreamingConfig::from(&config.streaming),
        );
        let verification = VerificationCache::new(
            verifier,
            config.verification.timeout(),
            config.verification.grace(),
        );
        let api = ConversationApi::new(&config.server)?;

        Ok(Self {
            config,
            controller,
            verification,
            api,
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &StreamChatConfig {
        &self.config
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn verification(&self) -> &VerificationCache {
        &self.verification
    }

    pub fn api(&self) -> &ConversationApi {
        &self.api
    }

    /// Stream an answer to `message` in the current conversation
    pub fn send(&self, message: impl Into<String>) -> SessionHandle {
        self.controller.start(ChatRequest::new(message))
    }

    /// Ask through the non-streaming endpoint. Stops the current answer first
    /// and adopts the conversation id of the reply.
    pub async fn ask_once(&self, mut request: ChatRequest) -> Result<ChatReply, ApiError> {
        self.controller.cancel();
        if request.session_id.is_none() {
            request.session_id = self.conversation_id();
        }
        let reply = self.api.chat(&request).await?;
        self.controller
            .set_conversation_id(Some(reply.session_id.clone()));
        Ok(reply)
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.controller.conversation_id()
    }

    /// Continue `conversation_id` with the next message. Stops the current
    /// answer first.
    pub fn switch_conversation(&self, conversation_id: impl Into<String>) {
        self.controller.cancel();
        self.controller
            .set_conversation_id(Some(conversation_id.into()));
    }

    /// Last fetched session list
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions.lock().clone()
    }

    pub async fn refresh_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let sessions = self.api.list_sessions().await?;
        *self.sessions.lock() = sessions.clone();
        Ok(sessions)
    }

    /// Create a conversation on the server and make it current
    pub async fn new_conversation(&self) -> Result<SessionSummary, ApiError> {
        let session = self.api.new_session().await?;
        self.switch_conversation(session.session_id.clone());
        self.sessions.lock().insert(0, session.clone());
        Ok(session)
    }

    /// Delete a conversation; forgets it locally if it was current
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.api.delete_session(conversation_id).await?;
        self.sessions
            .lock()
            .retain(|session| session.session_id != conversation_id);
        if self.conversation_id().as_deref() == Some(conversation_id) {
            self.controller.reset();
        }
        Ok(())
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<(), ApiError> {
        self.api.rename_session(conversation_id, title).await?;
        if let Some(session) = self
            .sessions
            .lock()
            .iter_mut()
            .find(|session| session.session_id == conversation_id)
        {
            session.title = title.to_string();
        }
        Ok(())
    }

    /// Verify every link in `text` through the shared cache
    pub async fn check_links(&self, text: &str) -> Vec<LinkReport> {
        validate_urls_in_message(&self.verification, text).await
    }

    /// Back to the freshly constructed state: no active stream, no current
    /// conversation, nothing cached.
    pub fn reset(&self) {
        self.controller.reset();
        self.verification.clear();
        self.sessions.lock().clear();
        info!("client state reset");
    }
}
