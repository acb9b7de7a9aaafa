//! Markdown rendering for streamed answers
//!
//! Answers arrive as deltas, and a markdown document can only be rendered
//! correctly as a whole, so [`RenderedTranscript`] keeps the accumulated text
//! and renders all of it again after every delta.

use crate::stream::{SessionId, SessionOutcome, SessionState, StreamObserver};
use parking_lot::Mutex;
use pulldown_cmark::{Options, Parser, html};
use std::sync::Arc;

/// Turns accumulated answer text into display markup
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

/// CommonMark to HTML with the GitHub-flavoured extensions
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl MarkdownRenderer for HtmlRenderer {
    fn render(&self, text: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = Parser::new_ext(text, options);
        let mut markup = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut markup, parser);
        markup
    }
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl MarkdownRenderer for PlainRenderer {
    fn render(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Debug, Default)]
struct TranscriptState {
    session: Option<SessionId>,
    state: Option<SessionState>,
    text: String,
    rendered: String,
    conversation_id: Option<String>,
    server_errors: Vec<String>,
    notice: Option<String>,
}

/// Observer that keeps an up-to-date rendering of the current answer
pub struct RenderedTranscript {
    renderer: Arc<dyn MarkdownRenderer>,
    state: Mutex<TranscriptState>,
}

impl RenderedTranscript {
    pub fn new(renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self {
            renderer,
            state: Mutex::new(TranscriptState::default()),
        }
    }

    pub fn html() -> Self {
        Self::new(Arc::new(HtmlRenderer))
    }

    /// Markup of the latest answer
    pub fn rendered(&self) -> String {
        self.state.lock().rendered.clone()
    }

    /// Raw text of the latest answer
    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    pub fn state(&self) -> Option<SessionState> {
        self.state.lock().state
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.state.lock().conversation_id.clone()
    }

    /// Server-reported errors shown inline with the latest answer
    pub fn server_errors(&self) -> Vec<String> {
        self.state.lock().server_errors.clone()
    }

    /// Message to show in place of, or after, the answer
    pub fn notice(&self) -> Option<String> {
        self.state.lock().notice.clone()
    }

    fn is_current(state: &TranscriptState, session: SessionId) -> bool {
        state.session == Some(session)
    }
}

impl StreamObserver for RenderedTranscript {
    fn on_state(&self, session: SessionId, next: SessionState) {
        let mut state = self.state.lock();
        if next == SessionState::Starting {
            *state = TranscriptState {
                session: Some(session),
                conversation_id: state.conversation_id.take(),
                ..TranscriptState::default()
            };
        }
        if Self::is_current(&state, session) {
            state.state = Some(next);
        }
    }

    fn on_delta(&self, session: SessionId, _delta: &str, text: &str) {
        let rendered = self.renderer.render(text);
        let mut state = self.state.lock();
        if Self::is_current(&state, session) {
            state.text = text.to_string();
            state.rendered = rendered;
        }
    }

    fn on_session_assigned(&self, _session: SessionId, conversation_id: &str) {
        self.state.lock().conversation_id = Some(conversation_id.to_string());
    }

    fn on_server_error(&self, session: SessionId, message: &str) {
        let mut state = self.state.lock();
        if Self::is_current(&state, session) {
            state.server_errors.push(message.to_string());
        }
    }

    fn on_finished(&self, session: SessionId, outcome: &SessionOutcome) {
        let mut state = self.state.lock();
        if Self::is_current(&state, session) {
            state.notice = outcome.user_message().map(str::to_string);
        }
    }
}
