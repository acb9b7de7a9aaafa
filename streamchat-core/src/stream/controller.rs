//! Single-flight owner of the active response stream
//!
//! At most one [`StreamSession`] is starting or streaming at any time. Starting
//! a new one cancels the previous session first, and every session ends with
//! exactly one terminal notification no matter which path ends it.

use super::decoder::{FrameDecoder, StreamEvent, StreamingConfig, decode_stream};
use super::errors::ControllerError;
use super::session::{SessionId, SessionOutcome, SessionState, StreamSession};
use super::{ChatRequest, StreamObserver};
use crate::config::constants::messages;
use crate::transport::{Transport, TransportError};
use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, watch};
use tracing::{debug, warn};

/// Cooperative cancellation flag
#[derive(Default)]
struct CancelSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

struct SessionSlot {
    id: SessionId,
    session: Mutex<StreamSession>,
    /// Held from the state check through the observer call, so no event can
    /// reach the observer after the terminal notification
    emit: ReentrantMutex<()>,
    cancel: CancelSignal,
    outcome: watch::Sender<Option<SessionOutcome>>,
}

impl SessionSlot {
    fn new(id: SessionId) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            id,
            session: Mutex::new(StreamSession::new(id)),
            emit: ReentrantMutex::new(()),
            cancel: CancelSignal::default(),
            outcome,
        }
    }

    fn state(&self) -> SessionState {
        self.session.lock().state()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct ControllerInner {
    transport: Arc<dyn Transport>,
    observer: Arc<dyn StreamObserver>,
    config: StreamingConfig,
    active: Mutex<Option<Arc<SessionSlot>>>,
    conversation_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl ControllerInner {
    fn transition(&self, slot: &SessionSlot, next: SessionState) -> bool {
        let _emit = slot.emit.lock();
        let moved = slot.session.lock().transition(next);
        if moved {
            debug!(session = %slot.id, state = %next, "stream session transition");
            self.observer.on_state(slot.id, next);
        }
        moved
    }

    /// Terminal transition shared by every exit path
    fn finish<F>(&self, slot: &Arc<SessionSlot>, next: SessionState, build: F) -> bool
    where
        F: FnOnce(String) -> SessionOutcome,
    {
        let _emit = slot.emit.lock();
        let outcome = {
            let mut session = slot.session.lock();
            if !session.transition(next) {
                return false;
            }
            build(session.take_text())
        };

        {
            let mut active = self.active.lock();
            if active
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, slot))
            {
                *active = None;
            }
        }

        debug!(session = %slot.id, state = %next, "stream session finished");
        self.observer.on_state(slot.id, next);
        self.observer.on_finished(slot.id, &outcome);
        slot.outcome.send_replace(Some(outcome));
        true
    }

    fn cancel_slot(&self, slot: &Arc<SessionSlot>) -> bool {
        slot.cancel.cancel();
        self.finish(slot, SessionState::Cancelled, |partial_text| {
            SessionOutcome::Cancelled { partial_text }
        })
    }

    fn complete(&self, slot: &Arc<SessionSlot>) {
        self.finish(slot, SessionState::Completed, |text| {
            SessionOutcome::Completed { text }
        });
    }

    fn fail(&self, slot: &Arc<SessionSlot>, error: TransportError) {
        warn!(session = %slot.id, error = %error, "response stream failed");
        self.finish(slot, SessionState::Failed, |partial_text| {
            SessionOutcome::Failed {
                message: messages::TRANSPORT_FAILURE.to_string(),
                error,
                partial_text,
            }
        });
    }

    fn apply(&self, slot: &Arc<SessionSlot>, event: StreamEvent) -> Flow {
        let _emit = slot.emit.lock();
        match event {
            StreamEvent::Delta(delta) => {
                let text = {
                    let mut session = slot.session.lock();
                    if !session.append(&delta) {
                        return Flow::Stop;
                    }
                    session.text().to_string()
                };
                self.observer.on_delta(slot.id, &delta, &text);
                Flow::Continue
            }
            StreamEvent::SessionAssigned(conversation_id) => {
                let accepted = slot.session.lock().assign_id(&conversation_id);
                if accepted {
                    *self.conversation_id.lock() = Some(conversation_id.clone());
                    self.observer
                        .on_session_assigned(slot.id, &conversation_id);
                } else {
                    debug!(session = %slot.id, "ignoring repeated session id assignment");
                }
                Flow::Continue
            }
            StreamEvent::Error(message) => {
                if slot.state() != SessionState::Streaming {
                    return Flow::Stop;
                }
                self.observer.on_server_error(slot.id, &message);
                Flow::Continue
            }
            StreamEvent::Completed => {
                self.complete(slot);
                Flow::Stop
            }
        }
    }
}

/// Drive one session from transport open to its terminal state.
///
/// The transport body lives inside this future, so returning from any branch
/// drops it and releases the connection.
async fn run_session(inner: Arc<ControllerInner>, slot: Arc<SessionSlot>, request: ChatRequest) {
    let opened = tokio::select! {
        biased;
        _ = slot.cancel.cancelled() => return,
        opened = tokio::time::timeout(
            inner.config.first_chunk_timeout,
            inner.transport.open(&request),
        ) => opened.unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                operation: "open",
                duration: inner.config.first_chunk_timeout,
            })
        }),
    };

    let body = match opened {
        Ok(body) => body,
        Err(error) => {
            inner.fail(&slot, error);
            return;
        }
    };

    if !inner.transition(&slot, SessionState::Streaming) {
        return;
    }

    let decoder = FrameDecoder::from_config(&inner.config);
    let mut events = Box::pin(decode_stream(body, decoder, &inner.config));

    loop {
        let next = tokio::select! {
            biased;
            _ = slot.cancel.cancelled() => return,
            next = events.next() => next,
        };

        if slot.cancel.is_cancelled() {
            return;
        }

        match next {
            Some(Ok(event)) => {
                if inner.apply(&slot, event) == Flow::Stop {
                    return;
                }
            }
            Some(Err(error)) => {
                inner.fail(&slot, error);
                return;
            }
            None => {
                // Transport closed without a sentinel
                inner.complete(&slot);
                return;
            }
        }
    }
}

/// Handle to one started session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<ControllerInner>,
    slot: Arc<SessionSlot>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.slot.id
    }

    pub fn state(&self) -> SessionState {
        self.slot.state()
    }

    /// Text accumulated so far; empty once the session has finished
    pub fn text(&self) -> String {
        self.slot.session.lock().text().to_string()
    }

    /// Cancel this session. Returns `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        self.inner.cancel_slot(&self.slot)
    }

    /// Wait for the terminal outcome
    pub async fn outcome(&self) -> SessionOutcome {
        let mut receiver = self.slot.outcome.subscribe();
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone());
        outcome.unwrap_or(SessionOutcome::Cancelled {
            partial_text: String::new(),
        })
    }
}

/// Owns the conversation's single active response stream
pub struct StreamController {
    inner: Arc<ControllerInner>,
}

impl StreamController {
    pub fn new(
        transport: Arc<dyn Transport>,
        observer: Arc<dyn StreamObserver>,
        config: StreamingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                transport,
                observer,
                config,
                active: Mutex::new(None),
                conversation_id: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Start a new session, cancelling the active one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: ChatRequest) -> SessionHandle {
        let slot = self.new_slot();
        let previous = self.inner.active.lock().replace(Arc::clone(&slot));
        self.launch(slot, previous, request)
    }

    /// Start a new session only if none is active
    pub fn try_start(&self, request: ChatRequest) -> Result<SessionHandle, ControllerError> {
        let slot = self.new_slot();
        let previous = {
            let mut active = self.inner.active.lock();
            // A slot that has not reached Starting yet counts as active
            if let Some(current) = active.as_ref()
                && !current.state().is_terminal()
            {
                return Err(ControllerError::AlreadyActive(current.id));
            }
            active.replace(Arc::clone(&slot))
        };
        Ok(self.launch(slot, previous, request))
    }

    /// Cancel the active session. A no-op when nothing is active.
    pub fn cancel(&self) -> bool {
        let active = self.inner.active.lock().clone();
        match active {
            Some(slot) => self.inner.cancel_slot(&slot),
            None => false,
        }
    }

    /// State of the active session, `Idle` when there is none
    pub fn state(&self) -> SessionState {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|slot| slot.state())
            .unwrap_or(SessionState::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        self.state().is_active()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.inner.active.lock().as_ref().map(|slot| slot.id)
    }

    /// Conversation id last assigned by the server
    pub fn conversation_id(&self) -> Option<String> {
        self.inner.conversation_id.lock().clone()
    }

    /// Switch to another conversation (or none) for subsequent requests
    pub fn set_conversation_id(&self, conversation_id: Option<String>) {
        *self.inner.conversation_id.lock() = conversation_id;
    }

    /// Cancel any active session and forget the conversation id
    pub fn reset(&self) {
        self.cancel();
        self.set_conversation_id(None);
    }

    fn new_slot(&self) -> Arc<SessionSlot> {
        let id = SessionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        Arc::new(SessionSlot::new(id))
    }

    fn launch(
        &self,
        slot: Arc<SessionSlot>,
        previous: Option<Arc<SessionSlot>>,
        mut request: ChatRequest,
    ) -> SessionHandle {
        if let Some(previous) = previous
            && self.inner.cancel_slot(&previous)
        {
            debug!(previous = %previous.id, next = %slot.id, "replaced active stream session");
        }

        if request.session_id.is_none() {
            request.session_id = self.conversation_id();
        }

        self.inner.transition(&slot, SessionState::Starting);
        tokio::spawn(run_session(
            Arc::clone(&self.inner),
            Arc::clone(&slot),
            request,
        ));

        SessionHandle {
            inner: Arc::clone(&self.inner),
            slot,
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.cancel();
    }
}
