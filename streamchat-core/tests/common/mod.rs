#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use streamchat_core::stream::{
    ChatRequest, SessionId, SessionOutcome, SessionState, StreamObserver,
};
use streamchat_core::transport::{ByteStream, Transport, TransportError};
use streamchat_core::verify::{LinkVerifier, Verification, VerifyError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub type ChunkSender = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

/// Sets its flag when the response body it is attached to is dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Test side of one scripted response body
pub struct ScriptedBody {
    pub sender: ChunkSender,
    pub released: Arc<AtomicBool>,
}

impl ScriptedBody {
    pub fn send(&self, chunk: &str) {
        let _ = self.sender.unbounded_send(Ok(chunk.as_bytes().to_vec()));
    }

    pub fn fail(&self, error: TransportError) {
        let _ = self.sender.unbounded_send(Err(error));
    }

    pub fn close(&self) {
        self.sender.close_channel();
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

enum Prepared {
    Body(mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>, Arc<AtomicBool>),
    OpenError(TransportError),
}

/// Transport whose bodies are fed by the test, one per `open` call in order
#[derive(Default)]
pub struct ScriptedTransport {
    prepared: Mutex<VecDeque<Prepared>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a body for the next `open`
    pub fn prepare(&self) -> ScriptedBody {
        let (sender, receiver) = mpsc::unbounded();
        let released = Arc::new(AtomicBool::new(false));
        self.prepared
            .lock()
            .push_back(Prepared::Body(receiver, Arc::clone(&released)));
        ScriptedBody { sender, released }
    }

    pub fn prepare_open_error(&self, error: TransportError) {
        self.prepared.lock().push_back(Prepared::OpenError(error));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request.clone());
        let prepared = self.prepared.lock().pop_front();
        match prepared {
            Some(Prepared::Body(receiver, released)) => {
                let guard = DropFlag(released);
                Ok(Box::pin(receiver.map(move |chunk| {
                    let _alive = &guard;
                    chunk
                })))
            }
            Some(Prepared::OpenError(error)) => Err(error),
            None => Err(TransportError::Network("no scripted response".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    State(SessionId, SessionState),
    Delta(SessionId, String),
    Assigned(SessionId, String),
    ServerError(SessionId, String),
    Finished(SessionId, SessionOutcome),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn finished_count(&self, session: SessionId) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Recorded::Finished(id, _) if *id == session))
            .count()
    }

    pub fn states_of(&self, session: SessionId) -> Vec<SessionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Recorded::State(id, state) if *id == session => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl StreamObserver for RecordingObserver {
    fn on_state(&self, session: SessionId, state: SessionState) {
        self.events.lock().push(Recorded::State(session, state));
    }

    fn on_delta(&self, session: SessionId, delta: &str, _text: &str) {
        self.events
            .lock()
            .push(Recorded::Delta(session, delta.to_string()));
    }

    fn on_session_assigned(&self, session: SessionId, conversation_id: &str) {
        self.events
            .lock()
            .push(Recorded::Assigned(session, conversation_id.to_string()));
    }

    fn on_server_error(&self, session: SessionId, message: &str) {
        self.events
            .lock()
            .push(Recorded::ServerError(session, message.to_string()));
    }

    fn on_finished(&self, session: SessionId, outcome: &SessionOutcome) {
        self.events
            .lock()
            .push(Recorded::Finished(session, outcome.clone()));
    }
}

/// Verifier that counts calls and holds each one until a permit is released
pub struct GatedVerifier {
    calls: AtomicUsize,
    gate: Semaphore,
    result: Result<Verification, VerifyError>,
}

impl GatedVerifier {
    pub fn new(result: Result<Verification, VerifyError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            result,
        })
    }

    pub fn ok(status: u16) -> Arc<Self> {
        Self::new(Ok(Verification::from_status(status)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let one pending call return
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl LinkVerifier for GatedVerifier {
    async fn verify(&self, _url: &str, _timeout: Duration) -> Result<Verification, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.result.clone()
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Answer one HTTP request with `status` and a JSON `body`.
///
/// Returns the base URL to point a client at and a task yielding the raw
/// request text.
pub async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = socket.read(&mut buf).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&request).into_owned()
    });

    (base_url, task)
}
