//! Frame decoder for the chat streaming protocol
//!
//! The server answers with newline-delimited lines of the form
//! `data: {"delta": "..."}`. Transport chunks are not aligned to lines or even
//! to UTF-8 code points, so the decoder keeps two carries between chunks: the
//! bytes of an unfinished code point and the text of an unfinished line.

use crate::config::StreamingSettings;
use crate::config::constants::protocol;
use crate::transport::{ByteStream, TransportError};
use async_stream::try_stream;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Event produced by the decoder, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Fragment of answer text to append
    Delta(String),
    /// Server-assigned conversation id
    SessionAssigned(String),
    /// Server-reported content error; the stream continues
    Error(String),
    /// End of the answer
    Completed,
}

/// Configuration for the streaming decoder
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Timeout for reading each chunk after the first
    pub chunk_timeout: Duration,
    /// Maximum time to wait for the first chunk
    pub first_chunk_timeout: Duration,
    /// Surface an unframed first chunk as raw text
    pub raw_text_fallback: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self::from(&StreamingSettings::default())
    }
}

impl From<&StreamingSettings> for StreamingConfig {
    fn from(settings: &StreamingSettings) -> Self {
        Self {
            chunk_timeout: Duration::from_millis(settings.chunk_timeout_ms),
            first_chunk_timeout: Duration::from_millis(settings.first_chunk_timeout_ms),
            raw_text_fallback: settings.raw_text_fallback,
        }
    }
}

/// Counters kept while decoding one response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderMetrics {
    pub total_chunks: usize,
    pub total_bytes: usize,
    pub frames: usize,
    pub protocol_deviations: usize,
}

/// Carry state held across chunk boundaries
#[derive(Debug, Default)]
pub struct TextBuffer {
    /// Leading bytes of a code point whose remaining bytes have not arrived
    utf8_carry: Vec<u8>,
    /// Text after the last newline seen so far
    pending_line: String,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` as UTF-8, continuing any code point left open by the
    /// previous call. Invalid sequences become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.utf8_carry);
        input.extend_from_slice(bytes);

        let mut decoded = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    decoded.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid_len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[invalid_len..];
                        }
                        None => {
                            self.utf8_carry = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        decoded
    }

    /// End of input: an unfinished code point decodes to U+FFFD
    pub fn flush_decoder(&mut self) -> String {
        if self.utf8_carry.is_empty() {
            String::new()
        } else {
            self.utf8_carry.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn pending_line(&self) -> &str {
        &self.pending_line
    }

    fn take_pending(&mut self) -> String {
        std::mem::take(&mut self.pending_line)
    }

    fn set_pending(&mut self, pending: String) {
        self.pending_line = pending;
    }

    pub fn is_empty(&self) -> bool {
        self.utf8_carry.is_empty() && self.pending_line.is_empty()
    }

    pub fn clear(&mut self) {
        self.utf8_carry.clear();
        self.pending_line.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// No non-blank text seen yet
    Undecided,
    /// `data:` lines
    Framed,
    /// The server is sending plain text
    RawText,
}

/// Incremental decoder from byte chunks to [`StreamEvent`]s
#[derive(Debug)]
pub struct FrameDecoder {
    raw_text_fallback: bool,
    buffer: TextBuffer,
    framing: Framing,
    closed: bool,
    metrics: DecoderMetrics,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_raw_text_fallback(true)
    }

    pub fn with_raw_text_fallback(raw_text_fallback: bool) -> Self {
        Self {
            raw_text_fallback,
            buffer: TextBuffer::new(),
            framing: Framing::Undecided,
            closed: false,
            metrics: DecoderMetrics::default(),
        }
    }

    pub fn from_config(config: &StreamingConfig) -> Self {
        Self::with_raw_text_fallback(config.raw_text_fallback)
    }

    /// Feed one transport chunk and collect the events it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.closed {
            return events;
        }

        self.metrics.total_chunks += 1;
        self.metrics.total_bytes += chunk.len();

        let text = self.buffer.decode(chunk);
        self.feed_text(&text, &mut events);
        events
    }

    /// The transport closed: flush what is left and close the decoder
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.closed {
            return events;
        }

        let tail = self.buffer.flush_decoder();
        let mut remaining = self.buffer.take_pending();
        remaining.push_str(&tail);

        match self.framing {
            Framing::RawText => {
                if !remaining.is_empty() {
                    events.push(StreamEvent::Delta(remaining));
                }
            }
            Framing::Undecided
                if self.raw_text_fallback
                    && !remaining.trim().is_empty()
                    && !remaining.trim_start().starts_with(protocol::FRAME_MARKER) =>
            {
                self.framing = Framing::RawText;
                events.push(StreamEvent::Delta(remaining));
            }
            Framing::Undecided | Framing::Framed => self.handle_tail(&remaining, &mut events),
        }

        self.close();
        events
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn metrics(&self) -> &DecoderMetrics {
        &self.metrics
    }

    /// Text retained after the last complete line
    pub fn pending_line(&self) -> &str {
        self.buffer.pending_line()
    }

    fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
    }

    fn feed_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        match self.framing {
            Framing::RawText => {
                if !text.is_empty() {
                    events.push(StreamEvent::Delta(text.to_string()));
                }
            }
            Framing::Framed => self.split_lines(text, events),
            Framing::Undecided if !self.raw_text_fallback => {
                self.framing = Framing::Framed;
                self.split_lines(text, events);
            }
            Framing::Undecided => {
                let mut candidate = self.buffer.take_pending();
                candidate.push_str(text);

                let head = candidate.trim_start();
                let could_become_marker =
                    head.len() < protocol::FRAME_MARKER.len() && protocol::FRAME_MARKER.starts_with(head);
                if head.is_empty() || could_become_marker {
                    self.buffer.set_pending(candidate);
                    return;
                }

                if head.starts_with(protocol::FRAME_MARKER) {
                    self.framing = Framing::Framed;
                    self.split_lines(&candidate, events);
                } else {
                    debug!("first chunk is not framed; treating response as raw text");
                    self.framing = Framing::RawText;
                    events.push(StreamEvent::Delta(candidate));
                }
            }
        }
    }

    fn split_lines(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        let mut combined = self.buffer.take_pending();
        combined.push_str(text);

        let Some(last_newline) = combined.rfind('\n') else {
            self.buffer.set_pending(combined);
            return;
        };

        for line in combined[..last_newline].split('\n') {
            self.handle_line(line, events);
            if self.closed {
                return;
            }
        }

        self.buffer
            .set_pending(combined[last_newline + 1..].to_string());
    }

    fn handle_line(&mut self, raw_line: &str, events: &mut Vec<StreamEvent>) {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let Some(rest) = line.strip_prefix(protocol::FRAME_MARKER) else {
            return;
        };

        let payload = rest.trim();
        if payload.is_empty() {
            return;
        }

        self.metrics.frames += 1;

        if payload == protocol::DONE_SENTINEL {
            events.push(StreamEvent::Completed);
            self.close();
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => self.process_payload(value, events),
            Err(err) => {
                self.metrics.protocol_deviations += 1;
                warn!(error = %err, frame = %payload, "malformed stream frame; surfacing as text");
                events.push(StreamEvent::Delta(payload.to_string()));
            }
        }
    }

    /// An unterminated last line is only used if it is a whole frame
    fn handle_tail(&mut self, tail: &str, events: &mut Vec<StreamEvent>) {
        let line = tail.strip_suffix('\r').unwrap_or(tail);
        let Some(rest) = line.strip_prefix(protocol::FRAME_MARKER) else {
            return;
        };

        let payload = rest.trim();
        if payload.is_empty() {
            return;
        }

        let complete = payload == protocol::DONE_SENTINEL
            || serde_json::from_str::<Value>(payload).is_ok();
        if complete {
            self.handle_line(line, events);
        } else {
            self.metrics.protocol_deviations += 1;
            warn!(frame = %payload, "stream ended inside an incomplete frame; dropping it");
        }
    }

    fn process_payload(&mut self, value: Value, events: &mut Vec<StreamEvent>) {
        match value {
            Value::Object(map) => {
                if let Some(id) = map.get(protocol::KEY_SESSION_ID).and_then(Value::as_str) {
                    events.push(StreamEvent::SessionAssigned(id.to_string()));
                }

                if let Some(error_value) = map.get(protocol::KEY_ERROR) {
                    let message = match error_value {
                        Value::String(message) => Some(message.clone()),
                        Value::Null => None,
                        other => Some(
                            other
                                .get("message")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| other.to_string()),
                        ),
                    };
                    if let Some(message) = message {
                        events.push(StreamEvent::Error(message));
                    }
                }

                if let Some(delta) = map.get(protocol::KEY_DELTA).and_then(Value::as_str)
                    && !delta.is_empty()
                {
                    events.push(StreamEvent::Delta(delta.to_string()));
                }

                let finished = [protocol::KEY_DONE, protocol::KEY_END]
                    .iter()
                    .any(|key| map.get(*key).and_then(Value::as_bool) == Some(true));
                if finished {
                    events.push(StreamEvent::Completed);
                    self.close();
                }
            }
            Value::String(text) => {
                if !text.is_empty() {
                    events.push(StreamEvent::Delta(text));
                }
            }
            _ => {}
        }
    }
}

/// Drive `decoder` over a transport body.
///
/// The first chunk and every following chunk are bounded by the configured
/// timeouts. The returned stream ends after `Completed` or when the body
/// closes.
pub fn decode_stream(
    mut chunks: ByteStream,
    mut decoder: FrameDecoder,
    config: &StreamingConfig,
) -> impl Stream<Item = Result<StreamEvent, TransportError>> + Send + use<> {
    let first_chunk_timeout = config.first_chunk_timeout;
    let chunk_timeout = config.chunk_timeout;

    try_stream! {
        let mut first = true;
        loop {
            let (limit, operation) = if first {
                (first_chunk_timeout, "first_chunk")
            } else {
                (chunk_timeout, "chunk")
            };

            let next = timeout(limit, chunks.next())
                .await
                .map_err(|_| TransportError::Timeout { operation, duration: limit })?;
            first = false;

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            for event in decoder.push(&chunk) {
                yield event;
            }

            if decoder.is_closed() {
                break;
            }
        }

        for event in decoder.finish() {
            yield event;
        }

        let metrics = decoder.metrics();
        debug!(
            chunks = metrics.total_chunks,
            bytes = metrics.total_bytes,
            frames = metrics.frames,
            deviations = metrics.protocol_deviations,
            "response stream decoded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::Delta(text.to_string())
    }

    #[test]
    fn frame_split_across_two_chunks() {
        let events = decode_all(&[b"data: {\"delta\":\"Hel", b"lo\"}\n"]);
        assert_eq!(events, vec![delta("Hello")]);
    }

    #[test]
    fn two_frames_in_one_chunk_keep_order() {
        let events = decode_all(&[b"data: {\"delta\":\"A\"}\ndata: {\"delta\":\"B\"}\n"]);
        assert_eq!(events, vec![delta("A"), delta("B")]);
    }

    #[test]
    fn frame_split_across_many_chunks() {
        let events = decode_all(&[b"da", b"ta: {\"del", b"ta\":", b"\"xyz\"", b"}", b"\n"]);
        assert_eq!(events, vec![delta("xyz")]);
    }

    #[test]
    fn chunk_without_newline_only_extends_carry() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"delta\":\"one\"}\n").len() == 1);
        assert!(decoder.push(b"data: {\"delta\":").is_empty());
        assert!(decoder.push(b"\"two\"").is_empty());
        assert_eq!(decoder.pending_line(), "data: {\"delta\":\"two\"");
        assert_eq!(decoder.push(b"}\n"), vec![delta("two")]);
    }

    #[test]
    fn done_sentinel_completes_without_delta() {
        let events = decode_all(&[b"data: {\"delta\":\"hi\"}\n\ndata: [DONE]\n"]);
        assert_eq!(events, vec![delta("hi"), StreamEvent::Completed]);
    }

    #[test]
    fn nothing_is_emitted_after_completion() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.push(b"data: [DONE]\ndata: {\"delta\":\"late\"}\n");
        assert_eq!(events, vec![StreamEvent::Completed]);
        assert!(decoder.is_closed());
        assert!(decoder.push(b"data: {\"delta\":\"later\"}\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn multibyte_character_split_at_boundary() {
        let frame = "data: {\"delta\":\"caf\u{e9} \u{1F600}\"}\n".as_bytes();
        let e_acute = frame.iter().position(|b| *b == 0xC3).unwrap();
        let emoji = frame.iter().position(|b| *b == 0xF0).unwrap();
        let events = decode_all(&[
            &frame[..e_acute + 1],
            &frame[e_acute + 1..emoji + 2],
            &frame[emoji + 2..],
        ]);
        assert_eq!(events, vec![delta("caf\u{e9} \u{1F600}")]);
    }

    #[test]
    fn every_byte_split_yields_the_same_events() {
        let payload = "data: {\"session_id\":\"s-1\"}\n\ndata: {\"delta\":\"\u{3053}\u{3093}\"}\r\ndata: {\"delta\":\"!\"}\n\ndata: [DONE]\n";
        let bytes = payload.as_bytes();
        let expected = vec![
            StreamEvent::SessionAssigned("s-1".to_string()),
            delta("\u{3053}\u{3093}"),
            delta("!"),
            StreamEvent::Completed,
        ];

        for split in 0..=bytes.len() {
            let events = decode_all(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(events, expected, "split at byte {split}");
        }

        let one_byte_chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&one_byte_chunks), expected);
    }

    #[test]
    fn payload_keys_map_to_events() {
        let events = decode_all(&[
            b"data: {\"session_id\":\"abc\"}\n",
            b"data: {\"error\":\"db offline\"}\n",
            b"data: {\"unknown\":1}\n",
            b"data: {\"delta\":\"\"}\n",
            b"data: {\"end\":true}\n",
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::SessionAssigned("abc".to_string()),
                StreamEvent::Error("db offline".to_string()),
                StreamEvent::Completed,
            ]
        );
    }

    #[test]
    fn malformed_frame_degrades_to_text() {
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.push(b"data: {\"delta\":\"ok\"}\ndata: not json\n");
        events.extend(decoder.finish());
        assert_eq!(events, vec![delta("ok"), delta("not json")]);
        assert_eq!(decoder.metrics().protocol_deviations, 1);
    }

    #[test]
    fn unmarked_lines_are_ignored() {
        let events = decode_all(&[b"data: {\"delta\":\"a\"}\n: keepalive\nevent: message\n\ndata: {\"delta\":\"b\"}\n"]);
        assert_eq!(events, vec![delta("a"), delta("b")]);
    }

    #[test]
    fn unterminated_final_frame_is_flushed() {
        let events = decode_all(&[b"data: {\"delta\":\"a\"}\ndata: {\"delta\":\"b\"}"]);
        assert_eq!(events, vec![delta("a"), delta("b")]);
    }

    #[test]
    fn incomplete_final_fragment_is_dropped() {
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.push(b"data: {\"delta\":\"a\"}\ndata: {\"delta\":\"b");
        events.extend(decoder.finish());
        assert_eq!(events, vec![delta("a")]);
        assert_eq!(decoder.metrics().protocol_deviations, 1);
    }

    #[test]
    fn unframed_first_chunk_is_raw_text() {
        let events = decode_all(&[b"Hello there", b", friend"]);
        assert_eq!(events, vec![delta("Hello there"), delta(", friend")]);
    }

    #[test]
    fn marker_prefix_defers_raw_text_decision() {
        let events = decode_all(&[b"\nda", b"ta: {\"delta\":\"x\"}\n"]);
        assert_eq!(events, vec![delta("x")]);
    }

    #[test]
    fn raw_text_fallback_can_be_disabled() {
        let mut decoder = FrameDecoder::with_raw_text_fallback(false);
        let mut events = decoder.push(b"Hello\ndata: {\"delta\":\"x\"}\n");
        events.extend(decoder.finish());
        assert_eq!(events, vec![delta("x")]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let events = decode_all(&[b"data: {\"delta\":\"a\xFFb\"}\n"]);
        assert_eq!(events, vec![delta("a\u{FFFD}b")]);
    }

    #[test]
    fn text_buffer_carries_partial_code_point() {
        let mut buffer = TextBuffer::new();
        let bytes = "\u{20AC}".as_bytes();
        assert_eq!(buffer.decode(&bytes[..1]), "");
        assert!(!buffer.is_empty());
        assert_eq!(buffer.decode(&bytes[1..2]), "");
        assert_eq!(buffer.decode(&bytes[2..]), "\u{20AC}");
        assert!(buffer.is_empty());
        assert_eq!(buffer.decode(&bytes[..2]), "");
        assert_eq!(buffer.flush_decoder(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn decode_stream_stops_at_sentinel() {
        let chunks: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"data: {\"delta\":\"a\"}\n".to_vec()),
            Ok(b"data: [DONE]\n".to_vec()),
            Err(TransportError::Read("should not be read".to_string())),
        ];
        let body: ByteStream = Box::pin(futures::stream::iter(chunks));
        let events: Vec<_> = decode_stream(body, FrameDecoder::new(), &StreamingConfig::default())
            .collect()
            .await;
        assert_eq!(events, vec![Ok(delta("a")), Ok(StreamEvent::Completed)]);
    }

    #[tokio::test]
    async fn decode_stream_surfaces_read_errors() {
        let chunks: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"data: {\"delta\":\"a\"}\n".to_vec()),
            Err(TransportError::Read("reset".to_string())),
        ];
        let body: ByteStream = Box::pin(futures::stream::iter(chunks));
        let events: Vec<_> = decode_stream(body, FrameDecoder::new(), &StreamingConfig::default())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![Ok(delta("a")), Err(TransportError::Read("reset".to_string()))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn decode_stream_times_out_waiting_for_first_chunk() {
        let body: ByteStream = Box::pin(futures::stream::pending::<Result<Vec<u8>, TransportError>>());
        let config = StreamingConfig {
            first_chunk_timeout: Duration::from_millis(50),
            ..StreamingConfig::default()
        };
        let events: Vec<_> = decode_stream(body, FrameDecoder::new(), &config)
            .collect()
            .await;
        assert_eq!(
            events,
            vec![Err(TransportError::Timeout {
                operation: "first_chunk",
                duration: Duration::from_millis(50),
            })]
        );
    }
}
