//! # streamchat-core - Runtime for the streamchat client
//!
//! `streamchat-core` powers the streamchat terminal client. It provides the
//! pieces of a chat front end that carry real concurrency risk: consuming an
//! incremental answer stream, cancelling it, and verifying the links the
//! assistant produces.
//!
//! ## Highlights
//!
//! - **Frame Decoder**: turns transport byte chunks into ordered
//!   [`stream::StreamEvent`]s. Multi-byte characters and frames may be split at
//!   any byte; the decoder carries state across chunks.
//! - **Stream Session Controller**: single-flight ownership of the active
//!   response stream, with cooperative cancellation and exactly one terminal
//!   notification per session.
//! - **Verification Cache**: memoized URL reachability checks where concurrent
//!   callers for the same URL share one underlying request.
//! - **Configuration-First**: everything is driven by `streamchat.toml`, with
//!   protocol constants centralized in `config::constants`.
//!
//! ## Architecture Overview
//!
//! - `config/`: configuration loader, defaults and constants.
//! - `transport`: the byte-stream transport seam and its `reqwest` implementation.
//! - `stream/`: frame decoder, session state and the session controller.
//! - `verify/`: verification cache, link checkers and link annotation.
//! - `render`: markdown rendering collaborators.
//! - `history`: request/response client for the conversation API.
//! - `client`: the [`client::ClientState`] object tying everything together.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use streamchat_core::client::ClientState;
//! use streamchat_core::config::ConfigManager;
//! use streamchat_core::stream::{ChatRequest, NoopObserver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigManager::load()?.into_config();
//!     let client = ClientState::from_config(config, Arc::new(NoopObserver))?;
//!
//!     let handle = client.controller().start(ChatRequest::new("Hello there"));
//!     let outcome = handle.outcome().await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod history;
pub mod render;
pub mod stream;
pub mod transport;
pub mod verify;

pub use client::ClientState;
pub use config::{ConfigManager, StreamChatConfig};
pub use stream::{
    ChatRequest, FrameDecoder, SessionOutcome, SessionState, StreamController, StreamEvent,
    StreamObserver,
};
pub use verify::{Verification, VerificationCache};
