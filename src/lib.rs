//! # streamchat - terminal chat client
//!
//! `streamchat` talks to a chat assistant service that streams its answers as
//! `data:`-prefixed JSON lines. Answers print as they arrive, Ctrl-C stops the
//! one in progress, and links in an answer can be checked for reachability.
//!
//! ## Quickstart
//!
//! ```bash
//! # Write a default configuration next to you
//! streamchat init
//!
//! # Point at the service and ask something
//! export STREAMCHAT_BASE_URL="http://localhost:8000"
//! streamchat ask --check-links "Where are the tokio docs?"
//!
//! # Interactive chat
//! streamchat chat
//! ```
//!
//! ## Architecture Overview
//!
//! - `streamchat-core/` holds the stream decoder, the single-flight stream
//!   controller, the verification cache and the conversation API client.
//! - `src/cli/` holds the Clap-based commands wired on top of it.
//!
//! This package contains the binary executable for streamchat.
//! For the core library functionality, see `streamchat-core`.

pub mod cli;
