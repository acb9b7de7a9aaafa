//! Command-line interface module
//!
//! Argument parsing lives in [`args`]; each command has a handler module.

pub mod args;
pub mod ask;
pub mod chat;
pub mod check_url;
pub mod init;
pub mod output;
pub mod sessions;

pub use args::{Cli, Commands};

use anyhow::{Context, Result};
use std::io;
use std::sync::Arc;
use streamchat_core::config::{ConfigManager, StreamChatConfig};
use streamchat_core::stream::{ChatRequest, SessionOutcome};
use streamchat_core::ClientState;
use tracing::{debug, warn};

/// Resolve the configuration for this invocation
pub fn load_config(cli: &Cli) -> Result<StreamChatConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load().context("Failed to load configuration")?,
    };
    if let Some(path) = manager.config_path() {
        debug!(path = %path.display(), "using configuration file");
    }

    let mut config = manager.into_config();
    if let Some(base_url) = &cli.base_url {
        config.server.base_url = base_url.clone();
    }
    Ok(config)
}

/// Client whose observer prints the answer to the terminal
pub fn terminal_client(config: StreamChatConfig) -> Result<ClientState> {
    ClientState::from_config(config, Arc::new(output::TerminalObserver::new()))
        .context("Failed to initialize client")
}

/// Run `work` until it finishes or `interrupt` fires; `None` means interrupted.
///
/// An interrupt source that fails (no signal handler could be installed) is
/// ignored and `work` runs to completion.
pub async fn until_interrupted<F, I>(work: F, interrupt: I) -> Option<F::Output>
where
    F: Future,
    I: Future<Output = io::Result<()>>,
{
    tokio::pin!(work);
    let signal = tokio::select! {
        output = &mut work => return Some(output),
        signal = interrupt => signal,
    };

    match signal {
        Ok(()) => None,
        Err(error) => {
            warn!(%error, "Ctrl-C handler unavailable");
            Some(work.await)
        }
    }
}

/// Stream one answer, cancelling it on Ctrl-C
pub async fn stream_answer(client: &ClientState, request: ChatRequest) -> SessionOutcome {
    let handle = client.controller().start(request);
    match until_interrupted(handle.outcome(), tokio::signal::ctrl_c()).await {
        Some(outcome) => outcome,
        None => {
            handle.cancel();
            handle.outcome().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn interrupt_stops_waiting() {
        let work = tokio::time::sleep(Duration::from_secs(3600));
        let result = until_interrupted(work, async { Ok(()) }).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn failed_interrupt_source_lets_work_finish() {
        let work = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            7
        };
        let result = until_interrupted(work, async { Err(io::Error::other("no handler")) }).await;
        assert_eq!(result, Some(7));
    }
}
