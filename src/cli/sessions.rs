//! Conversation management commands

use anyhow::{Context, Result, bail};
use console::style;
use streamchat_core::config::StreamChatConfig;
use streamchat_core::history::{ConversationApi, HistoryMessage, SessionSummary};

fn api(config: &StreamChatConfig) -> Result<ConversationApi> {
    ConversationApi::new(&config.server).context("Failed to initialize API client")
}

pub fn print_sessions(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("{}", style("No conversations yet.").dim());
        return;
    }
    for session in sessions {
        let updated = session.updated_at.as_deref().unwrap_or("-");
        println!(
            "{}  {}  {}",
            style(&session.session_id).cyan(),
            session.title,
            style(format!("{} messages, updated {updated}", session.message_count)).dim()
        );
    }
}

fn print_history(messages: &[HistoryMessage]) {
    for message in messages {
        let speaker = match message.role.as_str() {
            "user" => style("you>").green().bold(),
            _ => style("assistant>").blue().bold(),
        };
        println!("{speaker} {}", message.content);
    }
}

pub async fn handle_sessions_command(config: &StreamChatConfig) -> Result<()> {
    let sessions = api(config)?.list_sessions().await?;
    print_sessions(&sessions);
    Ok(())
}

pub async fn handle_history_command(config: &StreamChatConfig, session_id: &str) -> Result<()> {
    let messages = api(config)?
        .history(session_id)
        .await
        .with_context(|| format!("Failed to load history for {session_id}"))?;
    print_history(&messages);
    Ok(())
}

pub async fn handle_new_session_command(config: &StreamChatConfig) -> Result<()> {
    let session = api(config)?.new_session().await?;
    println!("{}", session.session_id);
    Ok(())
}

pub async fn handle_delete_session_command(
    config: &StreamChatConfig,
    session_id: &str,
) -> Result<()> {
    api(config)?
        .delete_session(session_id)
        .await
        .with_context(|| format!("Failed to delete {session_id}"))?;
    println!("{} {session_id}", style("Deleted").dim());
    Ok(())
}

pub async fn handle_rename_session_command(
    config: &StreamChatConfig,
    session_id: &str,
    title: &str,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("A title is required. Use: streamchat rename-session <id> \"New title\"");
    }
    api(config)?
        .rename_session(session_id, title.trim())
        .await
        .with_context(|| format!("Failed to rename {session_id}"))?;
    println!("{} {session_id}", style("Renamed").dim());
    Ok(())
}
