//! Interactive chat loop

use super::output::print_link_reports;
use super::{stream_answer, terminal_client, until_interrupted};
use anyhow::{Context, Result};
use console::style;
use std::io::{self, Write};
use streamchat_core::ClientState;
use streamchat_core::config::StreamChatConfig;
use streamchat_core::stream::{ChatRequest, SessionOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Slash commands understood by the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    NewConversation,
    Switch(String),
    Sessions,
    Reset,
    Help,
    Exit,
    Empty,
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));
        match name {
            "new" => Self::NewConversation,
            "switch" if !rest.is_empty() => Self::Switch(rest.to_string()),
            "sessions" => Self::Sessions,
            "reset" => Self::Reset,
            "exit" | "quit" => Self::Exit,
            _ => Self::Help,
        }
    }
}

fn print_help() {
    println!("{}", style("Commands:").cyan().bold());
    println!("  /new            start a new conversation");
    println!("  /switch <id>    continue another conversation");
    println!("  /sessions       list conversations");
    println!("  /reset          forget the current conversation and cached links");
    println!("  /exit           leave");
    println!("Press Ctrl-C while an answer streams to stop it.");
}

fn prompt() -> Result<()> {
    print!("{} ", style("you>").green().bold());
    io::stdout().flush().context("Failed to flush stdout")
}

/// Handle the chat command
pub async fn handle_chat_command(
    config: StreamChatConfig,
    session: Option<String>,
    check_links: bool,
) -> Result<()> {
    let client = terminal_client(config)?;
    if let Some(session) = session {
        client.switch_conversation(session);
    }

    println!(
        "{} {}",
        style("streamchat").blue().bold(),
        style(client.config().server.base_url.as_str()).dim()
    );
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        // Ctrl-C at the prompt leaves the chat
        let Some(line) = until_interrupted(lines.next_line(), tokio::signal::ctrl_c()).await
        else {
            println!();
            break;
        };
        let Some(line) = line.context("Failed to read input")? else {
            break;
        };

        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Exit => break,
            ChatInput::Help => print_help(),
            ChatInput::Reset => {
                client.reset();
                println!("{}", style("State cleared.").dim());
            }
            ChatInput::NewConversation => match client.new_conversation().await {
                Ok(summary) => println!("{} {}", style("New conversation").dim(), summary.session_id),
                Err(err) => eprintln!("{} {err}", style("error:").red().bold()),
            },
            ChatInput::Switch(id) => {
                client.switch_conversation(id.clone());
                println!("{} {id}", style("Switched to").dim());
            }
            ChatInput::Sessions => match client.refresh_sessions().await {
                Ok(sessions) => super::sessions::print_sessions(&sessions),
                Err(err) => eprintln!("{} {err}", style("error:").red().bold()),
            },
            ChatInput::Message(message) => {
                print!("{} ", style("assistant>").blue().bold());
                io::stdout().flush().context("Failed to flush stdout")?;
                let outcome = stream_answer(&client, ChatRequest::new(message)).await;
                if check_links {
                    links_after(&client, &outcome).await;
                }
            }
        }
    }

    client.controller().cancel();
    Ok(())
}

async fn links_after(client: &ClientState, outcome: &SessionOutcome) {
    if let SessionOutcome::Completed { text } = outcome {
        print_link_reports(&client.check_links(text).await);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_messages_and_commands() {
        assert_eq!(ChatInput::parse("  hello "), ChatInput::Message("hello".into()));
        assert_eq!(ChatInput::parse(""), ChatInput::Empty);
        assert_eq!(ChatInput::parse("/new"), ChatInput::NewConversation);
        assert_eq!(
            ChatInput::parse("/switch  abc-123 "),
            ChatInput::Switch("abc-123".into())
        );
        assert_eq!(ChatInput::parse("/switch"), ChatInput::Help);
        assert_eq!(ChatInput::parse("/quit"), ChatInput::Exit);
        assert_eq!(ChatInput::parse("/what"), ChatInput::Help);
    }
}
