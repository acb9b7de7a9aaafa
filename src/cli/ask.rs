use super::output::print_link_reports;
use super::{stream_answer, terminal_client};
use anyhow::{Context, Result, bail};
use streamchat_core::config::StreamChatConfig;
use streamchat_core::stream::{ChatRequest, SessionOutcome};

/// Flags of the ask command
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub session: Option<String>,
    pub system: Option<String>,
    pub check_links: bool,
    pub no_stream: bool,
}

/// Handle the ask command - single prompt, streamed answer
pub async fn handle_ask_command(
    config: StreamChatConfig,
    prompt: &str,
    options: AskOptions,
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("No prompt provided. Use: streamchat ask \"Your question here\"");
    }

    let client = terminal_client(config)?;
    if let Some(session) = options.session {
        client.switch_conversation(session);
    }

    let mut request = ChatRequest::new(prompt);
    if let Some(system) = options.system {
        request = request.with_system_instruction(system);
    }

    let text = if options.no_stream {
        let reply = client.ask_once(request).await.context("Request failed")?;
        println!("{}", reply.response);
        reply.response
    } else {
        match stream_answer(&client, request).await {
            SessionOutcome::Completed { text } => text,
            SessionOutcome::Cancelled { .. } => return Ok(()),
            SessionOutcome::Failed { error, .. } => bail!("Request failed: {error}"),
        }
    };

    if options.check_links {
        print_link_reports(&client.check_links(&text).await);
    }
    Ok(())
}
