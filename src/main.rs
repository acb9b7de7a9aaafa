//! streamchat - stream answers from a chat assistant

use anyhow::Result;
use clap::Parser;
use streamchat::cli::{self, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn init_tracing(cli: &Cli, configured_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = cli.log_level.as_deref().unwrap_or(configured_filter);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    // stdout carries only answers
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    if args.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let command = args.command.clone().unwrap_or_default();
    if let Commands::Init { output, force } = &command {
        init_tracing(&args, "warn");
        return cli::init::handle_init_command(output, *force);
    }

    let config = cli::load_config(&args)?;
    init_tracing(&args, &config.logging.filter);

    match command {
        Commands::Chat {
            session,
            check_links,
        } => cli::chat::handle_chat_command(config, session, check_links).await,
        Commands::Ask {
            prompt,
            session,
            system,
            check_links,
            no_stream,
        } => {
            let options = cli::ask::AskOptions {
                session,
                system,
                check_links,
                no_stream,
            };
            cli::ask::handle_ask_command(config, &prompt.join(" "), options).await
        }
        Commands::CheckUrl { urls, direct, json } => {
            cli::check_url::handle_check_url_command(config, &urls, direct, json).await
        }
        Commands::Sessions => cli::sessions::handle_sessions_command(&config).await,
        Commands::History { session_id } => {
            cli::sessions::handle_history_command(&config, &session_id).await
        }
        Commands::NewSession => cli::sessions::handle_new_session_command(&config).await,
        Commands::DeleteSession { session_id } => {
            cli::sessions::handle_delete_session_command(&config, &session_id).await
        }
        Commands::RenameSession { session_id, title } => {
            cli::sessions::handle_rename_session_command(&config, &session_id, &title.join(" "))
                .await
        }
        Commands::Init { .. } => Ok(()),
    }
}
