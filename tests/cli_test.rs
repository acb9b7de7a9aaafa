use anyhow::Result;
use clap::Parser;
use std::fs;
use streamchat::cli::{Cli, Commands, load_config};
use tempfile::TempDir;

#[test]
fn defaults_to_interactive_chat() {
    let cli = Cli::parse_from(["streamchat"]);
    assert_eq!(cli.command.unwrap_or_default(), Commands::default());
    assert!(!cli.no_color);
}

#[test]
fn parses_ask_with_options() {
    let cli = Cli::parse_from([
        "streamchat",
        "--base-url",
        "http://chat.test",
        "ask",
        "--check-links",
        "--session",
        "abc",
        "what",
        "is",
        "tokio?",
    ]);
    assert_eq!(cli.base_url.as_deref(), Some("http://chat.test"));
    match cli.command {
        Some(Commands::Ask {
            prompt,
            session,
            system,
            check_links,
            no_stream,
        }) => {
            assert_eq!(prompt.join(" "), "what is tokio?");
            assert_eq!(session.as_deref(), Some("abc"));
            assert_eq!(system, None);
            assert!(check_links);
            assert!(!no_stream);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn ask_can_skip_streaming() {
    let cli = Cli::parse_from(["streamchat", "ask", "--no-stream", "hello"]);
    assert!(matches!(
        cli.command,
        Some(Commands::Ask { no_stream: true, .. })
    ));
}

#[test]
fn check_url_requires_at_least_one_url() {
    assert!(Cli::try_parse_from(["streamchat", "check-url"]).is_err());

    let cli = Cli::try_parse_from(["streamchat", "check-url", "--direct", "https://a.io"]).unwrap();
    assert_eq!(
        cli.command,
        Some(Commands::CheckUrl {
            urls: vec!["https://a.io".to_string()],
            direct: true,
            json: false,
        })
    );
}

#[test]
fn config_file_and_base_url_flag_are_layered() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("streamchat.toml");
    fs::write(
        &path,
        "[server]\nbase_url = \"http://from-file:9000\"\n\n[streaming]\nraw_text_fallback = false\n",
    )?;
    let path_arg = path.to_string_lossy().to_string();

    let cli = Cli::parse_from(["streamchat", "--config", &path_arg, "sessions"]);
    let config = load_config(&cli)?;
    assert!(!config.streaming.raw_text_fallback);

    let cli = Cli::parse_from([
        "streamchat",
        "--config",
        &path_arg,
        "--base-url",
        "http://from-flag:1",
        "sessions",
    ]);
    let config = load_config(&cli)?;
    assert_eq!(config.server.base_url, "http://from-flag:1");
    assert!(!config.streaming.raw_text_fallback);
    Ok(())
}

#[test]
fn init_writes_a_loadable_file() -> Result<()> {
    let dir = TempDir::new()?;
    let output = dir.path().join("streamchat.toml");

    streamchat::cli::init::handle_init_command(&output, false)?;
    assert!(streamchat::cli::init::handle_init_command(&output, false).is_err());
    streamchat::cli::init::handle_init_command(&output, true)?;

    let content = fs::read_to_string(&output)?;
    assert!(content.contains("[verification]"));
    Ok(())
}
