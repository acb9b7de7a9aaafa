//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for streamchat
#[derive(Parser, Debug)]
#[command(
    name = "streamchat",
    version,
    about = "Stream answers from a chat assistant, cancel them mid-flight and check the links they contain"
)]
pub struct Cli {
    /// Configuration file path; defaults to the usual search locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override `server.base_url`
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Log filter directive (error, warn, info, debug, trace); `RUST_LOG` wins
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Disable color output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Interactive chat; Ctrl-C stops the answer being streamed
    Chat {
        /// Continue an existing conversation
        #[arg(long)]
        session: Option<String>,

        /// Verify links in every answer
        #[arg(long)]
        check_links: bool,
    },

    /// Single prompt; streams the answer to stdout
    Ask {
        /// The prompt to send
        prompt: Vec<String>,

        /// Continue an existing conversation
        #[arg(long)]
        session: Option<String>,

        /// Extra system instruction for this request
        #[arg(long)]
        system: Option<String>,

        /// Verify links in the answer
        #[arg(long)]
        check_links: bool,

        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Check whether URLs are reachable
    CheckUrl {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Send HEAD requests directly instead of using the service endpoint
        #[arg(long)]
        direct: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List conversations
    Sessions,

    /// Print the stored messages of a conversation
    History { session_id: String },

    /// Create an empty conversation
    NewSession,

    /// Delete a conversation
    DeleteSession { session_id: String },

    /// Rename a conversation
    RenameSession {
        session_id: String,
        title: Vec<String>,
    },

    /// Write a default `streamchat.toml`
    Init {
        /// Where to write the file
        #[arg(long, default_value = "streamchat.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Self::Chat {
            session: None,
            check_links: false,
        }
    }
}
