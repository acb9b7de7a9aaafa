use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use streamchat_core::config::StreamChatConfig;

/// Handle the init command
pub fn handle_init_command(output: &Path, force: bool) -> Result<()> {
    StreamChatConfig::create_sample_config(output, force)
        .with_context(|| "failed to initialize configuration file")?;
    println!(
        "{} {}",
        style("Wrote").green().bold(),
        output.display()
    );
    Ok(())
}
