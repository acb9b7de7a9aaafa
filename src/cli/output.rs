//! Terminal rendering of streamed answers and link reports

use console::style;
use std::io::{self, Write};
use streamchat_core::stream::{SessionId, SessionOutcome, StreamObserver};
use streamchat_core::verify::LinkReport;

/// Prints deltas to stdout as they arrive; notices go to stderr
#[derive(Debug, Default)]
pub struct TerminalObserver;

impl TerminalObserver {
    pub fn new() -> Self {
        Self
    }
}

impl StreamObserver for TerminalObserver {
    fn on_delta(&self, _session: SessionId, delta: &str, _text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(delta.as_bytes());
        let _ = stdout.flush();
    }

    fn on_server_error(&self, _session: SessionId, message: &str) {
        eprintln!("\n{} {message}", style("server error:").yellow().bold());
    }

    fn on_finished(&self, _session: SessionId, outcome: &SessionOutcome) {
        if !outcome.text().is_empty() && !outcome.text().ends_with('\n') {
            println!();
        }
        match outcome {
            SessionOutcome::Completed { .. } => {}
            SessionOutcome::Cancelled { .. } => {
                eprintln!("{}", style("[stopped]").dim());
            }
            SessionOutcome::Failed { message, .. } => {
                eprintln!("{}", style(message).red());
            }
        }
    }
}

pub fn print_link_reports(reports: &[LinkReport]) {
    if reports.is_empty() {
        return;
    }
    println!("{}", style("Links:").cyan().bold());
    for report in reports {
        let verification = &report.verification;
        let marker = if verification.valid {
            style("✅").green()
        } else {
            style("❌").red()
        };
        let detail = match (&verification.error, verification.status) {
            (Some(error), _) => error.clone(),
            (None, status) => format!("HTTP {status}"),
        };
        println!("  {marker} {} {}", report.url, style(detail).dim());
    }
}
