//! Terminal implementations of the workflow collaborators.
//!
//! Input is read line by line from stdin on the blocking pool. Secrets are
//! echoed; this is a developer tool.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use seedkit_core::{AlertPresenter, Navigator, Pin, PinCancelled, PinPrompt};

/// Prints `label` and reads one line from stdin, without the line ending.
///
/// Returns `None` on end of input.
pub async fn prompt_line(label: &str) -> eyre::Result<Option<String>> {
    let label = label.to_string();
    tokio::task::spawn_blocking(move || -> eyre::Result<Option<String>> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{label}")?;
        stdout.flush()?;
        drop(stdout);

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    })
    .await?
}

/// Asks a yes/no question; anything but `y` is a no.
pub async fn confirm(label: &str) -> bool {
    matches!(
        prompt_line(label).await,
        Ok(Some(answer)) if answer.trim().eq_ignore_ascii_case("y")
    )
}

/// Reads a PIN from stdin. An empty line or end of input cancels.
pub async fn read_pin(label: &str) -> Result<Pin, PinCancelled> {
    match prompt_line(label).await {
        Ok(Some(pin)) if !pin.is_empty() => Ok(Pin::new(pin)),
        Ok(_) => Err(PinCancelled),
        Err(err) => {
            tracing::warn!("failed to read pin: {err}");
            Err(PinCancelled)
        }
    }
}

/// Asks for the PIN protecting a new identity.
#[derive(Debug, Default)]
pub struct TerminalPinPrompt;

#[async_trait]
impl PinPrompt for TerminalPinPrompt {
    async fn acquire_pin(&self) -> Result<Pin, PinCancelled> {
        read_pin("Choose a PIN (empty to cancel): ").await
    }
}

/// Prints errors to stderr and asks yes/no questions on stdin.
#[derive(Debug, Default)]
pub struct TerminalAlerts;

#[async_trait]
impl AlertPresenter for TerminalAlerts {
    async fn report_error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    async fn confirm_risk(&self, message: &str) -> bool {
        eprintln!("warning: {message}");
        confirm("Continue anyway? [y/N] ").await
    }
}

/// Reports where the app would navigate next.
#[derive(Debug, Default)]
pub struct TerminalNavigator;

#[async_trait]
impl Navigator for TerminalNavigator {
    async fn navigate_to_identity_network(&self) {
        tracing::info!("identity ready, continuing to network selection");
    }

    async fn navigate_to_identity_backup(&self, is_new: bool) {
        tracing::info!(is_new, "continuing to identity backup");
    }
}
