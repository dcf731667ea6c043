//! Interfaces the host app implements for the identity workflow.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::secret::Pin;

/// Moves the app to the screens that follow the workflow.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Called once a recovered identity has been committed.
    async fn navigate_to_identity_network(&self);

    /// Called when the user chooses to create a new identity.
    async fn navigate_to_identity_backup(&self, is_new: bool);
}

/// The user dismissed the PIN entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pin entry cancelled")]
pub struct PinCancelled;

/// Asks the user for the PIN that will protect the identity.
#[async_trait]
pub trait PinPrompt: Send + Sync {
    /// Resolves with the PIN, or [`PinCancelled`] if the user backed out.
    async fn acquire_pin(&self) -> Result<Pin, PinCancelled>;
}

/// Shows errors and risk confirmations.
#[async_trait]
pub trait AlertPresenter: Send + Sync {
    /// Shows `message` as an error.
    async fn report_error(&self, message: &str);

    /// Asks the user to accept the risk described by `message`.
    async fn confirm_risk(&self, message: &str) -> bool;
}

/// Everything the controller calls out to.
#[derive(Clone)]
pub struct Collaborators {
    /// Screen navigation.
    pub navigator: Arc<dyn Navigator>,
    /// PIN entry.
    pub pin_prompt: Arc<dyn PinPrompt>,
    /// Alerts and risk prompts.
    pub alerts: Arc<dyn AlertPresenter>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
