use strum::{Display, EnumString};

use crate::seed_ref::SeedRefHandle;

/// Whether the user is creating a fresh identity or recovering one from a seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, uniffi::Enum)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// A new seed will be generated and backed up on a later screen.
    Create,
    /// The user types an existing seed phrase.
    Recover,
}

/// Where the workflow currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// Waiting for input; the verdict is up to date.
    Editing(Mode),
    /// Input changed and its address derivation has not been applied yet.
    Validating(Mode),
    /// Waiting for the PIN collaborator.
    AwaitingPin,
    /// Sealing and persisting the seed.
    Committing,
    /// The identity was stored, or the flow moved on to the backup screen.
    Done,
    /// The last commit failed with the given message. The seed reference is
    /// kept so the commit can be retried.
    Failed(String),
}

impl ControllerState {
    /// Whether the state accepts input and mode changes.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        matches!(self, Self::Editing(_) | Self::Validating(_) | Self::Failed(_))
    }
}

/// The identity being assembled by the workflow.
#[derive(Debug, Default)]
pub struct IdentityDraft {
    pub(crate) name: String,
    pub(crate) seed_reference: Option<SeedRefHandle>,
}

impl IdentityDraft {
    /// Display name chosen for the identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the seed has already been handed to the store.
    #[must_use]
    pub const fn holds_reference(&self) -> bool {
        self.seed_reference.is_some()
    }
}
