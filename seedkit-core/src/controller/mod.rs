//! The recover/create identity workflow.
//!
//! [`IdentityController`] owns the typed phrase while the user edits it,
//! validates every change, runs address derivation through a
//! [`DebouncedDeriver`] and, on confirmation, moves the phrase into the
//! [`SeedRefStore`] and commits it under a PIN. Everything it cannot do itself
//! (navigation, PIN entry, dialogs) goes through [`Collaborators`].
//!
//! Methods take `&mut self`: the controller is driven by one logical flow and
//! only suspends while deriving, prompting or committing.
//!
//! Create mode keeps whatever was typed but neither validates nor derives it;
//! switching to recover mode picks the text up again.

mod collaborators;
mod error;
mod state;

use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::mpsc;

pub use collaborators::{AlertPresenter, Collaborators, Navigator, PinCancelled, PinPrompt};
pub use error::ControllerError;
pub use state::{ControllerState, IdentityDraft, Mode};

use crate::{
    config::FlowConfig,
    derivation::{
        AddressDeriver, DebouncedDeriver, DerivationError, DerivationOutcome, DerivedAddress,
        Generation,
    },
    secret::{Pin, SeedPhrase},
    seed_ref::{IdentityId, IdentityMetadata, SeedKind, SeedRefStore, StorageError},
    validation::{validate_phrase, ValidationVerdict},
};

/// How a call to [`IdentityController::confirm_recover`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The identity was stored under this id.
    Committed(IdentityId),
    /// The user did not accept the risk prompt.
    RiskDeclined,
    /// The phrase cannot be used; the reason was reported as an error.
    Rejected,
    /// The user backed out of PIN entry.
    PinCancelled,
    /// Storing the identity failed with this message. Confirming again retries
    /// with the same seed.
    CommitFailed(String),
}

/// State machine behind the "add identity" screen.
pub struct IdentityController {
    collaborators: Collaborators,
    store: SeedRefStore,
    debouncer: DebouncedDeriver,
    outcomes: mpsc::UnboundedReceiver<DerivationOutcome>,
    config: FlowConfig,
    mode: Mode,
    state: ControllerState,
    draft: IdentityDraft,
    phrase: SeedPhrase,
    verdict: ValidationVerdict,
    address: Option<DerivedAddress>,
    pending: Option<Generation>,
    risk_accepted_for: Option<Generation>,
}

impl std::fmt::Debug for IdentityController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityController")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("draft", &self.draft)
            .field("verdict", &self.verdict.kind)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl IdentityController {
    /// Creates a controller with an empty draft, in `Editing(mode)`.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        store: SeedRefStore,
        deriver: Arc<dyn AddressDeriver>,
        config: FlowConfig,
        mode: Mode,
    ) -> Self {
        let (debouncer, outcomes) = DebouncedDeriver::new(deriver, config.settle_delay());
        Self {
            collaborators,
            store,
            debouncer,
            outcomes,
            config,
            mode,
            state: ControllerState::Editing(mode),
            draft: IdentityDraft::default(),
            phrase: SeedPhrase::empty(),
            verdict: ValidationVerdict::default_invalid(),
            address: None,
            pending: None,
            risk_accepted_for: None,
        }
    }

    /// Current workflow state.
    #[must_use]
    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Verdict for the current phrase.
    #[must_use]
    pub const fn verdict(&self) -> &ValidationVerdict {
        &self.verdict
    }

    /// Address derived for the current phrase, once its derivation is applied.
    #[must_use]
    pub const fn address(&self) -> Option<&DerivedAddress> {
        self.address.as_ref()
    }

    /// The identity being assembled.
    #[must_use]
    pub const fn draft(&self) -> &IdentityDraft {
        &self.draft
    }

    /// The store seeds are committed to.
    #[must_use]
    pub const fn store(&self) -> &SeedRefStore {
        &self.store
    }

    /// Generation of the latest input change.
    #[must_use]
    pub fn current_generation(&self) -> Generation {
        self.debouncer.current_generation()
    }

    /// Whether a derivation for the current input has not been applied yet.
    #[must_use]
    pub const fn derivation_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn ensure_editable(&self) -> Result<(), ControllerError> {
        match &self.state {
            ControllerState::Done => Err(ControllerError::AlreadyCommitted),
            state if state.is_editable() => Ok(()),
            state => Err(ControllerError::InvalidState(state.clone())),
        }
    }

    const fn settled_state(&self) -> ControllerState {
        if self.pending.is_some() {
            ControllerState::Validating(self.mode)
        } else {
            ControllerState::Editing(self.mode)
        }
    }

    /// Sets the identity's display name.
    ///
    /// # Errors
    ///
    /// Fails once the identity is committed or while a commit is in flight.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ControllerError> {
        self.ensure_editable()?;
        self.draft.name = name.into();
        Ok(())
    }

    /// Switches between create and recover mode.
    ///
    /// Entering create mode drops the verdict, any pending derivation and any
    /// seed reference held from a failed commit. Entering recover mode
    /// validates the kept text and schedules its derivation.
    ///
    /// # Errors
    ///
    /// Fails once the identity is committed, while a commit is in flight, or
    /// when entering recover mode with text to derive outside a Tokio runtime.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), ControllerError> {
        self.ensure_editable()?;
        if self.mode != mode {
            if Self::needs_derivation(mode, &self.phrase) {
                Self::ensure_runtime()?;
            }
            log::debug!("identity flow switched to {mode} mode");
            self.mode = mode;
            self.release_reference();
            self.refresh_input();
        }
        self.state = self.settled_state();
        Ok(())
    }

    fn needs_derivation(mode: Mode, phrase: &SeedPhrase) -> bool {
        mode == Mode::Recover && !phrase.is_blank()
    }

    fn ensure_runtime() -> Result<(), ControllerError> {
        tokio::runtime::Handle::try_current()
            .map(drop)
            .map_err(|_| ControllerError::NoRuntime)
    }

    /// Replaces the typed phrase.
    ///
    /// In recover mode the phrase is validated immediately, as not yet
    /// confirmed BIP39, and a derivation is scheduled unless it is blank. In
    /// create mode it is only kept. Any seed reference held from a failed
    /// commit is discarded, and any risk acknowledgement is void.
    ///
    /// # Errors
    ///
    /// Fails once the identity is committed, while a commit is in flight, or
    /// outside a Tokio runtime when there is something to derive.
    pub fn on_seed_input(&mut self, phrase: SeedPhrase) -> Result<Generation, ControllerError> {
        self.ensure_editable()?;
        if Self::needs_derivation(self.mode, &phrase) {
            Self::ensure_runtime()?;
        }

        self.release_reference();
        self.phrase = phrase;
        let generation = self.refresh_input();
        self.state = self.settled_state();
        Ok(generation)
    }

    /// Recomputes the verdict for the kept phrase and reschedules derivation.
    fn refresh_input(&mut self) -> Generation {
        self.address = None;
        self.risk_accepted_for = None;
        if !Self::needs_derivation(self.mode, &self.phrase) {
            self.debouncer.cancel();
            self.pending = None;
            self.verdict = ValidationVerdict::default_invalid();
            return self.debouncer.current_generation();
        }
        self.verdict = validate_phrase(
            self.phrase.expose_secret(),
            false,
            self.config.min_word_count,
        );
        let generation = self.debouncer.on_input_changed(self.phrase.trimmed_end());
        self.pending = Some(generation);
        generation
    }

    fn apply_outcome(&mut self, outcome: DerivationOutcome) -> bool {
        let DerivationOutcome {
            generation,
            fingerprint,
            result,
        } = outcome;
        if self.pending != Some(generation) || !self.debouncer.is_current(generation) {
            log::trace!("dropping stale derivation for generation {generation}");
            return false;
        }
        self.pending = None;

        let result = if self.phrase.trimmed_end().matches_fingerprint(&fingerprint) {
            result
        } else {
            Err(DerivationError::Worker(
                "derived phrase does not match current input".to_string(),
            ))
        };
        match result {
            Ok(derived) => {
                self.verdict = validate_phrase(
                    self.phrase.expose_secret(),
                    derived.is_bip39,
                    self.config.min_word_count,
                );
                self.address = Some(derived);
            }
            Err(err) => {
                log::warn!("address derivation for generation {generation} failed: {err}");
                self.verdict = ValidationVerdict::default_invalid();
                self.address = None;
            }
        }
        if matches!(self.state, ControllerState::Validating(_)) {
            self.state = ControllerState::Editing(self.mode);
        }
        true
    }

    /// Applies every derivation outcome that has already arrived, without
    /// waiting. Returns how many were current.
    pub fn apply_pending_derivations(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.outcomes.try_recv() {
            if self.apply_outcome(outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next derivation outcome and applies it if it is current.
    ///
    /// Returns `false` right away when no derivation is pending.
    pub async fn next_derivation(&mut self) -> bool {
        if self.pending.is_none() {
            return false;
        }
        match self.outcomes.recv().await {
            Some(outcome) => self.apply_outcome(outcome),
            None => false,
        }
    }

    /// Waits until the derivation for the current input has been applied.
    pub async fn wait_for_derivation(&mut self) {
        self.apply_pending_derivations();
        while self.pending.is_some() {
            match self.outcomes.recv().await {
                Some(outcome) => {
                    self.apply_outcome(outcome);
                }
                None => break,
            }
        }
    }

    /// Confirms the typed phrase and, if the user agrees, commits it.
    ///
    /// Waits for a pending derivation first so the decision uses the final
    /// verdict. Invalid phrases that cannot be overridden are reported as
    /// errors; overridable ones need an accepted risk prompt, which stays valid
    /// until the phrase changes.
    ///
    /// # Errors
    ///
    /// Fails outside recover mode, once the identity is committed, or while a
    /// commit is in flight. User-facing failures are reported through the
    /// [`ConfirmOutcome`] instead.
    pub async fn confirm_recover(&mut self) -> Result<ConfirmOutcome, ControllerError> {
        self.ensure_editable()?;
        if self.mode != Mode::Recover {
            return Err(ControllerError::WrongMode {
                expected: Mode::Recover,
                actual: self.mode,
            });
        }
        self.wait_for_derivation().await;

        let generation = self.debouncer.current_generation();
        let verdict = self.verdict.clone();
        if !verdict.is_valid {
            if !verdict.allows_recovery_override {
                self.collaborators.alerts.report_error(&verdict.reason).await;
                return Ok(ConfirmOutcome::Rejected);
            }
            if self.risk_accepted_for != Some(generation) {
                if !self.collaborators.alerts.confirm_risk(&verdict.reason).await {
                    log::debug!("risk prompt declined for generation {generation}");
                    return Ok(ConfirmOutcome::RiskDeclined);
                }
                self.risk_accepted_for = Some(generation);
            }
        }

        self.state = ControllerState::AwaitingPin;
        let pin = match self.collaborators.pin_prompt.acquire_pin().await {
            Ok(pin) => pin,
            Err(PinCancelled) => {
                log::debug!("pin entry cancelled");
                self.state = self.settled_state();
                return Ok(ConfirmOutcome::PinCancelled);
            }
        };
        Ok(self.commit(pin, verdict.is_bip39).await)
    }

    async fn commit(&mut self, pin: Pin, is_bip39: bool) -> ConfirmOutcome {
        self.state = ControllerState::Committing;
        if self.draft.seed_reference.is_none() {
            let typed = std::mem::replace(&mut self.phrase, SeedPhrase::empty());
            let phrase = if is_bip39 {
                let trimmed = typed.trimmed_end();
                drop(typed);
                trimmed
            } else {
                typed
            };
            self.draft.seed_reference = Some(self.store.create_reference(phrase));
        }

        let metadata = IdentityMetadata {
            name: self.draft.name.clone(),
            address: self.address.as_ref().map(|derived| derived.address.clone()),
            seed_kind: if is_bip39 {
                SeedKind::Bip39
            } else {
                SeedKind::Legacy
            },
        };

        // The handle stays in the draft while the commit runs, so tearing the
        // controller down mid-commit still discards it.
        let result = match self.draft.seed_reference.as_ref() {
            Some(handle) => self.store.commit(handle, pin, metadata).await,
            None => Err(StorageError::ReferenceConsumed),
        };
        match result {
            Ok(id) => {
                // A committed handle is finished; it is dropped, not discarded.
                self.draft.seed_reference = None;
                self.state = ControllerState::Done;
                self.collaborators
                    .navigator
                    .navigate_to_identity_network()
                    .await;
                ConfirmOutcome::Committed(id)
            }
            Err(err) => {
                let message = err.to_string();
                self.state = ControllerState::Failed(message.clone());
                self.collaborators.alerts.report_error(&message).await;
                ConfirmOutcome::CommitFailed(message)
            }
        }
    }

    /// Leaves recover mode for the backup screen of a brand new identity.
    ///
    /// Anything typed so far is erased.
    ///
    /// # Errors
    ///
    /// Fails outside create mode, once the identity is committed, or while a
    /// commit is in flight.
    pub async fn create_new(&mut self) -> Result<(), ControllerError> {
        self.ensure_editable()?;
        if self.mode != Mode::Create {
            return Err(ControllerError::WrongMode {
                expected: Mode::Create,
                actual: self.mode,
            });
        }
        self.clear_secrets();
        self.state = ControllerState::Done;
        self.collaborators
            .navigator
            .navigate_to_identity_backup(true)
            .await;
        Ok(())
    }

    /// Tears the workflow down: cancels derivation, discards any seed
    /// reference and erases the typed phrase. Also runs on drop.
    ///
    /// A confirmation whose future was dropped while prompting or committing
    /// leaves the controller in `AwaitingPin` or `Committing`; closing returns
    /// it to editing and the abandoned commit is not stored.
    pub fn close(&mut self) {
        self.clear_secrets();
        if self.state != ControllerState::Done {
            self.state = ControllerState::Editing(self.mode);
        }
        log::debug!("identity flow closed in state {:?}", self.state);
    }

    fn release_reference(&mut self) {
        if let Some(handle) = self.draft.seed_reference.take() {
            if let Err(err) = self.store.discard(handle) {
                log::warn!("failed to discard seed reference: {err}");
            }
        }
    }

    fn clear_secrets(&mut self) {
        self.debouncer.cancel();
        self.pending = None;
        self.release_reference();
        self.phrase = SeedPhrase::empty();
        self.address = None;
        self.verdict = ValidationVerdict::default_invalid();
        self.risk_accepted_for = None;
    }
}

impl Drop for IdentityController {
    fn drop(&mut self) {
        self.clear_secrets();
    }
}
