//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use seedkit_core::{
    seed_ref::memory::MemoryIdentityStorage, AddressDeriver, AlertPresenter, Collaborators,
    DerivationError, DerivedAddress, FlowConfig, IdentityController, KdfParams, Mode,
    Navigator, Pin, PinCancelled, PinPrompt, SeedPhrase, SeedRefStore,
};

/// A valid English BIP39 mnemonic.
pub const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Eleven words: one short of the default minimum.
pub const ELEVEN_WORDS: &str = "one two three four five six seven eight nine ten eleven";

/// Twelve words that are not a BIP39 mnemonic.
pub const TWELVE_LEGACY_WORDS: &str =
    "one two three four five six seven eight nine ten eleven twelve";

/// Records every navigation request.
#[derive(Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    /// Navigation requests so far, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate_to_identity_network(&self) {
        self.events.lock().unwrap().push("network".to_string());
    }

    async fn navigate_to_identity_backup(&self, is_new: bool) {
        self.events
            .lock()
            .unwrap()
            .push(format!("backup(is_new={is_new})"));
    }
}

/// Answers PIN prompts from a script; `None` entries cancel.
///
/// Once the script is exhausted every prompt answers [`DEFAULT_PIN`].
#[derive(Default)]
pub struct ScriptedPins {
    script: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<usize>,
}

/// PIN used when a test does not script one.
pub const DEFAULT_PIN: &str = "1234";

impl ScriptedPins {
    /// Queues the answer for the next prompt.
    pub fn push(&self, answer: Option<&str>) {
        self.script
            .lock()
            .unwrap()
            .push_back(answer.map(str::to_string));
    }

    /// How many times a PIN was requested.
    pub fn prompts(&self) -> usize {
        *self.prompts.lock().unwrap()
    }
}

#[async_trait]
impl PinPrompt for ScriptedPins {
    async fn acquire_pin(&self) -> Result<Pin, PinCancelled> {
        *self.prompts.lock().unwrap() += 1;
        match self.script.lock().unwrap().pop_front() {
            Some(Some(pin)) => Ok(Pin::new(pin)),
            Some(None) => Err(PinCancelled),
            None => Ok(Pin::new(DEFAULT_PIN)),
        }
    }
}

/// Records alerts and answers risk prompts from a script.
///
/// Risk prompts are accepted once the script is exhausted.
#[derive(Default)]
pub struct ScriptedAlerts {
    errors: Mutex<Vec<String>>,
    risk_prompts: Mutex<Vec<String>>,
    risk_answers: Mutex<VecDeque<bool>>,
}

impl ScriptedAlerts {
    /// Queues the answer for the next risk prompt.
    pub fn answer_risk(&self, accept: bool) {
        self.risk_answers.lock().unwrap().push_back(accept);
    }

    /// Error messages shown so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Risk prompts shown so far.
    pub fn risk_prompts(&self) -> Vec<String> {
        self.risk_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertPresenter for ScriptedAlerts {
    async fn report_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    async fn confirm_risk(&self, message: &str) -> bool {
        self.risk_prompts.lock().unwrap().push(message.to_string());
        self.risk_answers.lock().unwrap().pop_front().unwrap_or(true)
    }
}

/// Deterministic [`AddressDeriver`] with per-phrase behaviour.
///
/// Every phrase derives to `addr:<phrase>` and is reported as non-BIP39
/// unless marked otherwise.
#[derive(Default)]
pub struct StubDeriver {
    calls: Mutex<Vec<String>>,
    bip39: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl StubDeriver {
    /// Reports `phrase` as a BIP39 mnemonic.
    pub fn mark_bip39(&self, phrase: &str) {
        self.bip39.lock().unwrap().insert(phrase.to_string());
    }

    /// Fails derivation for `phrase`.
    pub fn fail_on(&self, phrase: &str) {
        self.failing.lock().unwrap().insert(phrase.to_string());
    }

    /// Makes derivation for `phrase` take `delay`.
    pub fn delay(&self, phrase: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(phrase.to_string(), delay);
    }

    /// Phrases derived so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddressDeriver for StubDeriver {
    async fn derive_address(
        &self,
        phrase: &SeedPhrase,
    ) -> Result<DerivedAddress, DerivationError> {
        let text = phrase.expose_secret().to_string();
        self.calls.lock().unwrap().push(text.clone());
        let delay = self.delays.lock().unwrap().get(&text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&text) {
            return Err(DerivationError::Malformed(format!("cannot derive {text}")));
        }
        Ok(DerivedAddress {
            address: format!("addr:{text}"),
            is_bip39: self.bip39.lock().unwrap().contains(&text),
        })
    }
}

/// Collaborators and storage behind one controller.
pub struct Harness {
    /// Navigation recorder.
    pub navigator: Arc<RecordingNavigator>,
    /// PIN script.
    pub pins: Arc<ScriptedPins>,
    /// Alert recorder.
    pub alerts: Arc<ScriptedAlerts>,
    /// Derivation stub.
    pub deriver: Arc<StubDeriver>,
    /// Backing storage of `store`.
    pub storage: Arc<MemoryIdentityStorage>,
    /// Store handed to the controller.
    pub store: SeedRefStore,
}

impl Harness {
    /// Creates fresh collaborators and an empty store with a cheap KDF.
    pub fn new() -> Self {
        let storage = Arc::new(MemoryIdentityStorage::new());
        let store = SeedRefStore::new(storage.clone(), KdfParams::insecure_fast());
        Self {
            navigator: Arc::new(RecordingNavigator::default()),
            pins: Arc::new(ScriptedPins::default()),
            alerts: Arc::new(ScriptedAlerts::default()),
            deriver: Arc::new(StubDeriver::default()),
            storage,
            store,
        }
    }

    /// The collaborators, type-erased.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            navigator: self.navigator.clone(),
            pin_prompt: self.pins.clone(),
            alerts: self.alerts.clone(),
        }
    }

    /// Flow configuration used by [`Harness::controller`].
    pub fn config() -> FlowConfig {
        FlowConfig {
            kdf: KdfParams::insecure_fast(),
            ..FlowConfig::default()
        }
    }

    /// A controller wired to this harness and its stub deriver.
    pub fn controller(&self, mode: Mode) -> IdentityController {
        IdentityController::new(
            self.collaborators(),
            self.store.clone(),
            self.deriver.clone(),
            Self::config(),
            mode,
        )
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
