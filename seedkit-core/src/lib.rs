#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

//! Identity creation and recovery core for `SeedKit` wallets.
//!
//! The crate owns the part of the "new identity" workflow that must not live in
//! UI code:
//!
//! - [`validation`] classifies a typed seed phrase (empty, irregular
//!   whitespace, short, non-standard, standard BIP39) on every keystroke.
//! - [`derivation`] debounces the expensive address derivation and discards
//!   results that belong to superseded input.
//! - [`seed_ref`] takes ownership of the secret once the user confirms and only
//!   ever hands out opaque [`seed_ref::SeedRefHandle`]s.
//! - [`controller`] ties the pieces together into the recover/create state
//!   machine, talking to the host app through collaborator traits.
//!
//! ```rust,ignore
//! let store = SeedRefStore::new(storage, KdfParams::default());
//! let mut controller = IdentityController::new(
//!     collaborators,
//!     store,
//!     Arc::new(Bip39AddressDeriver::default()),
//!     FlowConfig::default(),
//!     Mode::Recover,
//! );
//! controller.on_seed_input(SeedPhrase::new(typed))?;
//! controller.wait_for_derivation().await;
//! let outcome = controller.confirm_recover().await?;
//! ```

pub mod config;
pub mod controller;
pub mod derivation;
pub mod logger;
pub mod secret;
pub mod seed_ref;
pub mod validation;

mod error;
pub use error::*;

pub use config::{FlowConfig, KdfParams};
pub use controller::{
    AlertPresenter, Collaborators, ConfirmOutcome, ControllerError, ControllerState,
    IdentityController, IdentityDraft, Mode, Navigator, PinCancelled, PinPrompt,
};
pub use derivation::{
    AddressDeriver, Bip39AddressDeriver, DebouncedDeriver, DerivationError,
    DerivationOutcome, DerivedAddress, Generation,
};
pub use secret::{Pin, SeedPhrase};
pub use seed_ref::{
    IdentityId, IdentityMetadata, IdentityStorage, SeedKind, SeedRefHandle,
    SeedRefStore, StorageError, StorageResult, UnlockedIdentity,
};
pub use validation::{validate_seed, ValidationVerdict, VerdictKind};

uniffi::setup_scaffolding!("seedkit_core");
