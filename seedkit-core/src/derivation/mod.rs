//! Address derivation from seed phrases.
//!
//! [`AddressDeriver`] is the black-box primitive (BIP39 or brain wallet key
//! derivation followed by address encoding). [`DebouncedDeriver`] sits in
//! front of it so that typing never queues more than one derivation per
//! settling window.

use async_trait::async_trait;
use thiserror::Error;

use crate::secret::SeedPhrase;

mod debounce;
mod mnemonic;

pub use debounce::{DebouncedDeriver, DerivationOutcome, Generation};
pub use mnemonic::Bip39AddressDeriver;

/// Address derived from a seed phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// Hex-encoded address, `0x` prefixed.
    pub address: String,
    /// Whether the phrase was recognised as a BIP39 mnemonic.
    pub is_bip39: bool,
}

/// Errors raised by an [`AddressDeriver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    /// The phrase cannot be turned into key material.
    #[error("malformed seed phrase: {0}")]
    Malformed(String),
    /// The phrase or its encoding is not supported by this deriver.
    #[error("unsupported seed phrase: {0}")]
    Unsupported(String),
    /// The derivation worker failed before producing a result.
    #[error("derivation worker failed: {0}")]
    Worker(String),
}

/// Derives the address that a seed phrase controls.
///
/// Implementations may be expensive (key stretching, elliptic curve
/// operations); callers go through [`DebouncedDeriver`] rather than invoking
/// this on every keystroke.
#[async_trait]
pub trait AddressDeriver: Send + Sync {
    /// Derives the address for `phrase`.
    ///
    /// # Errors
    ///
    /// Returns [`DerivationError`] if the phrase is malformed or unsupported.
    async fn derive_address(
        &self,
        phrase: &SeedPhrase,
    ) -> Result<DerivedAddress, DerivationError>;
}
