//! Reference [`AddressDeriver`] for English BIP39 mnemonics with a legacy
//! brain wallet fallback.
//!
//! Phrases that parse as English BIP39 mnemonics are expanded with the BIP39
//! seed function (empty passphrase). Anything else is treated as a brain wallet
//! and stretched with iterated SHA-256. In both cases the address is the last
//! 20 bytes of a domain-separated SHA-256 over the key material.
//!
//! The work runs on the blocking pool so it never stalls the task that feeds
//! keystrokes into the controller.

use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{AddressDeriver, DerivationError, DerivedAddress};
use crate::secret::SeedPhrase;

/// Default number of SHA-256 rounds for brain wallet stretching.
pub const DEFAULT_BRAIN_WALLET_ROUNDS: u32 = 16_384;

const BRAIN_WALLET_LABEL: &[u8] = b"seedkit:brain-wallet";
const ADDRESS_LABEL: &[u8] = b"seedkit:address";

/// Derives addresses from BIP39 mnemonics, falling back to brain wallets.
#[derive(Debug, Clone, Copy)]
pub struct Bip39AddressDeriver {
    brain_wallet_rounds: u32,
}

impl Default for Bip39AddressDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_BRAIN_WALLET_ROUNDS)
    }
}

impl Bip39AddressDeriver {
    /// Creates a deriver with a custom brain wallet stretching cost.
    #[must_use]
    pub const fn new(brain_wallet_rounds: u32) -> Self {
        Self {
            brain_wallet_rounds,
        }
    }
}

#[async_trait]
impl AddressDeriver for Bip39AddressDeriver {
    async fn derive_address(
        &self,
        phrase: &SeedPhrase,
    ) -> Result<DerivedAddress, DerivationError> {
        let phrase = phrase.trimmed_end();
        let rounds = self.brain_wallet_rounds;
        tokio::task::spawn_blocking(move || derive_blocking(&phrase, rounds))
            .await
            .map_err(|err| DerivationError::Worker(err.to_string()))?
    }
}

fn derive_blocking(
    phrase: &SeedPhrase,
    rounds: u32,
) -> Result<DerivedAddress, DerivationError> {
    let text = phrase.expose_secret();
    if text.trim().is_empty() {
        return Err(DerivationError::Malformed("empty seed phrase".to_string()));
    }

    if let Ok(mnemonic) = Mnemonic::parse_in_normalized(Language::English, text) {
        let seed = Zeroizing::new(mnemonic.to_seed_normalized(""));
        return Ok(DerivedAddress {
            address: encode_address(seed.as_slice()),
            is_bip39: true,
        });
    }

    let secret = brain_wallet_secret(text.as_bytes(), rounds);
    Ok(DerivedAddress {
        address: encode_address(secret.as_slice()),
        is_bip39: false,
    })
}

fn brain_wallet_secret(phrase: &[u8], rounds: u32) -> Zeroizing<[u8; 32]> {
    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(
        &Sha256::new()
            .chain_update(BRAIN_WALLET_LABEL)
            .chain_update(phrase)
            .finalize(),
    );
    for _ in 0..rounds {
        let next = Sha256::digest(secret.as_slice());
        secret.copy_from_slice(&next);
    }
    secret
}

fn encode_address(key_material: &[u8]) -> String {
    let digest = Sha256::new()
        .chain_update(ADDRESS_LABEL)
        .chain_update(key_material)
        .finalize();
    format!("0x{}", hex::encode(&digest[12..]))
}
