//! Secret wrappers for seed phrases and PINs.
//!
//! Both types keep their contents in a [`SecretString`], which is zeroized when
//! dropped. Neither implements `Clone`: copies must be made explicitly with
//! [`SeedPhrase::duplicate`] so that every extra copy is visible in review.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const FINGERPRINT_LABEL: &[u8] = b"seedkit:phrase-fingerprint";

/// A seed phrase as typed by the user.
pub struct SeedPhrase(SecretString);

impl SeedPhrase {
    /// Wraps `phrase`, taking ownership of its buffer.
    #[must_use]
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(SecretString::from(phrase.into()))
    }

    /// An empty phrase.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    /// Returns `true` if nothing but whitespace was typed.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }

    /// Returns a copy without trailing whitespace.
    #[must_use]
    pub fn trimmed_end(&self) -> Self {
        Self::new(self.0.expose_secret().trim_end().to_owned())
    }

    /// Makes an explicit copy of the secret.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self::new(self.0.expose_secret().to_owned())
    }

    /// Domain-separated SHA-256 of the phrase, used to tag derivation results.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::new()
            .chain_update(FINGERPRINT_LABEL)
            .chain_update(self.0.expose_secret().as_bytes())
            .finalize()
            .into()
    }

    /// Compares the phrase's fingerprint with `fingerprint` in constant time.
    #[must_use]
    pub fn matches_fingerprint(&self, fingerprint: &[u8; 32]) -> bool {
        self.fingerprint().ct_eq(fingerprint).into()
    }
}

impl ExposeSecret<str> for SeedPhrase {
    fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for SeedPhrase {
    fn from(phrase: String) -> Self {
        Self::new(phrase)
    }
}

impl std::fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SeedPhrase").field(&"[REDACTED]").finish()
    }
}

/// A PIN returned by the host's PIN entry flow.
pub struct Pin(SecretString);

impl Pin {
    /// Wraps `pin`, taking ownership of its buffer.
    #[must_use]
    pub fn new(pin: impl Into<String>) -> Self {
        Self(SecretString::from(pin.into()))
    }
}

impl ExposeSecret<str> for Pin {
    fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pin").field(&"[REDACTED]").finish()
    }
}
