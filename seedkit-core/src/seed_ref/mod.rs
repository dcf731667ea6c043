//! Seed reference store: the only owner of a seed once the user confirms it.
//!
//! The controller hands the typed phrase to [`SeedRefStore::create_reference`]
//! and from then on only holds an opaque [`SeedRefHandle`]. The handle can be
//! committed (sealed under a PIN-derived key and persisted through
//! [`IdentityStorage`]) or discarded. Either way the store zeroes its copy.

mod crypto;
mod envelope;
pub mod error;
pub mod memory;
mod store;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use error::{StorageError, StorageResult};
pub use store::{SeedRefHandle, SeedRefStore, UnlockedIdentity};
pub use traits::IdentityStorage;

/// How the seed of an identity is turned into keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case")]
pub enum SeedKind {
    /// A BIP39 mnemonic, stored without trailing whitespace.
    Bip39,
    /// A legacy brain wallet phrase, stored exactly as typed.
    Legacy,
}

/// Non-secret data stored alongside a sealed seed.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct IdentityMetadata {
    /// Display name chosen by the user.
    pub name: String,
    /// Address derived from the seed, when derivation finished before commit.
    pub address: Option<String>,
    /// How the seed should be interpreted.
    pub seed_kind: SeedKind,
}

/// Stable identifier of a committed identity: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId(String);

impl IdentityId {
    pub(crate) fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parses an id previously returned by [`SeedRefStore::commit`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IdentityNotFound`] if `value` is not a well-formed id.
    pub fn parse(value: &str) -> StorageResult<Self> {
        let well_formed = value.len() == 32
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(StorageError::IdentityNotFound(value.to_string()))
        }
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_id_parse() {
        let id = IdentityId::from_bytes([0xab; 16]);
        assert_eq!(IdentityId::parse(id.as_str()).expect("parse"), id);
        assert!(IdentityId::parse("ABABABABABABABABABABABABABABABAB").is_err());
        assert!(IdentityId::parse("../../etc/passwd").is_err());
        assert!(IdentityId::parse("").is_err());
    }
}
