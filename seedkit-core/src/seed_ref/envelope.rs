//! Sealed identity persistence format.

use serde::{Deserialize, Serialize};

use super::{
    error::{StorageError, StorageResult},
    IdentityMetadata, SeedKind,
};
use crate::config::KdfParams;

const ENVELOPE_VERSION: u32 = 1;

/// What gets written to [`super::IdentityStorage`] for one identity.
///
/// Only `sealed_seed` is secret; the metadata is stored in the clear so the
/// host can list identities without asking for a PIN.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct IdentityEnvelope {
    pub(crate) version: u32,
    pub(crate) name: String,
    pub(crate) address: Option<String>,
    pub(crate) seed_kind: SeedKind,
    pub(crate) kdf: KdfParams,
    pub(crate) kdf_salt: [u8; 16],
    pub(crate) sealed_seed: Vec<u8>,
    pub(crate) created_at: u64,
}

impl IdentityEnvelope {
    pub(crate) fn new(
        metadata: IdentityMetadata,
        kdf: KdfParams,
        kdf_salt: [u8; 16],
        sealed_seed: Vec<u8>,
        now: u64,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            name: metadata.name,
            address: metadata.address,
            seed_kind: metadata.seed_kind,
            kdf,
            kdf_salt,
            sealed_seed,
            created_at: now,
        }
    }

    pub(crate) fn metadata(&self) -> IdentityMetadata {
        IdentityMetadata {
            name: self.name.clone(),
            address: self.address.clone(),
            seed_kind: self.seed_kind,
        }
    }

    pub(crate) fn serialize(&self) -> StorageResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(bytes)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StorageError::UnsupportedEnvelopeVersion(envelope.version));
        }
        Ok(envelope)
    }
}
