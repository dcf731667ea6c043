//! Error types for the seed reference store.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while committing, unlocking or discarding seed references.
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// Errors coming from the identity storage backend.
    #[error("storage io error: {0}")]
    Io(String),

    /// An identity for the same seed is already stored.
    #[error("identity already exists: {0}")]
    DuplicateIdentity(String),

    /// Deriving the encryption key from the PIN failed.
    #[error("pin key derivation failed: {0}")]
    KeyDerivation(String),

    /// The PIN does not unlock the stored identity.
    #[error("pin does not unlock identity")]
    InvalidPin,

    /// Cryptographic failures (AEAD, HKDF).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unsupported identity envelope version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedEnvelopeVersion(u32),

    /// No identity is stored under the requested id.
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// The seed reference was committed, discarded, or belongs to another store.
    #[error("seed reference is unknown or already consumed")]
    ReferenceConsumed,

    /// The seed reference is being committed by another call.
    #[error("seed reference is busy")]
    ReferenceBusy,

    /// The commit was abandoned or its reference discarded before it finished.
    #[error("commit cancelled before the identity was stored")]
    CommitCancelled,

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}
