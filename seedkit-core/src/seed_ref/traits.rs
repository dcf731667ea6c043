//! Platform interface for identity persistence.

use super::error::StorageResult;

/// Durable key-value storage for sealed identities, implemented by the host.
///
/// Keys are [`super::IdentityId`] strings; values are opaque, already encrypted
/// envelopes. Implementations only need to provide durability and the
/// create-only semantics of [`IdentityStorage::write_new`].
///
/// Calls are made from the blocking thread pool, never from the task driving
/// the identity workflow.
#[uniffi::export(with_foreign)]
pub trait IdentityStorage: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, key: String) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, failing if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`super::StorageError::DuplicateIdentity`] if `key` is taken, or
    /// another error if the write fails.
    fn write_new(&self, key: String, bytes: Vec<u8>) -> StorageResult<()>;

    /// Deletes the value stored under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, key: String) -> StorageResult<()>;
}
