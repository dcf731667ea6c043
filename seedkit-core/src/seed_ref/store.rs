use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use secrecy::ExposeSecret;

use super::{
    crypto,
    envelope::IdentityEnvelope,
    error::{StorageError, StorageResult},
    traits::IdentityStorage,
    IdentityId, IdentityMetadata,
};
use crate::{
    config::KdfParams,
    derivation::{AddressDeriver, DerivationError, DerivedAddress},
    secret::{Pin, SeedPhrase},
};

enum Slot {
    Live(SeedPhrase),
    /// The flag is raised when the commit is abandoned, telling its worker not
    /// to write.
    Committing(SeedPhrase, Arc<AtomicBool>),
    Consumed,
}

impl Slot {
    fn cancel(&self) {
        if let Self::Committing(_, cancelled) = self {
            cancelled.store(true, Ordering::SeqCst);
        }
    }
}

struct StoreInner {
    storage: Arc<dyn IdentityStorage>,
    kdf: KdfParams,
    slots: Mutex<HashMap<u64, Slot>>,
    next_id: AtomicU64,
    leaked: AtomicU64,
    misused: AtomicU64,
}

impl StoreInner {
    // A poisoned table is still usable: every transition leaves it consistent,
    // and refusing to touch it would keep secrets alive.
    fn slots(&self) -> MutexGuard<'_, HashMap<u64, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_misuse(&self, id: u64, operation: &str) -> StorageError {
        self.misused.fetch_add(1, Ordering::SeqCst);
        log::error!("seed reference {id} used for {operation} after it was consumed");
        StorageError::ReferenceConsumed
    }

    fn begin_commit(&self, id: u64) -> StorageResult<(SeedPhrase, Arc<AtomicBool>)> {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            return Err(self.record_misuse(id, "commit"));
        };
        match std::mem::replace(slot, Slot::Consumed) {
            Slot::Live(phrase) => {
                let copy = phrase.duplicate();
                let cancelled = Arc::new(AtomicBool::new(false));
                *slot = Slot::Committing(phrase, Arc::clone(&cancelled));
                Ok((copy, cancelled))
            }
            busy @ Slot::Committing(..) => {
                *slot = busy;
                Err(StorageError::ReferenceBusy)
            }
            Slot::Consumed => Err(self.record_misuse(id, "commit")),
        }
    }

    fn finish_commit(&self, id: u64, committed: bool) {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            return;
        };
        if let Slot::Committing(phrase, cancelled) = std::mem::replace(slot, Slot::Consumed) {
            if !committed {
                cancelled.store(true, Ordering::SeqCst);
                *slot = Slot::Live(phrase);
            }
        }
    }
}

/// Puts a reference back to `Live` unless the commit finished. When the commit
/// future is dropped halfway this also stops the worker from writing.
struct CommitGuard<'a> {
    inner: &'a StoreInner,
    id: u64,
    committed: bool,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.inner.finish_commit(self.id, self.committed);
    }
}

/// Opaque reference to a seed held by a [`SeedRefStore`].
///
/// The handle never exposes the seed. Exactly one of a successful
/// [`SeedRefStore::commit`] or a [`SeedRefStore::discard`] finishes it; after
/// that the handle is inert and is simply dropped. Dropping an unfinished
/// handle erases the seed but is counted as a leak, and discarding a committed
/// one is refused and counted as misuse.
pub struct SeedRefHandle {
    id: u64,
    inner: Arc<StoreInner>,
}

impl SeedRefHandle {
    /// Store-local id of the reference. Only useful for logging.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for SeedRefHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedRefHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for SeedRefHandle {
    fn drop(&mut self) {
        let removed = self.inner.slots().remove(&self.id);
        if let Some(slot) = &removed {
            slot.cancel();
        }
        if matches!(removed, Some(Slot::Live(_) | Slot::Committing(..))) {
            self.inner.leaked.fetch_add(1, Ordering::SeqCst);
            log::error!(
                "seed reference {} dropped without commit or discard, seed erased",
                self.id
            );
        }
    }
}

/// A stored identity unlocked with its PIN.
#[derive(Debug)]
pub struct UnlockedIdentity {
    /// Id the identity is stored under.
    pub id: IdentityId,
    /// Non-secret data stored with the seed.
    pub metadata: IdentityMetadata,
    /// The seed, exactly as it was committed.
    pub seed: SeedPhrase,
}

/// Owns seeds between user confirmation and persistence.
///
/// Cloning the store is cheap; clones share the same references.
#[derive(Clone)]
pub struct SeedRefStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SeedRefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedRefStore")
            .field("kdf", &self.inner.kdf)
            .field("live_references", &self.live_references())
            .field("leaked_references", &self.leaked_references())
            .field("misused_references", &self.misused_references())
            .finish_non_exhaustive()
    }
}

impl SeedRefStore {
    /// Creates a store that persists committed identities to `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn IdentityStorage>, kdf: KdfParams) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                storage,
                kdf,
                slots: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                leaked: AtomicU64::new(0),
                misused: AtomicU64::new(0),
            }),
        }
    }

    /// Takes ownership of `phrase` and returns a handle to it.
    #[must_use]
    pub fn create_reference(&self, phrase: SeedPhrase) -> SeedRefHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.slots().insert(id, Slot::Live(phrase));
        log::debug!("seed reference {id} created");
        SeedRefHandle {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    fn check_owner(&self, handle: &SeedRefHandle) -> StorageResult<()> {
        if Arc::ptr_eq(&handle.inner, &self.inner) {
            Ok(())
        } else {
            Err(StorageError::ReferenceConsumed)
        }
    }

    /// Seals the referenced seed under `pin` and persists it with `metadata`.
    ///
    /// On success the store's copy of the seed is erased and the handle is
    /// finished: it must not be discarded. On failure the reference stays live
    /// so the commit can be retried, possibly with another PIN, or discarded.
    ///
    /// Dropping the returned future abandons the commit. The seed goes back to
    /// `Live`, and the worker skips the write, or deletes the record if the
    /// write already went through.
    ///
    /// # Errors
    ///
    /// - [`StorageError::ReferenceConsumed`] if the handle was already
    ///   committed or belongs to another store.
    /// - [`StorageError::CommitCancelled`] if the reference was discarded
    ///   while the commit was running.
    /// - [`StorageError::ReferenceBusy`] if another commit of the same handle
    ///   is in flight.
    /// - [`StorageError::DuplicateIdentity`] if the same seed is already stored.
    /// - Key derivation, crypto, serialization or storage errors.
    pub async fn commit(
        &self,
        handle: &SeedRefHandle,
        pin: Pin,
        metadata: IdentityMetadata,
    ) -> StorageResult<IdentityId> {
        self.check_owner(handle)?;
        let (seed, cancelled) = self.inner.begin_commit(handle.id)?;
        let mut guard = CommitGuard {
            inner: &self.inner,
            id: handle.id,
            committed: false,
        };

        let storage = Arc::clone(&self.inner.storage);
        let kdf = self.inner.kdf;
        let result = tokio::task::spawn_blocking(move || {
            persist(storage.as_ref(), &seed, &pin, metadata, kdf, &cancelled)
        })
        .await
        .map_err(|err| StorageError::Io(format!("commit worker failed: {err}")))?;

        match &result {
            Ok(id) => {
                guard.committed = true;
                log::info!("seed reference {} committed as identity {id}", handle.id);
            }
            Err(err) => {
                log::warn!("seed reference {} commit failed: {err}", handle.id);
            }
        }
        result
    }

    /// Erases the referenced seed without persisting it.
    ///
    /// A commit still running for the handle is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReferenceConsumed`] if the handle belongs to
    /// another store or was already committed. The latter is counted by
    /// [`SeedRefStore::misused_references`].
    pub fn discard(&self, handle: SeedRefHandle) -> StorageResult<()> {
        self.check_owner(&handle)?;
        let removed = self.inner.slots().remove(&handle.id);
        match removed {
            Some(slot @ (Slot::Live(_) | Slot::Committing(..))) => {
                slot.cancel();
                log::debug!("seed reference {} discarded", handle.id);
                Ok(())
            }
            Some(Slot::Consumed) | None => Err(self.inner.record_misuse(handle.id, "discard")),
        }
    }

    /// Derives the address of the referenced seed with `deriver`.
    ///
    /// # Errors
    ///
    /// Returns [`DerivationError::Unsupported`] if the reference is no longer
    /// live, or whatever `deriver` returns.
    pub async fn derive_address(
        &self,
        handle: &SeedRefHandle,
        deriver: &dyn AddressDeriver,
    ) -> Result<DerivedAddress, DerivationError> {
        let seed = {
            let slots = self.inner.slots();
            match slots.get(&handle.id) {
                Some(Slot::Live(phrase) | Slot::Committing(phrase, _))
                    if Arc::ptr_eq(&handle.inner, &self.inner) =>
                {
                    phrase.duplicate()
                }
                _ => {
                    return Err(DerivationError::Unsupported(
                        "seed reference is no longer live".to_string(),
                    ))
                }
            }
        };
        deriver.derive_address(&seed).await
    }

    /// Unlocks the identity stored under `id` with `pin`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::IdentityNotFound`] if nothing is stored under `id`.
    /// - [`StorageError::InvalidPin`] if `pin` does not unlock it.
    /// - Envelope or storage errors.
    pub async fn open(&self, id: &IdentityId, pin: Pin) -> StorageResult<UnlockedIdentity> {
        let storage = Arc::clone(&self.inner.storage);
        let id = id.clone();
        tokio::task::spawn_blocking(move || unlock(storage.as_ref(), id, &pin))
            .await
            .map_err(|err| StorageError::Io(format!("unlock worker failed: {err}")))?
    }

    /// Reads the non-secret metadata of the identity stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IdentityNotFound`] if nothing is stored under
    /// `id`, or an envelope or storage error.
    pub async fn metadata(&self, id: &IdentityId) -> StorageResult<IdentityMetadata> {
        let storage = Arc::clone(&self.inner.storage);
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            read_envelope(storage.as_ref(), &id).map(|envelope| envelope.metadata())
        })
        .await
        .map_err(|err| StorageError::Io(format!("storage worker failed: {err}")))?
    }

    /// Deletes the identity stored under `id`. The PIN must unlock it first.
    ///
    /// # Errors
    ///
    /// Same as [`SeedRefStore::open`], plus delete failures.
    pub async fn remove_identity(&self, id: &IdentityId, pin: Pin) -> StorageResult<()> {
        let storage = Arc::clone(&self.inner.storage);
        let id = id.clone();
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let unlocked = unlock(storage.as_ref(), id, &pin)?;
            storage.delete(unlocked.id.to_string())?;
            log::info!("identity {} removed", unlocked.id);
            Ok(())
        })
        .await
        .map_err(|err| StorageError::Io(format!("storage worker failed: {err}")))?
    }

    /// Number of references that still hold a seed.
    #[must_use]
    pub fn live_references(&self) -> usize {
        self.inner
            .slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_) | Slot::Committing(..)))
            .count()
    }

    /// Number of handles dropped without being committed or discarded.
    #[must_use]
    pub fn leaked_references(&self) -> u64 {
        self.inner.leaked.load(Ordering::SeqCst)
    }

    /// Number of commits or discards refused because the handle was already
    /// committed.
    #[must_use]
    pub fn misused_references(&self) -> u64 {
        self.inner.misused.load(Ordering::SeqCst)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn persist(
    storage: &dyn IdentityStorage,
    seed: &SeedPhrase,
    pin: &Pin,
    metadata: IdentityMetadata,
    kdf: KdfParams,
    cancelled: &AtomicBool,
) -> StorageResult<IdentityId> {
    let seed_bytes = seed.expose_secret().as_bytes();
    let id = crypto::identity_id(seed_bytes)?;
    if storage.read(id.to_string())?.is_some() {
        return Err(StorageError::DuplicateIdentity(id.to_string()));
    }
    let salt = crypto::random_salt();
    let key = crypto::derive_pin_key(pin, &salt, &kdf)?;
    let sealed = crypto::seal(&key, &id, seed_bytes)?;
    let envelope = IdentityEnvelope::new(metadata, kdf, salt, sealed, unix_now());
    let bytes = envelope.serialize()?;

    if cancelled.load(Ordering::SeqCst) {
        return Err(StorageError::CommitCancelled);
    }
    storage.write_new(id.to_string(), bytes)?;
    if cancelled.load(Ordering::SeqCst) {
        // Abandoned while writing: nobody will learn the id, so roll back.
        storage.delete(id.to_string())?;
        return Err(StorageError::CommitCancelled);
    }
    Ok(id)
}

fn read_envelope(
    storage: &dyn IdentityStorage,
    id: &IdentityId,
) -> StorageResult<IdentityEnvelope> {
    let bytes = storage
        .read(id.to_string())?
        .ok_or_else(|| StorageError::IdentityNotFound(id.to_string()))?;
    IdentityEnvelope::deserialize(&bytes)
}

fn unlock(
    storage: &dyn IdentityStorage,
    id: IdentityId,
    pin: &Pin,
) -> StorageResult<UnlockedIdentity> {
    let envelope = read_envelope(storage, &id)?;
    let key = crypto::derive_pin_key(pin, &envelope.kdf_salt, &envelope.kdf)?;
    let mut plaintext = crypto::open(&key, &id, &envelope.sealed_seed)?;
    let seed = String::from_utf8(std::mem::take(&mut *plaintext))
        .map_err(|_| StorageError::Serialization("sealed seed is not utf-8".to_string()))?;
    Ok(UnlockedIdentity {
        id,
        metadata: envelope.metadata(),
        seed: SeedPhrase::new(seed),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::seed_ref::{memory::MemoryIdentityStorage, SeedKind};

    fn new_store() -> (Arc<MemoryIdentityStorage>, SeedRefStore) {
        let storage = Arc::new(MemoryIdentityStorage::new());
        let store = SeedRefStore::new(storage.clone(), KdfParams::insecure_fast());
        (storage, store)
    }

    fn metadata(name: &str) -> IdentityMetadata {
        IdentityMetadata {
            name: name.to_string(),
            address: None,
            seed_kind: SeedKind::Legacy,
        }
    }

    #[tokio::test]
    async fn test_commit_then_open() {
        let (storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("my legacy phrase "));
        assert_eq!(store.live_references(), 1);

        let id = store
            .commit(&handle, Pin::new("1234"), metadata("alice"))
            .await
            .expect("commit");
        assert_eq!(store.live_references(), 0);
        assert_eq!(storage.keys(), vec![id.to_string()]);

        let unlocked = store.open(&id, Pin::new("1234")).await.expect("open");
        assert_eq!(unlocked.seed.expose_secret(), "my legacy phrase ");
        assert_eq!(unlocked.metadata, metadata("alice"));

        drop(handle);
        assert_eq!(store.leaked_references(), 0);
        assert_eq!(store.misused_references(), 0);
    }

    #[tokio::test]
    async fn test_discard_after_commit_is_rejected() {
        let (storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit");

        assert!(matches!(
            store.discard(handle),
            Err(StorageError::ReferenceConsumed)
        ));
        assert_eq!(store.misused_references(), 1);
        assert_eq!(store.leaked_references(), 0);
        assert_eq!(store.live_references(), 0);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_after_discard_is_rejected() {
        let (storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        let other = store.create_reference(SeedPhrase::new("other phrase"));
        store.discard(other).expect("discard");

        // `discard` takes the handle by value, so model a stale copy of it.
        let reused = SeedRefHandle {
            id: handle.id + 1,
            inner: Arc::clone(&store.inner),
        };
        assert!(matches!(
            store.commit(&reused, Pin::new("1234"), metadata("a")).await,
            Err(StorageError::ReferenceConsumed)
        ));
        assert_eq!(store.misused_references(), 1);
        assert!(storage.is_empty());
        drop(reused);
        store.discard(handle).expect("discard");
        assert_eq!(store.leaked_references(), 0);
    }

    #[tokio::test]
    async fn test_second_commit_is_rejected() {
        let (_storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit");
        assert!(matches!(
            store.commit(&handle, Pin::new("1234"), metadata("a")).await,
            Err(StorageError::ReferenceConsumed)
        ));
        assert_eq!(store.misused_references(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_reference_live() {
        let (storage, store) = new_store();
        storage.inject_write_failure(StorageError::Io("disk full".to_string()));
        let handle = store.create_reference(SeedPhrase::new("phrase"));

        assert!(matches!(
            store.commit(&handle, Pin::new("1234"), metadata("a")).await,
            Err(StorageError::Io(_))
        ));
        assert_eq!(store.live_references(), 1);

        store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("retry");
        assert_eq!(store.live_references(), 0);
        drop(handle);
        assert_eq!(store.leaked_references(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_seed() {
        let (_storage, store) = new_store();
        let first = store.create_reference(SeedPhrase::new("same words"));
        store
            .commit(&first, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit");
        let second = store.create_reference(SeedPhrase::new("same words"));
        assert!(matches!(
            store.commit(&second, Pin::new("9999"), metadata("b")).await,
            Err(StorageError::DuplicateIdentity(_))
        ));
        drop(first);
        store.discard(second).expect("discard after failed commit");
        assert_eq!(store.live_references(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_commit_does_not_persist() {
        let (storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        let hold = storage.hold_next_read();

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.commit(&handle, Pin::new("1234"), metadata("a")),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(store.live_references(), 1);

        hold.wait_until_entered();
        hold.release();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(storage.is_empty());

        store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit after abandoned attempt");
        assert_eq!(storage.len(), 1);
        assert_eq!(store.leaked_references(), 0);
    }

    #[tokio::test]
    async fn test_wrong_pin_and_missing_identity() {
        let (_storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        let id = store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit");
        drop(handle);

        assert!(matches!(
            store.open(&id, Pin::new("0000")).await,
            Err(StorageError::InvalidPin)
        ));
        let missing = IdentityId::from_bytes([0u8; 16]);
        assert!(matches!(
            store.open(&missing, Pin::new("1234")).await,
            Err(StorageError::IdentityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_identity_requires_pin() {
        let (storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        let id = store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit");
        drop(handle);

        assert!(store.remove_identity(&id, Pin::new("0000")).await.is_err());
        assert_eq!(storage.len(), 1);
        store
            .remove_identity(&id, Pin::new("1234"))
            .await
            .expect("remove");
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_handle_from_other_store_is_rejected() {
        let (_storage, store) = new_store();
        let (_other_storage, other) = new_store();
        let handle = other.create_reference(SeedPhrase::new("phrase"));
        assert!(matches!(
            store.commit(&handle, Pin::new("1234"), metadata("a")).await,
            Err(StorageError::ReferenceConsumed)
        ));
        assert_eq!(other.live_references(), 1);
        other.discard(handle).expect("discard");
    }

    #[test]
    fn test_dropped_handle_is_counted_as_leak() {
        let (_storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("phrase"));
        drop(handle);
        assert_eq!(store.live_references(), 0);
        assert_eq!(store.leaked_references(), 1);

        let handle = store.create_reference(SeedPhrase::new("phrase"));
        store.discard(handle).expect("discard");
        assert_eq!(store.leaked_references(), 1);
    }

    struct EchoDeriver;

    #[async_trait]
    impl AddressDeriver for EchoDeriver {
        async fn derive_address(
            &self,
            phrase: &SeedPhrase,
        ) -> Result<DerivedAddress, DerivationError> {
            Ok(DerivedAddress {
                address: format!("0x{}", phrase.expose_secret().len()),
                is_bip39: false,
            })
        }
    }

    #[tokio::test]
    async fn test_derive_address_from_reference() {
        let (_storage, store) = new_store();
        let handle = store.create_reference(SeedPhrase::new("four"));
        let derived = store
            .derive_address(&handle, &EchoDeriver)
            .await
            .expect("derive");
        assert_eq!(derived.address, "0x4");

        store
            .commit(&handle, Pin::new("1234"), metadata("a"))
            .await
            .expect("commit");
        assert!(store.derive_address(&handle, &EchoDeriver).await.is_err());
    }
}
