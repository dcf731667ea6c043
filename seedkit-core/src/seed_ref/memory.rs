//! In-memory identity storage, for tests and demos only.

use std::{
    collections::HashMap,
    sync::{mpsc, Mutex},
};

use super::{error::StorageError, traits::IdentityStorage};

/// [`IdentityStorage`] backed by a `HashMap`.
///
/// Nothing is persisted. A failure can be injected for the next write, and
/// the next read can be held, to exercise commit error and cancellation paths.
#[derive(Debug, Default)]
pub struct MemoryIdentityStorage {
    records: Mutex<HashMap<String, Vec<u8>>>,
    next_write_failure: Mutex<Option<StorageError>>,
    next_read_hold: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

/// A read parked by [`MemoryIdentityStorage::hold_next_read`].
#[derive(Debug)]
pub struct ReadHold {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl ReadHold {
    /// Blocks the calling thread until the held read has started.
    pub fn wait_until_entered(&self) {
        let _ = self.entered.recv();
    }

    /// Lets the held read continue.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl MemoryIdentityStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to [`IdentityStorage::write_new`] fail with `error`.
    pub fn inject_write_failure(&self, error: StorageError) {
        if let Ok(mut slot) = self.next_write_failure.lock() {
            *slot = Some(error);
        }
    }

    /// Makes the next call to [`IdentityStorage::read`] block until the
    /// returned hold is released or dropped.
    #[must_use]
    pub fn hold_next_read(&self) -> ReadHold {
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        if let Ok(mut slot) = self.next_read_hold.lock() {
            *slot = Some((entered_tx, release_rx));
        }
        ReadHold { entered, release }
    }

    /// Keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .records
            .lock()
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentityStorage for MemoryIdentityStorage {
    fn read(&self, key: String) -> Result<Option<Vec<u8>>, StorageError> {
        let hold = self
            .next_read_hold
            .lock()
            .map_err(|_| StorageError::Io("mutex poisoned".to_string()))?
            .take();
        if let Some((entered, release)) = hold {
            let _ = entered.send(());
            let _ = release.recv();
        }
        let guard = self
            .records
            .lock()
            .map_err(|_| StorageError::Io("mutex poisoned".to_string()))?;
        Ok(guard.get(&key).cloned())
    }

    fn write_new(&self, key: String, bytes: Vec<u8>) -> Result<(), StorageError> {
        if let Some(error) = self
            .next_write_failure
            .lock()
            .map_err(|_| StorageError::Io("mutex poisoned".to_string()))?
            .take()
        {
            return Err(error);
        }
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StorageError::Io("mutex poisoned".to_string()))?;
        if guard.contains_key(&key) {
            return Err(StorageError::DuplicateIdentity(key));
        }
        guard.insert(key, bytes);
        Ok(())
    }

    fn delete(&self, key: String) -> Result<(), StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Io("mutex poisoned".to_string()))?
            .remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_new_refuses_existing_key() {
        let storage = MemoryIdentityStorage::new();
        storage
            .write_new("a".to_string(), vec![1])
            .expect("first write");
        assert!(matches!(
            storage.write_new("a".to_string(), vec![2]),
            Err(StorageError::DuplicateIdentity(_))
        ));
        assert_eq!(storage.read("a".to_string()).expect("read"), Some(vec![1]));
    }

    #[test]
    fn test_injected_failure_applies_once() {
        let storage = MemoryIdentityStorage::new();
        storage.inject_write_failure(StorageError::Io("disk full".to_string()));
        assert!(storage.write_new("a".to_string(), vec![1]).is_err());
        assert!(storage.is_empty());
        storage
            .write_new("a".to_string(), vec![1])
            .expect("second write");
        assert_eq!(storage.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_held_read_waits_for_release() {
        let storage = std::sync::Arc::new(MemoryIdentityStorage::new());
        storage
            .write_new("a".to_string(), vec![1])
            .expect("write");
        let hold = storage.hold_next_read();

        let reader = {
            let storage = std::sync::Arc::clone(&storage);
            std::thread::spawn(move || storage.read("a".to_string()))
        };
        hold.wait_until_entered();
        assert!(!reader.is_finished());
        hold.release();
        assert_eq!(reader.join().expect("join").expect("read"), Some(vec![1]));

        // Only one read is held.
        assert_eq!(storage.read("a".to_string()).expect("read"), Some(vec![1]));
    }
}
