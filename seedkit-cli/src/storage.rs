//! File-backed [`IdentityStorage`]: one file per identity under the data dir.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use seedkit_core::{IdentityStorage, StorageError, StorageResult};

const RECORD_EXTENSION: &str = "identity";

/// Stores each sealed identity in `<root>/<id>.identity`.
#[derive(Debug, Clone)]
pub struct FileIdentityStorage {
    root: PathBuf,
}

impl FileIdentityStorage {
    /// Opens (and creates if needed) the storage directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root).map_err(|err| io_error("create data dir", &err))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn record_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::Io(format!("invalid storage key: {key:?}")));
        }
        Ok(self.root.join(format!("{key}.{RECORD_EXTENSION}")))
    }

    /// Keys of every stored record, sorted.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|err| io_error("list data dir", &err))? {
            let path = entry
                .map_err(|err| io_error("list data dir", &err))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn io_error(action: &str, err: &std::io::Error) -> StorageError {
    StorageError::Io(format!("{action}: {err}"))
}

impl IdentityStorage for FileIdentityStorage {
    fn read(&self, key: String) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.record_path(&key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error("read identity", &err)),
        }
    }

    fn write_new(&self, key: String, bytes: Vec<u8>) -> StorageResult<()> {
        let path = self.record_path(&key)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::DuplicateIdentity(key));
            }
            Err(err) => return Err(io_error("create identity", &err)),
        };
        let written = file.write_all(&bytes).and_then(|()| file.sync_all());
        if let Err(err) = written {
            // Leave no half-written record behind.
            let _ = fs::remove_file(&path);
            return Err(io_error("write identity", &err));
        }
        Ok(())
    }

    fn delete(&self, key: String) -> StorageResult<()> {
        match fs::remove_file(self.record_path(&key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("delete identity", &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileIdentityStorage::open(dir.path()).unwrap();

        assert_eq!(storage.read("abc123".to_string()).unwrap(), None);
        storage
            .write_new("abc123".to_string(), vec![1, 2, 3])
            .unwrap();
        assert_eq!(
            storage.read("abc123".to_string()).unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(storage.keys().unwrap(), vec!["abc123".to_string()]);

        storage.delete("abc123".to_string()).unwrap();
        storage.delete("abc123".to_string()).unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_write_new_refuses_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileIdentityStorage::open(dir.path()).unwrap();
        storage.write_new("abc".to_string(), vec![1]).unwrap();
        assert!(matches!(
            storage.write_new("abc".to_string(), vec![2]),
            Err(StorageError::DuplicateIdentity(_))
        ));
        assert_eq!(storage.read("abc".to_string()).unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileIdentityStorage::open(dir.path()).unwrap();
        assert!(storage.read("../etc/passwd".to_string()).is_err());
        assert!(storage.write_new(String::new(), vec![]).is_err());
    }
}
