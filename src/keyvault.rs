//! Opaque keychain handle.
//!
//! The OS keychain is an external collaborator; the stores only ever see the
//! [`KeyVault`] trait. [`FileKeyVault`] is the portable fallback (one file
//! per entry under a 0700 directory); [`MemoryKeyVault`] backs tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{EngramError, Result};

/// Keychain entry name for the device master key.
pub const MASTER_KEY_ENTRY: &str = "master-key";

/// Handle to wherever this device keeps its key material.
pub trait KeyVault: Send + Sync {
    fn get(&self, entry: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, entry: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, entry: &str) -> Result<bool>;
}

/// In-memory vault for tests.
#[derive(Default)]
pub struct MemoryKeyVault {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl KeyVault for MemoryKeyVault {
    fn get(&self, entry: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(entry).cloned())
    }

    fn set(&self, entry: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, entry: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().remove(entry).is_some())
    }
}

/// File-backed vault: one file per entry, owner-only permissions.
pub struct FileKeyVault {
    dir: PathBuf,
}

impl FileKeyVault {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        set_secure_permissions(&dir, 0o700)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, entry: &str) -> Result<PathBuf> {
        if entry.is_empty() || entry.contains(['/', '\\', '.']) {
            return Err(EngramError::Config(format!("invalid vault entry: {entry}")));
        }
        Ok(self.dir.join(format!("{entry}.key")))
    }
}

impl KeyVault for FileKeyVault {
    fn get(&self, entry: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(entry)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, entry: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(entry)?;
        fs::write(&path, value)?;
        set_secure_permissions(&path, 0o600)?;
        Ok(())
    }

    fn delete(&self, entry: &str) -> Result<bool> {
        let path = self.entry_path(entry)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn set_secure_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_secure_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
