//! Plain key/value storage (the localStorage role): master salt, session JSON.
//! Nothing secret beyond a short-lived session token goes here.

use std::collections::HashMap;
use std::sync::Mutex;

use super::VaultError;

pub trait PlainStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError>;
    fn set(&self, key: &str, value: &str) -> Result<(), VaultError>;
    fn remove(&self, key: &str) -> Result<(), VaultError>;
}

#[derive(Default)]
pub struct MemoryPlain {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPlain {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, VaultError> {
        self.values
            .lock()
            .map_err(|_| VaultError::Storage("plain storage lock".into()))
    }
}

impl PlainStorage for MemoryPlain {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
#[cfg(feature = "native")]
pub struct FilePlain {
    dir: std::path::PathBuf,
}

#[cfg(feature = "native")]
impl FilePlain {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<root>/<app>/plain/`
    pub fn for_app(app: &str) -> Self {
        Self::new(crate::config::data_root().join(app).join("plain"))
    }

    fn path(&self, key: &str) -> std::path::PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }
}

#[cfg(feature = "native")]
impl PlainStorage for FilePlain {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::Storage(format!("plain read: {e}"))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| VaultError::Storage(format!("plain mkdir: {e}")))?;
        std::fs::write(self.path(key), value)
            .map_err(|e| VaultError::Storage(format!("plain write: {e}")))
    }

    fn remove(&self, key: &str) -> Result<(), VaultError> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Storage(format!("plain remove: {e}"))),
        }
    }
}
