//! Record backends for the shard store (the IndexedDB role).
//!
//! Backends see only `EncryptedRecord`s. Every write is a complete record,
//! so concurrent writers to one id resolve last-write-wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::VaultError;

/// One encrypted entry. `ciphertext`, `iv` and `salt` are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub ciphertext: String,
    pub iv: String,
    pub salt: String,
    /// Unix milliseconds of the write.
    pub timestamp: i64,
}

#[async_trait]
pub trait RecordBackend: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<EncryptedRecord>, VaultError>;
    async fn put(&self, record: EncryptedRecord) -> Result<(), VaultError>;
    async fn delete(&self, id: &str) -> Result<bool, VaultError>;
    async fn clear(&self) -> Result<(), VaultError>;
    async fn all(&self) -> Result<Vec<EncryptedRecord>, VaultError>;
    /// Swap the whole contents in one step. Readers never observe a mix.
    async fn replace_all(&self, records: Vec<EncryptedRecord>) -> Result<(), VaultError>;
    async fn close(&self) -> Result<(), VaultError> {
        Ok(())
    }
}

// =============================================================================
// MEMORY RECORDS
// =============================================================================

#[derive(Default)]
pub struct MemoryRecords {
    records: Mutex<BTreeMap<String, EncryptedRecord>>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordBackend for MemoryRecords {
    async fn get(&self, id: &str) -> Result<Option<EncryptedRecord>, VaultError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put(&self, record: EncryptedRecord) -> Result<(), VaultError> {
        self.records.lock().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, VaultError> {
        Ok(self.records.lock().await.remove(id).is_some())
    }

    async fn clear(&self) -> Result<(), VaultError> {
        self.records.lock().await.clear();
        Ok(())
    }

    async fn all(&self) -> Result<Vec<EncryptedRecord>, VaultError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn replace_all(&self, records: Vec<EncryptedRecord>) -> Result<(), VaultError> {
        let next = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        *self.records.lock().await = next;
        Ok(())
    }
}

// =============================================================================
// FILE RECORDS
// =============================================================================

/// All records in one JSON document, rewritten through a temp file + rename.
#[cfg(feature = "native")]
pub struct FileRecords {
    path: std::path::PathBuf,
    lock: Mutex<()>,
}

#[cfg(feature = "native")]
impl FileRecords {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// `<root>/<app>/vault/records.json`
    pub fn for_app(app: &str) -> Self {
        Self::new(crate::config::data_root().join(app).join("vault").join("records.json"))
    }

    async fn load(&self) -> Result<BTreeMap<String, EncryptedRecord>, VaultError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| VaultError::Storage(format!("records json: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(VaultError::Storage(format!("records read: {e}"))),
        }
    }

    async fn save(&self, records: &BTreeMap<String, EncryptedRecord>) -> Result<(), VaultError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::Storage(format!("records mkdir: {e}")))?;
        }
        let raw = serde_json::to_vec_pretty(records)
            .map_err(|e| VaultError::Storage(format!("records json: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| VaultError::Storage(format!("records write: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| VaultError::Storage(format!("records rename: {e}")))
    }
}

#[cfg(feature = "native")]
#[async_trait]
impl RecordBackend for FileRecords {
    async fn get(&self, id: &str) -> Result<Option<EncryptedRecord>, VaultError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(id))
    }

    async fn put(&self, record: EncryptedRecord) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.insert(record.id.clone(), record);
        self.save(&records).await
    }

    async fn delete(&self, id: &str) -> Result<bool, VaultError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let removed = records.remove(id).is_some();
        if removed {
            self.save(&records).await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        self.save(&BTreeMap::new()).await
    }

    async fn all(&self) -> Result<Vec<EncryptedRecord>, VaultError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_values().collect())
    }

    async fn replace_all(&self, records: Vec<EncryptedRecord>) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        let next = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.save(&next).await
    }
}
