//! Encrypted shard store.
//!
//! Holds the device key shard and other secrets as AES-256-GCM records.
//! The master key is derived from a password (the session token in practice)
//! and a random master salt kept in plain storage.
//!
//! ```text
//! ShardStore
//!     │
//!     ├── PlainStorage   master salt (plain)
//!     ├── VaultKey       PBKDF2-HMAC-SHA256 → AES-256-GCM (memory only)
//!     └── RecordBackend  {id, type, ciphertext, iv, salt, timestamp}
//! ```

mod backend;
mod cipher;
mod plain;

pub use backend::{EncryptedRecord, MemoryRecords, RecordBackend};
#[cfg(feature = "native")]
pub use backend::FileRecords;
pub use cipher::{VaultKey, IV_LEN, PBKDF2_ITERATIONS, SALT_LEN};
pub use plain::{MemoryPlain, PlainStorage};
#[cfg(feature = "native")]
pub use plain::FilePlain;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

use cipher::{decode_base64, encode_base64, random_iv, random_salt, record_aad};

pub const MASTER_SALT_KEY: &str = "vaultframe.master_salt";
const EXPORT_VERSION: u32 = 1;

/// Storage errors. Display strings are fixed so nothing about the record,
/// the password, or the backend leaks to a caller.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("secure storage not initialized")]
    NotInitialized,
    #[error("unable to decrypt secure storage record")]
    DecryptionFailed,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("invalid secure storage export")]
    InvalidExport,
    #[error("secure storage operation failed")]
    Storage(String),
}

/// Portable encrypted dump. Records stay sealed; the master salt travels
/// with them so the same password unlocks them elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultExport {
    pub version: u32,
    pub master_salt: String,
    pub exported_at: i64,
    pub records: Vec<EncryptedRecord>,
}

pub struct ShardStore {
    records: Arc<dyn RecordBackend>,
    plain: Arc<dyn PlainStorage>,
    key: Option<VaultKey>,
}

impl ShardStore {
    pub fn new(records: Arc<dyn RecordBackend>, plain: Arc<dyn PlainStorage>) -> Self {
        Self { records, plain, key: None }
    }

    /// In-memory store, for tests and ephemeral frames.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecords::new()), Arc::new(MemoryPlain::new()))
    }

    #[cfg(feature = "native")]
    pub fn for_app(app: &str) -> Self {
        Self::new(Arc::new(FileRecords::for_app(app)), Arc::new(FilePlain::for_app(app)))
    }

    pub fn is_initialized(&self) -> bool {
        self.key.is_some()
    }

    /// Derive the store key. Reuses the persisted master salt, creating it
    /// on first use. A wrong password still "succeeds" here; it surfaces as
    /// `DecryptionFailed` on the first read of an existing record.
    pub async fn initialize(&mut self, password: &str) -> Result<(), VaultError> {
        if password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }
        let salt = self.master_salt()?;
        let password = Zeroizing::new(password.to_string());
        let key = tokio::task::spawn_blocking(move || VaultKey::derive(&password, &salt))
            .await
            .map_err(|e| VaultError::Storage(format!("kdf task: {e}")))??;
        self.key = Some(key);
        tracing::debug!("shard store unlocked");
        Ok(())
    }

    fn master_salt(&self) -> Result<Vec<u8>, VaultError> {
        if let Some(existing) = self.plain.get(MASTER_SALT_KEY)? {
            let salt = decode_base64(&existing)
                .map_err(|_| VaultError::Storage("master salt corrupted".into()))?;
            if salt.len() == SALT_LEN {
                return Ok(salt);
            }
            return Err(VaultError::Storage("master salt corrupted".into()));
        }
        let salt = random_salt();
        self.plain.set(MASTER_SALT_KEY, &encode_base64(&salt))?;
        Ok(salt.to_vec())
    }

    fn key(&self) -> Result<&VaultKey, VaultError> {
        self.key.as_ref().ok_or(VaultError::NotInitialized)
    }

    /// Encrypt and persist `value` under `id`, replacing any previous record.
    pub async fn store<T: Serialize + ?Sized>(
        &self,
        id: &str,
        value: &T,
        type_: &str,
    ) -> Result<EncryptedRecord, VaultError> {
        let key = self.key()?;
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value).map_err(|e| VaultError::Storage(format!("encode: {e}")))?,
        );
        let iv = random_iv();
        let salt = random_salt();
        let ciphertext = key.encrypt(&plaintext, &iv, &record_aad(id, type_, &salt))?;
        let record = EncryptedRecord {
            id: id.to_string(),
            type_: type_.to_string(),
            ciphertext: encode_base64(&ciphertext),
            iv: encode_base64(&iv),
            salt: encode_base64(&salt),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.records.put(record.clone()).await?;
        Ok(record)
    }

    pub async fn retrieve<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, VaultError> {
        let key = self.key()?;
        let Some(record) = self.records.get(id).await? else {
            return Ok(None);
        };
        let plaintext = open_record(key, &record)?;
        serde_json::from_slice(&plaintext)
            .map(Some)
            .map_err(|e| VaultError::Storage(format!("decode: {e}")))
    }

    pub async fn delete(&self, id: &str) -> Result<bool, VaultError> {
        self.key()?;
        self.records.delete(id).await
    }

    pub async fn clear(&self) -> Result<(), VaultError> {
        self.key()?;
        self.records.clear().await
    }

    pub async fn keys_by_type(&self, type_: &str) -> Result<Vec<String>, VaultError> {
        self.key()?;
        let mut ids: Vec<String> = self
            .records
            .all()
            .await?
            .into_iter()
            .filter(|r| r.type_ == type_)
            .map(|r| r.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub async fn export_encrypted(&self) -> Result<String, VaultError> {
        self.key()?;
        let master_salt = self
            .plain
            .get(MASTER_SALT_KEY)?
            .ok_or_else(|| VaultError::Storage("master salt missing".into()))?;
        let export = VaultExport {
            version: EXPORT_VERSION,
            master_salt,
            exported_at: chrono::Utc::now().timestamp_millis(),
            records: self.records.all().await?,
        };
        serde_json::to_string(&export).map_err(|e| VaultError::Storage(format!("export: {e}")))
    }

    /// Replace the whole store with an export. If the export was sealed
    /// under a different master salt the current key no longer applies,
    /// so the store drops it and must be initialized again.
    pub async fn import_encrypted(&mut self, bundle: &str) -> Result<usize, VaultError> {
        self.key()?;
        let export: VaultExport = serde_json::from_str(bundle).map_err(|_| VaultError::InvalidExport)?;
        validate_export(&export)?;

        let count = export.records.len();
        let previous_salt = self.plain.get(MASTER_SALT_KEY)?;
        let salt_changed = previous_salt.as_deref() != Some(export.master_salt.as_str());
        // Salt first: records without their salt could never be opened.
        if salt_changed {
            self.plain.set(MASTER_SALT_KEY, &export.master_salt)?;
        }
        if let Err(e) = self.records.replace_all(export.records).await {
            if salt_changed {
                let restored = match &previous_salt {
                    Some(salt) => self.plain.set(MASTER_SALT_KEY, salt),
                    None => self.plain.remove(MASTER_SALT_KEY),
                };
                if let Err(restore) = restored {
                    tracing::warn!("master salt not restored after failed import: {restore}");
                }
            }
            return Err(e);
        }
        if salt_changed {
            self.key = None;
            tracing::info!(count, "imported records under a new master salt; store locked");
        } else {
            tracing::info!(count, "imported records");
        }
        Ok(count)
    }

    pub async fn close(&mut self) -> Result<(), VaultError> {
        self.key = None;
        self.records.close().await
    }
}

fn open_record(key: &VaultKey, record: &EncryptedRecord) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let ciphertext = decode_base64(&record.ciphertext)?;
    let iv = decode_base64(&record.iv)?;
    let salt = decode_base64(&record.salt)?;
    key.decrypt(&ciphertext, &iv, &record_aad(&record.id, &record.type_, &salt))
}

fn validate_export(export: &VaultExport) -> Result<(), VaultError> {
    if export.version != EXPORT_VERSION {
        return Err(VaultError::InvalidExport);
    }
    let salt = decode_base64(&export.master_salt).map_err(|_| VaultError::InvalidExport)?;
    if salt.len() != SALT_LEN {
        return Err(VaultError::InvalidExport);
    }
    let mut seen = std::collections::HashSet::new();
    for record in &export.records {
        let iv = decode_base64(&record.iv).map_err(|_| VaultError::InvalidExport)?;
        let record_salt = decode_base64(&record.salt).map_err(|_| VaultError::InvalidExport)?;
        decode_base64(&record.ciphertext).map_err(|_| VaultError::InvalidExport)?;
        if iv.len() != IV_LEN || record_salt.len() != SALT_LEN || !seen.insert(record.id.as_str()) {
            return Err(VaultError::InvalidExport);
        }
    }
    Ok(())
}
