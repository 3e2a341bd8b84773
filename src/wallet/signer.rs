//! Shard-combine signing.
//!
//! The private key exists only inside one `ShardSigner` call: the device
//! shard is decrypted from the shard store, the server shard is fetched from
//! custody with the session token, the two are combined, used once and wiped.
//!
//! The split is a two-way XOR. It is reversible and hands back the complete
//! key; it is a placeholder for a real threshold scheme and is not
//! production-safe.

use rand::RngCore;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::services::{ChainAdapter, KeyCustody, KeyShard, ShardLocation, SigningKey, TransactionRequest};
use super::WalletError;
use crate::core::methods::records::{DEVICE_SHARD, SHARD_TYPE};
use crate::vault::{ShardStore, VaultError};

pub const KEY_LEN: usize = 32;

pub fn generate_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; KEY_LEN]);
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Split `key` into `(device, server)` halves. Either half alone is uniform noise.
pub fn split_key(key: &[u8]) -> (Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>) {
    let mut device = Zeroizing::new(vec![0u8; key.len()]);
    rand::thread_rng().fill_bytes(&mut device);
    let server = Zeroizing::new(key.iter().zip(device.iter()).map(|(k, d)| k ^ d).collect::<Vec<u8>>());
    (device, server)
}

pub fn combine_shards(a: &[u8], b: &[u8]) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    if a.is_empty() || a.len() != b.len() {
        return Err(WalletError::ShardMismatch);
    }
    Ok(Zeroizing::new(a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect()))
}

fn decode_shard(shard: &KeyShard) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    hex::decode(&shard.encrypted_data)
        .map(Zeroizing::new)
        .map_err(|_| WalletError::ShardMismatch)
}

/// What to do with the reconstructed key.
#[derive(Debug, Clone)]
pub enum SignOp {
    Message(Vec<u8>),
    TypedData(Value),
    Transaction(TransactionRequest),
}

pub struct ShardSigner {
    shards: Arc<RwLock<ShardStore>>,
    custody: Arc<dyn KeyCustody>,
    chain: Arc<dyn ChainAdapter>,
}

impl ShardSigner {
    pub fn new(shards: Arc<RwLock<ShardStore>>, custody: Arc<dyn KeyCustody>, chain: Arc<dyn ChainAdapter>) -> Self {
        Self { shards, custody, chain }
    }

    /// The device shard, if this device has one it can decrypt.
    pub async fn device_shard(&self) -> Result<Option<KeyShard>, WalletError> {
        let store = self.shards.read().await;
        store.retrieve::<KeyShard>(DEVICE_SHARD).await.map_err(WalletError::Storage)
    }

    async fn unlock(&self, token: &str) -> Result<SigningKey, WalletError> {
        // A shard sealed under an earlier session's token is as good as absent.
        let device = match self.device_shard().await {
            Ok(Some(device)) => device,
            Ok(None) | Err(WalletError::Storage(VaultError::DecryptionFailed)) => return Err(WalletError::NotEnrolled),
            Err(e) => return Err(e),
        };
        let server = self
            .custody
            .fetch_server_shard(token)
            .await
            .map_err(|e| WalletError::collaborator("key custody", e))?;
        let key = combine_shards(&decode_shard(&device)?, &decode_shard(&server)?)?;
        Ok(SigningKey::from_bytes(key))
    }

    pub async fn address(&self, token: &str) -> Result<String, WalletError> {
        let key = self.unlock(token).await?;
        self.chain
            .address_for(&key)
            .map_err(|e| WalletError::collaborator("chain adapter", e))
    }

    /// Reconstruct, perform `op`, drop the key.
    pub async fn sign(&self, token: &str, op: SignOp) -> Result<String, WalletError> {
        let key = self.unlock(token).await?;
        tracing::debug!(key = %key.fingerprint(), "signing key reconstructed");
        let result = match &op {
            SignOp::Message(message) => self.chain.sign_message(&key, message).await,
            SignOp::TypedData(data) => self.chain.sign_typed_data(&key, data).await,
            SignOp::Transaction(tx) => self.chain.send_transaction(&key, tx).await,
        };
        drop(key);
        result.map_err(|e| WalletError::collaborator("chain adapter", e))
    }

    /// Fresh key: server half goes to custody first, then the device half
    /// into the shard store. Returns the new address.
    pub async fn enroll(&self, token: &str) -> Result<String, WalletError> {
        let key = SigningKey::from_bytes(generate_key());
        let fingerprint = key.fingerprint();
        let address = self
            .chain
            .address_for(&key)
            .map_err(|e| WalletError::collaborator("chain adapter", e))?;

        let (device, server) = split_key(key.expose_secret());
        drop(key);
        let server = KeyShard {
            id: format!("{fingerprint}-server"),
            encrypted_data: hex::encode(&*server),
            location: ShardLocation::Server,
        };
        self.custody
            .store_server_shard(token, &server)
            .await
            .map_err(|e| WalletError::collaborator("key custody", e))?;

        let device = KeyShard {
            id: format!("{fingerprint}-device"),
            encrypted_data: hex::encode(&*device),
            location: ShardLocation::Device,
        };
        let store = self.shards.read().await;
        store
            .store(DEVICE_SHARD, &device, SHARD_TYPE)
            .await
            .map_err(WalletError::Storage)?;
        tracing::info!(shard = %device.id, "key enrolled");
        Ok(address)
    }

    /// Whether a device shard exists and opens under the current key.
    pub async fn is_enrolled(&self) -> Result<bool, WalletError> {
        match self.device_shard().await {
            Ok(shard) => Ok(shard.is_some()),
            Err(WalletError::Storage(VaultError::DecryptionFailed)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
