//! Collaborators the wallet core drives but does not implement: chain RPC,
//! key custody, and the identity backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use super::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardLocation {
    Device,
    Server,
    Recovery,
}

/// One fragment of a split key. `encrypted_data` is hex; it is only ever
/// plaintext inside the shard store or in transit over the custody channel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyShard {
    pub id: String,
    pub encrypted_data: String,
    pub location: ShardLocation,
}

impl std::fmt::Debug for KeyShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShard")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// A reconstructed private key. Lives for one signing operation; wiped on drop.
pub struct SigningKey(Zeroizing<Vec<u8>>);

impl SigningKey {
    pub(crate) fn from_bytes(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }

    pub fn expose_secret(&self) -> &[u8] {
        &self.0
    }

    /// Stable non-secret identifier for logs.
    pub fn fingerprint(&self) -> String {
        let hex = blake3::hash(&self.0).to_hex();
        hex.as_str()[..16].to_string()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> String;
    fn address_for(&self, key: &SigningKey) -> anyhow::Result<String>;
    async fn get_balance(&self, address: &str) -> anyhow::Result<String>;
    /// Sign and broadcast. Returns the transaction hash.
    async fn send_transaction(&self, key: &SigningKey, tx: &TransactionRequest) -> anyhow::Result<String>;
    async fn sign_message(&self, key: &SigningKey, message: &[u8]) -> anyhow::Result<String>;
    async fn sign_typed_data(&self, key: &SigningKey, typed_data: &Value) -> anyhow::Result<String>;
}

/// Remote holder of the server shard, reached with the session token.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    async fn fetch_server_shard(&self, token: &str) -> anyhow::Result<KeyShard>;
    async fn store_server_shard(&self, token: &str, shard: &KeyShard) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpChannel {
    Email,
    Sms,
}

/// OTP and password backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn send_code(&self, channel: OtpChannel, destination: &str) -> anyhow::Result<()>;
    /// Fails when the code is wrong or expired.
    async fn verify_code(&self, channel: OtpChannel, destination: &str, code: &str) -> anyhow::Result<Session>;
    async fn login(&self, username: &str, password: &str) -> anyhow::Result<Session>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthStatus {
    Pending,
    Complete(Session),
    /// The user closed the popup.
    Closed,
}

/// Popup-based OAuth: `open` starts the flow, `poll` is asked until it settles.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn open(&self, provider: &str) -> anyhow::Result<String>;
    async fn poll(&self, handle: &str) -> anyhow::Result<OAuthStatus>;
}

/// WebAuthn ceremony.
#[async_trait]
pub trait PasskeyAuthenticator: Send + Sync {
    async fn authenticate(&self, username: Option<&str>) -> anyhow::Result<Session>;
}
