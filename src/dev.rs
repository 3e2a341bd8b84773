//! Development collaborators.
//!
//! In-memory stand-ins for the chain, custody and identity services so a
//! wallet can run end to end without a network. Signatures are HMAC-SHA256
//! tags, not chain signatures.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::WalletConfig;
use crate::wallet::{
    AuthBackend, ChainAdapter, Collaborators, KeyCustody, KeyShard, OAuthProvider, OAuthStatus, OtpChannel,
    PasskeyAuthenticator, Session, SigningKey, TransactionRequest,
};

/// The only code `DevAuthBackend` accepts.
pub const DEV_OTP_CODE: &str = "123456";

type HmacSha256 = Hmac<Sha256>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hmac_hex(key: &[u8], data: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow::anyhow!("hmac key: {e}"))?;
    mac.update(data);
    Ok(format!("0x{}", hex::encode(mac.finalize().into_bytes())))
}

/// Wire up every development collaborator for `config`.
pub fn collaborators(config: &WalletConfig) -> Collaborators {
    Collaborators {
        chain: Arc::new(DevChain::new(&config.chain_id)),
        custody: Arc::new(DevCustody::new()),
        auth: Arc::new(DevAuthBackend::new(config.session_ttl)),
        oauth: Arc::new(DevOAuth::completing(1)),
        passkey: Arc::new(DevPasskey::new(config.session_ttl)),
    }
}

/// OTP backend that "sends" codes into a set and accepts `DEV_OTP_CODE`.
pub struct DevAuthBackend {
    ttl: Duration,
    challenges: Mutex<HashSet<(OtpChannel, String)>>,
    users: Mutex<HashMap<String, String>>,
}

impl DevAuthBackend {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, challenges: Mutex::new(HashSet::new()), users: Mutex::new(HashMap::new()) }
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        lock(&self.users).insert(username.to_string(), password.to_string());
        self
    }

    pub fn has_challenge(&self, channel: OtpChannel, destination: &str) -> bool {
        lock(&self.challenges).contains(&(channel, destination.to_string()))
    }
}

#[async_trait]
impl AuthBackend for DevAuthBackend {
    async fn send_code(&self, channel: OtpChannel, destination: &str) -> anyhow::Result<()> {
        lock(&self.challenges).insert((channel, destination.to_string()));
        tracing::info!(?channel, "dev one-time code issued ({DEV_OTP_CODE})");
        Ok(())
    }

    async fn verify_code(&self, channel: OtpChannel, destination: &str, code: &str) -> anyhow::Result<Session> {
        let key = (channel, destination.to_string());
        let mut challenges = lock(&self.challenges);
        if !challenges.contains(&key) {
            anyhow::bail!("no code issued for this destination");
        }
        if code != DEV_OTP_CODE {
            anyhow::bail!("wrong code");
        }
        challenges.remove(&key);
        let method = match channel {
            OtpChannel::Email => "email",
            OtpChannel::Sms => "sms",
        };
        Ok(Session::new(format!("{method}:{destination}"), method, random_token(), self.ttl).with_username(destination))
    }

    async fn login(&self, username: &str, password: &str) -> anyhow::Result<Session> {
        match lock(&self.users).get(username) {
            Some(expected) if expected == password => {
                Ok(Session::new(format!("user:{username}"), "legacy", random_token(), self.ttl).with_username(username))
            }
            _ => anyhow::bail!("invalid credentials"),
        }
    }
}

/// Scripted OAuth popup: `Pending` for a number of polls, then completes or closes.
pub struct DevOAuth {
    pending_polls: u32,
    closes: bool,
    next_handle: AtomicU64,
    polls: Mutex<HashMap<String, (String, u32)>>,
}

impl DevOAuth {
    pub fn completing(pending_polls: u32) -> Self {
        Self { pending_polls, closes: false, next_handle: AtomicU64::new(1), polls: Mutex::new(HashMap::new()) }
    }

    pub fn closing(pending_polls: u32) -> Self {
        Self { closes: true, ..Self::completing(pending_polls) }
    }
}

#[async_trait]
impl OAuthProvider for DevOAuth {
    async fn open(&self, provider: &str) -> anyhow::Result<String> {
        let handle = format!("oauth-{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        lock(&self.polls).insert(handle.clone(), (provider.to_string(), 0));
        Ok(handle)
    }

    async fn poll(&self, handle: &str) -> anyhow::Result<OAuthStatus> {
        let mut polls = lock(&self.polls);
        let Some((provider, count)) = polls.get_mut(handle) else {
            anyhow::bail!("unknown oauth handle {handle}");
        };
        if *count < self.pending_polls {
            *count += 1;
            return Ok(OAuthStatus::Pending);
        }
        let provider = provider.clone();
        polls.remove(handle);
        if self.closes {
            return Ok(OAuthStatus::Closed);
        }
        let session = Session::new(format!("{provider}:dev"), "oauth", random_token(), Duration::from_secs(3600))
            .with_username(format!("dev@{provider}"));
        Ok(OAuthStatus::Complete(session))
    }
}

pub struct DevPasskey {
    ttl: Duration,
}

impl DevPasskey {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

#[async_trait]
impl PasskeyAuthenticator for DevPasskey {
    async fn authenticate(&self, username: Option<&str>) -> anyhow::Result<Session> {
        let username = username.unwrap_or("passkey-user");
        Ok(Session::new(format!("passkey:{username}"), "passkey", random_token(), self.ttl).with_username(username))
    }
}

/// Server-shard custody keyed by session token.
#[derive(Default)]
pub struct DevCustody {
    shards: Mutex<HashMap<String, KeyShard>>,
}

impl DevCustody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.shards).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shards).is_empty()
    }
}

#[async_trait]
impl KeyCustody for DevCustody {
    async fn fetch_server_shard(&self, token: &str) -> anyhow::Result<KeyShard> {
        lock(&self.shards)
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no server shard for this session"))
    }

    async fn store_server_shard(&self, token: &str, shard: &KeyShard) -> anyhow::Result<()> {
        lock(&self.shards).insert(token.to_string(), shard.clone());
        Ok(())
    }
}

/// Chain adapter with derived addresses, fixed balances and HMAC "signatures".
pub struct DevChain {
    chain_id: String,
    balances: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<(String, TransactionRequest)>>,
}

impl DevChain {
    pub fn new(chain_id: &str) -> Self {
        Self { chain_id: chain_id.to_string(), balances: Mutex::new(HashMap::new()), sent: Mutex::new(Vec::new()) }
    }

    pub fn with_balance(self, address: &str, wei: &str) -> Self {
        lock(&self.balances).insert(address.to_ascii_lowercase(), wei.to_string());
        self
    }

    /// `(hash, tx)` for every transaction sent so far.
    pub fn sent(&self) -> Vec<(String, TransactionRequest)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl ChainAdapter for DevChain {
    fn chain_id(&self) -> String {
        self.chain_id.clone()
    }

    fn address_for(&self, key: &SigningKey) -> anyhow::Result<String> {
        let digest = Sha256::digest(key.expose_secret());
        Ok(format!("0x{}", hex::encode(&digest[12..])))
    }

    async fn get_balance(&self, address: &str) -> anyhow::Result<String> {
        Ok(lock(&self.balances)
            .get(&address.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| "0x0".to_string()))
    }

    async fn send_transaction(&self, key: &SigningKey, tx: &TransactionRequest) -> anyhow::Result<String> {
        let body = serde_json::to_vec(tx)?;
        let signature = hmac_hex(key.expose_secret(), &body)?;
        let hash = format!("0x{}", hex::encode(Sha256::digest(signature.as_bytes())));
        lock(&self.sent).push((hash.clone(), tx.clone()));
        Ok(hash)
    }

    async fn sign_message(&self, key: &SigningKey, message: &[u8]) -> anyhow::Result<String> {
        hmac_hex(key.expose_secret(), message)
    }

    async fn sign_typed_data(&self, key: &SigningKey, typed_data: &Value) -> anyhow::Result<String> {
        hmac_hex(key.expose_secret(), &serde_json::to_vec(typed_data)?)
    }
}
