//! Wallet Core - runs inside the wallet frame and answers the host page.
//!
//! # Architecture
//!
//! ```text
//! FrameReceiver ── Envelope{origin, data}
//!      │
//!      ├── origin allow-list (drop on mismatch)
//!      ├── BridgeMessage::from_wire (drop when malformed)
//!      │
//!      ├── PING ─────────────▶ PONG
//!      ├── DISCONNECT_WALLET ─▶ end session (no reply)
//!      └── WALLET_REQUEST / AUTH_REQUEST / CONNECT_WALLET
//!               │  (own task; errors and panics become WALLET_ERROR)
//!               ├── AuthMachine ── AuthBackend / OAuthProvider / PasskeyAuthenticator
//!               ├── ApprovalQueue ◀── approval UI
//!               └── ShardSigner ── ShardStore (device) + KeyCustody (server) ── ChainAdapter
//! ```
//!
//! # RPC methods
//!
//! | Method | Session | Result |
//! |--------|---------|--------|
//! | `eth_accounts` | optional | `[address]` or `[]` |
//! | `eth_requestAccounts` | required | `[address]`, emits `connect` once |
//! | `eth_chainId` | - | hex chain id, `chainChanged` when it moved |
//! | `eth_sendTransaction` | required | tx hash after user approval |
//! | `eth_sign` / `personal_sign` | required | signature |
//! | `eth_signTypedData_v4` | required | signature |
//! | `eth_getBalance` | - | hex wei |
//! | `wallet_getUsername` | required | username or `null` |
//! | `wallet_getSession` | optional | session summary or `null` |
//! | `wallet_enroll` | required | `{address}` |
//! | `wallet_lock` | - | `true` when a session was ended |

mod approval;
mod auth;
mod services;
mod session;
mod signer;

pub use approval::{ApprovalEvent, ApprovalQueue, Decision, PendingApproval};
pub use auth::{AuthMachine, AuthOutcome, AuthState, AuthStep};
pub use services::{
    AuthBackend, ChainAdapter, KeyCustody, KeyShard, OAuthProvider, OAuthStatus, OtpChannel, PasskeyAuthenticator,
    ShardLocation, SigningKey, TransactionRequest,
};
pub use session::{Session, SessionStore};
pub use signer::{combine_shards, generate_key, split_key, ShardSigner, SignOp, KEY_LEN};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::config::WalletConfig;
use crate::core::methods::{events, rpc, wallet};
use crate::core::{codes, AuthMethod, BridgeMessage, OriginPolicy, RpcError};
use crate::frame::{Envelope, FramePort, FrameSender, ANY_ORIGIN};
use crate::vault::{MemoryPlain, MemoryRecords, PlainStorage, RecordBackend, ShardStore, VaultError};

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("unauthorized: authenticate first")]
    Unauthorized,
    #[error("session expired")]
    SessionExpired,
    #[error("{0}")]
    AuthFailed(String),
    #[error("no key enrolled for this account")]
    NotEnrolled,
    #[error("requested account is not managed by this wallet")]
    AccountMismatch,
    #[error("user rejected the request")]
    UserRejected,
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("wallet disconnected")]
    Disconnected,
    #[error("another transaction is awaiting approval")]
    Busy,
    #[error("secure storage failure")]
    Storage(#[source] VaultError),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("key shards do not match")]
    ShardMismatch,
    #[error("{what} unavailable")]
    Collaborator { what: &'static str, detail: String },
    #[error("internal error")]
    Internal,
}

impl WalletError {
    pub fn code(&self) -> i64 {
        match self {
            WalletError::Unauthorized
            | WalletError::SessionExpired
            | WalletError::NotEnrolled
            | WalletError::AccountMismatch => codes::UNAUTHORIZED,
            WalletError::AuthFailed(_) => codes::AUTH_FAILED,
            WalletError::UserRejected => codes::USER_REJECTED,
            WalletError::UnsupportedMethod(_) => codes::UNSUPPORTED_METHOD,
            WalletError::Disconnected => codes::DISCONNECTED,
            WalletError::Busy => codes::BUSY,
            WalletError::Storage(_) => codes::STORAGE_FAILURE,
            WalletError::InvalidParams(_) => codes::INVALID_PARAMS,
            WalletError::ShardMismatch | WalletError::Collaborator { .. } | WalletError::Internal => {
                codes::INTERNAL_ERROR
            }
        }
    }

    pub fn to_rpc(&self) -> RpcError {
        RpcError::new(self.code(), self.to_string())
    }

    /// Wrap a collaborator failure. The detail is logged, not sent to the host.
    pub fn collaborator(what: &'static str, error: anyhow::Error) -> Self {
        tracing::warn!(what, "collaborator failed: {error:#}");
        WalletError::Collaborator { what, detail: error.to_string() }
    }
}

/// External services the core drives.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainAdapter>,
    pub custody: Arc<dyn KeyCustody>,
    pub auth: Arc<dyn AuthBackend>,
    pub oauth: Arc<dyn OAuthProvider>,
    pub passkey: Arc<dyn PasskeyAuthenticator>,
}

/// Local persistence: encrypted records plus plain state (session, master salt).
#[derive(Clone)]
pub struct Storage {
    pub records: Arc<dyn RecordBackend>,
    pub plain: Arc<dyn PlainStorage>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self { records: Arc::new(MemoryRecords::new()), plain: Arc::new(MemoryPlain::new()) }
    }

    #[cfg(feature = "native")]
    pub fn for_app(app: &str) -> Self {
        Self {
            records: Arc::new(crate::vault::FileRecords::for_app(app)),
            plain: Arc::new(crate::vault::FilePlain::for_app(app)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    Lock,
    Expired,
    HostDisconnect,
}

impl EndReason {
    fn as_str(&self) -> &'static str {
        match self {
            EndReason::Lock => "lock",
            EndReason::Expired => "expired",
            EndReason::HostDisconnect => "disconnect",
        }
    }
}

#[derive(Default)]
struct Outbound {
    sender: Option<FrameSender>,
    /// Last origin that passed the allow-list; events go there.
    host_origin: Option<String>,
}

pub struct WalletCore {
    config: WalletConfig,
    origins: OriginPolicy,
    auth: AuthMachine,
    sessions: SessionStore,
    shards: Arc<RwLock<ShardStore>>,
    signer: ShardSigner,
    chain: Arc<dyn ChainAdapter>,
    approvals: ApprovalQueue,
    outbound: Mutex<Outbound>,
    connected: AtomicBool,
    /// Chain id last reported to the host.
    announced_chain: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl WalletCore {
    pub fn new(config: WalletConfig, collaborators: Collaborators, storage: Storage) -> Arc<Self> {
        let origins = OriginPolicy::new(&config.allowed_origins);
        if origins.is_empty() {
            tracing::warn!("no host origins allowed; every message will be dropped");
        }
        let shards = Arc::new(RwLock::new(ShardStore::new(storage.records, storage.plain.clone())));
        let Collaborators { chain, custody, auth, oauth, passkey } = collaborators;
        Arc::new(Self {
            auth: AuthMachine::new(&config, auth, oauth, passkey),
            sessions: SessionStore::new(storage.plain),
            signer: ShardSigner::new(shards.clone(), custody, chain.clone()),
            approvals: ApprovalQueue::new(config.approval_policy),
            shards,
            chain,
            origins,
            config,
            outbound: Mutex::new(Outbound::default()),
            connected: AtomicBool::new(false),
            announced_chain: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn approvals(&self) -> &ApprovalQueue {
        &self.approvals
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn session(&self) -> Option<Session> {
        self.auth.session()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn outbound(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Serve one host connection: restore any persisted session, announce
    /// READY, then handle each inbound message on its own task so a parked
    /// approval never blocks pings or other calls.
    pub async fn run(self: Arc<Self>, port: FramePort) {
        let FramePort { sender, mut receiver } = port;
        match self.restore_session().await {
            Ok(true) => tracing::info!("persisted session restored"),
            Ok(false) => {}
            Err(e) => tracing::warn!("session restore failed: {e}"),
        }

        self.outbound().sender = Some(sender.clone());
        let ready = BridgeMessage::Ready { id: self.next_id("ready") };
        if let Err(e) = sender.post(&ready, ANY_ORIGIN) {
            tracing::warn!("could not announce READY: {e}");
            return;
        }

        // Dropping the set (frame detached) aborts every in-flight handler.
        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                envelope = receiver.recv() => {
                    let Some(envelope) = envelope else { break };
                    let core = self.clone();
                    let sender = sender.clone();
                    handlers.spawn(async move {
                        let origin = envelope.origin.clone();
                        if let Some(reply) = core.handle_message(envelope).await {
                            if let Err(e) = sender.post(&reply, &origin) {
                                tracing::debug!(id = reply.id(), "reply not delivered: {e}");
                            }
                        }
                    });
                }
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
            }
        }
        tracing::debug!("host channel closed");
        handlers.abort_all();
        self.frame_detached();
    }

    /// The frame went away: nothing is left to answer, so queued approvals
    /// are rejected and events stop. The session itself survives.
    pub fn frame_detached(&self) {
        {
            let mut outbound = self.outbound();
            outbound.sender = None;
            outbound.host_origin = None;
        }
        self.connected.store(false, Ordering::SeqCst);
        let rejected = self.approvals.reject_all();
        tracing::info!(rejected, "wallet frame detached");
    }

    /// Validate and dispatch one inbound message. Returns the reply to post
    /// back to the sender, if the message calls for one.
    pub async fn handle_message(self: &Arc<Self>, envelope: Envelope) -> Option<BridgeMessage> {
        if !self.origins.allows(&envelope.origin) {
            tracing::debug!(origin = %envelope.origin, "message from disallowed origin dropped");
            return None;
        }
        let message = match BridgeMessage::from_wire(envelope.data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(origin = %envelope.origin, "{e}");
                return None;
            }
        };
        self.outbound().host_origin = Some(envelope.origin);

        match message {
            BridgeMessage::Ping { id } => Some(BridgeMessage::Pong { id }),
            BridgeMessage::DisconnectWallet { .. } => {
                self.disconnect().await;
                None
            }
            message @ (BridgeMessage::WalletRequest { .. }
            | BridgeMessage::AuthRequest { .. }
            | BridgeMessage::ConnectWallet { .. }) => {
                let id = message.id().to_string();
                let core = self.clone();
                // Own task so a panic becomes a reply; the set aborts it if
                // this handler is dropped.
                let mut task = JoinSet::new();
                task.spawn(async move { core.route(message).await });
                let result = match task.join_next().await {
                    Some(Ok(result)) => result,
                    Some(Err(e)) => {
                        tracing::warn!(id = %id, "handler failed: {e}");
                        Err(WalletError::Internal)
                    }
                    None => Err(WalletError::Internal),
                };
                Some(match result {
                    Ok(value) => BridgeMessage::response(id, value),
                    Err(e) => {
                        tracing::debug!(id = %id, code = e.code(), "{e}");
                        BridgeMessage::error(id, e.to_rpc())
                    }
                })
            }
            other => {
                tracing::debug!(kind = %other.kind(), "unexpected message type on wallet side");
                None
            }
        }
    }

    async fn route(&self, message: BridgeMessage) -> Result<Value, WalletError> {
        match message {
            BridgeMessage::WalletRequest { method, params, .. } => self.rpc(&method, params).await,
            BridgeMessage::AuthRequest { params, .. } => {
                let method: AuthMethod = serde_json::from_value(params)
                    .map_err(|e| WalletError::InvalidParams(format!("auth params: {e}")))?;
                self.authenticate(method).await.map(|_| json!(true))
            }
            BridgeMessage::ConnectWallet { .. } => self.request_accounts().await.map(|a| json!(a)),
            other => Err(WalletError::UnsupportedMethod(other.kind().to_string())),
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        match method {
            rpc::ACCOUNTS => self.accounts().await.map(|a| json!(a)),
            rpc::REQUEST_ACCOUNTS => self.request_accounts().await.map(|a| json!(a)),
            rpc::CHAIN_ID => Ok(json!(self.current_chain())),
            rpc::SEND_TRANSACTION => {
                let tx: TransactionRequest = param(&params, 0, "transaction")?;
                self.send_transaction(tx).await.map(|hash| json!(hash))
            }
            rpc::SIGN => {
                let address: String = param(&params, 0, "address")?;
                let message: String = param(&params, 1, "message")?;
                self.sign_message(&address, &message).await.map(|s| json!(s))
            }
            rpc::PERSONAL_SIGN => {
                let message: String = param(&params, 0, "message")?;
                let address: String = param(&params, 1, "address")?;
                self.sign_message(&address, &message).await.map(|s| json!(s))
            }
            rpc::SIGN_TYPED_DATA_V4 => {
                let address: String = param(&params, 0, "address")?;
                let data: Value = param(&params, 1, "typedData")?;
                let data = match data {
                    Value::String(raw) => serde_json::from_str(&raw)
                        .map_err(|e| WalletError::InvalidParams(format!("typedData: {e}")))?,
                    other => other,
                };
                self.sign_typed_data(&address, data).await.map(|s| json!(s))
            }
            rpc::GET_BALANCE => {
                let address: String = param(&params, 0, "address")?;
                self.chain
                    .get_balance(&address)
                    .await
                    .map(|b| json!(b))
                    .map_err(|e| WalletError::collaborator("chain adapter", e))
            }
            wallet::GET_USERNAME => Ok(json!(self.require_session().await?.username)),
            wallet::GET_SESSION => Ok(match self.require_session().await {
                Ok(session) => session.summary(),
                Err(_) => Value::Null,
            }),
            wallet::ENROLL => self.enroll().await.map(|address| json!({ "address": address })),
            wallet::LOCK => Ok(json!(self.lock().await)),
            other => Err(WalletError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Run one authentication step. A new session is published only after
    /// the shard store opened with its token; then it is persisted and
    /// `authenticated` emitted.
    pub async fn authenticate(&self, method: AuthMethod) -> Result<AuthOutcome, WalletError> {
        match self.auth.verify(method).await? {
            AuthStep::OtpSent => Ok(AuthOutcome::OtpSent),
            AuthStep::AlreadyAuthenticated(session) => Ok(AuthOutcome::AlreadyAuthenticated(session)),
            AuthStep::Verified { session, start } => {
                self.establish(session, &start).await.map(AuthOutcome::Authenticated)
            }
        }
    }

    pub async fn verify_otp(&self, code: &str) -> Result<Session, WalletError> {
        match self.authenticate(AuthMethod::Otp { code: code.to_string() }).await? {
            AuthOutcome::Authenticated(session) | AuthOutcome::AlreadyAuthenticated(session) => Ok(session),
            AuthOutcome::OtpSent => Err(WalletError::Internal),
        }
    }

    /// Open shards, then commit. Both happen under the shard lock, so a
    /// competing step cannot swap the store key between them.
    async fn establish(&self, session: Session, start: &AuthState) -> Result<Session, WalletError> {
        let session = {
            let mut shards = self.shards.write().await;
            if !self.auth.is_current(start) {
                return Err(WalletError::AuthFailed("authentication superseded".into()));
            }
            shards.initialize(&session.token).await.map_err(WalletError::Storage)?;
            match self.auth.commit(session, start) {
                Ok(session) => session,
                Err(e) => {
                    if let Err(close) = shards.close().await {
                        tracing::warn!("shard store not closed cleanly: {close}");
                    }
                    return Err(e);
                }
            }
        };
        if let Err(e) = self.sessions.save(&session) {
            tracing::warn!("session not persisted: {e}");
        }
        self.emit(
            events::AUTHENTICATED,
            json!({ "userId": session.user_id, "authMethod": session.auth_method }),
        );
        Ok(session)
    }

    async fn open_shards(&self, token: &str) -> Result<(), WalletError> {
        self.shards.write().await.initialize(token).await.map_err(WalletError::Storage)
    }

    /// Reinstate an unexpired persisted session and unlock the shard store
    /// with it. Expired sessions are discarded by the session store.
    pub async fn restore_session(&self) -> Result<bool, WalletError> {
        let Some(session) = self.sessions.load().map_err(WalletError::Storage)? else {
            return Ok(false);
        };
        self.open_shards(&session.token).await?;
        if !self.auth.restore(session) {
            self.shards.write().await.close().await.map_err(WalletError::Storage)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Live, unexpired session. An expired one ends here.
    async fn require_session(&self) -> Result<Session, WalletError> {
        let session = self.auth.session().ok_or(WalletError::Unauthorized)?;
        if session.is_expired() {
            self.end_session(EndReason::Expired).await;
            return Err(WalletError::SessionExpired);
        }
        Ok(session)
    }

    /// Back to `Unauthenticated`, rejecting queued approvals. Returns whether
    /// a session was ended.
    pub async fn lock(&self) -> bool {
        self.end_session(EndReason::Lock).await
    }

    /// Host-initiated disconnect. Same teardown as `lock`, no echo event.
    pub async fn disconnect(&self) -> bool {
        self.end_session(EndReason::HostDisconnect).await
    }

    async fn end_session(&self, reason: EndReason) -> bool {
        let previous = self.auth.lock();
        self.connected.store(false, Ordering::SeqCst);
        let rejected = self.approvals.reject_all();
        if let Err(e) = self.sessions.clear() {
            tracing::warn!("session not cleared: {e}");
        }
        if let Err(e) = self.shards.write().await.close().await {
            tracing::warn!("shard store not closed cleanly: {e}");
        }
        let ended = matches!(previous, AuthState::Authenticated(_));
        tracing::info!(reason = reason.as_str(), ended, rejected, "session ended");

        match reason {
            EndReason::Lock => self.emit(events::LOCKED, json!({})),
            EndReason::Expired => self.emit(events::DISCONNECT, json!({ "reason": "expired" })),
            EndReason::HostDisconnect => {}
        }
        ended
    }

    async fn account(&self, session: &Session) -> Result<String, WalletError> {
        if let Some(address) = &session.address {
            return Ok(address.clone());
        }
        let address = self.signer.address(&session.token).await?;
        self.remember_address(&address);
        Ok(address)
    }

    fn remember_address(&self, address: &str) {
        if let Some(updated) = self.auth.update_session(|s| s.address = Some(address.to_string())) {
            if let Err(e) = self.sessions.save(&updated) {
                tracing::warn!("session not persisted: {e}");
            }
        }
    }

    async fn accounts(&self) -> Result<Vec<String>, WalletError> {
        Ok(match self.require_session().await {
            Ok(session) => session.address.into_iter().collect(),
            Err(_) => Vec::new(),
        })
    }

    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        let session = self.require_session().await?;
        let address = self.account(&session).await?;
        let chain_id = self.current_chain();
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.emit(events::CONNECT, json!({ "chainId": chain_id }));
            self.emit(events::ACCOUNTS_CHANGED, json!([address]));
        }
        Ok(vec![address])
    }

    /// The adapter's chain id. A connected host hears `chainChanged` when it
    /// differs from the one last reported.
    fn current_chain(&self) -> String {
        let chain_id = self.chain.chain_id();
        let previous = self
            .announced_chain
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(chain_id.clone());
        if self.is_connected() && previous.is_some_and(|p| p != chain_id) {
            tracing::info!(%chain_id, "chain changed");
            self.emit(events::CHAIN_CHANGED, json!(chain_id));
        }
        chain_id
    }

    async fn signing_session(&self, requested: &str) -> Result<Session, WalletError> {
        let session = self.require_session().await?;
        let address = self.account(&session).await?;
        if !requested.eq_ignore_ascii_case(&address) {
            return Err(WalletError::AccountMismatch);
        }
        Ok(session)
    }

    async fn sign_message(&self, address: &str, message: &str) -> Result<String, WalletError> {
        let session = self.signing_session(address).await?;
        self.signer.sign(&session.token, SignOp::Message(message_bytes(message))).await
    }

    async fn sign_typed_data(&self, address: &str, data: Value) -> Result<String, WalletError> {
        let session = self.signing_session(address).await?;
        self.signer.sign(&session.token, SignOp::TypedData(data)).await
    }

    /// Park the transaction in the approval queue; sign and send once approved.
    async fn send_transaction(&self, mut tx: TransactionRequest) -> Result<String, WalletError> {
        let session = self.require_session().await?;
        let address = self.account(&session).await?;
        if let Some(from) = &tx.from {
            if !from.eq_ignore_ascii_case(&address) {
                return Err(WalletError::AccountMismatch);
            }
        }
        tx.from = Some(address);

        let approval_id = self.next_id("tx");
        let decision = self.approvals.submit(approval_id.clone(), tx.clone())?;
        match tokio::time::timeout(self.config.approval_timeout, decision).await {
            Ok(Ok(Decision::Approved)) => {}
            Ok(Ok(Decision::Rejected)) => return Err(WalletError::UserRejected),
            Ok(Err(_)) => return Err(WalletError::Disconnected),
            Err(_) => {
                // Nobody decided in time; the host has given up on this call.
                self.approvals.reject(&approval_id);
                tracing::info!(id = %approval_id, "approval timed out");
                return Err(WalletError::UserRejected);
            }
        }

        // The session may have ended while the user was deciding.
        let session = self.require_session().await?;
        let hash = self.signer.sign(&session.token, SignOp::Transaction(tx)).await?;
        tracing::info!(%hash, "transaction sent");
        Ok(hash)
    }

    /// Create and split a key for the current session, unless this device
    /// already holds a shard it can open.
    pub async fn enroll(&self) -> Result<String, WalletError> {
        let session = self.require_session().await?;
        if self.signer.is_enrolled().await? {
            return self.account(&session).await;
        }
        let address = self.signer.enroll(&session.token).await?;
        self.remember_address(&address);
        if self.is_connected() {
            self.emit(events::ACCOUNTS_CHANGED, json!([address]));
        }
        Ok(address)
    }

    /// Post a `WALLET_EVENT` to the last validated host origin.
    fn emit(&self, event: &str, data: Value) {
        let (sender, origin) = {
            let outbound = self.outbound();
            (outbound.sender.clone(), outbound.host_origin.clone())
        };
        let (Some(sender), Some(origin)) = (sender, origin) else {
            tracing::debug!(event, "no host attached, event not sent");
            return;
        };
        let message = BridgeMessage::event(self.next_id("evt"), event, data);
        if let Err(e) = sender.post(&message, &origin) {
            tracing::debug!(event, "event not delivered: {e}");
        }
    }
}

/// Positional param; a bare non-array value counts as position 0.
fn param<T: DeserializeOwned>(params: &Value, index: usize, name: &str) -> Result<T, WalletError> {
    let value = match params {
        Value::Array(items) => items.get(index).cloned(),
        Value::Null => None,
        other if index == 0 => Some(other.clone()),
        _ => None,
    };
    let value = value.ok_or_else(|| WalletError::InvalidParams(format!("missing {name}")))?;
    serde_json::from_value(value).map_err(|e| WalletError::InvalidParams(format!("{name}: {e}")))
}

/// `0x`-prefixed hex is decoded; anything else is signed as UTF-8.
fn message_bytes(message: &str) -> Vec<u8> {
    message
        .strip_prefix("0x")
        .and_then(|h| hex::decode(h).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec())
}
