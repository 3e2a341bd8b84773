//! Host Bridge - runs in the merchant page and proxies wallet calls into the frame.
//!
//! # Architecture
//!
//! ```text
//! caller ── request()/authenticate()/ping() ──┐
//!                                             ▼
//!                          PendingRequest{reply, timer}  keyed by id
//!                                             │
//!                           FrameSender ──────┼──────▶ wallet frame
//!                                             │
//!          intake task ◀── FrameReceiver ◀────┴─────── WALLET_RESPONSE / WALLET_ERROR
//!              │                                       WALLET_EVENT / READY / PONG
//!              ├── origin allow-list (drop on mismatch)
//!              ├── settle pending by id (exactly once)
//!              └── WalletState + EventEmitter
//! ```
//!
//! A pending entry leaves the map exactly once: on response, on error, when
//! its timer fires, or on `destroy()`. Whoever removes it settles the caller;
//! anything arriving later for that id finds nothing and is ignored.

mod events;
mod state;

pub use events::{EventEmitter, Listener, ListenerId};
pub use state::WalletState;

use rand::RngCore;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::core::methods::{events as names, rpc};
use crate::core::{AuthMethod, BridgeMessage, OriginPolicy, RpcError};
use crate::frame::{FrameError, FrameHost, FrameReceiver, FrameSender, FrameSpec};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge not initialized")]
    NotInitialized,
    #[error("bridge already initialized")]
    AlreadyInitialized,
    #[error("invalid wallet url: {0}")]
    InvalidWalletUrl(String),
    #[error("wallet frame failed to attach: {0}")]
    Attach(String),
    #[error("wallet frame did not signal READY within {0:?}")]
    ReadyTimeout(Duration),
    #[error("request '{method}' timed out after {after:?}")]
    RequestTimeout { method: String, after: Duration },
    #[error("authentication timed out after {0:?}")]
    AuthTimeout(Duration),
    #[error("bridge destroyed")]
    Destroyed,
    #[error(transparent)]
    Transport(#[from] FrameError),
    #[error("wallet error: {0}")]
    Wallet(RpcError),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl BridgeError {
    /// Wallet-side error code, when the failure came from the wallet.
    pub fn code(&self) -> Option<i64> {
        match self {
            BridgeError::Wallet(e) => Some(e.code),
            _ => None,
        }
    }
}

type Reply = Result<Value, BridgeError>;

#[derive(Debug, Clone)]
enum PendingKind {
    Request(String),
    Auth,
    Ping,
}

impl PendingKind {
    fn timeout_error(&self, after: Duration) -> BridgeError {
        match self {
            PendingKind::Request(method) => BridgeError::RequestTimeout { method: method.clone(), after },
            PendingKind::Auth => BridgeError::AuthTimeout(after),
            PendingKind::Ping => BridgeError::RequestTimeout { method: "ping".into(), after },
        }
    }
}

struct PendingRequest {
    reply: oneshot::Sender<Reply>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    sender: Option<FrameSender>,
    intake: Option<JoinHandle<()>>,
    ready_tx: Option<oneshot::Sender<()>>,
    ready: bool,
    pending: HashMap<String, PendingRequest>,
    state: WalletState,
}

struct Shared {
    inner: Mutex<Inner>,
    debug: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn settle(&self, id: &str, outcome: Reply) {
        let entry = self.lock().pending.remove(id);
        match entry {
            Some(pending) => {
                pending.timer.abort();
                let _ = pending.reply.send(outcome);
            }
            None => {
                if self.debug {
                    tracing::debug!(id, "reply for unknown or settled request ignored");
                }
            }
        }
    }

    fn expire(&self, id: &str, error: BridgeError) {
        let entry = self.lock().pending.remove(id);
        if let Some(pending) = entry {
            tracing::debug!(id, "{error}");
            let _ = pending.reply.send(Err(error));
        }
    }

    fn dispatch(&self, message: BridgeMessage, events: &EventEmitter) {
        match message {
            BridgeMessage::Ready { .. } => {
                let ready_tx = {
                    let mut inner = self.lock();
                    inner.ready = true;
                    inner.ready_tx.take()
                };
                if let Some(tx) = ready_tx {
                    let _ = tx.send(());
                }
            }
            BridgeMessage::WalletResponse { id, result } => self.settle(&id, Ok(result)),
            BridgeMessage::WalletError { id, error } => self.settle(&id, Err(BridgeError::Wallet(error))),
            BridgeMessage::Pong { id } => self.settle(&id, Ok(Value::Null)),
            BridgeMessage::WalletEvent { event, data, .. } => {
                self.lock().state.apply_event(&event, &data);
                events.emit(&event, &data);
            }
            other => {
                if self.debug {
                    tracing::debug!(kind = %other.kind(), "unexpected message type on host side");
                }
            }
        }
    }
}

/// Host-page end of the wallet bridge.
pub struct HostBridge {
    config: BridgeConfig,
    wallet_origin: String,
    origins: OriginPolicy,
    frames: Arc<dyn FrameHost>,
    shared: Arc<Shared>,
    events: EventEmitter,
    id_prefix: String,
    next_id: AtomicU64,
}

impl HostBridge {
    pub fn new(config: BridgeConfig, frames: Arc<dyn FrameHost>) -> Result<Self, BridgeError> {
        let wallet_origin = config
            .wallet_origin()
            .ok_or_else(|| BridgeError::InvalidWalletUrl(config.wallet_url.clone()))?;
        let origins = OriginPolicy::new(&config.effective_origins());
        let mut prefix = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut prefix);
        Ok(Self {
            shared: Arc::new(Shared { inner: Mutex::new(Inner::default()), debug: config.debug }),
            config,
            wallet_origin,
            origins,
            frames,
            events: EventEmitter::new(),
            id_prefix: hex::encode(prefix),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn wallet_origin(&self) -> &str {
        &self.wallet_origin
    }

    /// Attach the wallet frame and wait for its READY. One attempt, bounded
    /// by `ready_timeout`; on timeout the frame is torn down again.
    pub async fn initialize(&self) -> Result<(), BridgeError> {
        if self.shared.lock().sender.is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }
        let spec = FrameSpec::wallet(&self.config.wallet_url, &self.wallet_origin);
        let port = self
            .frames
            .attach(&spec)
            .await
            .map_err(|e| BridgeError::Attach(e.to_string()))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut inner = self.shared.lock();
            if inner.sender.is_some() {
                drop(inner);
                self.frames.detach();
                return Err(BridgeError::AlreadyInitialized);
            }
            inner.sender = Some(port.sender);
            inner.ready_tx = Some(ready_tx);
            inner.intake = Some(tokio::spawn(intake(
                self.shared.clone(),
                self.events.clone(),
                self.origins.clone(),
                port.receiver,
            )));
        }

        match tokio::time::timeout(self.config.ready_timeout, ready_rx).await {
            Ok(Ok(())) => {
                tracing::info!(origin = %self.wallet_origin, "wallet frame ready");
                self.events.emit(names::READY, &json!({ "origin": self.wallet_origin }));
                Ok(())
            }
            Ok(Err(_)) => Err(BridgeError::Destroyed),
            Err(_) => {
                self.teardown();
                Err(BridgeError::ReadyTimeout(self.config.ready_timeout))
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock().ready
    }

    fn next_id(&self) -> String {
        format!("{}-{}", self.id_prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn call(&self, message: BridgeMessage, kind: PendingKind, after: Duration) -> Reply {
        let id = message.id().to_string();
        let rx = {
            let mut inner = self.shared.lock();
            if !inner.ready {
                return Err(BridgeError::NotInitialized);
            }
            let sender = inner.sender.clone().ok_or(BridgeError::NotInitialized)?;

            let (tx, rx) = oneshot::channel();
            let shared = self.shared.clone();
            let timer_id = id.clone();
            let timeout_error = kind.timeout_error(after);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(after).await;
                shared.expire(&timer_id, timeout_error);
            });
            let previous = inner.pending.insert(id.clone(), PendingRequest { reply: tx, timer });
            debug_assert!(previous.is_none(), "correlation id reused");

            if let Err(e) = sender.post(&message, &self.wallet_origin) {
                if let Some(pending) = inner.pending.remove(&id) {
                    pending.timer.abort();
                }
                return Err(e.into());
            }
            rx
        };
        rx.await.unwrap_or(Err(BridgeError::Destroyed))
    }

    /// Call a wallet RPC method. Fails after `request_timeout`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let message = BridgeMessage::WalletRequest { id: self.next_id(), method: method.to_string(), params };
        self.call(message, PendingKind::Request(method.to_string()), self.config.request_timeout)
            .await
    }

    pub async fn request_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, BridgeError> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| BridgeError::UnexpectedResponse(format!("{method}: {e}")))
    }

    /// Start (or complete, for `Otp`) authentication. `true` means the
    /// wallet accepted the step: a session exists or a code was sent.
    pub async fn authenticate(&self, method: AuthMethod) -> Result<bool, BridgeError> {
        let params = serde_json::to_value(&method)
            .map_err(|e| BridgeError::UnexpectedResponse(format!("auth params: {e}")))?;
        let message = BridgeMessage::AuthRequest { id: self.next_id(), params };
        let result = self.call(message, PendingKind::Auth, self.config.auth_timeout).await?;
        result
            .as_bool()
            .ok_or_else(|| BridgeError::UnexpectedResponse(format!("auth result: {result}")))
    }

    pub async fn verify_otp(&self, code: &str) -> Result<bool, BridgeError> {
        self.authenticate(AuthMethod::Otp { code: code.to_string() }).await
    }

    /// Optionally authenticate, then request accounts and chain id. The
    /// snapshot is updated from the wallet's answers only.
    pub async fn connect(&self, auth: Option<AuthMethod>) -> Result<Vec<String>, BridgeError> {
        if let Some(method) = auth {
            self.authenticate(method).await?;
        }
        let accounts: Value = self.request(rpc::REQUEST_ACCOUNTS, json!([])).await?;
        let list: Vec<String> = serde_json::from_value(accounts.clone())
            .map_err(|e| BridgeError::UnexpectedResponse(format!("accounts: {e}")))?;
        let chain_id = self.request(rpc::CHAIN_ID, json!([])).await?;
        self.shared.lock().state.apply_connect(&accounts, chain_id.as_str());
        Ok(list)
    }

    /// Fire-and-forget. Local state is cleared whether or not the frame hears it.
    pub fn disconnect(&self) {
        let sender = self.shared.lock().sender.clone();
        if let Some(sender) = sender {
            let message = BridgeMessage::DisconnectWallet { id: self.next_id() };
            if let Err(e) = sender.post(&message, &self.wallet_origin) {
                tracing::debug!("disconnect not delivered: {e}");
            }
        }
        self.shared.lock().state = WalletState::default();
        self.events.emit(names::DISCONNECT, &Value::Null);
    }

    /// PING/PONG round trip.
    pub async fn ping(&self) -> Result<Duration, BridgeError> {
        let started = Instant::now();
        let message = BridgeMessage::Ping { id: self.next_id() };
        self.call(message, PendingKind::Ping, self.config.request_timeout).await?;
        Ok(started.elapsed())
    }

    pub fn state(&self) -> WalletState {
        self.shared.lock().state.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.shared.lock().pending.keys().cloned().collect()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.events.off(event, id)
    }

    pub fn emit(&self, event: &str, data: &Value) -> usize {
        self.events.emit(event, data)
    }

    /// Fail every pending call with `Destroyed`, cancel all timers, detach
    /// the frame and reset. Everything is settled before this returns.
    /// Returns how many calls were failed.
    pub fn destroy(&self) -> usize {
        let failed = self.teardown();
        self.events.clear();
        tracing::info!(failed, "bridge destroyed");
        failed
    }

    fn teardown(&self) -> usize {
        let (pending, intake, had_frame) = {
            let mut inner = self.shared.lock();
            let pending = std::mem::take(&mut inner.pending);
            let intake = inner.intake.take();
            let had_frame = inner.sender.take().is_some();
            inner.ready_tx = None;
            inner.ready = false;
            inner.state = WalletState::default();
            (pending, intake, had_frame)
        };
        let failed = pending.len();
        for (_, entry) in pending {
            entry.timer.abort();
            let _ = entry.reply.send(Err(BridgeError::Destroyed));
        }
        if let Some(handle) = intake {
            handle.abort();
        }
        if had_frame {
            self.frames.detach();
        }
        failed
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn intake(shared: Arc<Shared>, events: EventEmitter, origins: OriginPolicy, mut receiver: FrameReceiver) {
    while let Some(envelope) = receiver.recv().await {
        if !origins.allows(&envelope.origin) {
            if shared.debug {
                tracing::debug!(origin = %envelope.origin, "message from disallowed origin dropped");
            }
            continue;
        }
        match BridgeMessage::from_wire(envelope.data) {
            Ok(message) => shared.dispatch(message, &events),
            Err(e) => {
                if shared.debug {
                    tracing::debug!(origin = %envelope.origin, "{e}");
                }
            }
        }
    }
    tracing::debug!("wallet frame channel closed");
}
