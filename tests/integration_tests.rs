//! Integration Tests: host page and wallet frame end to end
//!
//! These tests verify:
//! 1. HostBridge ↔ WalletCore over the in-process frame host
//! 2. Wallet events reach the host's WalletState
//! 3. Approval and rejection of transactions through the bridge
//! 4. The wallet's own origin check on host messages
//! 5. chainChanged reaches a connected host
//! 6. destroy() detaches the frame and drops parked transactions

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vaultframe::core::methods::{events, rpc, wallet};
use vaultframe::dev::{self, DEV_OTP_CODE};
use vaultframe::dev::DevChain;
use vaultframe::wallet::{ApprovalEvent, ChainAdapter, Collaborators, SigningKey, TransactionRequest};
use vaultframe::{
    codes, AuthMethod, BridgeConfig, BridgeError, HostBridge, LocalFrameHost, Storage, WalletConfig, WalletCore,
};

const HOST: &str = "https://shop.test";
const WALLET_URL: &str = "https://wallet.acme.io/embed";

fn wallet_core(allowed: &str) -> Arc<WalletCore> {
    let config = WalletConfig::new("it").with_allowed_origins(vec![allowed.to_string()]);
    WalletCore::new(config.clone(), dev::collaborators(&config), Storage::in_memory())
}

async fn attached(core: Arc<WalletCore>) -> (HostBridge, Arc<LocalFrameHost>) {
    let frames = Arc::new(LocalFrameHost::new(HOST, core));
    let bridge = HostBridge::new(BridgeConfig::new(WALLET_URL), frames.clone()).unwrap();
    bridge.initialize().await.unwrap();
    (bridge, frames)
}

/// Auto-approves (or rejects) every queued transaction.
fn approval_ui(core: &Arc<WalletCore>, approve: bool) {
    let mut rx = core.approvals().subscribe();
    let core = core.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let ApprovalEvent::Queued(pending) = event {
                if approve {
                    core.approvals().approve(&pending.id);
                } else {
                    core.approvals().reject(&pending.id);
                }
            }
        }
    });
}

/// Test: full flow - email login, enroll, connect, sign, send, lock
#[tokio::test]
async fn end_to_end_wallet_flow() {
    let core = wallet_core(HOST);
    approval_ui(&core, true);
    let (bridge, _frames) = attached(core.clone()).await;
    assert!(bridge.is_ready());

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for event in [events::AUTHENTICATED, events::CONNECT, events::ACCOUNTS_CHANGED, events::LOCKED] {
        let s = seen.clone();
        bridge.on(event, move |_| s.lock().unwrap().push(event.to_string()));
    }

    assert!(bridge.authenticate(AuthMethod::Email { credential: "a@b.com".into() }).await.unwrap());
    let wrong = bridge.verify_otp("000000").await.unwrap_err();
    assert_eq!(wrong.code(), Some(codes::AUTH_FAILED));
    assert!(bridge.verify_otp(DEV_OTP_CODE).await.unwrap());
    assert!(bridge.state().authenticated);

    let enrolled = bridge.request(wallet::ENROLL, json!([])).await.unwrap();
    let address = enrolled["address"].as_str().unwrap().to_string();

    let accounts = bridge.connect(None).await.unwrap();
    assert_eq!(accounts, vec![address.clone()]);
    let state = bridge.state();
    assert!(state.connected);
    assert_eq!(state.address.as_deref(), Some(address.as_str()));
    assert_eq!(state.chain_id.as_deref(), Some("0x1"));

    let signature = bridge.request(rpc::PERSONAL_SIGN, json!(["0x68656c6c6f", address])).await.unwrap();
    assert!(signature.as_str().unwrap().starts_with("0x"));

    let hash: String = bridge
        .request_as(rpc::SEND_TRANSACTION, json!([{ "to": "0xdead", "value": "0x1" }]))
        .await
        .unwrap();
    assert!(hash.starts_with("0x"));

    assert!(bridge.ping().await.is_ok());

    assert_eq!(bridge.request(wallet::LOCK, json!([])).await.unwrap(), json!(true));
    let state = bridge.state();
    assert!(!state.authenticated);
    assert!(!state.connected);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["authenticated", "connect", "accountsChanged", "locked"]);
}

/// Test: a rejected transaction surfaces 4001 on the host
#[tokio::test]
async fn rejected_transaction_surfaces_user_rejected() {
    let core = wallet_core(HOST);
    approval_ui(&core, false);
    let (bridge, _frames) = attached(core).await;

    bridge.authenticate(AuthMethod::Passkey { username: Some("carol".into()) }).await.unwrap();
    bridge.request(wallet::ENROLL, json!([])).await.unwrap();
    let err = bridge.request(rpc::SEND_TRANSACTION, json!([{ "to": "0xdead" }])).await.unwrap_err();
    assert!(matches!(err, BridgeError::Wallet(ref e) if e.code == codes::USER_REJECTED));
}

/// Test: username and session come back through product methods
#[tokio::test]
async fn product_methods_over_bridge() {
    let (bridge, _frames) = attached(wallet_core(HOST)).await;

    assert_eq!(bridge.request(wallet::GET_SESSION, json!([])).await.unwrap(), Value::Null);
    bridge.authenticate(AuthMethod::Oauth { provider: "github".into() }).await.unwrap();
    assert_eq!(bridge.request(wallet::GET_USERNAME, json!([])).await.unwrap(), json!("dev@github"));
    let session = bridge.request(wallet::GET_SESSION, json!([])).await.unwrap();
    assert_eq!(session["authMethod"], "oauth");

    let err = bridge.request("eth_coinbase", json!([])).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::UNSUPPORTED_METHOD));
}

/// Dev chain whose network can be switched under the wallet.
struct SwitchingChain {
    inner: DevChain,
    chain_id: Mutex<String>,
}

#[async_trait]
impl ChainAdapter for SwitchingChain {
    fn chain_id(&self) -> String {
        self.chain_id.lock().unwrap().clone()
    }
    fn address_for(&self, key: &SigningKey) -> anyhow::Result<String> {
        self.inner.address_for(key)
    }
    async fn get_balance(&self, address: &str) -> anyhow::Result<String> {
        self.inner.get_balance(address).await
    }
    async fn send_transaction(&self, key: &SigningKey, tx: &TransactionRequest) -> anyhow::Result<String> {
        self.inner.send_transaction(key, tx).await
    }
    async fn sign_message(&self, key: &SigningKey, message: &[u8]) -> anyhow::Result<String> {
        self.inner.sign_message(key, message).await
    }
    async fn sign_typed_data(&self, key: &SigningKey, typed_data: &Value) -> anyhow::Result<String> {
        self.inner.sign_typed_data(key, typed_data).await
    }
}

/// Test: a network switch on the wallet side shows up in the host's state
#[tokio::test]
async fn chain_switch_reaches_connected_host() {
    let config = WalletConfig::new("it").with_allowed_origins(vec![HOST.to_string()]);
    let chain = Arc::new(SwitchingChain { inner: DevChain::new("0x1"), chain_id: Mutex::new("0x1".into()) });
    let collaborators = Collaborators { chain: chain.clone(), ..dev::collaborators(&config) };
    let core = WalletCore::new(config, collaborators, Storage::in_memory());
    let (bridge, _frames) = attached(core).await;

    let changes: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let c = changes.clone();
    bridge.on(events::CHAIN_CHANGED, move |data| c.lock().unwrap().push(data.clone()));

    bridge.authenticate(AuthMethod::Passkey { username: None }).await.unwrap();
    bridge.request(wallet::ENROLL, json!([])).await.unwrap();
    bridge.connect(None).await.unwrap();
    assert_eq!(bridge.state().chain_id.as_deref(), Some("0x1"));

    *chain.chain_id.lock().unwrap() = "0x89".into();
    assert_eq!(bridge.request(rpc::CHAIN_ID, json!([])).await.unwrap(), json!("0x89"));
    assert_eq!(bridge.state().chain_id.as_deref(), Some("0x89"));
    assert_eq!(*changes.lock().unwrap(), vec![json!("0x89")]);
}

/// Test: the wallet ignores a host page it does not trust; the call times out
#[tokio::test(start_paused = true)]
async fn wallet_ignores_untrusted_host() {
    let (bridge, _frames) = attached(wallet_core("https://other-shop.test")).await;
    let err = bridge.request(rpc::CHAIN_ID, json!([])).await.unwrap_err();
    assert!(matches!(err, BridgeError::RequestTimeout { after, .. } if after == Duration::from_secs(30)));
}

/// Test: destroy detaches the in-process frame
#[tokio::test]
async fn destroy_detaches_frame() {
    let (bridge, frames) = attached(wallet_core(HOST)).await;
    assert!(frames.is_attached());
    assert_eq!(bridge.destroy(), 0);
    assert!(!frames.is_attached());
    assert!(matches!(bridge.request(rpc::CHAIN_ID, json!([])).await, Err(BridgeError::NotInitialized)));
}

/// Test: destroy while a transaction awaits approval; it can never be sent afterwards
#[tokio::test]
async fn destroy_drops_parked_transaction() {
    let config = WalletConfig::new("it").with_allowed_origins(vec![HOST.to_string()]);
    let chain = Arc::new(DevChain::new("0x1"));
    let collaborators = Collaborators { chain: chain.clone(), ..dev::collaborators(&config) };
    let core = WalletCore::new(config, collaborators, Storage::in_memory());
    let (bridge, frames) = attached(core.clone()).await;

    bridge.authenticate(AuthMethod::Passkey { username: None }).await.unwrap();
    bridge.request(wallet::ENROLL, json!([])).await.unwrap();

    let mut approvals = core.approvals().subscribe();
    let send = bridge.request(rpc::SEND_TRANSACTION, json!([{ "to": "0xdead" }]));
    tokio::pin!(send);
    let queued = tokio::select! {
        result = &mut send => panic!("settled before approval: {result:?}"),
        event = approvals.recv() => match event.unwrap() {
            ApprovalEvent::Queued(pending) => pending.id,
            other => panic!("unexpected approval event: {other:?}"),
        },
    };

    assert_eq!(bridge.destroy(), 1);
    assert!(matches!(send.await, Err(BridgeError::Destroyed)));
    assert!(!frames.is_attached());
    assert!(core.approvals().is_empty());
    assert!(!core.approvals().approve(&queued));

    tokio::task::yield_now().await;
    assert!(chain.sent().is_empty());
}
