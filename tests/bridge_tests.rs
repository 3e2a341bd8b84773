//! Host Bridge tests against a scripted wallet frame
//!
//! These tests verify:
//! 1. Request/response correlation by id
//! 2. Request, auth and READY timeouts (paused clock)
//! 3. Unknown ids, late replies and foreign origins are ignored
//! 4. destroy() fails every pending call before returning
//! 5. Wallet events drive WalletState and reach isolated listeners

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vaultframe::frame::{channel, FrameHost, FramePort, FrameSpec, ANY_ORIGIN};
use vaultframe::{codes, AuthMethod, BridgeConfig, BridgeError, BridgeMessage, HostBridge, RpcError, WalletState};

const HOST: &str = "https://shop.test";
const WALLET_URL: &str = "https://wallet.acme.io/embed";
const WALLET: &str = "https://wallet.acme.io";

/// Frame host whose wallet side is driven by the test.
struct ScriptedFrames {
    host: Mutex<Option<FramePort>>,
    detached: AtomicUsize,
}

#[async_trait]
impl FrameHost for ScriptedFrames {
    async fn attach(&self, spec: &FrameSpec) -> anyhow::Result<FramePort> {
        assert_eq!(spec.origin, WALLET);
        assert!(spec.hidden);
        self.host
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("already attached"))
    }

    fn detach(&self) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

fn scripted() -> (Arc<ScriptedFrames>, FramePort) {
    let (host, frame) = channel(HOST, WALLET);
    let frames = Arc::new(ScriptedFrames { host: Mutex::new(Some(host)), detached: AtomicUsize::new(0) });
    (frames, frame)
}

fn post(frame: &FramePort, message: BridgeMessage) {
    frame.sender.post(&message, HOST).unwrap();
}

async fn ready_bridge() -> (Arc<HostBridge>, FramePort, Arc<ScriptedFrames>) {
    let (frames, frame) = scripted();
    post(&frame, BridgeMessage::Ready { id: "ready-1".into() });
    let bridge = HostBridge::new(BridgeConfig::new(WALLET_URL), frames.clone()).unwrap();
    bridge.initialize().await.unwrap();
    (Arc::new(bridge), frame, frames)
}

/// Next message the host sent, parsed.
async fn next_sent(frame: &mut FramePort) -> BridgeMessage {
    let envelope = frame.receiver.recv().await.expect("host message");
    assert_eq!(envelope.origin, HOST);
    BridgeMessage::from_wire(envelope.data).unwrap()
}

/// Test: request resolves with the result of the matching WALLET_RESPONSE
#[tokio::test]
async fn request_resolves_with_matching_response() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.request("eth_accounts", json!([])).await });

    let BridgeMessage::WalletRequest { id, method, params } = next_sent(&mut frame).await else {
        panic!("expected WALLET_REQUEST");
    };
    assert_eq!(method, "eth_accounts");
    assert_eq!(params, json!([]));
    assert_eq!(bridge.pending_ids(), vec![id.clone()]);

    post(&frame, BridgeMessage::response(id, json!(["0xabc"])));
    assert_eq!(call.await.unwrap().unwrap(), json!(["0xabc"]));
    assert_eq!(bridge.pending_count(), 0);
}

/// Test: WALLET_ERROR fails the call with the remote code
#[tokio::test]
async fn wallet_error_surfaces_code() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.request("eth_sendTransaction", json!([{"to": "0x1"}])).await });
    let id = next_sent(&mut frame).await.id().to_string();
    post(&frame, BridgeMessage::error(id, RpcError::new(codes::USER_REJECTED, "User rejected")));

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.code(), Some(codes::USER_REJECTED));
}

/// Test: concurrent requests are correlated independently, out of order
#[tokio::test]
async fn concurrent_requests_resolve_out_of_order() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let (b1, b2) = (bridge.clone(), bridge.clone());
    let first = tokio::spawn(async move { b1.request("eth_chainId", json!([])).await });
    let first_id = next_sent(&mut frame).await.id().to_string();
    let second = tokio::spawn(async move { b2.request("eth_accounts", json!([])).await });
    let second_id = next_sent(&mut frame).await.id().to_string();
    assert_ne!(first_id, second_id);

    post(&frame, BridgeMessage::response(second_id, json!(["0x2"])));
    post(&frame, BridgeMessage::response(first_id, json!("0x1")));
    assert_eq!(first.await.unwrap().unwrap(), json!("0x1"));
    assert_eq!(second.await.unwrap().unwrap(), json!(["0x2"]));
}

/// Test: no reply within 30s fails with a timeout and clears the entry; a late reply is ignored
#[tokio::test(start_paused = true)]
async fn request_times_out_after_thirty_seconds() {
    let (bridge, mut frame, _) = ready_bridge().await;
    let started = tokio::time::Instant::now();

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.request("eth_accounts", json!([])).await });
    let id = next_sent(&mut frame).await.id().to_string();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::RequestTimeout { ref method, after } if method == "eth_accounts" && after == Duration::from_secs(30)));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(bridge.pending_count(), 0);

    // Late reply: no entry, no effect.
    post(&frame, BridgeMessage::response(id, json!(["0xlate"])));
    tokio::task::yield_now().await;
    assert_eq!(bridge.pending_count(), 0);
}

/// Test: authentication uses the 60s timeout
#[tokio::test(start_paused = true)]
async fn authenticate_times_out_after_sixty_seconds() {
    let (bridge, mut frame, _) = ready_bridge().await;
    let started = tokio::time::Instant::now();

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.authenticate(AuthMethod::Email { credential: "a@b.com".into() }).await });
    let BridgeMessage::AuthRequest { params, .. } = next_sent(&mut frame).await else {
        panic!("expected AUTH_REQUEST");
    };
    assert_eq!(params, json!({"type": "email", "credential": "a@b.com"}));

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::AuthTimeout(d) if d == Duration::from_secs(60)));
    assert!(started.elapsed() >= Duration::from_secs(60));
}

/// Test: initialize gives up when READY never arrives and detaches the frame
#[tokio::test(start_paused = true)]
async fn initialize_times_out_without_ready() {
    let (frames, _frame) = scripted();
    let bridge = HostBridge::new(BridgeConfig::new(WALLET_URL), frames.clone()).unwrap();
    let err = bridge.initialize().await.unwrap_err();
    assert!(matches!(err, BridgeError::ReadyTimeout(_)));
    assert!(!bridge.is_ready());
    assert_eq!(frames.detached.load(Ordering::SeqCst), 1);
}

/// Test: calls before initialize fail immediately
#[tokio::test]
async fn request_before_initialize_fails() {
    let (frames, _frame) = scripted();
    let bridge = HostBridge::new(BridgeConfig::new(WALLET_URL), frames).unwrap();
    assert!(matches!(bridge.request("eth_accounts", json!([])).await, Err(BridgeError::NotInitialized)));
    assert_eq!(bridge.pending_count(), 0);
}

/// Test: a response with an unknown id is a no-op
#[tokio::test]
async fn unknown_id_is_ignored() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.request("eth_chainId", json!([])).await });
    let id = next_sent(&mut frame).await.id().to_string();

    post(&frame, BridgeMessage::response("not-a-request", json!("0xbad")));
    post(&frame, BridgeMessage::error("also-unknown", RpcError::new(codes::INTERNAL_ERROR, "x")));
    post(&frame, BridgeMessage::response(id, json!("0x1")));
    assert_eq!(call.await.unwrap().unwrap(), json!("0x1"));
}

/// Test: messages from origins outside the allow-list never settle anything
#[tokio::test]
async fn foreign_origin_is_dropped() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.request("eth_accounts", json!([])).await });
    let id = next_sent(&mut frame).await.id().to_string();

    let evil = frame.sender.from_window("https://evil.test");
    evil.post(&BridgeMessage::response(id.clone(), json!(["0xevil"])), ANY_ORIGIN).unwrap();
    evil.post(&BridgeMessage::event("e1", "accountsChanged", json!(["0xevil"])), ANY_ORIGIN).unwrap();
    // Subdomain of the wallet's organization is accepted by default.
    let sibling = frame.sender.from_window("https://cdn.acme.io");
    sibling.post(&BridgeMessage::response(id, json!(["0xgood"])), ANY_ORIGIN).unwrap();

    assert_eq!(call.await.unwrap().unwrap(), json!(["0xgood"]));
    assert_eq!(bridge.state().address, None);
}

/// Test: destroy() with N pending requests fails all N before returning
#[tokio::test]
async fn destroy_fails_all_pending() {
    let (bridge, mut frame, frames) = ready_bridge().await;

    let mut calls = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let b = bridge.clone();
        calls.push(tokio::spawn(async move { b.request("eth_accounts", json!([])).await }));
        ids.push(next_sent(&mut frame).await.id().to_string());
    }
    assert_eq!(bridge.pending_count(), 3);

    assert_eq!(bridge.destroy(), 3);
    assert_eq!(bridge.pending_count(), 0);
    for call in calls {
        assert!(matches!(call.await.unwrap(), Err(BridgeError::Destroyed)));
    }
    assert_eq!(frames.detached.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.state(), WalletState::default());

    // Responses after destroy are ignored.
    for id in ids {
        let _ = frame.sender.post(&BridgeMessage::response(id, json!([])), HOST);
    }
    assert_eq!(bridge.pending_count(), 0);
}

/// Test: PING/PONG round trip
#[tokio::test]
async fn ping_round_trip() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let b = bridge.clone();
    let call = tokio::spawn(async move { b.ping().await });
    let BridgeMessage::Ping { id } = next_sent(&mut frame).await else {
        panic!("expected PING");
    };
    post(&frame, BridgeMessage::Pong { id });
    assert!(call.await.unwrap().is_ok());
}

/// Test: wallet events update state and reach listeners; a panicking listener is isolated
#[tokio::test]
async fn events_update_state_and_listeners() {
    let (bridge, mut frame, _) = ready_bridge().await;

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    bridge.on("accountsChanged", |_| panic!("listener bug"));
    bridge.on("accountsChanged", move |data| s.lock().unwrap().push(data.clone()));

    post(&frame, BridgeMessage::event("e1", "connect", json!({"chainId": "0x1"})));
    post(&frame, BridgeMessage::event("e2", "accountsChanged", json!(["0xabc"])));

    // Round-trip a ping so both events have been processed.
    let b = bridge.clone();
    let call = tokio::spawn(async move { b.ping().await });
    let id = next_sent(&mut frame).await.id().to_string();
    post(&frame, BridgeMessage::Pong { id });
    call.await.unwrap().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!(["0xabc"])]);
    let state = bridge.state();
    assert!(state.connected);
    assert_eq!(state.address.as_deref(), Some("0xabc"));
    assert_eq!(state.chain_id.as_deref(), Some("0x1"));
}

/// Test: disconnect is fire-and-forget, clears state and emits locally
#[tokio::test]
async fn disconnect_clears_state() {
    let (bridge, mut frame, _) = ready_bridge().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    bridge.on("disconnect", move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    bridge.disconnect();
    assert!(matches!(next_sent(&mut frame).await, BridgeMessage::DisconnectWallet { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.state(), WalletState::default());
}

/// Test: two bridges keep separate pending maps
#[tokio::test]
async fn bridges_are_independent() {
    let (one, mut frame_one, _) = ready_bridge().await;
    let (two, _frame_two, _) = ready_bridge().await;

    let b = one.clone();
    let call = tokio::spawn(async move { b.request("eth_chainId", json!([])).await });
    let id = next_sent(&mut frame_one).await.id().to_string();
    assert_eq!(one.pending_count(), 1);
    assert_eq!(two.pending_count(), 0);

    assert_eq!(two.destroy(), 0);
    post(&frame_one, BridgeMessage::response(id, json!("0x5")));
    assert_eq!(call.await.unwrap().unwrap(), json!("0x5"));
}
