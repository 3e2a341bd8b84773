//! Vaultframe: an embeddable wallet that lives in an isolated frame.
//!
//! # Architecture
//!
//! ```text
//! host page                                      wallet frame
//! ┌────────────────────────┐   BridgeMessage   ┌─────────────────────────────┐
//! │ HostBridge             │ ◀───────────────▶ │ WalletCore                  │
//! │  ├── pending {id}      │   (postMessage,   │  ├── AuthMachine            │
//! │  ├── EventEmitter      │    origin-checked │  ├── ApprovalQueue          │
//! │  └── WalletState       │    both ways)     │  ├── ShardSigner            │
//! └────────────────────────┘                   │  └── ShardStore (AES-GCM)   │
//!                                              └─────────────────────────────┘
//! ```
//!
//! The host page never sees keys, tokens or shards. It gets RPC results,
//! wallet events and stable error codes.
//!
//! # Modules
//!
//! | Module | Side | Description |
//! |--------|------|-------------|
//! | `core` | both | Wire protocol, method names, origin policy |
//! | `frame` | both | Frame transport and frame hosts |
//! | `bridge` | host | Request correlation, timeouts, events |
//! | `wallet` | frame | Auth state machine, RPC dispatch, signing, approvals |
//! | `vault` | frame | Encrypted shard store |
//! | `dev` | frame | In-memory collaborators for demos and tests |
//!
//! # Features
//!
//! - `native` - File-backed storage, log subscriber, CLI (default)
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use vaultframe::{BridgeConfig, HostBridge, LocalFrameHost, Storage, WalletConfig, WalletCore, AuthMethod};
//!
//! let wallet = WalletConfig::new("shop").with_allowed_origins(vec!["https://shop.example".into()]);
//! let core = WalletCore::new(wallet.clone(), vaultframe::dev::collaborators(&wallet), Storage::in_memory());
//! let frames = Arc::new(LocalFrameHost::new("https://shop.example", core));
//!
//! let bridge = HostBridge::new(BridgeConfig::new("https://wallet.example/embed"), frames)?;
//! bridge.initialize().await?;
//! bridge.authenticate(AuthMethod::Email { credential: "a@b.com".into() }).await?;
//! bridge.verify_otp("123456").await?;
//! let accounts = bridge.connect(None).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod core;
pub mod dev;
pub mod frame;
pub mod vault;
pub mod wallet;

#[cfg(feature = "native")]
pub mod logging;

pub use bridge::{BridgeError, EventEmitter, HostBridge, ListenerId, WalletState};
pub use config::{ApprovalPolicy, BridgeConfig, WalletConfig};
pub use core::{codes, AuthMethod, BridgeMessage, MessageType, OriginPolicy, ProtocolError, RpcError};
pub use frame::{FrameHost, FramePort, FrameSpec, LocalFrameHost};
pub use vault::{ShardStore, VaultError};
pub use wallet::{Collaborators, Session, Storage, WalletCore, WalletError};
