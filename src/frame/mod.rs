//! Frame transport: the postMessage channel between host page and wallet frame.
//!
//! ```text
//!   host page                                 wallet frame
//!  ┌──────────────┐   Envelope{origin,data}  ┌──────────────┐
//!  │ FrameSender  │ ───────────────────────▶ │ FrameReceiver│
//!  │ FrameReceiver│ ◀─────────────────────── │ FrameSender  │
//!  └──────────────┘                          └──────────────┘
//! ```
//!
//! The origin on an envelope is stamped by the sending port, never taken from
//! the payload, so receivers can trust it. `post` honours the target origin
//! the way `window.postMessage` does: a mismatch drops the message silently.

mod local;

pub use local::LocalFrameHost;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::BridgeMessage;

/// Target origin that matches any receiver.
pub const ANY_ORIGIN: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub origin: String,
    pub data: Value,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame channel closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct FrameSender {
    origin: String,
    peer_origin: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl FrameSender {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn peer_origin(&self) -> &str {
        &self.peer_origin
    }

    pub fn post(&self, message: &BridgeMessage, target_origin: &str) -> Result<(), FrameError> {
        self.post_raw(message.to_wire(), target_origin)
    }

    pub fn post_raw(&self, data: Value, target_origin: &str) -> Result<(), FrameError> {
        if target_origin != ANY_ORIGIN && !target_origin.eq_ignore_ascii_case(&self.peer_origin) {
            tracing::trace!(target_origin, peer = %self.peer_origin, "target origin mismatch, message dropped");
            return Ok(());
        }
        self.tx
            .send(Envelope { origin: self.origin.clone(), data })
            .map_err(|_| FrameError::Closed)
    }

    /// Another window that holds a reference to the same peer. Its messages
    /// carry its own origin.
    pub fn from_window(&self, origin: impl Into<String>) -> FrameSender {
        FrameSender { origin: origin.into(), ..self.clone() }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl FrameReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// One side of an attached frame.
#[derive(Debug)]
pub struct FramePort {
    pub sender: FrameSender,
    pub receiver: FrameReceiver,
}

/// Connected pair: `(host side, frame side)`.
pub fn channel(host_origin: &str, frame_origin: &str) -> (FramePort, FramePort) {
    let (to_frame, frame_rx) = mpsc::unbounded_channel();
    let (to_host, host_rx) = mpsc::unbounded_channel();
    let host = FramePort {
        sender: FrameSender {
            origin: host_origin.to_ascii_lowercase(),
            peer_origin: frame_origin.to_ascii_lowercase(),
            tx: to_frame,
        },
        receiver: FrameReceiver { rx: host_rx },
    };
    let frame = FramePort {
        sender: FrameSender {
            origin: frame_origin.to_ascii_lowercase(),
            peer_origin: host_origin.to_ascii_lowercase(),
            tx: to_host,
        },
        receiver: FrameReceiver { rx: frame_rx },
    };
    (host, frame)
}

/// What the host asks for when it mounts the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    pub url: String,
    pub origin: String,
    pub sandbox: Vec<String>,
    pub hidden: bool,
}

impl FrameSpec {
    pub fn wallet(url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: origin.into(),
            sandbox: ["allow-scripts", "allow-same-origin", "allow-popups", "allow-forms"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hidden: true,
        }
    }
}

/// Owns frame lifecycles for a host page.
#[async_trait]
pub trait FrameHost: Send + Sync {
    async fn attach(&self, spec: &FrameSpec) -> anyhow::Result<FramePort>;
    fn detach(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn envelopes_carry_sender_origin() {
        let (host, mut frame) = channel("https://shop.test", "https://wallet.test");
        host.sender.post_raw(json!({"x": 1}), "https://wallet.test").unwrap();
        host.sender.from_window("https://evil.test").post_raw(json!({"x": 2}), ANY_ORIGIN).unwrap();

        let first = frame.receiver.recv().await.unwrap();
        assert_eq!(first.origin, "https://shop.test");
        let second = frame.receiver.recv().await.unwrap();
        assert_eq!(second.origin, "https://evil.test");
    }

    #[tokio::test]
    async fn target_mismatch_is_dropped() {
        let (host, mut frame) = channel("https://shop.test", "https://wallet.test");
        host.sender.post_raw(json!(1), "https://other.test").unwrap();
        host.sender.post_raw(json!(2), "https://wallet.test").unwrap();
        assert_eq!(frame.receiver.recv().await.unwrap().data, json!(2));
    }

    #[tokio::test]
    async fn closed_peer_reports_error() {
        let (host, frame) = channel("https://shop.test", "https://wallet.test");
        drop(frame);
        assert_eq!(host.sender.post_raw(json!(1), ANY_ORIGIN), Err(FrameError::Closed));
    }
}
