//! Bridge wire protocol.
//!
//! Every postMessage payload is one JSON `BridgeMessage`, discriminated by
//! `type`. Payloads are validated here before either side acts on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stable numeric error codes carried in `WALLET_ERROR`.
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const AUTH_FAILED: i64 = 4101;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const BUSY: i64 = -32002;
    pub const STORAGE_FAILURE: i64 = -32010;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

const MAX_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// How a user proves who they are. Sent as `AUTH_REQUEST` params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthMethod {
    Email { credential: String },
    Sms { credential: String },
    Oauth { provider: String },
    Passkey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    Legacy { username: String, password: String },
    /// Completes a pending email/SMS challenge.
    Otp { code: String },
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Email { .. } => "email",
            AuthMethod::Sms { .. } => "sms",
            AuthMethod::Oauth { .. } => "oauth",
            AuthMethod::Passkey { .. } => "passkey",
            AuthMethod::Legacy { .. } => "legacy",
            AuthMethod::Otp { .. } => "otp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    WalletRequest {
        id: String,
        method: String,
        #[serde(default)]
        params: Value,
    },
    WalletResponse {
        id: String,
        #[serde(default)]
        result: Value,
    },
    WalletEvent {
        id: String,
        event: String,
        #[serde(default)]
        data: Value,
    },
    WalletError {
        id: String,
        error: RpcError,
    },
    ConnectWallet {
        id: String,
    },
    DisconnectWallet {
        id: String,
    },
    AuthRequest {
        id: String,
        #[serde(default)]
        params: Value,
    },
    Ready {
        id: String,
    },
    Ping {
        id: String,
    },
    Pong {
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    WalletRequest,
    WalletResponse,
    WalletEvent,
    WalletError,
    ConnectWallet,
    DisconnectWallet,
    AuthRequest,
    Ready,
    Ping,
    Pong,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::WalletRequest => "WALLET_REQUEST",
            MessageType::WalletResponse => "WALLET_RESPONSE",
            MessageType::WalletEvent => "WALLET_EVENT",
            MessageType::WalletError => "WALLET_ERROR",
            MessageType::ConnectWallet => "CONNECT_WALLET",
            MessageType::DisconnectWallet => "DISCONNECT_WALLET",
            MessageType::AuthRequest => "AUTH_REQUEST",
            MessageType::Ready => "READY",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed bridge message: {0}")]
    Malformed(String),
    #[error("invalid correlation id")]
    InvalidId,
    #[error("empty method name")]
    EmptyMethod,
}

impl BridgeMessage {
    /// Parse and validate an untrusted payload.
    pub fn from_wire(value: Value) -> Result<Self, ProtocolError> {
        let message: BridgeMessage =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let id = message.id();
        if id.is_empty() || id.len() > MAX_ID_LEN || id.chars().any(char::is_control) {
            return Err(ProtocolError::InvalidId);
        }
        match &message {
            BridgeMessage::WalletRequest { method, .. } | BridgeMessage::WalletEvent { event: method, .. }
                if method.trim().is_empty() =>
            {
                Err(ProtocolError::EmptyMethod)
            }
            _ => Ok(message),
        }
    }

    pub fn to_wire(&self) -> Value {
        // Every variant is plain data with string keys; this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn id(&self) -> &str {
        match self {
            BridgeMessage::WalletRequest { id, .. }
            | BridgeMessage::WalletResponse { id, .. }
            | BridgeMessage::WalletEvent { id, .. }
            | BridgeMessage::WalletError { id, .. }
            | BridgeMessage::ConnectWallet { id }
            | BridgeMessage::DisconnectWallet { id }
            | BridgeMessage::AuthRequest { id, .. }
            | BridgeMessage::Ready { id }
            | BridgeMessage::Ping { id }
            | BridgeMessage::Pong { id } => id,
        }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            BridgeMessage::WalletRequest { .. } => MessageType::WalletRequest,
            BridgeMessage::WalletResponse { .. } => MessageType::WalletResponse,
            BridgeMessage::WalletEvent { .. } => MessageType::WalletEvent,
            BridgeMessage::WalletError { .. } => MessageType::WalletError,
            BridgeMessage::ConnectWallet { .. } => MessageType::ConnectWallet,
            BridgeMessage::DisconnectWallet { .. } => MessageType::DisconnectWallet,
            BridgeMessage::AuthRequest { .. } => MessageType::AuthRequest,
            BridgeMessage::Ready { .. } => MessageType::Ready,
            BridgeMessage::Ping { .. } => MessageType::Ping,
            BridgeMessage::Pong { .. } => MessageType::Pong,
        }
    }

    pub fn response(id: impl Into<String>, result: Value) -> Self {
        BridgeMessage::WalletResponse { id: id.into(), result }
    }

    pub fn error(id: impl Into<String>, error: RpcError) -> Self {
        BridgeMessage::WalletError { id: id.into(), error }
    }

    pub fn event(id: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        BridgeMessage::WalletEvent { id: id.into(), event: event.into(), data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_uses_screaming_type_tag() {
        let msg = BridgeMessage::WalletRequest {
            id: "r1".into(),
            method: "eth_accounts".into(),
            params: json!([]),
        };
        assert_eq!(
            msg.to_wire(),
            json!({"type": "WALLET_REQUEST", "id": "r1", "method": "eth_accounts", "params": []})
        );

        let err = BridgeMessage::error("r2", RpcError::new(codes::USER_REJECTED, "User rejected"));
        assert_eq!(
            err.to_wire(),
            json!({"type": "WALLET_ERROR", "id": "r2", "error": {"code": 4001, "message": "User rejected"}})
        );
    }

    #[test]
    fn parses_response_with_result() {
        let msg = BridgeMessage::from_wire(json!({"type": "WALLET_RESPONSE", "id": "r1", "result": ["0xabc"]})).unwrap();
        assert_eq!(msg, BridgeMessage::response("r1", json!(["0xabc"])));
        assert_eq!(msg.kind(), MessageType::WalletResponse);
    }

    #[test]
    fn rejects_unknown_type_and_bad_ids() {
        assert!(matches!(
            BridgeMessage::from_wire(json!({"type": "EVAL", "id": "x"})),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            BridgeMessage::from_wire(json!({"type": "PING"})),
            Err(ProtocolError::Malformed(_))
        ));
        assert_eq!(
            BridgeMessage::from_wire(json!({"type": "PING", "id": ""})),
            Err(ProtocolError::InvalidId)
        );
        assert_eq!(
            BridgeMessage::from_wire(json!({"type": "PING", "id": "a".repeat(200)})),
            Err(ProtocolError::InvalidId)
        );
        assert_eq!(
            BridgeMessage::from_wire(json!({"type": "WALLET_REQUEST", "id": "r", "method": " "})),
            Err(ProtocolError::EmptyMethod)
        );
        assert!(BridgeMessage::from_wire(json!("READY")).is_err());
    }

    #[test]
    fn auth_method_tagged_by_type() {
        let method: AuthMethod = serde_json::from_value(json!({"type": "email", "credential": "a@b.com"})).unwrap();
        assert_eq!(method, AuthMethod::Email { credential: "a@b.com".into() });
        assert_eq!(
            serde_json::to_value(AuthMethod::Passkey { username: None }).unwrap(),
            json!({"type": "passkey"})
        );
    }
}
