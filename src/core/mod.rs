//! Shared protocol pieces used on both sides of the frame boundary.

pub mod methods;
pub mod origin;
pub mod protocol;

pub use origin::OriginPolicy;
pub use protocol::{codes, AuthMethod, BridgeMessage, MessageType, ProtocolError, RpcError};
