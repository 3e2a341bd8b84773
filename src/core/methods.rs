//! RPC method and event names
//!
//! Centralized registry for everything that crosses the bridge by name.

/// Standard provider methods
pub mod rpc {
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const SIGN: &str = "eth_sign";
    pub const PERSONAL_SIGN: &str = "personal_sign";
    pub const SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";
    pub const GET_BALANCE: &str = "eth_getBalance";

    pub const ALL: &[&str] = &[
        ACCOUNTS, REQUEST_ACCOUNTS, CHAIN_ID, SEND_TRANSACTION, SIGN, PERSONAL_SIGN, SIGN_TYPED_DATA_V4, GET_BALANCE,
    ];
}

/// Product methods
pub mod wallet {
    pub const GET_USERNAME: &str = "wallet_getUsername";
    pub const GET_SESSION: &str = "wallet_getSession";
    pub const ENROLL: &str = "wallet_enroll";
    pub const LOCK: &str = "wallet_lock";

    pub const ALL: &[&str] = &[GET_USERNAME, GET_SESSION, ENROLL, LOCK];
}

/// `WALLET_EVENT` names
pub mod events {
    pub const READY: &str = "ready";
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
    pub const CHAIN_CHANGED: &str = "chainChanged";
    pub const AUTHENTICATED: &str = "authenticated";
    pub const LOCKED: &str = "locked";
}

/// Shard store record ids and types
pub mod records {
    pub const DEVICE_SHARD: &str = "device-shard";
    pub const SHARD_TYPE: &str = "key-shard";
    pub const SESSION_KEY: &str = "vaultframe.session";
}
