//! Bridge and wallet configuration - passed in by the embedding page / frame.

use std::time::Duration;

use crate::core::origin::{origin_of, same_organization};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What the wallet does with a second `eth_sendTransaction` while one is
/// still waiting for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    /// Queue behind the current one; the UI sees them in arrival order.
    #[default]
    Fifo,
    /// Fail the newcomer with the busy code.
    RejectIfBusy,
}

impl ApprovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalPolicy::Fifo => "fifo",
            ApprovalPolicy::RejectIfBusy => "reject-if-busy",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fifo" | "queue" => Some(ApprovalPolicy::Fifo),
            "reject-if-busy" | "reject" | "busy" => Some(ApprovalPolicy::RejectIfBusy),
            _ => None,
        }
    }
}

/// Host-page side.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// URL the frame is pointed at. Its origin is where requests are sent.
    pub wallet_url: String,
    /// Origins whose messages are accepted. Empty means the wallet's organization.
    pub allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    pub auth_timeout: Duration,
    pub ready_timeout: Duration,
    /// Log dropped messages.
    pub debug: bool,
}

impl BridgeConfig {
    pub fn new(wallet_url: impl Into<String>) -> Self {
        Self {
            wallet_url: wallet_url.into(),
            allowed_origins: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            ready_timeout: DEFAULT_REQUEST_TIMEOUT,
            debug: false,
        }
    }
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self { self.allowed_origins = origins; self }
    pub fn with_request_timeout(mut self, t: Duration) -> Self { self.request_timeout = t; self }
    pub fn with_auth_timeout(mut self, t: Duration) -> Self { self.auth_timeout = t; self }
    pub fn with_ready_timeout(mut self, t: Duration) -> Self { self.ready_timeout = t; self }
    pub fn with_debug(mut self, debug: bool) -> Self { self.debug = debug; self }

    pub fn wallet_origin(&self) -> Option<String> {
        origin_of(&self.wallet_url)
    }

    /// Allow-list actually enforced: the configured list, or the wallet
    /// origin's domain and its subdomains.
    pub fn effective_origins(&self) -> Vec<String> {
        if !self.allowed_origins.is_empty() {
            return self.allowed_origins.clone();
        }
        self.wallet_origin().map(|o| same_organization(&o)).into_iter().collect()
    }

    pub fn from_env() -> Option<Self> {
        let url = std::env::var("VAULTFRAME_WALLET_URL").ok()?;
        let mut config = Self::new(url);
        if let Some(origins) = env_list("VAULTFRAME_ALLOWED_ORIGINS") {
            config.allowed_origins = origins;
        }
        config.debug = std::env::var("VAULTFRAME_DEBUG").map(|v| v == "1").unwrap_or(false);
        Some(config)
    }
}

/// Frame side.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub app: String,
    /// Host-page origins allowed to drive the wallet.
    pub allowed_origins: Vec<String>,
    /// Hex chain id reported by `eth_chainId`, e.g. `0x1`.
    pub chain_id: String,
    pub approval_policy: ApprovalPolicy,
    /// How long a transaction waits for a decision before it is rejected.
    pub approval_timeout: Duration,
    /// Upper bound on a session's lifetime, whatever the backend issues.
    pub session_ttl: Duration,
    pub oauth_poll_interval: Duration,
    pub oauth_timeout: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            app: "vaultframe".into(),
            allowed_origins: Vec::new(),
            chain_id: "0x1".into(),
            approval_policy: ApprovalPolicy::default(),
            approval_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_ttl: DEFAULT_SESSION_TTL,
            oauth_poll_interval: Duration::from_millis(500),
            oauth_timeout: Duration::from_secs(120),
        }
    }
}

impl WalletConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self { self.allowed_origins = origins; self }
    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self { self.chain_id = chain_id.into(); self }
    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self { self.approval_policy = policy; self }
    pub fn with_approval_timeout(mut self, t: Duration) -> Self { self.approval_timeout = t; self }
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self { self.session_ttl = ttl; self }
    pub fn with_oauth_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.oauth_poll_interval = interval;
        self.oauth_timeout = timeout;
        self
    }

    pub fn from_env(app: &str) -> Self {
        let mut config = Self::new(app);
        if let Some(origins) = env_list("VAULTFRAME_ALLOWED_ORIGINS") {
            config.allowed_origins = origins;
        }
        if let Ok(chain_id) = std::env::var("VAULTFRAME_CHAIN_ID") {
            config.chain_id = chain_id;
        }
        if let Some(policy) = std::env::var("VAULTFRAME_APPROVAL_POLICY")
            .ok()
            .and_then(|v| ApprovalPolicy::from_str(&v))
        {
            config.approval_policy = policy;
        }
        config
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Root for file-backed state: `$VAULTFRAME_ROOT`, else the platform data dir.
#[cfg(feature = "native")]
pub fn data_root() -> std::path::PathBuf {
    std::env::var("VAULTFRAME_ROOT")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from(".")))
}
