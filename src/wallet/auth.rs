//! Authentication state machine.
//!
//! ```text
//!                 authenticate(email|sms)
//!  Unauthenticated ─────────────────────────▶ AwaitingOtp
//!        │  ▲                                     │
//!        │  └──────────── lock() ─────────────────┤ verify_otp(ok)
//!        │ authenticate(oauth|passkey|legacy)     ▼
//!        └────────────────────────────────▶ Authenticated
//! ```
//!
//! Backends are awaited outside the lock. A new session is produced by
//! `verify` and published by `commit`, which succeeds only if the state is
//! still what it was when the step started. Anything that must happen
//! before the session becomes visible goes between the two; a failed step
//! leaves the state untouched.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::services::{AuthBackend, OAuthProvider, OAuthStatus, OtpChannel, PasskeyAuthenticator};
use super::session::Session;
use super::WalletError;
use crate::config::WalletConfig;
use crate::core::AuthMethod;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingOtp { channel: OtpChannel, destination: String },
    Authenticated(Session),
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::AwaitingOtp { .. } => "awaiting_otp",
            AuthState::Authenticated(_) => "authenticated",
        }
    }
}

/// Result of `verify`: a session not yet published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    OtpSent,
    AlreadyAuthenticated(Session),
    Verified { session: Session, start: AuthState },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    OtpSent,
    Authenticated(Session),
    /// A session already existed; nothing was asked of the backends.
    AlreadyAuthenticated(Session),
}

pub struct AuthMachine {
    state: Mutex<AuthState>,
    backend: Arc<dyn AuthBackend>,
    oauth: Arc<dyn OAuthProvider>,
    passkey: Arc<dyn PasskeyAuthenticator>,
    session_ttl: Duration,
    oauth_poll_interval: Duration,
    oauth_timeout: Duration,
}

impl AuthMachine {
    pub fn new(
        config: &WalletConfig,
        backend: Arc<dyn AuthBackend>,
        oauth: Arc<dyn OAuthProvider>,
        passkey: Arc<dyn PasskeyAuthenticator>,
    ) -> Self {
        Self {
            state: Mutex::new(AuthState::Unauthenticated),
            backend,
            oauth,
            passkey,
            session_ttl: config.session_ttl,
            oauth_poll_interval: config.oauth_poll_interval,
            oauth_timeout: config.oauth_timeout,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.lock_state().clone()
    }

    pub fn state_name(&self) -> &'static str {
        self.lock_state().name()
    }

    pub fn session(&self) -> Option<Session> {
        match &*self.lock_state() {
            AuthState::Authenticated(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Run one step and publish its session, if it produced one.
    pub async fn authenticate(&self, method: AuthMethod) -> Result<AuthOutcome, WalletError> {
        match self.verify(method).await? {
            AuthStep::OtpSent => Ok(AuthOutcome::OtpSent),
            AuthStep::AlreadyAuthenticated(session) => Ok(AuthOutcome::AlreadyAuthenticated(session)),
            AuthStep::Verified { session, start } => self.commit(session, &start).map(AuthOutcome::Authenticated),
        }
    }

    /// Talk to the backends for one step. Sending a code moves to
    /// `AwaitingOtp` directly; a new session is returned unpublished.
    pub async fn verify(&self, method: AuthMethod) -> Result<AuthStep, WalletError> {
        let start = self.state();
        if let AuthState::Authenticated(session) = &start {
            if !matches!(method, AuthMethod::Otp { .. }) {
                return Ok(AuthStep::AlreadyAuthenticated(session.clone()));
            }
        }

        let session = match method {
            AuthMethod::Email { credential } => return self.send_code(OtpChannel::Email, credential, &start).await,
            AuthMethod::Sms { credential } => return self.send_code(OtpChannel::Sms, credential, &start).await,
            AuthMethod::Otp { code } => return self.verify_code(&code).await,
            AuthMethod::Oauth { provider } => self.oauth_flow(&provider).await?,
            AuthMethod::Passkey { username } => self.passkey.authenticate(username.as_deref()).await.map_err(|e| {
                tracing::warn!("passkey ceremony failed: {e:#}");
                WalletError::AuthFailed("passkey authentication failed".into())
            })?,
            AuthMethod::Legacy { username, password } => {
                if username.trim().is_empty() || password.is_empty() {
                    return Err(WalletError::InvalidParams("username and password are required".into()));
                }
                self.backend.login(&username, &password).await.map_err(|e| {
                    tracing::debug!("legacy login rejected: {e:#}");
                    WalletError::AuthFailed("invalid username or password".into())
                })?
            }
        };
        Ok(AuthStep::Verified { session: self.bounded(session)?, start })
    }

    async fn send_code(&self, channel: OtpChannel, destination: String, start: &AuthState) -> Result<AuthStep, WalletError> {
        let destination = destination.trim().to_string();
        if destination.is_empty() {
            return Err(WalletError::InvalidParams("credential is required".into()));
        }
        self.backend.send_code(channel, &destination).await.map_err(|e| {
            tracing::warn!(?channel, "sending one-time code failed: {e:#}");
            WalletError::AuthFailed("could not send one-time code".into())
        })?;

        let mut state = self.lock_state();
        if *state != *start {
            return Err(WalletError::AuthFailed("authentication superseded".into()));
        }
        *state = AuthState::AwaitingOtp { channel, destination };
        tracing::info!(?channel, "one-time code sent");
        Ok(AuthStep::OtpSent)
    }

    /// Complete a pending email/SMS challenge and publish the session. A
    /// wrong code keeps the challenge open so the user can retry.
    pub async fn verify_otp(&self, code: &str) -> Result<Session, WalletError> {
        match self.verify_code(code).await? {
            AuthStep::Verified { session, start } => self.commit(session, &start),
            _ => Err(WalletError::Internal),
        }
    }

    async fn verify_code(&self, code: &str) -> Result<AuthStep, WalletError> {
        let start = self.state();
        let AuthState::AwaitingOtp { channel, destination } = &start else {
            return Err(WalletError::AuthFailed("no one-time code pending".into()));
        };
        let code = code.trim();
        if code.is_empty() {
            return Err(WalletError::InvalidParams("code is required".into()));
        }
        let session = self.backend.verify_code(*channel, destination, code).await.map_err(|e| {
            tracing::debug!("one-time code rejected: {e:#}");
            WalletError::AuthFailed("invalid or expired code".into())
        })?;
        Ok(AuthStep::Verified { session: self.bounded(session)?, start })
    }

    async fn oauth_flow(&self, provider: &str) -> Result<Session, WalletError> {
        if provider.trim().is_empty() {
            return Err(WalletError::InvalidParams("provider is required".into()));
        }
        let handle = self.oauth.open(provider).await.map_err(|e| {
            tracing::warn!(provider, "oauth popup failed to open: {e:#}");
            WalletError::AuthFailed("could not open OAuth window".into())
        })?;

        let poll = async {
            loop {
                match self.oauth.poll(&handle).await {
                    Ok(OAuthStatus::Pending) => tokio::time::sleep(self.oauth_poll_interval).await,
                    Ok(OAuthStatus::Complete(session)) => return Ok(session),
                    Ok(OAuthStatus::Closed) => return Err(WalletError::AuthFailed("OAuth window closed".into())),
                    Err(e) => {
                        tracing::warn!(provider, "oauth poll failed: {e:#}");
                        return Err(WalletError::AuthFailed("OAuth failed".into()));
                    }
                }
            }
        };
        tokio::time::timeout(self.oauth_timeout, poll)
            .await
            .map_err(|_| WalletError::AuthFailed("OAuth timed out".into()))?
    }

    /// Cap the expiry at `session_ttl` from now; refuse a dead session.
    fn bounded(&self, mut session: Session) -> Result<Session, WalletError> {
        let cap = Utc::now() + ChronoDuration::from_std(self.session_ttl).unwrap_or_else(|_| ChronoDuration::hours(24));
        if session.expires_at > cap {
            session.expires_at = cap;
        }
        if session.is_expired() {
            return Err(WalletError::AuthFailed("backend issued an expired session".into()));
        }
        Ok(session)
    }

    /// Whether the state is still `start`.
    pub fn is_current(&self, start: &AuthState) -> bool {
        *self.lock_state() == *start
    }

    /// Publish a verified session, unless the state moved since `start`.
    pub fn commit(&self, session: Session, start: &AuthState) -> Result<Session, WalletError> {
        let mut state = self.lock_state();
        if *state != *start {
            return Err(WalletError::AuthFailed("authentication superseded".into()));
        }
        *state = AuthState::Authenticated(session.clone());
        tracing::info!(user = %session.user_id, method = %session.auth_method, "authenticated");
        Ok(session)
    }

    /// Reinstate a persisted session. Only valid from `Unauthenticated`.
    pub fn restore(&self, session: Session) -> bool {
        let mut state = self.lock_state();
        if *state != AuthState::Unauthenticated || session.is_expired() {
            return false;
        }
        *state = AuthState::Authenticated(session);
        true
    }

    /// Apply `f` to the live session, if any, and return the updated copy.
    pub fn update_session(&self, f: impl FnOnce(&mut Session)) -> Option<Session> {
        match &mut *self.lock_state() {
            AuthState::Authenticated(session) => {
                f(session);
                Some(session.clone())
            }
            _ => None,
        }
    }

    /// Back to `Unauthenticated` from any state. Returns the previous state.
    pub fn lock(&self) -> AuthState {
        std::mem::replace(&mut *self.lock_state(), AuthState::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::{DevAuthBackend, DevOAuth, DevPasskey, DEV_OTP_CODE};

    fn machine(backend: Arc<DevAuthBackend>, oauth: DevOAuth) -> AuthMachine {
        let config = WalletConfig::default().with_oauth_polling(Duration::from_millis(10), Duration::from_secs(1));
        AuthMachine::new(&config, backend, Arc::new(oauth), Arc::new(DevPasskey::new(Duration::from_secs(60))))
    }

    #[tokio::test]
    async fn email_then_otp() {
        let auth = machine(Arc::new(DevAuthBackend::new(Duration::from_secs(60))), DevOAuth::completing(0));
        let outcome = auth.authenticate(AuthMethod::Email { credential: "a@b.com".into() }).await.unwrap();
        assert_eq!(outcome, AuthOutcome::OtpSent);
        assert_eq!(auth.state_name(), "awaiting_otp");

        let err = auth.verify_otp("000000").await.unwrap_err();
        assert!(matches!(err, WalletError::AuthFailed(_)));
        assert_eq!(auth.state_name(), "awaiting_otp");
        assert!(auth.session().is_none());

        let session = auth.verify_otp(DEV_OTP_CODE).await.unwrap();
        assert_eq!(session.auth_method, "email");
        assert_eq!(auth.session(), Some(session));
    }

    #[tokio::test]
    async fn otp_without_challenge_fails() {
        let auth = machine(Arc::new(DevAuthBackend::new(Duration::from_secs(60))), DevOAuth::completing(0));
        assert!(auth.verify_otp(DEV_OTP_CODE).await.is_err());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn legacy_login_and_lock() {
        let backend = Arc::new(DevAuthBackend::new(Duration::from_secs(60)).with_user("alice", "hunter2"));
        let auth = machine(backend, DevOAuth::completing(0));

        let bad = auth
            .authenticate(AuthMethod::Legacy { username: "alice".into(), password: "nope".into() })
            .await;
        assert!(bad.is_err());
        assert_eq!(auth.state(), AuthState::Unauthenticated);

        let ok = auth
            .authenticate(AuthMethod::Legacy { username: "alice".into(), password: "hunter2".into() })
            .await
            .unwrap();
        assert!(matches!(ok, AuthOutcome::Authenticated(_)));
        assert!(matches!(auth.lock(), AuthState::Authenticated(_)));
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn oauth_polls_until_complete_or_closed() {
        let auth = machine(Arc::new(DevAuthBackend::new(Duration::from_secs(60))), DevOAuth::completing(3));
        let outcome = auth.authenticate(AuthMethod::Oauth { provider: "google".into() }).await.unwrap();
        assert!(matches!(outcome, AuthOutcome::Authenticated(ref s) if s.auth_method == "oauth"));

        let auth = machine(Arc::new(DevAuthBackend::new(Duration::from_secs(60))), DevOAuth::closing(1));
        assert!(auth.authenticate(AuthMethod::Oauth { provider: "google".into() }).await.is_err());
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn session_ttl_caps_backend_expiry() {
        let backend = Arc::new(DevAuthBackend::new(Duration::from_secs(7 * 24 * 3600)).with_user("bob", "pw"));
        let config = WalletConfig::default().with_session_ttl(Duration::from_secs(60));
        let auth = AuthMachine::new(
            &config,
            backend,
            Arc::new(DevOAuth::completing(0)),
            Arc::new(DevPasskey::new(Duration::from_secs(60))),
        );
        auth.authenticate(AuthMethod::Legacy { username: "bob".into(), password: "pw".into() })
            .await
            .unwrap();
        let session = auth.session().unwrap();
        assert!(session.expires_at <= Utc::now() + ChronoDuration::seconds(61));
    }
}
