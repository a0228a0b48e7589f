//! Session lifecycle.
//!
//! One state machine covers both ways in: a direct-grant login and the
//! completion of an OAuth redirect. They differ only in how the bearer token
//! is obtained; persistence, accessor installation and identity derivation are
//! shared.
//!
//! ```text
//!            restore (token stored)
//!   Idle ───────────────────────────▶ Restoring ──ok──▶ Authenticated
//!    ▲ ▲                                  │                  │
//!    │ └──────────────fail────────────────┘                  │ sign_out
//!    │                                                       ▼
//!    │◀──fail── Authenticating ◀── sign_in / callback     SigningOut ──▶ Idle
//!                     │
//!                     └──ok──▶ Authenticated
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use warden_client::{
    CodeExchangeRequest, DEFAULT_EXCHANGE_PATH, Error as ClientError, IdentityClaims,
    PortalClient, TokenResponse, fixed_token,
};

use crate::error::{AuthError, Result};
use crate::pkce::PkceEngine;
use crate::roles::{Capabilities, Role, RoleMapping, RoleRequests};
use crate::store::SessionStore;

/// The authenticated user, derived from identity claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub username: String,
    pub role: Role,
}

impl Identity {
    /// Build an identity from the claims endpoint's answer.
    pub fn from_claims(claims: IdentityClaims, mapping: &RoleMapping) -> Self {
        let role = mapping.derive_role(&claims.roles);
        let username = claims
            .preferred_username
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| claims.email.clone());
        Self {
            subject_id: claims.sub,
            email: claims.email,
            username,
            role,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_role(self.role)
    }
}

/// Where the session state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Restoring,
    Authenticating,
    Authenticated,
    SigningOut,
}

impl SessionState {
    /// States in which another transition must not start.
    fn is_transitioning(&self) -> bool {
        matches!(
            self,
            SessionState::Restoring | SessionState::Authenticating | SessionState::SigningOut
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Restoring => "restoring",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::SigningOut => "signing_out",
        };
        f.write_str(s)
    }
}

/// How a sign-in attempt obtains its token.
pub enum LoginAttempt {
    /// Email/password (and optional one-time code) exchanged directly.
    DirectGrant {
        email: String,
        password: String,
        otp: Option<String>,
    },
    /// Authorization code from the provider redirect, exchanged with the
    /// pending PKCE verifier.
    CallbackExchange { code: String },
}

impl fmt::Debug for LoginAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginAttempt::DirectGrant { email, otp, .. } => f
                .debug_struct("DirectGrant")
                .field("email", email)
                .field("otp", &otp.as_ref().map(|_| "<redacted>"))
                .finish_non_exhaustive(),
            LoginAttempt::CallbackExchange { .. } => {
                f.debug_struct("CallbackExchange").finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    identity: Option<Identity>,
    second_factor_hint: bool,
}

/// Orchestrates sign-in, restoration and sign-out.
pub struct SessionManager {
    client: PortalClient,
    store: SessionStore,
    pkce: Option<PkceEngine>,
    mapping: RoleMapping,
    exchange_path: String,
    inner: Arc<Mutex<Inner>>,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.client.base_url().as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager in the `Idle` state. Call [`restore`](Self::restore)
    /// to pick up a persisted session.
    pub fn new(client: PortalClient, store: SessionStore) -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            client,
            store,
            pkce: None,
            mapping: RoleMapping::default(),
            exchange_path: DEFAULT_EXCHANGE_PATH.to_string(),
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                identity: None,
                second_factor_hint: false,
            })),
            identity_tx,
        }
    }

    /// Enable the OAuth callback path.
    pub fn with_pkce(mut self, engine: PkceEngine) -> Self {
        self.pkce = Some(engine);
        self
    }

    /// Use a custom claim-to-role mapping.
    pub fn with_role_mapping(mut self, mapping: RoleMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Backend path that accepts authorization codes.
    pub fn with_exchange_path(mut self, path: impl Into<String>) -> Self {
        self.exchange_path = path.into().trim_start_matches('/').to_string();
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.inner.lock().identity.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Capabilities of the current user, if any.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.inner.lock().identity.as_ref().map(Identity::capabilities)
    }

    /// Set after a sign-in failed for lack of a one-time code.
    pub fn second_factor_hint(&self) -> bool {
        self.inner.lock().second_factor_hint
    }

    /// Watch identity changes (sign-in, restore, sign-out).
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    pub fn client(&self) -> &PortalClient {
        &self.client
    }

    pub fn pkce(&self) -> Option<&PkceEngine> {
        self.pkce.as_ref()
    }

    /// Role-request operations for the signed-in user.
    pub fn role_requests(&self) -> Result<RoleRequests> {
        let capabilities = self
            .capabilities()
            .ok_or_else(|| AuthError::Unauthorized("not signed in".to_string()))?;
        Ok(RoleRequests::new(self.client.clone(), capabilities))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Pick up a persisted session.
    ///
    /// Returns `Ok(None)` when nothing is stored. A stored token the backend
    /// no longer accepts is cleared and reported as [`AuthError::SessionExpired`].
    pub async fn restore(&self) -> Result<Option<Identity>> {
        if let Some(identity) = self.current_user() {
            return Ok(Some(identity));
        }

        let Some(token) = self.store.read_token().await? else {
            return Ok(None);
        };

        let transition = self.begin(SessionState::Restoring)?;
        self.install_token(&token);

        match self.fetch_identity(AuthError::from_claims_failure).await {
            Ok(identity) => {
                tracing::info!(email = %identity.email, role = %identity.role, "Session restored");
                transition.finish(SessionState::Authenticated, Some(identity.clone()), false);
                Ok(Some(identity))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored session rejected, clearing it");
                let cleared = self.clear_local().await;
                transition.finish(SessionState::Idle, None, false);
                cleared?;
                Err(e)
            }
        }
    }

    /// Direct-grant sign-in.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<Identity> {
        self.authenticate(LoginAttempt::DirectGrant {
            email: email.to_string(),
            password: password.to_string(),
            otp: otp.filter(|o| !o.is_empty()).map(str::to_string),
        })
        .await
    }

    /// Finish an OAuth redirect with the returned authorization code.
    pub async fn complete_callback(&self, code: &str) -> Result<Identity> {
        self.authenticate(LoginAttempt::CallbackExchange {
            code: code.to_string(),
        })
        .await
    }

    /// Run one sign-in attempt. Only one may be in flight.
    pub async fn authenticate(&self, attempt: LoginAttempt) -> Result<Identity> {
        let transition = self.begin(SessionState::Authenticating)?;
        tracing::debug!(?attempt, "Starting sign-in attempt");

        if transition.previous == SessionState::Authenticated {
            self.inner.lock().identity = None;
            self.publish(None);
            self.clear_local().await?;
        }

        match self.run_attempt(attempt).await {
            Ok(identity) => {
                tracing::info!(email = %identity.email, role = %identity.role, "Signed in");
                transition.finish(SessionState::Authenticated, Some(identity.clone()), false);
                Ok(identity)
            }
            Err(e) => {
                tracing::info!(error = %e, "Sign-in failed");
                let hint = e.needs_second_factor();
                transition.finish(SessionState::Idle, None, hint);
                Err(e)
            }
        }
    }

    /// End the session. Local state is cleared before the best-effort backend
    /// call, so neither its failure nor a cancellation leaves a token behind.
    pub async fn sign_out(&self) -> Result<()> {
        let transition = self.begin(SessionState::SigningOut)?;

        let token = self.store.read_token().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Could not read stored token for logout");
            None
        });
        let cleared = self.clear_local().await;

        // The logout call alone still carries the old bearer token.
        if let Some(token) = token {
            self.install_token(&token);
        }
        if let Err(e) = self.client.auth().logout().await {
            tracing::debug!(error = %e, "Backend logout failed, local session already cleared");
        }
        self.client.transport().set_token_accessor(None);

        transition.finish(SessionState::Idle, None, false);
        tracing::info!("Signed out");
        cleared
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn begin(&self, target: SessionState) -> Result<Transition<'_>> {
        let mut inner = self.inner.lock();
        if inner.state.is_transitioning() {
            return Err(AuthError::SessionBusy);
        }
        let previous = inner.state;
        inner.state = target;
        Ok(Transition {
            manager: self,
            previous,
            target,
            finished: false,
        })
    }

    async fn run_attempt(&self, attempt: LoginAttempt) -> Result<Identity> {
        let token = self.obtain_token(attempt).await?;
        if token.access_token.is_empty() {
            return Err(AuthError::Backend("backend issued an empty token".to_string()));
        }

        self.store.set_token(&token.access_token).await?;
        self.install_token(&token.access_token);

        match self.fetch_identity(<AuthError as From<ClientError>>::from).await {
            Ok(identity) => Ok(identity),
            Err(e) => {
                if let Err(clear_err) = self.clear_local().await {
                    tracing::warn!(error = %clear_err, "Failed to clear token after sign-in failure");
                }
                Err(e)
            }
        }
    }

    async fn obtain_token(&self, attempt: LoginAttempt) -> Result<TokenResponse> {
        match attempt {
            LoginAttempt::DirectGrant {
                email,
                password,
                otp,
            } => self
                .client
                .auth()
                .login(&email, &password, otp.as_deref())
                .await
                .map_err(AuthError::from_login_failure),
            LoginAttempt::CallbackExchange { code } => {
                let pkce = self.pkce.as_ref().ok_or_else(|| {
                    AuthError::Config("OAuth sign-in is not configured".to_string())
                })?;
                // Taken before the exchange so it cannot be replayed, whatever happens next.
                let verifier = pkce.take_verifier().await?.ok_or(AuthError::MissingVerifier)?;
                let request = CodeExchangeRequest {
                    code,
                    code_verifier: verifier,
                    redirect_uri: pkce.config().redirect_uri.clone(),
                };
                self.client
                    .auth()
                    .exchange_code(&self.exchange_path, &request)
                    .await
                    .map_err(AuthError::from_login_failure)
            }
        }
    }

    async fn fetch_identity(&self, classify: fn(ClientError) -> AuthError) -> Result<Identity> {
        let claims = self.client.auth().me().await.map_err(classify)?;
        Ok(Identity::from_claims(claims, &self.mapping))
    }

    fn install_token(&self, token: &str) {
        self.client
            .transport()
            .set_token_accessor(Some(fixed_token(token)));
    }

    async fn clear_local(&self) -> Result<()> {
        self.client.transport().set_token_accessor(None);
        self.store.clear_token().await
    }

    fn publish(&self, identity: Option<Identity>) {
        self.identity_tx.send_replace(identity);
    }
}

/// An in-progress transition. Dropping it unfinished (a cancelled future)
/// puts the machine back to `Idle`.
///
/// A cancelled sign-in or sign-out may have left a token in the store. The
/// machine then stays busy until a spawned task has cleared it, so a new
/// attempt cannot persist a token that the cleanup would remove.
struct Transition<'a> {
    manager: &'a SessionManager,
    previous: SessionState,
    target: SessionState,
    finished: bool,
}

impl Transition<'_> {
    fn finish(mut self, state: SessionState, identity: Option<Identity>, hint: bool) {
        self.finished = true;
        {
            let mut inner = self.manager.inner.lock();
            inner.state = state;
            inner.identity = identity.clone();
            inner.second_factor_hint = hint;
        }
        self.manager.publish(identity);
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let manager = self.manager;
        manager.client.transport().set_token_accessor(None);
        manager.inner.lock().identity = None;
        manager.publish(None);

        let discards_token = matches!(
            self.target,
            SessionState::Authenticating | SessionState::SigningOut
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if discards_token => {
                tracing::debug!(state = %self.target, "Transition cancelled, clearing stored token");
                let store = manager.store.clone();
                let inner = Arc::clone(&manager.inner);
                handle.spawn(async move {
                    if let Err(e) = store.clear_token().await {
                        tracing::warn!(error = %e, "Failed to clear token after cancelled transition");
                    }
                    inner.lock().state = SessionState::Idle;
                });
            }
            _ => manager.inner.lock().state = SessionState::Idle,
        }
    }
}
