//! Authentication and session management for the SOC portal.
//!
//! Sits on top of [`warden_client`] and owns everything stateful about being
//! signed in.
//!
//! # Components
//!
//! - [`pkce`]: verifier/challenge generation and identity-provider URLs
//! - [`store`]: durable token storage and the tab-scoped verifier store
//! - [`session`]: the sign-in / restore / sign-out state machine
//! - [`roles`]: claim-to-role resolution, capabilities, role requests
//! - [`poller`]: background pending-approval count for admins
//! - [`callback`]: loopback listener for the OAuth redirect
//!
//! # Example
//!
//! ```no_run
//! use warden_auth::{SessionManager, SessionStore};
//! use warden_client::PortalClient;
//!
//! # async fn example() -> warden_auth::Result<()> {
//! let client = PortalClient::builder()
//!     .base_url("https://portal.example.com")
//!     .build()?;
//! let session = SessionManager::new(client, SessionStore::memory());
//!
//! let identity = session.sign_in("analyst@example.com", "secret", None).await?;
//! println!("{} is {}", identity.email, identity.role);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod error;
pub mod pkce;
pub mod poller;
pub mod roles;
pub mod session;
pub mod store;

pub use callback::{CallbackListener, CallbackParams, callback_router, parse_callback};
pub use error::{AuthError, Result, looks_like_second_factor};
pub use pkce::{DEFAULT_SCOPE, OAuthConfig, PkceChallenge, PkceEngine, VERIFIER_LENGTH, compute_challenge};
pub use poller::{DEFAULT_POLL_INTERVAL, PendingApprovalPoller, PendingCountSource};
pub use roles::{Capabilities, DEFAULT_ROLE_PREFIX, Role, RoleMapping, RoleRequests, derive_role};
pub use session::{Identity, LoginAttempt, SessionManager, SessionState};
pub use store::{
    FileStore, KeyValueStore, MemoryStore, PKCE_VERIFIER_KEY, STORE_FILE, SessionStore,
    SharedStore, TOKEN_KEY,
};
