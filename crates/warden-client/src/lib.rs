//! HTTP client for the SOC portal backend.
//!
//! Every request is signed by a shared [`CredentialTransport`]: a bearer token
//! when a session is active, otherwise the CSRF nonce for mutating calls.
//!
//! # Example
//!
//! ```no_run
//! use warden_client::{PortalClient, Result, fixed_token};
//!
//! # async fn example() -> Result<()> {
//! let client = PortalClient::builder()
//!     .base_url("http://localhost:8000")
//!     .build()?;
//!
//! let token = client.auth().login("a@x.com", "pw", None).await?;
//! client
//!     .transport()
//!     .set_token_accessor(Some(fixed_token(token.access_token)));
//!
//! let me = client.auth().me().await?;
//! println!("{} has roles {:?}", me.email, me.roles);
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Auth**: direct-grant login, PKCE code exchange, identity claims, logout
//! - **Roles**: submit, list, approve, reject and count role requests

pub mod api;
pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use api::{AuthApi, DEFAULT_EXCHANGE_PATH, ListRoleRequestsQuery, RolesApi};
pub use client::{ClientBuilder, PortalClient};
pub use error::{Error, GENERIC_NETWORK_MESSAGE, Result};
pub use transport::{
    CSRF_COOKIE, CSRF_HEADER, CookieSource, CredentialTransport, TokenAccessor, fixed_token,
    is_state_mutating,
};
pub use types::*;
