//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! data_dir = "/var/lib/warden"
//!
//! [backend]
//! base_url = "https://portal.example.com/"
//! timeout_secs = 30
//! exchange_path = "auth/kc/exchange"
//!
//! [identity_provider]
//! base_url = "https://sso.example.com"
//! realm = "soc"
//! client_id = "soc-portal"
//! redirect_uri = "http://127.0.0.1:8765/callback"
//! scope = "openid profile email"
//!
//! [roles]
//! strip_prefixes = ["soc_"]
//! aliases = { "soc-lead" = "manager" }
//!
//! [poller]
//! interval_secs = 20
//! ```
//!
//! Every field is optional so that partial layers can be merged; the
//! accessor methods apply defaults and validate what a given command needs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Application name used for config and data directories.
pub const APP_NAME: &str = "warden";

/// HTTP timeout when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Pending-approval poll interval when none is configured.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;

/// Redirect target served by the local callback listener.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";

/// Scopes requested from the identity provider by default.
pub const DEFAULT_SCOPE: &str = "openid profile email";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Where the session file and logs live.
    pub data_dir: Option<PathBuf>,
    pub backend: Option<BackendConfig>,
    pub identity_provider: Option<IdentityProviderConfig>,
    pub roles: Option<RolesConfig>,
    pub poller: Option<PollerConfig>,
}

impl WardenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Overlay `other` on top of `self`, field by field.
    pub fn merge(&mut self, other: WardenConfig) {
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        merge_section(&mut self.backend, other.backend, BackendConfig::merge);
        merge_section(
            &mut self.identity_provider,
            other.identity_provider,
            IdentityProviderConfig::merge,
        );
        merge_section(&mut self.roles, other.roles, RolesConfig::merge);
        merge_section(&mut self.poller, other.poller, PollerConfig::merge);
    }

    fn backend_mut(&mut self) -> &mut BackendConfig {
        self.backend.get_or_insert_with(BackendConfig::default)
    }

    fn identity_provider_mut(&mut self) -> &mut IdentityProviderConfig {
        self.identity_provider
            .get_or_insert_with(IdentityProviderConfig::default)
    }

    /// Override the backend URL (used for `--server`).
    pub fn set_backend_url(&mut self, url: impl Into<String>) {
        self.backend_mut().base_url = Some(url.into());
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_API_BASE) {
            self.backend_mut().base_url = Some(v);
        }
        if let Some(v) = get(ENV_KC_BASE_URL) {
            self.identity_provider_mut().base_url = Some(v);
        }
        if let Some(v) = get(ENV_KC_REALM) {
            self.identity_provider_mut().realm = Some(v);
        }
        if let Some(v) = get(ENV_KC_CLIENT_ID) {
            self.identity_provider_mut().client_id = Some(v);
        }
        if let Some(v) = get(ENV_KC_REDIRECT) {
            self.identity_provider_mut().redirect_uri = Some(v);
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    // ── Resolved accessors ──────────────────────────────────────────────────

    /// Validated backend base URL.
    pub fn backend_url(&self) -> Result<Url> {
        let raw = self
            .backend
            .as_ref()
            .and_then(|b| b.base_url.as_deref())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::missing("backend.base_url", Some(ENV_API_BASE)))?;
        Url::parse(raw.trim()).map_err(|e| ConfigError::invalid("backend.base_url", e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.backend
                .as_ref()
                .and_then(|b| b.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Backend path for authorization-code exchange, if overridden.
    pub fn exchange_path(&self) -> Option<&str> {
        self.backend
            .as_ref()
            .and_then(|b| b.exchange_path.as_deref())
            .filter(|p| !p.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        let secs = self
            .poller
            .as_ref()
            .and_then(|p| p.interval_secs)
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Data directory, defaulting to the platform data dir.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .ok_or_else(|| ConfigError::missing("data_dir", None))
    }

    /// Identity-provider settings needed for the browser flow.
    pub fn identity_provider(&self) -> Result<ResolvedIdentityProvider> {
        let idp = self.identity_provider.clone().unwrap_or_default();
        let require = |value: Option<String>, field: &str, env: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::missing(field, Some(env)))
        };

        let base_url = require(idp.base_url, "identity_provider.base_url", ENV_KC_BASE_URL)?;
        let realm = require(idp.realm, "identity_provider.realm", ENV_KC_REALM)?;
        let client_id = require(idp.client_id, "identity_provider.client_id", ENV_KC_CLIENT_ID)?;
        let redirect_uri = idp
            .redirect_uri
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        Url::parse(&redirect_uri)
            .map_err(|e| ConfigError::invalid("identity_provider.redirect_uri", e.to_string()))?;

        Ok(ResolvedIdentityProvider {
            base_url,
            realm,
            client_id,
            redirect_uri,
            scope: idp
                .scope
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
        })
    }

    /// Role-claim normalisation table.
    pub fn roles(&self) -> RolesConfig {
        self.roles.clone().unwrap_or_default()
    }
}

fn merge_section<T>(target: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
    let Some(layer) = other else {
        return;
    };
    if let Some(existing) = target.as_mut() {
        merge(existing, layer);
    } else {
        *target = Some(layer);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment variables
// ─────────────────────────────────────────────────────────────────────────────

pub const ENV_API_BASE: &str = "WARDEN_API_BASE";
pub const ENV_KC_BASE_URL: &str = "WARDEN_KC_BASE_URL";
pub const ENV_KC_REALM: &str = "WARDEN_KC_REALM";
pub const ENV_KC_CLIENT_ID: &str = "WARDEN_KC_CLIENT_ID";
pub const ENV_KC_REDIRECT: &str = "WARDEN_KC_REDIRECT";

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[backend]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub exchange_path: Option<String>,
}

impl BackendConfig {
    fn merge(&mut self, other: BackendConfig) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.exchange_path.is_some() {
            self.exchange_path = other.exchange_path;
        }
    }
}

/// `[identity_provider]` (Keycloak realm layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderConfig {
    pub base_url: Option<String>,
    pub realm: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
}

impl IdentityProviderConfig {
    fn merge(&mut self, other: IdentityProviderConfig) {
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.realm.is_some() {
            self.realm = other.realm;
        }
        if other.client_id.is_some() {
            self.client_id = other.client_id;
        }
        if other.redirect_uri.is_some() {
            self.redirect_uri = other.redirect_uri;
        }
        if other.scope.is_some() {
            self.scope = other.scope;
        }
    }
}

/// Identity-provider settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentityProvider {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
}

/// `[roles]`: how raw role claims map onto portal roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Prefixes stripped from claims. `None` keeps the built-in default.
    pub strip_prefixes: Option<Vec<String>>,
    /// Claim name → role name (`client`, `analyst`, `manager`, `admin`).
    pub aliases: BTreeMap<String, String>,
}

impl RolesConfig {
    fn merge(&mut self, other: RolesConfig) {
        if other.strip_prefixes.is_some() {
            self.strip_prefixes = other.strip_prefixes;
        }
        self.aliases.extend(other.aliases);
    }
}

/// `[poller]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: Option<u64>,
}

impl PollerConfig {
    fn merge(&mut self, other: PollerConfig) {
        if other.interval_secs.is_some() {
            self.interval_secs = other.interval_secs;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
