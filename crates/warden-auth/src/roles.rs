//! Role derivation and capability resolution.
//!
//! The identity provider hands us a list of raw role claims; the portal works
//! with exactly one [`Role`] per user. Capabilities derived here only gate the
//! client side. The backend stays authoritative.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_client::{PortalClient, RequestableRole, RoleRequest, RoleRequestStatus};

use crate::error::{AuthError, Result};

/// Claim prefix the portal realm puts on its roles.
pub const DEFAULT_ROLE_PREFIX: &str = "soc_";

/// Portal role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Analyst,
    Manager,
    Admin,
}

impl Role {
    /// All roles, highest priority first.
    pub const PRIORITY: [Role; 4] = [Role::Admin, Role::Manager, Role::Analyst, Role::Client];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Analyst => "analyst",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_role(*self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "analyst" => Ok(Role::Analyst),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// How raw claims are normalised before matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Prefixes stripped from each claim (first match wins).
    pub strip_prefixes: Vec<String>,
    /// Extra claim names mapped onto a role, matched after prefix stripping.
    pub aliases: BTreeMap<String, Role>,
}

impl Default for RoleMapping {
    fn default() -> Self {
        Self {
            strip_prefixes: vec![DEFAULT_ROLE_PREFIX.to_string()],
            aliases: BTreeMap::new(),
        }
    }
}

impl RoleMapping {
    fn normalize(&self, claim: &str) -> Option<Role> {
        let claim = claim.trim();
        let stripped = self
            .strip_prefixes
            .iter()
            .find_map(|p| claim.strip_prefix(p.as_str()))
            .unwrap_or(claim);

        if let Some(role) = self.aliases.get(stripped) {
            return Some(*role);
        }
        match stripped {
            "client" => Some(Role::Client),
            "analyst" => Some(Role::Analyst),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Pick the single highest-priority role in `claims`; `client` if none match.
    pub fn derive_role<S: AsRef<str>>(&self, claims: &[S]) -> Role {
        claims
            .iter()
            .filter_map(|c| self.normalize(c.as_ref()))
            .max()
            .unwrap_or(Role::Client)
    }
}

/// [`RoleMapping::derive_role`] with the default mapping.
pub fn derive_role<S: AsRef<str>>(claims: &[S]) -> Role {
    RoleMapping::default().derive_role(claims)
}

/// What a role may see and do in the portal UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_view_reports: bool,
    pub can_view_notifications: bool,
    pub can_manage_incidents: bool,
    pub can_confirm_incidents: bool,
    pub can_reopen_incidents: bool,
    pub can_create_tickets: bool,
    pub can_reply_tickets: bool,
    pub can_view_all_tickets: bool,
    pub can_request_roles: bool,
    pub can_review_role_requests: bool,
}

impl Capabilities {
    /// The capability table. Total and side-effect free.
    pub fn for_role(role: Role) -> Self {
        let client = role == Role::Client;
        let analyst = role == Role::Analyst;
        let manager = role == Role::Manager;
        let admin = role == Role::Admin;

        Self {
            can_view_reports: analyst || manager,
            can_view_notifications: client || analyst || manager,
            can_manage_incidents: analyst,
            can_confirm_incidents: client,
            can_reopen_incidents: analyst || manager,
            can_create_tickets: client,
            can_reply_tickets: client || analyst,
            can_view_all_tickets: analyst || manager,
            can_request_roles: client || analyst,
            can_review_role_requests: admin,
        }
    }
}

/// Role-request operations, gated by the caller's capabilities.
pub struct RoleRequests {
    client: PortalClient,
    capabilities: Capabilities,
}

impl RoleRequests {
    pub fn new(client: PortalClient, capabilities: Capabilities) -> Self {
        Self {
            client,
            capabilities,
        }
    }

    fn require(&self, allowed: bool, action: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "current role may not {}",
                action
            )))
        }
    }

    /// Ask for a promotion.
    pub async fn submit(&self, role: RequestableRole) -> Result<RoleRequest> {
        self.require(self.capabilities.can_request_roles, "request a role")?;
        let request = self.client.roles().request(role).await?;
        tracing::info!(id = request.id, role = %role, "Submitted role request");
        Ok(request)
    }

    /// List requests by status.
    pub async fn list(&self, status: RoleRequestStatus) -> Result<Vec<RoleRequest>> {
        self.require(self.capabilities.can_review_role_requests, "review role requests")?;
        Ok(self.client.roles().list(status).await?)
    }

    /// Approve a request.
    pub async fn approve(&self, id: i64) -> Result<RoleRequest> {
        self.require(self.capabilities.can_review_role_requests, "review role requests")?;
        let request = self.client.roles().approve(id).await?;
        tracing::info!(id, "Approved role request");
        Ok(request)
    }

    /// Reject a request.
    pub async fn reject(&self, id: i64, comment: Option<&str>) -> Result<RoleRequest> {
        self.require(self.capabilities.can_review_role_requests, "review role requests")?;
        let request = self.client.roles().reject(id, comment).await?;
        tracing::info!(id, "Rejected role request");
        Ok(request)
    }

    /// Number of pending requests.
    pub async fn pending_count(&self) -> Result<u64> {
        self.require(self.capabilities.can_review_role_requests, "review role requests")?;
        Ok(self.client.roles().pending_count().await?)
    }
}
