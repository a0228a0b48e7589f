//! Request and response types for the portal backend.
//!
//! These types mirror the backend's API contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

/// Direct-grant login request.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// One-time code, only sent when the account requires a second factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// Backend-mediated PKCE code exchange.
#[derive(Debug, Clone, Serialize)]
pub struct CodeExchangeRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// Token issued by either login path.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Identity claims returned by `/auth/kc/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Role requests
// ─────────────────────────────────────────────────────────────────────────────

/// Roles a user may ask to be promoted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestableRole {
    Analyst,
    Manager,
}

impl RequestableRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestableRole::Analyst => "analyst",
            RequestableRole::Manager => "manager",
        }
    }
}

impl fmt::Display for RequestableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestableRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analyst" => Ok(RequestableRole::Analyst),
            "manager" => Ok(RequestableRole::Manager),
            other => Err(format!("'{}' is not a requestable role (analyst, manager)", other)),
        }
    }
}

/// Lifecycle status of a role request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleRequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RoleRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleRequestStatus::Pending => "pending",
            RoleRequestStatus::Approved => "approved",
            RoleRequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RoleRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RoleRequestStatus::Pending),
            "approved" => Ok(RoleRequestStatus::Approved),
            "rejected" => Ok(RoleRequestStatus::Rejected),
            other => Err(format!("unknown role request status '{}'", other)),
        }
    }
}

/// Body of a role request submission.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRoleRequest {
    pub role: RequestableRole,
}

/// Body of a rejection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectRoleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A role request as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRequest {
    pub id: i64,
    pub user_id: i64,
    pub requested_role: String,
    pub status: RoleRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Response from the count endpoint. A missing or null count means zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub count: Option<u64>,
}

impl CountResponse {
    pub fn count(&self) -> u64 {
        self.count.unwrap_or(0)
    }
}
