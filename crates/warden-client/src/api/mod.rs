//! API endpoint implementations.

mod auth;
mod roles;

pub use auth::{AuthApi, DEFAULT_EXCHANGE_PATH};
pub use roles::{ListRoleRequestsQuery, RolesApi};
