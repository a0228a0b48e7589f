//! Role-request API.

use serde::Serialize;

use crate::client::PortalClient;
use crate::error::Result;
use crate::types::{
    CountResponse, CreateRoleRequest, RejectRoleRequest, RequestableRole, RoleRequest,
    RoleRequestStatus,
};

/// Query parameters for listing and counting role requests.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ListRoleRequestsQuery {
    pub status: RoleRequestStatus,
}

/// Role-request API client.
pub struct RolesApi {
    client: PortalClient,
}

impl RolesApi {
    pub(crate) fn new(client: PortalClient) -> Self {
        Self { client }
    }

    /// Ask to be promoted to `role`.
    pub async fn request(&self, role: RequestableRole) -> Result<RoleRequest> {
        self.client
            .post("api/roles/request", &CreateRoleRequest { role })
            .await
    }

    /// List requests with the given status.
    pub async fn list(&self, status: RoleRequestStatus) -> Result<Vec<RoleRequest>> {
        self.client
            .get_with_query("api/roles/requests", &ListRoleRequestsQuery { status })
            .await
    }

    /// Approve a pending request.
    pub async fn approve(&self, id: i64) -> Result<RoleRequest> {
        self.client
            .post_empty(&format!("api/roles/requests/{}/approve", id))
            .await
    }

    /// Reject a pending request, optionally explaining why.
    pub async fn reject(&self, id: i64, comment: Option<&str>) -> Result<RoleRequest> {
        let body = RejectRoleRequest {
            comment: comment.map(str::to_string),
        };
        self.client
            .post(&format!("api/roles/requests/{}/reject", id), &body)
            .await
    }

    /// Number of pending requests.
    pub async fn pending_count(&self) -> Result<u64> {
        let query = ListRoleRequestsQuery {
            status: RoleRequestStatus::Pending,
        };
        let response: CountResponse = self
            .client
            .get_with_query("api/roles/requests/count", &query)
            .await?;
        Ok(response.count())
    }
}
