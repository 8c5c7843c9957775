//! Team API operations.

use reqwest::Method;
use serde_json::Value;

use slawatch_core::cache::KeyPart;
use slawatch_core::models::{CreateTeamRequest, UpdateTeamRequest};

use super::SlawatchClient;
use crate::engine::remote::{RemoteCall, Result};

impl SlawatchClient {
    /// List teams, optionally restricted to one tenant.
    pub async fn list_teams(&self, tenant_id: Option<&KeyPart>) -> Result<Value> {
        match tenant_id {
            Some(tenant_id) => {
                self.get_json(&format!("/api/tenants/{}/teams", tenant_id))
                    .await
            }
            None => self.get_json("/api/teams").await,
        }
    }

    /// Get team by ID.
    pub async fn get_team(&self, id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/teams/{}", id)).await
    }

    /// List members of a team.
    pub async fn list_team_members(&self, id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/teams/{}/members", id)).await
    }

    /// Create a new team. Older servers only accept it under the tenant.
    pub fn create_team(&self, req: CreateTeamRequest) -> RemoteCall {
        let nested = format!("/api/tenants/{}/teams", req.tenant_id);
        let call = self
            .write(Method::POST, "/api/teams", Some(&req))
            .into_call("POST /api/teams");
        self.write(Method::POST, &nested, Some(&req))
            .or_else_of(call, "POST /api/tenants/{id}/teams")
    }

    /// Update a team. Falls back to `PUT` on servers without `PATCH`.
    pub fn update_team(&self, id: &KeyPart, req: UpdateTeamRequest) -> RemoteCall {
        let path = format!("/api/teams/{}", id);
        let patch = self
            .write(Method::PATCH, &path, Some(&req))
            .into_call("PATCH /api/teams/{id}");
        self.write(Method::PUT, &path, Some(&req))
            .or_else_of(patch, "PUT /api/teams/{id}")
    }

    /// Delete team by ID.
    pub fn delete_team(&self, id: &KeyPart) -> RemoteCall {
        self.write(Method::DELETE, &format!("/api/teams/{}", id), None::<Value>)
            .into_call("DELETE /api/teams/{id}")
    }
}
