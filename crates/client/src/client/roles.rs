//! Role API operations.

use reqwest::Method;
use serde_json::Value;

use slawatch_core::cache::KeyPart;
use slawatch_core::models::{CreateRoleRequest, UpdateRoleRequest};

use super::SlawatchClient;
use crate::engine::remote::{RemoteCall, Result};

impl SlawatchClient {
    /// List all roles.
    pub async fn list_roles(&self) -> Result<Value> {
        self.get_json("/api/roles").await
    }

    /// Permissions granted by a role.
    pub async fn role_permissions(&self, id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/roles/{}/permissions", id))
            .await
    }

    /// Create a new role.
    pub fn create_role(&self, req: CreateRoleRequest) -> RemoteCall {
        self.write(Method::POST, "/api/roles", Some(req))
            .into_call("POST /api/roles")
    }

    /// Update a role. Falls back to `PUT` on servers without `PATCH`.
    pub fn update_role(&self, id: &KeyPart, req: UpdateRoleRequest) -> RemoteCall {
        let path = format!("/api/roles/{}", id);
        let patch = self
            .write(Method::PATCH, &path, Some(&req))
            .into_call("PATCH /api/roles/{id}");
        self.write(Method::PUT, &path, Some(&req))
            .or_else_of(patch, "PUT /api/roles/{id}")
    }

    /// Delete role by ID.
    pub fn delete_role(&self, id: &KeyPart) -> RemoteCall {
        self.write(Method::DELETE, &format!("/api/roles/{}", id), None::<Value>)
            .into_call("DELETE /api/roles/{id}")
    }
}
