//! Tenant API operations.

use reqwest::Method;
use serde_json::Value;

use slawatch_core::cache::KeyPart;
use slawatch_core::models::{CreateTenantRequest, UpdateTenantRequest};

use super::SlawatchClient;
use crate::engine::remote::{RemoteCall, Result};

impl SlawatchClient {
    /// List all tenants.
    pub async fn list_tenants(&self) -> Result<Value> {
        self.get_json("/api/tenants").await
    }

    /// Get tenant by ID.
    pub async fn get_tenant(&self, id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/tenants/{}", id)).await
    }

    /// Number of teams of a tenant.
    pub async fn tenant_team_count(&self, id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/tenants/{}/team-count", id))
            .await
    }

    /// Create a new tenant.
    pub fn create_tenant(&self, req: CreateTenantRequest) -> RemoteCall {
        self.write(Method::POST, "/api/tenants", Some(req))
            .into_call("POST /api/tenants")
    }

    /// Update a tenant. Falls back to `PUT` on servers without `PATCH`.
    pub fn update_tenant(&self, id: &KeyPart, req: UpdateTenantRequest) -> RemoteCall {
        let path = format!("/api/tenants/{}", id);
        let patch = self
            .write(Method::PATCH, &path, Some(&req))
            .into_call("PATCH /api/tenants/{id}");
        self.write(Method::PUT, &path, Some(&req))
            .or_else_of(patch, "PUT /api/tenants/{id}")
    }

    /// Delete tenant by ID.
    pub fn delete_tenant(&self, id: &KeyPart) -> RemoteCall {
        self.write(Method::DELETE, &format!("/api/tenants/{}", id), None::<Value>)
            .into_call("DELETE /api/tenants/{id}")
    }
}
