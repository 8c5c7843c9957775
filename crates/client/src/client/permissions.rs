//! Permission and notification channel API operations.

use serde_json::Value;

use slawatch_core::cache::KeyPart;

use super::SlawatchClient;
use crate::engine::remote::Result;

impl SlawatchClient {
    /// List all permissions.
    pub async fn list_permissions(&self) -> Result<Value> {
        self.get_json("/api/permissions").await
    }

    /// Effective permissions of a user.
    pub async fn user_permissions(&self, user_id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/users/{}/permissions", user_id))
            .await
    }

    /// Notification channels configured for a tenant.
    pub async fn list_notification_channels(&self, tenant_id: &KeyPart) -> Result<Value> {
        self.get_json(&format!("/api/tenants/{}/notification-channels", tenant_id))
            .await
    }
}
