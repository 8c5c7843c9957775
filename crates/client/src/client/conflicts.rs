//! Ownership conflict API operations.

use reqwest::Method;
use serde_json::{json, Value};

use slawatch_core::cache::KeyPart;
use slawatch_core::models::ResolveConflictRequest;

use super::SlawatchClient;
use crate::engine::remote::{RemoteCall, Result};

impl SlawatchClient {
    /// List ownership conflicts.
    pub async fn list_conflicts(&self) -> Result<Value> {
        self.get_json("/api/conflicts").await
    }

    /// Resolve a conflict in favour of one team.
    ///
    /// Uses the dedicated resolve endpoint, falling back to patching the
    /// conflict's status on servers that lack it.
    pub fn resolve_conflict(&self, id: &KeyPart, req: ResolveConflictRequest) -> RemoteCall {
        let resolve = self
            .write(
                Method::POST,
                &format!("/api/conflicts/{}/resolve", id),
                Some(&req),
            )
            .into_call("POST /api/conflicts/{id}/resolve");
        let patch = json!({
            "status": "resolved",
            "ownerTeamId": req.owner_team_id,
        });
        self.write(Method::PATCH, &format!("/api/conflicts/{}", id), Some(patch))
            .or_else_of(resolve, "PATCH /api/conflicts/{id}")
    }
}
