use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cache::KeyPart;
use crate::invalidation::{EntityType, MutationScope};
use crate::reconcile::TempId;

/// A console entity that can be cached and mutated through the engine.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Entity family used to look up invalidation cascades.
    const ENTITY: EntityType;

    fn id(&self) -> &KeyPart;

    /// Identifiers this record touches when it changes.
    fn scope(&self) -> MutationScope;
}

/// A customer organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: KeyPart,
    pub name: String,
    pub is_active: bool,
}

impl Tenant {
    pub fn new(id: impl Into<KeyPart>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_active: true,
        }
    }

    /// Creates the optimistic stand-in for a tenant being created.
    pub fn placeholder(temp_id: &TempId, name: impl Into<String>) -> Self {
        Self::new(temp_id.as_str(), name)
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

impl Record for Tenant {
    const ENTITY: EntityType = EntityType::Tenant;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new()
            .with_tenant(self.id.clone())
            .with_entity(self.id.clone())
    }
}

/// A team owning SLAs inside a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: KeyPart,
    pub tenant_id: KeyPart,
    pub name: String,
    pub is_active: bool,
}

impl Team {
    pub fn new(
        id: impl Into<KeyPart>,
        tenant_id: impl Into<KeyPart>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            is_active: true,
        }
    }

    pub fn placeholder(
        temp_id: &TempId,
        tenant_id: impl Into<KeyPart>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(temp_id.as_str(), tenant_id, name)
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

impl Record for Team {
    const ENTITY: EntityType = EntityType::Team;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new()
            .with_tenant(self.tenant_id.clone())
            .with_team(self.id.clone())
            .with_entity(self.id.clone())
    }
}

/// Membership of a user in a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: KeyPart,
    pub team_id: KeyPart,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<KeyPart>,
}

impl Record for TeamMember {
    const ENTITY: EntityType = EntityType::TeamMember;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new()
            .with_team(self.team_id.clone())
            .with_entity(self.id.clone())
    }
}

/// A named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: KeyPart,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<KeyPart>,
}

impl Role {
    pub fn new(id: impl Into<KeyPart>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            permission_ids: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Record for Role {
    const ENTITY: EntityType = EntityType::Role;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new().with_entity(self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: KeyPart,
    /// Machine name, e.g. `sla.edit`.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Record for Permission {
    const ENTITY: EntityType = EntityType::Permission;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new().with_entity(self.id.clone())
    }
}

/// Delivery mechanism of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Slack,
    Webhook,
    Pagerduty,
}

/// Where SLA breach alerts of a tenant are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: KeyPart,
    pub tenant_id: KeyPart,
    pub kind: ChannelKind,
    pub target: String,
    pub enabled: bool,
}

impl Record for NotificationChannel {
    const ENTITY: EntityType = EntityType::NotificationChannel;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new()
            .with_tenant(self.tenant_id.clone())
            .with_entity(self.id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    Resolved,
}

/// Two or more teams claiming ownership of the same monitored resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipConflict {
    pub id: KeyPart,
    pub tenant_id: KeyPart,
    pub resource: String,
    pub claimant_team_ids: Vec<KeyPart>,
    pub status: ConflictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_team_id: Option<KeyPart>,
}

impl OwnershipConflict {
    pub fn is_resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }
}

impl Record for OwnershipConflict {
    const ENTITY: EntityType = EntityType::Conflict;

    fn id(&self) -> &KeyPart {
        &self.id
    }

    fn scope(&self) -> MutationScope {
        MutationScope::new()
            .with_tenant(self.tenant_id.clone())
            .with_entity(self.id.clone())
    }
}
