//! Change notifications received over the real-time channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cache::KeyPart;
use crate::invalidation::{EntityType, MutationScope, Operation};

/// Errors that can occur when decoding a change notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    #[error("Empty notification payload")]
    Empty,
    #[error("Malformed notification: {0}")]
    Malformed(String),
}

/// Result type for notification decoding.
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Tenant/team a change belongs to. Unset fields mean "not scoped".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<KeyPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<KeyPart>,
}

impl Scope {
    pub fn tenant(tenant_id: impl Into<KeyPart>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<KeyPart>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

/// A change broadcast by the server to every open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub entity_type: EntityType,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<KeyPart>,
    #[serde(default)]
    pub scope: Scope,
    /// Monotonically increasing per entity.
    pub version: u64,
    /// Set when the change originated from a write that carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl ChangeNotification {
    /// The ids this change touches, in the shape the rule table consumes.
    pub fn mutation_scope(&self) -> MutationScope {
        MutationScope {
            tenant_id: self.scope.tenant_id.clone(),
            team_id: self.scope.team_id.clone(),
            entity_id: self.entity_id.clone(),
        }
    }

    /// Identity under which versions are ordered.
    pub fn version_key(&self) -> (EntityType, Option<KeyPart>) {
        (self.entity_type, self.entity_id.clone())
    }
}

/// The tenant/team context a session is currently displaying.
///
/// An unset field admits notifications for any value of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewContext {
    pub tenant_id: Option<KeyPart>,
    pub team_id: Option<KeyPart>,
}

impl ViewContext {
    /// A context that admits every notification.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant_id: impl Into<KeyPart>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<KeyPart>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Returns true if a change in `scope` affects what this session shows.
    pub fn admits(&self, scope: &Scope) -> bool {
        fn compatible(viewed: &Option<KeyPart>, changed: &Option<KeyPart>) -> bool {
            match (viewed, changed) {
                (Some(viewed), Some(changed)) => viewed == changed,
                _ => true,
            }
        }

        compatible(&self.tenant_id, &scope.tenant_id) && compatible(&self.team_id, &scope.team_id)
    }
}

/// Decodes a JSON change notification.
pub fn parse_notification(raw: &str) -> Result<ChangeNotification> {
    if raw.trim().is_empty() {
        return Err(NotificationError::Empty);
    }
    serde_json::from_str(raw).map_err(|e| NotificationError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_notification() {
        let raw = r#"{
            "entityType": "team",
            "operation": "update",
            "entityId": 7,
            "scope": {"tenantId": 42},
            "version": 12,
            "correlationId": "550e8400-e29b-41d4-a716-446655440000"
        }"#;

        let notification = parse_notification(raw).unwrap();
        assert_eq!(notification.entity_type, EntityType::Team);
        assert_eq!(notification.operation, Operation::Update);
        assert_eq!(notification.entity_id, Some(KeyPart::Int(7)));
        assert_eq!(notification.scope, Scope::tenant(42));
        assert_eq!(notification.version, 12);
        assert_eq!(
            notification.correlation_id,
            Some(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap())
        );
    }

    #[test]
    fn test_parse_minimal_notification() {
        let raw = r#"{"entityType": "role", "operation": "create", "version": 1}"#;

        let notification = parse_notification(raw).unwrap();
        assert_eq!(notification.entity_id, None);
        assert_eq!(notification.scope, Scope::default());
        assert_eq!(notification.correlation_id, None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_notification("not json"),
            Err(NotificationError::Malformed(_))
        ));
        assert!(matches!(
            parse_notification(r#"{"entityType": "spaceship", "operation": "create", "version": 1}"#),
            Err(NotificationError::Malformed(_))
        ));
        assert!(matches!(
            parse_notification(r#"{"entityType": "team", "operation": "update"}"#),
            Err(NotificationError::Malformed(_))
        ));
        assert_eq!(parse_notification("  "), Err(NotificationError::Empty));
    }

    #[test]
    fn test_view_context_admits() {
        let acme = ViewContext::for_tenant(42);

        assert!(acme.admits(&Scope::tenant(42)));
        assert!(acme.admits(&Scope::tenant(42).with_team(7)));
        assert!(acme.admits(&Scope::default()));
        assert!(!acme.admits(&Scope::tenant(43)));

        let sre = ViewContext::for_tenant(42).with_team(7);
        assert!(!sre.admits(&Scope::tenant(42).with_team(8)));
        assert!(ViewContext::all().admits(&Scope::tenant(99).with_team(1)));
    }

    #[test]
    fn test_mutation_scope_and_version_key() {
        let notification = ChangeNotification {
            entity_type: EntityType::Team,
            operation: Operation::Delete,
            entity_id: Some(KeyPart::Int(7)),
            scope: Scope::tenant(42),
            version: 3,
            correlation_id: None,
        };

        assert_eq!(
            notification.mutation_scope(),
            MutationScope::new().with_tenant(42).with_entity(7)
        );
        assert_eq!(
            notification.version_key(),
            (EntityType::Team, Some(KeyPart::Int(7)))
        );
    }
}
