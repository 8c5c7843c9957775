//! The invalidation rule table.
//!
//! Maps "entity X had operation Y" to the cache views that must be marked
//! stale. Rules are written as key templates whose slots are filled from the
//! [`MutationScope`] of the specific change, so that a team update
//! invalidates `tenant-team-count:42` rather than every tenant counter.
//! Slots with no value in the scope widen to a wildcard.
//!
//! This is part of the Functional Core: resolving is a pure lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{
    normalize_predicates, CacheKey, KeyPart, KeyPredicate, PatternPart, CONFLICT, CONFLICTS,
    DASHBOARD_SUMMARY, NOTIFICATION_CHANNELS, PERMISSIONS, ROLE, ROLES, ROLE_PERMISSIONS, TEAM,
    TEAMS, TEAM_MEMBERS, TENANT, TENANTS, TENANT_TEAM_COUNT, USER_PERMISSIONS,
};

/// Entity families managed by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Tenant,
    Team,
    TeamMember,
    Role,
    Permission,
    NotificationChannel,
    Conflict,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Tenant => "tenant",
            EntityType::Team => "team",
            EntityType::TeamMember => "team_member",
            EntityType::Role => "role",
            EntityType::Permission => "permission",
            EntityType::NotificationChannel => "notification_channel",
            EntityType::Conflict => "conflict",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of write applied to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers touched by one specific change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<KeyPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<KeyPart>,
    /// Id of the changed entity itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<KeyPart>,
}

impl MutationScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<KeyPart>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<KeyPart>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<KeyPart>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// One position of a [`KeyTemplate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Literal(KeyPart),
    Tenant,
    Team,
    Entity,
    Any,
}

impl Slot {
    pub fn literal(part: impl Into<KeyPart>) -> Self {
        Slot::Literal(part.into())
    }

    fn fill(&self, scope: &MutationScope) -> PatternPart {
        let filled = match self {
            Slot::Literal(part) => Some(part.clone()),
            Slot::Tenant => scope.tenant_id.clone(),
            Slot::Team => scope.team_id.clone(),
            Slot::Entity => scope.entity_id.clone(),
            Slot::Any => None,
        };
        filled.map_or(PatternPart::Any, PatternPart::Exact)
    }
}

/// A cache key shape with slots filled per change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    slots: Vec<Slot>,
    /// Exact templates address one key; the rest cover everything below.
    exact: bool,
}

impl KeyTemplate {
    pub fn exact(slots: impl IntoIterator<Item = Slot>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
            exact: true,
        }
    }

    pub fn prefix(slots: impl IntoIterator<Item = Slot>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
            exact: false,
        }
    }

    /// Produces the most specific predicate the scope allows.
    ///
    /// A fully filled template becomes an exact or prefix predicate; any
    /// unfilled slot widens it to a wildcard pattern.
    pub fn instantiate(&self, scope: &MutationScope) -> KeyPredicate {
        let parts: Vec<PatternPart> = self.slots.iter().map(|slot| slot.fill(scope)).collect();

        let concrete: Option<Vec<KeyPart>> = parts
            .iter()
            .map(|part| match part {
                PatternPart::Exact(p) => Some(p.clone()),
                PatternPart::Any => None,
            })
            .collect();

        match concrete {
            Some(parts) if self.exact => KeyPredicate::Exact(CacheKey::from(parts)),
            Some(parts) => KeyPredicate::Prefix(CacheKey::from(parts)),
            None => KeyPredicate::Pattern(parts),
        }
    }
}

/// "When `trigger_entity` has `trigger_operation`, these views go stale."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    pub trigger_entity: EntityType,
    pub trigger_operation: Operation,
    pub affected: Vec<KeyTemplate>,
}

impl InvalidationRule {
    pub fn new(
        trigger_entity: EntityType,
        trigger_operation: Operation,
        affected: Vec<KeyTemplate>,
    ) -> Self {
        Self {
            trigger_entity,
            trigger_operation,
            affected,
        }
    }
}

/// The single canonical table of invalidation cascades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<InvalidationRule>,
}

impl RuleTable {
    /// Builds a table from an explicit rule list.
    pub fn with_rules(rules: Vec<InvalidationRule>) -> Self {
        Self { rules }
    }

    /// The console's cascade table.
    pub fn canonical() -> Self {
        Self::with_rules(canonical_rules())
    }

    pub fn rules(&self) -> &[InvalidationRule] {
        &self.rules
    }

    /// Returns the predicates to mark stale after `operation` on `entity`.
    ///
    /// Every rule matching the trigger contributes; predicates covered by a
    /// broader one in the result are dropped. Unknown triggers resolve to an
    /// empty set.
    pub fn resolve(
        &self,
        entity: EntityType,
        operation: Operation,
        scope: &MutationScope,
    ) -> Vec<KeyPredicate> {
        let predicates = self
            .rules
            .iter()
            .filter(|rule| rule.trigger_entity == entity && rule.trigger_operation == operation)
            .flat_map(|rule| rule.affected.iter().map(|t| t.instantiate(scope)))
            .collect();

        normalize_predicates(predicates)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::canonical()
    }
}

fn lit(part: &str) -> Slot {
    Slot::literal(part)
}

fn prefix_of(namespace: &str) -> KeyTemplate {
    KeyTemplate::prefix([lit(namespace)])
}

fn dashboard() -> KeyTemplate {
    KeyTemplate::exact([lit(DASHBOARD_SUMMARY)])
}

fn rule(entity: EntityType, operations: &[Operation], affected: Vec<KeyTemplate>) -> Vec<InvalidationRule> {
    operations
        .iter()
        .map(|op| InvalidationRule::new(entity, *op, affected.clone()))
        .collect()
}

fn canonical_rules() -> Vec<InvalidationRule> {
    use EntityType::*;
    use Operation::*;

    let mut rules = Vec::new();

    // Tenants
    rules.extend(rule(Tenant, &[Create], vec![prefix_of(TENANTS), dashboard()]));
    rules.extend(rule(
        Tenant,
        &[Update],
        vec![
            prefix_of(TENANTS),
            KeyTemplate::exact([lit(TENANT), Slot::Entity]),
            dashboard(),
        ],
    ));
    rules.extend(rule(
        Tenant,
        &[Delete],
        vec![
            prefix_of(TENANTS),
            KeyTemplate::exact([lit(TENANT), Slot::Entity]),
            KeyTemplate::exact([lit(TENANT_TEAM_COUNT), Slot::Entity]),
            KeyTemplate::prefix([lit(TEAMS), Slot::Entity]),
            KeyTemplate::prefix([lit(NOTIFICATION_CHANNELS), Slot::Entity]),
            dashboard(),
        ],
    ));

    // Teams
    rules.extend(rule(
        Team,
        &[Create],
        vec![
            prefix_of(TEAMS),
            KeyTemplate::exact([lit(TENANT_TEAM_COUNT), Slot::Tenant]),
            dashboard(),
        ],
    ));
    rules.extend(rule(
        Team,
        &[Update, Delete],
        vec![
            prefix_of(TEAMS),
            KeyTemplate::exact([lit(TEAM), Slot::Entity]),
            KeyTemplate::exact([lit(TENANT_TEAM_COUNT), Slot::Tenant]),
            KeyTemplate::prefix([lit(TEAM_MEMBERS), Slot::Entity]),
            dashboard(),
        ],
    ));

    // Team membership
    rules.extend(rule(
        TeamMember,
        &[Create, Delete],
        vec![
            KeyTemplate::prefix([lit(TEAM_MEMBERS), Slot::Team]),
            KeyTemplate::exact([lit(TEAM), Slot::Team]),
            dashboard(),
        ],
    ));
    rules.extend(rule(
        TeamMember,
        &[Update],
        vec![KeyTemplate::prefix([lit(TEAM_MEMBERS), Slot::Team])],
    ));

    // Roles. Role changes also invalidate effective user permissions.
    rules.extend(rule(Role, &[Create], vec![prefix_of(ROLES)]));
    rules.extend(rule(
        Role,
        &[Update, Delete],
        vec![
            prefix_of(ROLES),
            KeyTemplate::exact([lit(ROLE), Slot::Entity]),
            KeyTemplate::prefix([lit(ROLE_PERMISSIONS), Slot::Entity]),
            prefix_of(USER_PERMISSIONS),
        ],
    ));

    // Permissions
    rules.extend(rule(
        Permission,
        &[Create, Update, Delete],
        vec![
            prefix_of(PERMISSIONS),
            prefix_of(ROLE_PERMISSIONS),
            prefix_of(USER_PERMISSIONS),
        ],
    ));

    // Notification channels
    rules.extend(rule(
        NotificationChannel,
        &[Create, Update, Delete],
        vec![KeyTemplate::prefix([lit(NOTIFICATION_CHANNELS), Slot::Tenant])],
    ));

    // Ownership conflicts. Resolving one reassigns ownership between teams.
    rules.extend(rule(Conflict, &[Create], vec![prefix_of(CONFLICTS), dashboard()]));
    rules.extend(rule(
        Conflict,
        &[Update],
        vec![
            prefix_of(CONFLICTS),
            KeyTemplate::exact([lit(CONFLICT), Slot::Entity]),
            prefix_of(TEAMS),
            prefix_of(TEAM),
            dashboard(),
        ],
    ));
    rules.extend(rule(
        Conflict,
        &[Delete],
        vec![
            prefix_of(CONFLICTS),
            KeyTemplate::exact([lit(CONFLICT), Slot::Entity]),
            dashboard(),
        ],
    ));

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{
        dashboard_summary_key, role_key, team_key, team_members_key, teams_key,
        tenant_team_count_key, tenant_teams_key, tenants_key, user_permissions_key,
    };

    fn team_scope() -> MutationScope {
        MutationScope::new().with_tenant(42).with_entity(7)
    }

    #[test]
    fn test_team_update_cascade_is_targeted() {
        let table = RuleTable::canonical();
        let predicates = table.resolve(EntityType::Team, Operation::Update, &team_scope());

        assert_eq!(
            predicates,
            vec![
                KeyPredicate::prefix(teams_key()),
                KeyPredicate::exact(team_key(7)),
                KeyPredicate::exact(tenant_team_count_key(42)),
                KeyPredicate::prefix(team_members_key(7)),
                KeyPredicate::exact(dashboard_summary_key()),
            ]
        );
    }

    #[test]
    fn test_team_update_does_not_touch_other_tenants() {
        let table = RuleTable::canonical();
        let predicates = table.resolve(EntityType::Team, Operation::Update, &team_scope());

        let other_counter = tenant_team_count_key(43);
        assert!(!predicates.iter().any(|p| p.matches(&other_counter)));
        assert!(!predicates.iter().any(|p| p.matches(&tenants_key())));
        assert!(predicates.iter().any(|p| p.matches(&tenant_teams_key(42))));
    }

    #[test]
    fn test_missing_scope_widens_to_wildcard() {
        let table = RuleTable::canonical();
        let predicates =
            table.resolve(EntityType::Team, Operation::Create, &MutationScope::new());

        assert!(predicates.contains(&KeyPredicate::Pattern(vec![
            PatternPart::from(TENANT_TEAM_COUNT),
            PatternPart::Any,
        ])));
        assert!(predicates
            .iter()
            .any(|p| p.matches(&tenant_team_count_key(99))));
    }

    #[test]
    fn test_role_update_invalidates_user_permissions() {
        let table = RuleTable::canonical();
        let scope = MutationScope::new().with_entity(3);
        let predicates = table.resolve(EntityType::Role, Operation::Update, &scope);

        assert!(predicates.iter().any(|p| p.matches(&role_key(3))));
        assert!(predicates
            .iter()
            .any(|p| p.matches(&user_permissions_key("alice"))));
    }

    #[test]
    fn test_unknown_trigger_resolves_to_nothing() {
        let table = RuleTable::with_rules(Vec::new());
        assert!(table
            .resolve(EntityType::Tenant, Operation::Create, &MutationScope::new())
            .is_empty());
    }

    #[test]
    fn test_overlapping_rules_are_merged_and_normalized() {
        let table = RuleTable::with_rules(vec![
            InvalidationRule::new(
                EntityType::Team,
                Operation::Update,
                vec![KeyTemplate::exact([Slot::literal(TEAMS), Slot::Tenant])],
            ),
            InvalidationRule::new(
                EntityType::Team,
                Operation::Update,
                vec![KeyTemplate::prefix([Slot::literal(TEAMS)])],
            ),
        ]);

        let predicates = table.resolve(EntityType::Team, Operation::Update, &team_scope());
        assert_eq!(predicates, vec![KeyPredicate::prefix(teams_key())]);
    }

    #[test]
    fn test_every_trigger_has_a_rule() {
        let table = RuleTable::canonical();
        let entities = [
            EntityType::Tenant,
            EntityType::Team,
            EntityType::TeamMember,
            EntityType::Role,
            EntityType::Permission,
            EntityType::NotificationChannel,
            EntityType::Conflict,
        ];
        for entity in entities {
            for op in [Operation::Create, Operation::Update, Operation::Delete] {
                assert!(
                    !table.resolve(entity, op, &MutationScope::new()).is_empty(),
                    "no cascade for {} {}",
                    entity,
                    op
                );
            }
        }
    }

    #[test]
    fn test_entity_type_serde() {
        assert_eq!(
            serde_json::to_string(&EntityType::NotificationChannel).unwrap(),
            "\"notification_channel\""
        );
        let op: Operation = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(op, Operation::Delete);
    }
}
