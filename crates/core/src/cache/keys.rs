use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace of the tenant list views (`("tenants", filter…)`).
pub const TENANTS: &str = "tenants";
/// Namespace of a single tenant view.
pub const TENANT: &str = "tenant";
/// Namespace of the per-tenant team counter.
pub const TENANT_TEAM_COUNT: &str = "tenant-team-count";
/// Namespace of the team list views (`("teams", tenant_id…)`).
pub const TEAMS: &str = "teams";
/// Namespace of a single team view.
pub const TEAM: &str = "team";
/// Namespace of the member list of a team.
pub const TEAM_MEMBERS: &str = "team-members";
/// Namespace of the dashboard summary widgets.
pub const DASHBOARD_SUMMARY: &str = "dashboard-summary";
pub const ROLES: &str = "roles";
pub const ROLE: &str = "role";
pub const ROLE_PERMISSIONS: &str = "role-permissions";
pub const PERMISSIONS: &str = "permissions";
pub const USER_PERMISSIONS: &str = "user-permissions";
pub const NOTIFICATION_CHANNELS: &str = "notification-channels";
pub const CONFLICTS: &str = "conflicts";
pub const CONFLICT: &str = "conflict";

/// One scalar component of a [`CacheKey`].
///
/// Serialized untagged so that `42` and `"42"` stay distinct: a key built from
/// a numeric server id never collides with one built from a string id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl KeyPart {
    /// Converts a JSON scalar (typically a record's `id`) into a key part.
    ///
    /// Returns `None` for floats, arrays, objects and `null`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(KeyPart::Bool(*b)),
            Value::Number(n) => n.as_i64().map(KeyPart::Int),
            Value::String(s) => Some(KeyPart::Str(s.clone())),
            _ => None,
        }
    }

    /// Converts this part back into the JSON scalar it was built from.
    pub fn to_json(&self) -> Value {
        match self {
            KeyPart::Bool(b) => Value::Bool(*b),
            KeyPart::Int(i) => Value::from(*i),
            KeyPart::Str(s) => Value::String(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyPart::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

/// Structural identifier of one queryable view.
///
/// Two keys address the same entry iff every component is equal. A shorter
/// key is a prefix of every longer key sharing its leading components, so
/// `("tenants")` covers `("tenants", "active")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<KeyPart>);

impl CacheKey {
    /// Creates a single-component key.
    pub fn new(root: impl Into<KeyPart>) -> Self {
        Self(vec![root.into()])
    }

    /// Appends a component, returning the longer key.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the leading component when it is a string (the view namespace).
    pub fn namespace(&self) -> Option<&str> {
        self.0.first().and_then(KeyPart::as_str)
    }

    /// Returns true if `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &CacheKey) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }
}

impl From<Vec<KeyPart>> for CacheKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Returns the key of the unfiltered tenant list.
pub fn tenants_key() -> CacheKey {
    CacheKey::new(TENANTS)
}

/// Returns the key of a filtered tenant list (e.g. `"active"`).
pub fn tenants_filtered_key(filter: impl Into<KeyPart>) -> CacheKey {
    tenants_key().with(filter)
}

/// Returns the key of a single tenant.
pub fn tenant_key(tenant_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(TENANT).with(tenant_id)
}

/// Returns the key of the team counter shown on a tenant row.
pub fn tenant_team_count_key(tenant_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(TENANT_TEAM_COUNT).with(tenant_id)
}

/// Returns the key of the team list across all tenants.
pub fn teams_key() -> CacheKey {
    CacheKey::new(TEAMS)
}

/// Returns the key of the team list of one tenant.
pub fn tenant_teams_key(tenant_id: impl Into<KeyPart>) -> CacheKey {
    teams_key().with(tenant_id)
}

/// Returns the key of a single team.
pub fn team_key(team_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(TEAM).with(team_id)
}

/// Returns the key of the member list of a team.
pub fn team_members_key(team_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(TEAM_MEMBERS).with(team_id)
}

/// Returns the key of the dashboard summary.
pub fn dashboard_summary_key() -> CacheKey {
    CacheKey::new(DASHBOARD_SUMMARY)
}

pub fn roles_key() -> CacheKey {
    CacheKey::new(ROLES)
}

pub fn role_key(role_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(ROLE).with(role_id)
}

/// Returns the key of the permission set granted by a role.
pub fn role_permissions_key(role_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(ROLE_PERMISSIONS).with(role_id)
}

pub fn permissions_key() -> CacheKey {
    CacheKey::new(PERMISSIONS)
}

/// Returns the key of the effective permissions of a user.
pub fn user_permissions_key(user_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(USER_PERMISSIONS).with(user_id)
}

/// Returns the key of the notification channels configured for a tenant.
pub fn notification_channels_key(tenant_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(NOTIFICATION_CHANNELS).with(tenant_id)
}

pub fn conflicts_key() -> CacheKey {
    CacheKey::new(CONFLICTS)
}

pub fn conflict_key(conflict_id: impl Into<KeyPart>) -> CacheKey {
    CacheKey::new(CONFLICT).with(conflict_id)
}
