//! Pretty output formatting.

use slawatch_core::models::{
    NotificationChannel, OwnershipConflict, Permission, Role, Team, Tenant,
};

use crate::engine::SyncOutcome;

fn status(is_active: bool) -> &'static str {
    if is_active {
        "active"
    } else {
        "inactive"
    }
}

/// Formats a titled list, or `empty` when there is nothing to show.
fn format_list<T>(title: &str, empty: &str, items: &[T], format: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let mut output = format!("{} ({})\n", title, items.len());
    output.push_str(&"-".repeat(40));
    for item in items {
        output.push_str(&format!("\n{}", format(item)));
        output.push('\n');
    }
    output
}

/// Format a tenant for display.
pub fn format_tenant(tenant: &Tenant) -> String {
    format!(
        "{} [{}]\n  ID: {}",
        tenant.name,
        status(tenant.is_active),
        tenant.id
    )
}

/// Format tenants for display.
pub fn format_tenants(tenants: &[Tenant]) -> String {
    format_list("TENANTS", "No tenants found.", tenants, format_tenant)
}

/// Format a team for display.
pub fn format_team(team: &Team) -> String {
    format!(
        "{} [{}]\n  ID: {}\n  Tenant: {}",
        team.name,
        status(team.is_active),
        team.id,
        team.tenant_id
    )
}

/// Format teams for display.
pub fn format_teams(teams: &[Team]) -> String {
    format_list("TEAMS", "No teams found.", teams, format_team)
}

/// Format a role for display.
pub fn format_role(role: &Role) -> String {
    let mut output = format!("{}\n  ID: {}", role.name, role.id);
    if let Some(desc) = &role.description {
        output.push_str(&format!("\n  Description: {}", desc));
    }
    if !role.permission_ids.is_empty() {
        let ids: Vec<String> = role.permission_ids.iter().map(|p| p.to_string()).collect();
        output.push_str(&format!("\n  Permissions: {}", ids.join(", ")));
    }
    output
}

/// Format roles for display.
pub fn format_roles(roles: &[Role]) -> String {
    format_list("ROLES", "No roles found.", roles, format_role)
}

pub fn format_permissions(permissions: &[Permission]) -> String {
    format_list(
        "PERMISSIONS",
        "No permissions found.",
        permissions,
        |permission| {
            let mut output = format!("{}\n  ID: {}", permission.code, permission.id);
            if let Some(desc) = &permission.description {
                output.push_str(&format!("\n  Description: {}", desc));
            }
            output
        },
    )
}

pub fn format_channels(channels: &[NotificationChannel]) -> String {
    format_list(
        "NOTIFICATION CHANNELS",
        "No notification channels found.",
        channels,
        |channel| {
            format!(
                "{:?} -> {} [{}]\n  ID: {}",
                channel.kind,
                channel.target,
                if channel.enabled { "enabled" } else { "disabled" },
                channel.id
            )
        },
    )
}

/// Format an ownership conflict for display.
pub fn format_conflict(conflict: &OwnershipConflict) -> String {
    let claimants: Vec<String> = conflict
        .claimant_team_ids
        .iter()
        .map(|id| id.to_string())
        .collect();
    let mut output = format!(
        "{} [{}]\n  ID: {}\n  Tenant: {}\n  Claimants: {}",
        conflict.resource,
        if conflict.is_resolved() { "resolved" } else { "open" },
        conflict.id,
        conflict.tenant_id,
        claimants.join(", ")
    );
    if let Some(owner) = &conflict.owner_team_id {
        output.push_str(&format!("\n  Owner: {}", owner));
    }
    output
}

/// Format conflicts for display.
pub fn format_conflicts(conflicts: &[OwnershipConflict]) -> String {
    format_list("CONFLICTS", "No conflicts found.", conflicts, format_conflict)
}

/// One line per handled real-time message.
pub fn format_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Applied {
            entity,
            operation,
            invalidated,
        } => format!("{} {}: {} view(s) marked stale", entity, operation, invalidated),
        SyncOutcome::SelfEcho { correlation_id } => {
            format!("own change echoed ({})", correlation_id)
        }
        SyncOutcome::Stale { version, last_seen } => {
            format!("out-of-order change dropped (v{} <= v{})", version, last_seen)
        }
        SyncOutcome::ScopeMismatch => "change outside current view dropped".to_string(),
        SyncOutcome::Malformed(reason) => format!("malformed change dropped: {}", reason),
    }
}
