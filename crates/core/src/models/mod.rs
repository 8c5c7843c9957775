mod requests;
mod types;

pub use requests::{
    CreateRoleRequest, CreateTeamRequest, CreateTenantRequest, ResolveConflictRequest,
    UpdateRoleRequest, UpdateTeamRequest, UpdateTenantRequest,
};
pub use types::{
    ChannelKind, ConflictStatus, NotificationChannel, OwnershipConflict, Permission, Record,
    Role, Team, TeamMember, Tenant,
};
