//! Console operations: typed reads and optimistic writes over one session.
//!
//! Every write follows the same shape: pick the cached views it patches,
//! build the [`Mutation`] with a [`RemoteCall`] from the HTTP client, and let
//! the executor reconcile or roll back.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use slawatch_core::cache::{
    conflict_key, conflicts_key, deserialize_record, deserialize_records,
    notification_channels_key, permissions_key, role_key, roles_key, serialize_record, team_key,
    teams_key, tenant_key, tenant_teams_key, tenants_key, CacheKey, KeyPart,
};
use slawatch_core::invalidation::{EntityType, MutationScope};
use slawatch_core::models::{
    CreateRoleRequest, CreateTeamRequest, CreateTenantRequest, NotificationChannel,
    OwnershipConflict, Permission, ResolveConflictRequest, Role, Team, Tenant,
    UpdateRoleRequest, UpdateTeamRequest, UpdateTenantRequest,
};
use slawatch_core::notification::ViewContext;

use crate::client::events::SseNotificationSource;
use crate::client::SlawatchClient;
use crate::engine::{ConsoleSession, Mutation, Settled, Target};
use crate::error::Result;

/// A console session bound to one API server.
#[derive(Debug, Clone)]
pub struct Console {
    session: ConsoleSession,
    client: SlawatchClient,
}

impl Console {
    pub fn new(session: ConsoleSession, client: SlawatchClient) -> Self {
        Self { session, client }
    }

    pub fn session(&self) -> &ConsoleSession {
        &self.session
    }

    pub fn client(&self) -> &SlawatchClient {
        &self.client
    }

    async fn read<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::engine::remote::Result<Value>>,
    {
        let value = self.session.queries().query(&key, fetch).await?;
        Ok(deserialize_records(&value)?)
    }

    async fn write<T: DeserializeOwned>(&self, mutation: Mutation) -> Result<T> {
        let Settled { record, .. } = self.session.executor().execute(mutation).await?;
        Ok(deserialize_record(&record)?)
    }

    async fn remove(&self, mutation: Mutation) -> Result<()> {
        self.session.executor().execute(mutation).await?;
        Ok(())
    }

    // Tenants

    pub async fn tenants(&self) -> Result<Vec<Tenant>> {
        self.read(tenants_key(), || self.client.list_tenants()).await
    }

    pub async fn create_tenant(&self, name: String) -> Result<Tenant> {
        let temp_id = self.session.next_temp_id();
        let placeholder = Tenant::placeholder(&temp_id, name.clone());
        let remote = self.client.create_tenant(CreateTenantRequest { name });

        let mutation = Mutation::create_record(&placeholder, temp_id, vec![tenants_key()], remote)?;
        self.write(mutation).await
    }

    pub async fn update_tenant(&self, id: KeyPart, req: UpdateTenantRequest) -> Result<Tenant> {
        let changes = serialize_record(&req)?;
        let remote = self.client.update_tenant(&id, req);
        let target = Target::new(
            EntityType::Tenant,
            MutationScope::new()
                .with_tenant(id.clone())
                .with_entity(id.clone()),
            vec![tenants_key(), tenant_key(id.clone())],
        );

        self.write(Mutation::update(target, id.to_json(), changes, remote))
            .await
    }

    pub async fn delete_tenant(&self, id: KeyPart) -> Result<()> {
        let remote = self.client.delete_tenant(&id);
        let target = Target::new(
            EntityType::Tenant,
            MutationScope::new()
                .with_tenant(id.clone())
                .with_entity(id.clone()),
            vec![tenants_key()],
        );

        self.remove(Mutation::delete(target, id.to_json(), remote))
            .await
    }

    // Teams

    pub async fn teams(&self, tenant_id: Option<KeyPart>) -> Result<Vec<Team>> {
        let key = match &tenant_id {
            Some(tenant_id) => tenant_teams_key(tenant_id.clone()),
            None => teams_key(),
        };
        self.read(key, || self.client.list_teams(tenant_id.as_ref()))
            .await
    }

    pub async fn create_team(&self, tenant_id: KeyPart, name: String) -> Result<Team> {
        let temp_id = self.session.next_temp_id();
        let placeholder = Team::placeholder(&temp_id, tenant_id.clone(), name.clone());
        let remote = self.client.create_team(CreateTeamRequest {
            tenant_id: tenant_id.clone(),
            name,
        });

        let keys = vec![teams_key(), tenant_teams_key(tenant_id)];
        let mutation = Mutation::create_record(&placeholder, temp_id, keys, remote)?;
        self.write(mutation).await
    }

    pub async fn update_team(
        &self,
        id: KeyPart,
        tenant_id: Option<KeyPart>,
        req: UpdateTeamRequest,
    ) -> Result<Team> {
        let changes = serialize_record(&req)?;
        let remote = self.client.update_team(&id, req);
        let target = team_target(&id, tenant_id);

        self.write(Mutation::update(target, id.to_json(), changes, remote))
            .await
    }

    pub async fn delete_team(&self, id: KeyPart, tenant_id: Option<KeyPart>) -> Result<()> {
        let remote = self.client.delete_team(&id);
        let mut target = team_target(&id, tenant_id);
        target.keys.retain(|key| key != &team_key(id.clone()));

        self.remove(Mutation::delete(target, id.to_json(), remote))
            .await
    }

    // Roles and permissions

    pub async fn roles(&self) -> Result<Vec<Role>> {
        self.read(roles_key(), || self.client.list_roles()).await
    }

    pub async fn create_role(&self, req: CreateRoleRequest) -> Result<Role> {
        let temp_id = self.session.next_temp_id();
        let mut placeholder = Role::new(temp_id.as_str(), req.name.clone());
        placeholder.description = req.description.clone();
        placeholder.permission_ids = req.permission_ids.clone();
        let remote = self.client.create_role(req);

        let mutation = Mutation::create_record(&placeholder, temp_id, vec![roles_key()], remote)?;
        self.write(mutation).await
    }

    pub async fn update_role(&self, id: KeyPart, req: UpdateRoleRequest) -> Result<Role> {
        let changes = serialize_record(&req)?;
        let remote = self.client.update_role(&id, req);
        let target = Target::new(
            EntityType::Role,
            MutationScope::new().with_entity(id.clone()),
            vec![roles_key(), role_key(id.clone())],
        );

        self.write(Mutation::update(target, id.to_json(), changes, remote))
            .await
    }

    pub async fn delete_role(&self, id: KeyPart) -> Result<()> {
        let remote = self.client.delete_role(&id);
        let target = Target::new(
            EntityType::Role,
            MutationScope::new().with_entity(id.clone()),
            vec![roles_key()],
        );

        self.remove(Mutation::delete(target, id.to_json(), remote))
            .await
    }

    pub async fn permissions(&self) -> Result<Vec<Permission>> {
        self.read(permissions_key(), || self.client.list_permissions())
            .await
    }

    pub async fn notification_channels(
        &self,
        tenant_id: KeyPart,
    ) -> Result<Vec<NotificationChannel>> {
        self.read(notification_channels_key(tenant_id.clone()), || {
            self.client.list_notification_channels(&tenant_id)
        })
        .await
    }

    // Ownership conflicts

    pub async fn conflicts(&self) -> Result<Vec<OwnershipConflict>> {
        self.read(conflicts_key(), || self.client.list_conflicts())
            .await
    }

    /// Resolves a conflict in favour of `owner_team_id`. The conflict shows as
    /// resolved immediately.
    pub async fn resolve_conflict(
        &self,
        id: KeyPart,
        owner_team_id: KeyPart,
    ) -> Result<OwnershipConflict> {
        let changes = json!({
            "status": "resolved",
            "ownerTeamId": owner_team_id.to_json(),
        });
        let remote = self
            .client
            .resolve_conflict(&id, ResolveConflictRequest { owner_team_id });
        let target = Target::new(
            EntityType::Conflict,
            MutationScope::new().with_entity(id.clone()),
            vec![conflicts_key(), conflict_key(id.clone())],
        );

        self.write(Mutation::update(target, id.to_json(), changes, remote))
            .await
    }

    // Real-time

    /// Follows the server's change stream until `shutdown` resolves.
    pub async fn watch<F>(&self, view: ViewContext, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut source = SseNotificationSource::new(self.client.clone());
        if let Some(tenant_id) = &view.tenant_id {
            source = source.for_tenant(tenant_id.clone());
        }

        let realtime = self.session.realtime();
        realtime.set_view(view);
        realtime.run(&source, shutdown).await;
    }

    /// Runs an arbitrary write through the executor.
    pub async fn execute(&self, mutation: Mutation) -> Result<Settled> {
        Ok(self.session.executor().execute(mutation).await?)
    }
}

fn team_target(id: &KeyPart, tenant_id: Option<KeyPart>) -> Target {
    let mut scope = MutationScope::new()
        .with_team(id.clone())
        .with_entity(id.clone());
    let mut keys = vec![teams_key(), team_key(id.clone())];

    if let Some(tenant_id) = tenant_id {
        keys.push(tenant_teams_key(tenant_id.clone()));
        scope = scope.with_tenant(tenant_id);
    }

    Target::new(EntityType::Team, scope, keys)
}
