//! Programmable in-memory gateway.
//!
//! Used by unit tests and by `fkhd --snapshot` dry runs, where the remote
//! platform is described by a TOML file instead of a live connection.
//! Mutations are applied to the in-memory state and recorded so tests can
//! assert on exactly which writes happened.

use crate::errors::GatewayError;
use crate::gateway::{ArchivedChildren, Gateway};
use crate::types::{
    ActorId, ChildHandle, Permission, PermissionSet, ResourceHandle, ResourceId, ResourceKind,
    TenantId, TrackedKind, TrackedResource,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    tenants: HashSet<TenantId>,
    resources: BTreeMap<ResourceId, ResourceHandle>,
    /// Resources whose lookup and listings fail with Forbidden.
    hidden: HashSet<ResourceId>,
    /// Containers whose archived listing fails with Forbidden.
    archived_forbidden: HashSet<ResourceId>,
    /// Scripted failures for `set_archived`, consumed on use.
    set_archived_failures: HashMap<ResourceId, GatewayError>,
    resource_permissions: HashMap<ResourceId, PermissionSet>,
    tenant_permissions: HashMap<TenantId, PermissionSet>,
    default_permissions: PermissionSet,
    set_archived_calls: Vec<(ResourceId, bool)>,
}

/// In-memory [`Gateway`] with call recording.
#[derive(Debug, Clone)]
pub struct MockGateway {
    actor: ActorId,
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(ActorId(1))
    }
}

impl MockGateway {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            state: Arc::new(Mutex::new(MockState::default())),
            latency: None,
        }
    }

    /// Delay every async call by `latency` (for timeout tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock gateway mutex poisoned")
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn add_tenant(&self, tenant: TenantId) -> &Self {
        self.state().tenants.insert(tenant);
        self
    }

    pub fn add_category(&self, id: u64) -> &Self {
        self.insert(ResourceId(id), ResourceKind::ContainerOfContainers, None, false)
    }

    pub fn add_forum(&self, id: u64, category: Option<u64>) -> &Self {
        self.insert(ResourceId(id), ResourceKind::Container, category.map(ResourceId), false)
    }

    pub fn add_channel(&self, id: u64, category: Option<u64>) -> &Self {
        self.insert(ResourceId(id), ResourceKind::Channel, category.map(ResourceId), false)
    }

    pub fn add_thread(&self, id: u64, forum: u64, archived: bool) -> &Self {
        self.insert(ResourceId(id), ResourceKind::Leaf, Some(ResourceId(forum)), archived)
    }

    fn insert(
        &self,
        id: ResourceId,
        kind: ResourceKind,
        parent: Option<ResourceId>,
        archived: bool,
    ) -> &Self {
        self.state().resources.insert(
            id,
            ResourceHandle {
                id,
                kind,
                archived,
                parent,
                name: format!("{kind:?}-{id}").to_lowercase(),
            },
        );
        self
    }

    /// Simulate a remote deletion.
    pub fn remove_resource(&self, id: u64) -> &Self {
        self.state().resources.remove(&ResourceId(id));
        self
    }

    pub fn hide(&self, id: u64) -> &Self {
        self.state().hidden.insert(ResourceId(id));
        self
    }

    pub fn forbid_archived_listing(&self, container: u64) -> &Self {
        self.state().archived_forbidden.insert(ResourceId(container));
        self
    }

    /// Make the next `set_archived` on `leaf` fail with `error`.
    pub fn fail_next_set_archived(&self, leaf: u64, error: GatewayError) -> &Self {
        self.state()
            .set_archived_failures
            .insert(ResourceId(leaf), error);
        self
    }

    pub fn grant_default<I, P>(&self, permissions: I) -> &Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.state().default_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn grant_tenant<I, P>(&self, tenant: TenantId, permissions: I) -> &Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.state()
            .tenant_permissions
            .insert(tenant, permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn grant_resource<I, P>(&self, resource: u64, permissions: I) -> &Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.state().resource_permissions.insert(
            ResourceId(resource),
            permissions.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Whether the thread is currently archived (None if it does not exist).
    pub fn is_archived(&self, id: u64) -> Option<bool> {
        self.state()
            .resources
            .get(&ResourceId(id))
            .map(|handle| handle.archived)
    }

    /// Every `set_archived` call received, in order.
    pub fn set_archived_calls(&self) -> Vec<(ResourceId, bool)> {
        self.state().set_archived_calls.clone()
    }

    fn children_of(&self, container: ResourceId) -> Result<Vec<ResourceHandle>, GatewayError> {
        let state = self.state();
        if state.hidden.contains(&container) {
            return Err(GatewayError::Forbidden);
        }
        if !state.resources.contains_key(&container) {
            return Err(GatewayError::NotFound);
        }
        Ok(state
            .resources
            .values()
            .filter(|handle| handle.parent == Some(container))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn actor_id(&self) -> ActorId {
        self.actor
    }

    async fn resolve_tenant(&self, tenant: TenantId) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        if self.state().tenants.contains(&tenant) {
            Ok(())
        } else {
            Err(GatewayError::NotFound)
        }
    }

    async fn resolve(&self, resource: ResourceId) -> Result<ResourceHandle, GatewayError> {
        self.simulate_latency().await;
        let state = self.state();
        if state.hidden.contains(&resource) {
            return Err(GatewayError::Forbidden);
        }
        state
            .resources
            .get(&resource)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    async fn list_live_children(
        &self,
        container: ResourceId,
    ) -> Result<Vec<ChildHandle>, GatewayError> {
        self.simulate_latency().await;
        Ok(self
            .children_of(container)?
            .into_iter()
            .filter(|child| !(child.is_leaf() && child.archived))
            .collect())
    }

    fn list_archived_children(&self, container: ResourceId) -> ArchivedChildren<'_> {
        let forbidden = self.state().archived_forbidden.contains(&container);
        let listing = if forbidden {
            Err(GatewayError::Forbidden)
        } else {
            self.children_of(container)
        };
        let items: Vec<Result<ChildHandle, GatewayError>> = match listing {
            Ok(children) => children
                .into_iter()
                .filter(|child| child.is_leaf() && child.archived)
                .map(Ok)
                .collect(),
            Err(err) => vec![Err(err)],
        };
        Box::pin(futures::stream::iter(items))
    }

    async fn set_archived(&self, leaf: ResourceId, archived: bool) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.set_archived_calls.push((leaf, archived));
        if let Some(error) = state.set_archived_failures.remove(&leaf) {
            return Err(error);
        }
        if state.hidden.contains(&leaf) {
            return Err(GatewayError::Forbidden);
        }
        match state.resources.get_mut(&leaf) {
            Some(handle) => {
                handle.archived = archived;
                Ok(())
            }
            None => Err(GatewayError::NotFound),
        }
    }

    async fn permissions_for(
        &self,
        resource: ResourceId,
        _actor: ActorId,
    ) -> Result<PermissionSet, GatewayError> {
        self.simulate_latency().await;
        let state = self.state();
        if !state.resources.contains_key(&resource) {
            return Err(GatewayError::NotFound);
        }
        Ok(state
            .resource_permissions
            .get(&resource)
            .cloned()
            .unwrap_or_else(|| state.default_permissions.clone()))
    }

    async fn tenant_permissions(
        &self,
        tenant: TenantId,
        _actor: ActorId,
    ) -> Result<PermissionSet, GatewayError> {
        self.simulate_latency().await;
        let state = self.state();
        if !state.tenants.contains(&tenant) {
            return Err(GatewayError::NotFound);
        }
        Ok(state
            .tenant_permissions
            .get(&tenant)
            .cloned()
            .unwrap_or_else(|| state.default_permissions.clone()))
    }
}

/// Errors loading a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Snapshot resource {0} references unknown parent {1}")]
    UnknownParent(u64, u64),
}

/// Offline description of the remote platform plus each tenant's tracked set.
///
/// ```toml
/// actor_id = 99
///
/// [[tenants]]
/// id = 1
/// permissions = ["view_channel", "manage_threads"]
/// tracked = [{ kind = "category", id = 10 }]
///
/// [[tenants.resources]]
/// id = 10
/// kind = "container_of_containers"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MockSnapshot {
    #[serde(default = "default_actor")]
    pub actor_id: u64,
    #[serde(default)]
    pub default_permissions: Vec<String>,
    #[serde(default)]
    pub tenants: Vec<SnapshotTenant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotTenant {
    pub id: u64,
    #[serde(default = "default_true")]
    pub reachable: bool,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub tracked: Vec<SnapshotTracked>,
    #[serde(default)]
    pub resources: Vec<SnapshotResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotTracked {
    pub kind: TrackedKind,
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResource {
    pub id: u64,
    pub kind: ResourceKind,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub hidden: bool,
}

fn default_actor() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

impl MockSnapshot {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| SnapshotError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Build the gateway and the directory rows described by the snapshot.
    pub fn into_parts(self) -> Result<(MockGateway, Vec<TrackedResource>), SnapshotError> {
        let gateway = MockGateway::new(ActorId(self.actor_id));
        gateway.grant_default(self.default_permissions.iter().map(String::as_str));
        let mut rows = Vec::new();

        let known: HashSet<u64> = self
            .tenants
            .iter()
            .flat_map(|t| t.resources.iter().map(|r| r.id))
            .collect();

        for tenant in &self.tenants {
            let tenant_id = TenantId(tenant.id);
            if tenant.reachable {
                gateway.add_tenant(tenant_id);
            }
            if let Some(perms) = &tenant.permissions {
                gateway.grant_tenant(tenant_id, perms.iter().map(String::as_str));
            }
            for resource in &tenant.resources {
                if let Some(parent) = resource.parent
                    && !known.contains(&parent)
                {
                    return Err(SnapshotError::UnknownParent(resource.id, parent));
                }
                let id = ResourceId(resource.id);
                gateway.insert(id, resource.kind, resource.parent.map(ResourceId), resource.archived);
                if let Some(name) = &resource.name {
                    let mut state = gateway.state();
                    if let Some(handle) = state.resources.get_mut(&id) {
                        handle.name = name.clone();
                    }
                }
                if let Some(perms) = &resource.permissions {
                    gateway.grant_resource(resource.id, perms.iter().map(String::as_str));
                }
                if resource.hidden {
                    gateway.hide(resource.id);
                }
            }
            rows.extend(
                tenant
                    .tracked
                    .iter()
                    .map(|t| TrackedResource::new(tenant_id, t.kind, ResourceId(t.id))),
            );
        }

        Ok((gateway, rows))
    }
}
