//! Remote resource gateway: the engine's only view of the chat platform.

use crate::errors::GatewayError;
use crate::types::{ActorId, ChildHandle, PermissionSet, ResourceHandle, ResourceId, TenantId};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy listing of a container's archived children.
pub type ArchivedChildren<'a> = BoxStream<'a, Result<ChildHandle, GatewayError>>;

/// Read/mutate access to the remote platform.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// The account the engine acts as.
    fn actor_id(&self) -> ActorId;

    /// Whether the tenant is still reachable by the actor.
    async fn resolve_tenant(&self, tenant: TenantId) -> Result<(), GatewayError>;

    async fn resolve(&self, resource: ResourceId) -> Result<ResourceHandle, GatewayError>;

    /// Currently live children of a forum or category.
    async fn list_live_children(
        &self,
        container: ResourceId,
    ) -> Result<Vec<ChildHandle>, GatewayError>;

    /// Archived threads of a forum, fetched page by page as the stream is polled.
    fn list_archived_children(&self, container: ResourceId) -> ArchivedChildren<'_>;

    async fn set_archived(&self, leaf: ResourceId, archived: bool) -> Result<(), GatewayError>;

    /// Effective permissions of `actor` on a resource.
    async fn permissions_for(
        &self,
        resource: ResourceId,
        actor: ActorId,
    ) -> Result<PermissionSet, GatewayError>;

    /// Effective tenant-wide permissions of `actor`.
    async fn tenant_permissions(
        &self,
        tenant: TenantId,
        actor: ActorId,
    ) -> Result<PermissionSet, GatewayError>;
}
