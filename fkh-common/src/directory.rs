//! Resource directory: which resources each tenant asked to keep alive.
//!
//! The directory is the only durable shared state. Every mutation is atomic
//! per row; nothing here spans tenants.

use crate::errors::DirectoryError;
use crate::types::{ResourceId, TenantId, TrackedKind, TrackedResource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

/// Outcome of registering a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// A row for (tenant, resource) already exists, under any kind.
    AlreadyTracked,
}

/// Persistence collaborator for tracked resources.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, DirectoryError>;

    async fn list_tracked(&self, tenant: TenantId) -> Result<Vec<TrackedResource>, DirectoryError>;

    /// Delete a tenant and, with it, every tracked resource it owns.
    async fn delete_tenant(&self, tenant: TenantId) -> Result<(), DirectoryError>;

    /// Delete one row. Returns whether a row was removed.
    async fn delete_tracked(
        &self,
        tenant: TenantId,
        resource: ResourceId,
    ) -> Result<bool, DirectoryError>;

    async fn add_tracked(&self, tracked: TrackedResource) -> Result<AddOutcome, DirectoryError>;

    async fn is_tracked(&self, tenant: TenantId, resource: ResourceId)
    -> Result<bool, DirectoryError>;
}

/// In-memory directory, ordered by tenant and by insertion within a tenant.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tenants: RwLock<BTreeMap<TenantId, Vec<(ResourceId, TrackedKind)>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory pre-populated with rows. Duplicate rows are dropped.
    pub fn with_rows(rows: impl IntoIterator<Item = TrackedResource>) -> Self {
        let directory = Self::new();
        {
            let mut tenants = directory
                .tenants
                .write()
                .unwrap_or_else(|e| e.into_inner());
            for row in rows {
                insert_row(&mut tenants, row);
            }
        }
        directory
    }

    /// Total number of rows across all tenants.
    pub fn row_count(&self) -> usize {
        self.tenants
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }
}

fn insert_row(
    tenants: &mut BTreeMap<TenantId, Vec<(ResourceId, TrackedKind)>>,
    row: TrackedResource,
) -> AddOutcome {
    let rows = tenants.entry(row.tenant_id).or_default();
    if rows.iter().any(|(id, _)| *id == row.resource_id) {
        return AddOutcome::AlreadyTracked;
    }
    rows.push((row.resource_id, row.kind));
    AddOutcome::Added
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, DirectoryError> {
        let tenants = self.tenants.read().map_err(|_| DirectoryError::Poisoned)?;
        Ok(tenants.keys().copied().collect())
    }

    async fn list_tracked(&self, tenant: TenantId) -> Result<Vec<TrackedResource>, DirectoryError> {
        let tenants = self.tenants.read().map_err(|_| DirectoryError::Poisoned)?;
        Ok(tenants
            .get(&tenant)
            .map(|rows| {
                rows.iter()
                    .map(|(id, kind)| TrackedResource::new(tenant, *kind, *id))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_tenant(&self, tenant: TenantId) -> Result<(), DirectoryError> {
        let mut tenants = self.tenants.write().map_err(|_| DirectoryError::Poisoned)?;
        if let Some(rows) = tenants.remove(&tenant) {
            debug!(%tenant, rows = rows.len(), "Deleted tenant from directory");
        }
        Ok(())
    }

    async fn delete_tracked(
        &self,
        tenant: TenantId,
        resource: ResourceId,
    ) -> Result<bool, DirectoryError> {
        let mut tenants = self.tenants.write().map_err(|_| DirectoryError::Poisoned)?;
        let Some(rows) = tenants.get_mut(&tenant) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|(id, _)| *id != resource);
        Ok(rows.len() != before)
    }

    async fn add_tracked(&self, tracked: TrackedResource) -> Result<AddOutcome, DirectoryError> {
        let mut tenants = self.tenants.write().map_err(|_| DirectoryError::Poisoned)?;
        Ok(insert_row(&mut tenants, tracked))
    }

    async fn is_tracked(
        &self,
        tenant: TenantId,
        resource: ResourceId,
    ) -> Result<bool, DirectoryError> {
        let tenants = self.tenants.read().map_err(|_| DirectoryError::Poisoned)?;
        Ok(tenants
            .get(&tenant)
            .is_some_and(|rows| rows.iter().any(|(id, _)| *id == resource)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tenant: u64, kind: TrackedKind, id: u64) -> TrackedResource {
        TrackedResource::new(TenantId(tenant), kind, ResourceId(id))
    }

    #[tokio::test]
    async fn test_add_then_list_preserves_insertion_order() {
        let dir = InMemoryDirectory::new();
        dir.add_tracked(row(1, TrackedKind::Forum, 20)).await.unwrap();
        dir.add_tracked(row(1, TrackedKind::Post, 10)).await.unwrap();

        let tracked = dir.list_tracked(TenantId(1)).await.unwrap();
        let ids: Vec<u64> = tracked.iter().map(|t| t.resource_id.get()).collect();
        assert_eq!(ids, vec![20, 10]);
        assert_eq!(dir.list_tenants().await.unwrap(), vec![TenantId(1)]);
    }

    #[tokio::test]
    async fn test_resource_is_tracked_once_regardless_of_kind() {
        let dir = InMemoryDirectory::new();
        assert_eq!(
            dir.add_tracked(row(1, TrackedKind::Forum, 5)).await.unwrap(),
            AddOutcome::Added
        );
        assert_eq!(
            dir.add_tracked(row(1, TrackedKind::Category, 5)).await.unwrap(),
            AddOutcome::AlreadyTracked
        );
        assert_eq!(dir.row_count(), 1);
    }

    #[tokio::test]
    async fn test_same_resource_in_two_tenants_is_two_rows() {
        let dir = InMemoryDirectory::with_rows([
            row(1, TrackedKind::Post, 5),
            row(2, TrackedKind::Post, 5),
        ]);
        assert_eq!(dir.row_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_tracked_reports_whether_row_existed() {
        let dir = InMemoryDirectory::with_rows([row(1, TrackedKind::Post, 5)]);
        assert!(dir.delete_tracked(TenantId(1), ResourceId(5)).await.unwrap());
        assert!(!dir.delete_tracked(TenantId(1), ResourceId(5)).await.unwrap());
        assert!(!dir.delete_tracked(TenantId(9), ResourceId(5)).await.unwrap());
        assert!(!dir.is_tracked(TenantId(1), ResourceId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_tenant_cascades() {
        let dir = InMemoryDirectory::with_rows([
            row(42, TrackedKind::Post, 1),
            row(42, TrackedKind::Forum, 2),
            row(7, TrackedKind::Post, 3),
        ]);
        dir.delete_tenant(TenantId(42)).await.unwrap();

        assert!(dir.list_tracked(TenantId(42)).await.unwrap().is_empty());
        assert_eq!(dir.list_tenants().await.unwrap(), vec![TenantId(7)]);
        assert_eq!(dir.row_count(), 1);
    }
}
