//! Expansion of a tenant's tracked set into the leaves that currently exist.
//!
//! Every call to [`expand`] owns a fresh [`VisitedSet`]; nothing about a
//! traversal outlives the call, so concurrent tenant passes cannot observe
//! each other's progress.

use fkh_common::{Gateway, ResourceId, ResourceKind, TrackedKind, TrackedResource};
use futures::StreamExt;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Leaves and containers already seen during one traversal.
#[derive(Debug, Default)]
pub struct VisitedSet {
    leaves: HashSet<ResourceId>,
    order: Vec<ResourceId>,
    containers: HashSet<ResourceId>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a leaf. Returns false if it was already recorded.
    pub fn insert_leaf(&mut self, id: ResourceId) -> bool {
        if self.leaves.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    /// Mark a container as listed. Returns false if it was already listed.
    pub fn visit_container(&mut self, id: ResourceId) -> bool {
        self.containers.insert(id)
    }

    pub fn containers_visited(&self) -> usize {
        self.containers.len()
    }

    /// Leaves in discovery order.
    pub fn into_leaves(self) -> Vec<ResourceId> {
        self.order
    }
}

/// Result of expanding one tenant's tracked set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Distinct leaves in discovery order.
    pub leaves: Vec<ResourceId>,
    pub containers_visited: usize,
    /// Containers whose listing failed and contributed nothing.
    pub containers_skipped: usize,
}

/// Expand tracked categories, forums and posts into the distinct set of leaves.
pub async fn expand(gateway: &dyn Gateway, tracked: &[TrackedResource]) -> Expansion {
    let mut visited = VisitedSet::new();
    let mut skipped = 0;

    for resource in tracked {
        match resource.kind {
            TrackedKind::Post => {
                visited.insert_leaf(resource.resource_id);
            }
            TrackedKind::Forum => {
                if !expand_forum(gateway, resource.resource_id, &mut visited).await {
                    skipped += 1;
                }
            }
            TrackedKind::Category => {
                skipped += expand_category(gateway, resource.resource_id, &mut visited).await;
            }
        }
    }

    Expansion {
        containers_visited: visited.containers_visited(),
        containers_skipped: skipped,
        leaves: visited.into_leaves(),
    }
}

/// Add every live and archived thread of `forum`. Returns false if the
/// forum could not be listed at all.
async fn expand_forum(gateway: &dyn Gateway, forum: ResourceId, visited: &mut VisitedSet) -> bool {
    if !visited.visit_container(forum) {
        debug!(%forum, "Forum already expanded in this pass");
        return true;
    }

    let live = match gateway.list_live_children(forum).await {
        Ok(children) => children,
        Err(e) => {
            if e.is_forbidden() || e.is_not_found() {
                debug!(%forum, error = %e, "Skipping forum");
            } else {
                warn!(%forum, error = %e, "Failed to list forum threads");
            }
            return false;
        }
    };
    let mut found = 0usize;
    for child in live.iter().filter(|c| c.kind == ResourceKind::Leaf) {
        if visited.insert_leaf(child.id) {
            found += 1;
        }
    }

    let mut archived = gateway.list_archived_children(forum);
    while let Some(item) = archived.next().await {
        match item {
            Ok(child) if child.kind == ResourceKind::Leaf => {
                if visited.insert_leaf(child.id) {
                    found += 1;
                }
            }
            Ok(_) => {}
            Err(e) => {
                // Forbidden here means the archive is unreadable; live threads still count.
                debug!(%forum, error = %e, "Archived thread listing ended early");
                break;
            }
        }
    }

    debug!(%forum, found, "Expanded forum");
    true
}

/// Expand every forum directly inside `category`. Returns the number of
/// containers that could not be listed.
async fn expand_category(
    gateway: &dyn Gateway,
    category: ResourceId,
    visited: &mut VisitedSet,
) -> usize {
    if !visited.visit_container(category) {
        return 0;
    }

    let children = match gateway.list_live_children(category).await {
        Ok(children) => children,
        Err(e) => {
            if e.is_forbidden() || e.is_not_found() {
                debug!(%category, error = %e, "Skipping category");
            } else {
                warn!(%category, error = %e, "Failed to list category channels");
            }
            return 1;
        }
    };

    let mut skipped = 0;
    for forum in children.iter().filter(|c| c.kind == ResourceKind::Container) {
        if !expand_forum(gateway, forum.id, visited).await {
            skipped += 1;
        }
    }
    skipped
}
