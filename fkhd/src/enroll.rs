//! Adding, removing and listing a tenant's tracked resources.

use fkh_common::{
    AddOutcome, Directory, DirectoryError, Gateway, GatewayError, ResourceId, ResourceKind,
    TenantId, TrackedKind, TrackedResource,
};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("{} was not found.", .0.mention())]
    NotFound(ResourceId),

    #[error("The provided {expected} is invalid or not a {expected}.")]
    KindMismatch {
        expected: TrackedKind,
        found: ResourceKind,
    },

    #[error("Missing access to {}.", .0.mention())]
    Forbidden(ResourceId),

    #[error("Could not look up {resource}: {source}")]
    Gateway {
        resource: ResourceId,
        #[source]
        source: GatewayError,
    },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollOutcome {
    pub resource: ResourceId,
    pub added: bool,
}

impl fmt::Display for EnrollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.added {
            write!(f, "{} added.", self.resource.mention())
        } else {
            write!(f, "{} is already tracked.", self.resource.mention())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnenrollOutcome {
    Removed(ResourceId),
    NotTracked(ResourceId),
}

impl fmt::Display for UnenrollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed(id) => write!(f, "{} has been removed.", id.mention()),
            Self::NotTracked(id) => write!(f, "Channel {} (`{id}`) is not tracked.", id.mention()),
        }
    }
}

/// Start tracking `resource` after checking it exists remotely with the
/// kind the caller claims.
pub async fn enroll(
    directory: &dyn Directory,
    gateway: &dyn Gateway,
    tenant: TenantId,
    kind: TrackedKind,
    resource: ResourceId,
) -> Result<EnrollOutcome, EnrollError> {
    let handle = gateway.resolve(resource).await.map_err(|e| match e {
        GatewayError::NotFound => EnrollError::NotFound(resource),
        GatewayError::Forbidden => EnrollError::Forbidden(resource),
        source => EnrollError::Gateway { resource, source },
    })?;

    if handle.kind != kind.expected_remote_kind() {
        return Err(EnrollError::KindMismatch {
            expected: kind,
            found: handle.kind,
        });
    }

    let outcome = directory
        .add_tracked(TrackedResource::new(tenant, kind, resource))
        .await?;
    let added = outcome == AddOutcome::Added;
    if added {
        info!(%tenant, %resource, %kind, "Now tracking resource");
    }
    Ok(EnrollOutcome { resource, added })
}

/// Stop tracking `resource`. Does not touch the remote platform.
pub async fn unenroll(
    directory: &dyn Directory,
    tenant: TenantId,
    resource: ResourceId,
) -> Result<UnenrollOutcome, DirectoryError> {
    if directory.delete_tracked(tenant, resource).await? {
        info!(%tenant, %resource, "Stopped tracking resource");
        Ok(UnenrollOutcome::Removed(resource))
    } else {
        Ok(UnenrollOutcome::NotTracked(resource))
    }
}

/// A tenant's tracked resources grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub groups: BTreeMap<TrackedKind, Vec<ResourceId>>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No channel found.");
        }
        let mut first = true;
        for kind in TrackedKind::ALL {
            let Some(ids) = self.groups.get(&kind).filter(|ids| !ids.is_empty()) else {
                continue;
            };
            if !first {
                writeln!(f)?;
            }
            first = false;
            let name = kind.as_str();
            let mut chars = name.chars();
            let title: String = chars
                .next()
                .map(|c| c.to_ascii_uppercase())
                .into_iter()
                .chain(chars)
                .collect();
            writeln!(f, "**{title}**:")?;
            for id in ids {
                writeln!(f, "- {}", id.mention())?;
            }
        }
        Ok(())
    }
}

pub async fn listing(directory: &dyn Directory, tenant: TenantId) -> Result<Listing, DirectoryError> {
    let mut listing = Listing::default();
    for row in directory.list_tracked(tenant).await? {
        listing.groups.entry(row.kind).or_default().push(row.resource_id);
    }
    Ok(listing)
}
