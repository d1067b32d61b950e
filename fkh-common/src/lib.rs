//! Shared types and collaborator seams for Forum Keepalive Helper.
//!
//! The engine in `fkhd` only talks to the outside world through the
//! [`Directory`] (which resources each tenant tracks) and the [`Gateway`]
//! (the remote chat platform).

pub mod config;
pub mod directory;
pub mod errors;
pub mod gateway;
pub mod mock;
pub mod testing;
pub mod types;
pub mod util;

pub use config::{ConfigError, FkhConfig};
pub use directory::{AddOutcome, Directory, InMemoryDirectory};
pub use errors::{DirectoryError, GatewayError};
pub use gateway::{ArchivedChildren, Gateway};
pub use mock::{MockGateway, MockSnapshot, SnapshotError};
pub use types::{
    ActorId, ChildHandle, Permission, PermissionSet, ResourceHandle, ResourceId, ResourceKind,
    TenantId, TrackedKind, TrackedResource,
};
pub use util::{format_duration, pluralize};
