//! Common types used across FKH components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a remote tenant (a server/guild).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl TenantId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a remote resource (category, forum, channel or thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub fn get(self) -> u64 {
        self.0
    }

    /// Parse a resource reference typed by a user.
    ///
    /// Accepts a bare numeric id (`123`) or a channel mention (`<#123>`).
    pub fn parse_ref(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("<#")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u64>().ok().map(Self)
    }

    /// Render as a channel mention.
    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind under which a resource is registered in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedKind {
    /// A category grouping forums.
    Category,
    /// A forum grouping threads.
    Forum,
    /// A single thread.
    Post,
}

impl TrackedKind {
    pub const ALL: [TrackedKind; 3] = [Self::Category, Self::Forum, Self::Post];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Forum => "forum",
            Self::Post => "post",
        }
    }

    /// The remote kind a resource must have to be registered under this kind.
    pub fn expected_remote_kind(self) -> ResourceKind {
        match self {
            Self::Category => ResourceKind::ContainerOfContainers,
            Self::Forum => ResourceKind::Container,
            Self::Post => ResourceKind::Leaf,
        }
    }
}

impl std::fmt::Display for TrackedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "category" => Ok(Self::Category),
            "forum" => Ok(Self::Forum),
            "post" => Ok(Self::Post),
            other => Err(format!("unknown tracked kind '{other}'")),
        }
    }
}

/// One directory row: a resource a tenant asked to keep alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedResource {
    pub tenant_id: TenantId,
    pub kind: TrackedKind,
    pub resource_id: ResourceId,
}

impl TrackedResource {
    pub fn new(tenant_id: TenantId, kind: TrackedKind, resource_id: ResourceId) -> Self {
        Self {
            tenant_id,
            kind,
            resource_id,
        }
    }
}

/// Kind of a live remote resource, decided once when it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A thread that can be archived and unarchived.
    Leaf,
    /// A forum whose children are threads.
    Container,
    /// A category whose children are channels.
    ContainerOfContainers,
    /// Any other channel. Never traversed, never a leaf.
    Channel,
}

/// Transient view of a live remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Only meaningful for leaves.
    #[serde(default)]
    pub archived: bool,
    /// Enclosing category or forum, when there is one.
    #[serde(default)]
    pub parent: Option<ResourceId>,
    #[serde(default)]
    pub name: String,
}

impl ResourceHandle {
    pub fn is_leaf(&self) -> bool {
        self.kind == ResourceKind::Leaf
    }
}

/// A child entry returned by a container listing.
pub type ChildHandle = ResourceHandle;

/// Name of an access right on the remote platform (e.g. `manage_threads`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(pub String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ordered permission set, so reports render deterministically.
pub type PermissionSet = BTreeSet<Permission>;

/// Identifier of the acting account on the remote platform (the bot user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ref_accepts_bare_id_and_mention() {
        assert_eq!(ResourceId::parse_ref("1234"), Some(ResourceId(1234)));
        assert_eq!(ResourceId::parse_ref("<#987>"), Some(ResourceId(987)));
        assert_eq!(ResourceId::parse_ref("  <#55> "), Some(ResourceId(55)));
    }

    #[test]
    fn test_parse_ref_rejects_garbage() {
        assert_eq!(ResourceId::parse_ref(""), None);
        assert_eq!(ResourceId::parse_ref("<#>"), None);
        assert_eq!(ResourceId::parse_ref("general"), None);
        assert_eq!(ResourceId::parse_ref("<#12a>"), None);
        assert_eq!(ResourceId::parse_ref("-5"), None);
    }

    #[test]
    fn test_mention_round_trips_through_parse_ref() {
        let id = ResourceId(42);
        assert_eq!(ResourceId::parse_ref(&id.mention()), Some(id));
    }

    #[test]
    fn test_tracked_kind_expected_remote_kind() {
        assert_eq!(
            TrackedKind::Category.expected_remote_kind(),
            ResourceKind::ContainerOfContainers
        );
        assert_eq!(TrackedKind::Forum.expected_remote_kind(), ResourceKind::Container);
        assert_eq!(TrackedKind::Post.expected_remote_kind(), ResourceKind::Leaf);
    }

    #[test]
    fn test_tracked_kind_from_str() {
        assert_eq!("Forum".parse::<TrackedKind>(), Ok(TrackedKind::Forum));
        assert!("thread".parse::<TrackedKind>().is_err());
    }

    #[test]
    fn test_tracked_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TrackedKind::Category).unwrap();
        assert_eq!(json, "\"category\"");
    }
}
