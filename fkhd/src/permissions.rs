//! Permission inheritance checker.
//!
//! Walks a tenant's tracked hierarchy and reports which of the required
//! permissions the actor lacks, level by level. A permission already
//! missing at a parent level (tenant, then category) is never reported
//! again for a child.

use fkh_common::config::PermissionsConfig;
use fkh_common::{
    Gateway, GatewayError, Permission, PermissionSet, ResourceId, ResourceKind, TenantId,
    TrackedKind, TrackedResource,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

/// Report section a finding belongs to, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Global,
    Category,
    Forum,
    Channel,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Self::Global, Self::Category, Self::Forum, Self::Channel];

    pub fn title(self) -> &'static str {
        match self {
            Self::Global => "Global",
            Self::Category => "Categories",
            Self::Forum => "Forums",
            Self::Channel => "Channels",
        }
    }
}

/// Permissions missing on one resource (or tenant-wide when `resource` is None).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub resource: Option<ResourceId>,
    pub missing: PermissionSet,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let perms = self
            .missing
            .iter()
            .map(Permission::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        match self.resource {
            Some(id) => write!(f, "- {}: {perms}", id.mention()),
            None => write!(f, "- {perms}"),
        }
    }
}

/// Unpaginated result of one check, plus the per-category masks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audit {
    pub findings: BTreeMap<Bucket, Vec<Finding>>,
    /// Missing set recorded for each tracked category.
    pub masks: BTreeMap<ResourceId, PermissionSet>,
}

impl Audit {
    fn push(&mut self, bucket: Bucket, resource: Option<ResourceId>, missing: PermissionSet) {
        if missing.is_empty() {
            return;
        }
        self.findings
            .entry(bucket)
            .or_default()
            .push(Finding { resource, missing });
    }

    pub fn bucket(&self, bucket: Bucket) -> &[Finding] {
        self.findings.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Missing set reported for `resource`, if any.
    #[cfg(test)]
    pub fn missing_for(&self, resource: ResourceId) -> Option<&PermissionSet> {
        self.findings
            .values()
            .flatten()
            .find(|f| f.resource == Some(resource))
            .map(|f| &f.missing)
    }

    /// Split into report pages. Page `i` holds slice `i` of every bucket.
    pub fn paginate(&self, page_size: usize) -> Vec<Report> {
        let page_size = page_size.max(1);
        let total_pages = self
            .findings
            .values()
            .map(|f| f.len().div_ceil(page_size))
            .max()
            .unwrap_or(0);
        if total_pages == 0 {
            return vec![Report::all_clear()];
        }

        (0..total_pages)
            .map(|page| {
                let sections = Bucket::ALL
                    .iter()
                    .filter_map(|bucket| {
                        let chunk = self
                            .bucket(*bucket)
                            .chunks(page_size)
                            .nth(page)?;
                        Some(ReportSection {
                            bucket: *bucket,
                            findings: chunk.to_vec(),
                        })
                    })
                    .collect();
                Report {
                    page: page + 1,
                    total_pages,
                    sections,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub bucket: Bucket,
    pub findings: Vec<Finding>,
}

/// One page of the permission report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// 1-based.
    pub page: usize,
    pub total_pages: usize,
    pub sections: Vec<ReportSection>,
}

impl Report {
    pub fn all_clear() -> Self {
        Self {
            page: 1,
            total_pages: 1,
            sections: Vec::new(),
        }
    }

    pub fn is_all_clear(&self) -> bool {
        self.sections.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all_clear() {
            return write!(f, "All required permissions are granted.");
        }
        write!(f, "Missing permissions (page {}/{})", self.page, self.total_pages)?;
        for section in &self.sections {
            write!(f, "\n**{}**", section.bucket.title())?;
            for finding in &section.findings {
                write!(f, "\n{finding}")?;
            }
        }
        Ok(())
    }
}

/// Computes missing permissions for a tenant's tracked resources.
#[derive(Debug, Clone)]
pub struct PermissionChecker {
    required: PermissionSet,
    page_size: usize,
}

impl PermissionChecker {
    pub fn new(required: PermissionSet, page_size: usize) -> Self {
        Self {
            required,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(config: &PermissionsConfig) -> Self {
        Self::new(
            config.required.iter().map(|p| Permission::new(p.as_str())).collect(),
            config.page_size,
        )
    }

    pub fn required(&self) -> &PermissionSet {
        &self.required
    }

    /// Check and paginate. Always returns at least one report.
    pub async fn check(
        &self,
        gateway: &dyn Gateway,
        tenant: TenantId,
        tracked: &[TrackedResource],
    ) -> Result<Vec<Report>, GatewayError> {
        Ok(self.audit(gateway, tenant, tracked).await?.paginate(self.page_size))
    }

    /// Compute findings without paginating.
    pub async fn audit(
        &self,
        gateway: &dyn Gateway,
        tenant: TenantId,
        tracked: &[TrackedResource],
    ) -> Result<Audit, GatewayError> {
        let actor = gateway.actor_id();
        let mut audit = Audit::default();

        let granted = gateway.tenant_permissions(tenant, actor).await?;
        let global = self.missing(&granted, &[]);
        audit.push(Bucket::Global, None, global.clone());

        let mut reached = HashSet::new();
        for category in tracked.iter().filter(|t| t.kind == TrackedKind::Category) {
            let id = category.resource_id;
            let Some(granted) = not_found_as_none(gateway.permissions_for(id, actor).await)? else {
                debug!(%tenant, category = %id, "Skipping deleted category");
                continue;
            };
            let mask = self.missing(&granted, &[&global]);
            audit.push(Bucket::Category, Some(id), mask.clone());

            let children = match gateway.list_live_children(id).await {
                Ok(children) => children,
                Err(e) if e.is_not_found() || e.is_forbidden() => {
                    debug!(%tenant, category = %id, error = %e, "Cannot list category children");
                    audit.masks.insert(id, mask);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for child in children {
                let bucket = match child.kind {
                    ResourceKind::Container => Bucket::Forum,
                    ResourceKind::Channel => Bucket::Channel,
                    ResourceKind::Leaf | ResourceKind::ContainerOfContainers => continue,
                };
                reached.insert(child.id);
                let Some(granted) =
                    not_found_as_none(gateway.permissions_for(child.id, actor).await)?
                else {
                    continue;
                };
                audit.push(bucket, Some(child.id), self.missing(&granted, &[&global, &mask]));
            }
            audit.masks.insert(id, mask);
        }

        for forum in tracked.iter().filter(|t| t.kind == TrackedKind::Forum) {
            let id = forum.resource_id;
            if !reached.insert(id) {
                continue;
            }
            let parent = match gateway.resolve(id).await {
                Ok(handle) => handle.parent,
                Err(e) if e.is_not_found() => continue,
                Err(e) if e.is_forbidden() => None,
                Err(e) => return Err(e),
            };
            let Some(granted) = not_found_as_none(gateway.permissions_for(id, actor).await)? else {
                continue;
            };
            let empty = PermissionSet::new();
            let parent_mask = parent
                .and_then(|p| audit.masks.get(&p))
                .unwrap_or(&empty);
            let missing = self.missing(&granted, &[&global, parent_mask]);
            audit.push(Bucket::Forum, Some(id), missing);
        }

        Ok(audit)
    }

    /// `required - granted - every inherited set`.
    fn missing(&self, granted: &PermissionSet, inherited: &[&PermissionSet]) -> PermissionSet {
        self.required
            .iter()
            .filter(|p| !granted.contains(*p) && !inherited.iter().any(|s| s.contains(*p)))
            .cloned()
            .collect()
    }
}

fn not_found_as_none<T>(result: Result<T, GatewayError>) -> Result<Option<T>, GatewayError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fkh_common::MockGateway;
    use proptest::prelude::*;

    const TENANT: TenantId = TenantId(1);

    fn perms(names: &[&str]) -> PermissionSet {
        names.iter().map(|n| Permission::new(*n)).collect()
    }

    fn tracked(kind: TrackedKind, id: u64) -> TrackedResource {
        TrackedResource::new(TENANT, kind, ResourceId(id))
    }

    fn checker() -> PermissionChecker {
        PermissionChecker::new(perms(&["view_channel", "manage_threads"]), 15)
    }

    #[tokio::test]
    async fn test_inherited_permissions_are_not_reported_again() {
        // Global lacks view_channel; category X lacks manage_threads too;
        // forum Y under X lacks both but adds nothing new.
        let gw = MockGateway::default();
        gw.add_tenant(TENANT)
            .grant_tenant(TENANT, ["manage_threads"])
            .add_category(100)
            .add_forum(200, Some(100))
            .grant_resource(100, Vec::<&str>::new())
            .grant_resource(200, Vec::<&str>::new());

        let audit = checker()
            .audit(&gw, TENANT, &[tracked(TrackedKind::Category, 100)])
            .await
            .unwrap();

        assert_eq!(audit.bucket(Bucket::Global)[0].missing, perms(&["view_channel"]));
        assert_eq!(
            audit.missing_for(ResourceId(100)),
            Some(&perms(&["manage_threads"]))
        );
        assert_eq!(audit.missing_for(ResourceId(200)), None);
        assert!(audit.bucket(Bucket::Forum).is_empty());
    }

    #[tokio::test]
    async fn test_untracked_forum_folds_in_recorded_parent_mask() {
        let gw = MockGateway::default();
        gw.add_tenant(TENANT)
            .grant_tenant(TENANT, ["view_channel", "manage_threads"])
            .add_category(100)
            .add_category(101)
            .add_forum(200, Some(100))
            .add_forum(201, Some(101))
            .grant_resource(100, ["view_channel"])
            .grant_resource(101, ["view_channel", "manage_threads"])
            .grant_resource(200, ["view_channel"])
            .grant_resource(201, ["view_channel"]);

        // Forum 200 is reached through tracked category 100. Category 101 is
        // not tracked, so forum 201 has no recorded mask to fold in.
        let audit = checker()
            .audit(
                &gw,
                TENANT,
                &[
                    tracked(TrackedKind::Category, 100),
                    tracked(TrackedKind::Forum, 200),
                    tracked(TrackedKind::Forum, 201),
                ],
            )
            .await
            .unwrap();

        assert!(audit.bucket(Bucket::Global).is_empty());
        assert_eq!(
            audit.missing_for(ResourceId(100)),
            Some(&perms(&["manage_threads"]))
        );
        assert_eq!(audit.missing_for(ResourceId(200)), None);
        assert_eq!(
            audit.missing_for(ResourceId(201)),
            Some(&perms(&["manage_threads"]))
        );
        assert_eq!(audit.bucket(Bucket::Forum).len(), 1);
    }

    #[tokio::test]
    async fn test_channels_under_category_get_their_own_bucket() {
        let gw = MockGateway::default();
        gw.add_tenant(TENANT)
            .grant_default(["view_channel", "manage_threads"])
            .add_category(100)
            .add_channel(300, Some(100))
            .grant_resource(300, ["manage_threads"]);

        let audit = checker()
            .audit(&gw, TENANT, &[tracked(TrackedKind::Category, 100)])
            .await
            .unwrap();
        assert_eq!(audit.bucket(Bucket::Channel).len(), 1);
        assert_eq!(
            audit.missing_for(ResourceId(300)),
            Some(&perms(&["view_channel"]))
        );
    }

    #[tokio::test]
    async fn test_posts_and_deleted_resources_are_skipped() {
        let gw = MockGateway::default();
        gw.add_tenant(TENANT)
            .grant_default(Vec::<&str>::new())
            .grant_tenant(TENANT, ["view_channel", "manage_threads"]);

        let reports = checker()
            .check(
                &gw,
                TENANT,
                &[
                    tracked(TrackedKind::Post, 1),
                    tracked(TrackedKind::Forum, 404),
                    tracked(TrackedKind::Category, 405),
                ],
            )
            .await
            .unwrap();
        assert_eq!(reports, vec![Report::all_clear()]);
        assert_eq!(reports[0].to_string(), "All required permissions are granted.");
    }

    #[tokio::test]
    async fn test_unknown_tenant_propagates_error() {
        let gw = MockGateway::default();
        let err = checker().check(&gw, TenantId(9), &[]).await.unwrap_err();
        assert_eq!(err, GatewayError::NotFound);
    }

    #[tokio::test]
    async fn test_findings_paginate_per_bucket() {
        let gw = MockGateway::default();
        gw.add_tenant(TENANT)
            .grant_tenant(TENANT, ["view_channel", "manage_threads"])
            .grant_default(Vec::<&str>::new());
        let mut rows = Vec::new();
        for id in 1..=20 {
            gw.add_forum(id, None);
            rows.push(tracked(TrackedKind::Forum, id));
        }
        gw.add_category(500);
        rows.push(tracked(TrackedKind::Category, 500));

        let reports = checker().check(&gw, TENANT, &rows).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].total_pages, 2);
        assert_eq!(reports[0].sections[0].bucket, Bucket::Category);
        assert_eq!(reports[0].sections[1].findings.len(), 15);
        assert_eq!(reports[1].sections.len(), 1);
        assert_eq!(reports[1].sections[0].findings.len(), 5);

        let text = reports[0].to_string();
        assert!(text.starts_with(
            "Missing permissions (page 1/2)\n**Categories**\n- <#500>: manage_threads, view_channel"
        ));
        assert!(text.contains("\n**Forums**\n- <#1>: manage_threads, view_channel"));
    }

    #[test]
    fn test_global_finding_renders_permission_list() {
        let mut audit = Audit::default();
        audit.push(Bucket::Global, None, perms(&["view_channel", "manage_threads"]));
        let reports = audit.paginate(15);
        assert_eq!(
            reports[0].to_string(),
            "Missing permissions (page 1/1)\n**Global**\n- manage_threads, view_channel"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Nothing missing globally shows up for a category, and nothing
        // missing for the category shows up for its forums.
        #[test]
        fn test_inheritance_is_monotonic(
            tenant_grant in proptest::collection::vec(any::<bool>(), 4),
            category_grant in proptest::collection::vec(any::<bool>(), 4),
            forum_grants in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 4), 1..4),
        ) {
            const ALL: [&str; 4] = ["view_channel", "read_message_history", "send_messages_in_threads", "manage_threads"];
            let pick = |mask: &[bool]| -> Vec<&'static str> {
                ALL.iter().zip(mask).filter(|(_, g)| **g).map(|(p, _)| *p).collect()
            };

            let gw = MockGateway::default();
            gw.add_tenant(TENANT)
                .grant_tenant(TENANT, pick(&tenant_grant))
                .add_category(100)
                .grant_resource(100, pick(&category_grant));
            for (i, grant) in forum_grants.iter().enumerate() {
                let id = 200 + i as u64;
                gw.add_forum(id, Some(100)).grant_resource(id, pick(grant));
            }

            let checker = PermissionChecker::new(perms(&ALL), 15);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let audit = runtime
                .block_on(checker.audit(&gw, TENANT, &[tracked(TrackedKind::Category, 100)]))
                .unwrap();

            let global = audit
                .bucket(Bucket::Global)
                .first()
                .map(|f| f.missing.clone())
                .unwrap_or_default();
            let category = audit.missing_for(ResourceId(100)).cloned().unwrap_or_default();
            prop_assert!(category.is_disjoint(&global));
            for finding in audit.bucket(Bucket::Forum) {
                prop_assert!(finding.missing.is_disjoint(&global));
                prop_assert!(finding.missing.is_disjoint(&category));
            }
        }
    }
}
