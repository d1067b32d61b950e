//! Reconciliation passes.
//!
//! A pass prunes each tenant's directory entries against the remote
//! platform, expands what is left into leaves and keeps every leaf alive.
//! Tenants run concurrently on a `JoinSet`; leaves within a tenant are
//! fanned out with a bounded `buffer_unordered`.

use crate::cooldown::{CooldownGate, cooldown_message};
use crate::events::{EventBus, FkhEvent};
use crate::keepalive::{self, ApplyOutcome};
use crate::traversal;
use fkh_common::config::ReconcileConfig;
use fkh_common::{
    Directory, DirectoryError, Gateway, TenantId, TrackedResource, format_duration, pluralize,
};
use futures::StreamExt;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Errors from an on-demand single-tenant run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{}", cooldown_message(*retry_after))]
    Cooldown { retry_after: Duration },

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Outcome of reconciling one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantOutcome {
    pub tenant: TenantId,
    /// The tenant was unreachable and all of its rows were deleted.
    pub pruned: bool,
    /// The tenant was skipped this pass after a transient lookup failure.
    pub skipped: bool,
    pub stale_removed: usize,
    pub leaves: usize,
    pub changed: usize,
    pub gone: usize,
    /// Counts are partial: the run hit its timeout.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl TenantOutcome {
    fn empty(tenant: TenantId) -> Self {
        Self {
            tenant,
            pruned: false,
            skipped: false,
            stale_removed: 0,
            leaves: 0,
            changed: 0,
            gone: 0,
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }
}

impl fmt::Display for TenantOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} threads unarchived in {}.",
            self.changed,
            format_duration(self.elapsed)
        )?;
        if self.timed_out {
            write!(f, " (partial: timed out)")?;
        }
        Ok(())
    }
}

/// Totals for one full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Tenants that were reconciled (not pruned, not skipped).
    pub tenants_processed: usize,
    pub tenants_pruned: usize,
    pub tenants_failed: usize,
    pub stale_removed: usize,
    pub leaves_visited: usize,
    pub leaves_gone: usize,
    pub total_changed: usize,
    pub elapsed: Duration,
}

impl PassSummary {
    fn absorb(&mut self, outcome: &TenantOutcome) {
        if outcome.pruned {
            self.tenants_pruned += 1;
            return;
        }
        if outcome.skipped {
            self.tenants_failed += 1;
            return;
        }
        self.tenants_processed += 1;
        self.stale_removed += outcome.stale_removed;
        self.leaves_visited += outcome.leaves;
        self.leaves_gone += outcome.gone;
        self.total_changed += outcome.changed;
    }
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} threads unarchived in {} {} ({})",
            self.total_changed,
            self.tenants_processed,
            pluralize("server", self.tenants_processed),
            format_duration(self.elapsed)
        )
    }
}

/// Live counters for one tenant run, readable after a timeout.
#[derive(Debug, Default)]
struct TenantProgress {
    stale_removed: AtomicUsize,
    leaves: AtomicUsize,
    changed: AtomicUsize,
    gone: AtomicUsize,
}

impl TenantProgress {
    fn record(&self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Changed => self.changed.fetch_add(1, Ordering::Relaxed),
            ApplyOutcome::Gone => self.gone.fetch_add(1, Ordering::Relaxed),
            ApplyOutcome::Unchanged => 0,
        };
    }

    fn outcome(&self, tenant: TenantId, elapsed: Duration) -> TenantOutcome {
        TenantOutcome {
            stale_removed: self.stale_removed.load(Ordering::Relaxed),
            leaves: self.leaves.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            gone: self.gone.load(Ordering::Relaxed),
            elapsed,
            ..TenantOutcome::empty(tenant)
        }
    }
}

enum Pruned {
    Kept(Vec<TrackedResource>),
    TenantRemoved,
    Skipped,
}

/// Runs reconciliation passes. Cheap to clone; clones share the cooldown
/// gate and collaborators.
#[derive(Clone)]
pub struct Reconciler {
    directory: Arc<dyn Directory>,
    gateway: Arc<dyn Gateway>,
    config: ReconcileConfig,
    cooldown: Arc<CooldownGate>,
    events: EventBus,
}

impl Reconciler {
    pub fn new(
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn Gateway>,
        config: ReconcileConfig,
    ) -> Self {
        let cooldown = Arc::new(CooldownGate::new(config.cooldown()));
        Self {
            directory,
            gateway,
            config,
            cooldown,
            events: EventBus::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Reconcile every tenant in the directory.
    ///
    /// Only a failure to list tenants aborts the pass; per-tenant failures
    /// are logged and counted.
    pub async fn run_pass(&self) -> Result<PassSummary, DirectoryError> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let tenants = self.directory.list_tenants().await?;
        info!(%run_id, tenants = tenants.len(), "Starting reconciliation pass");
        self.events.emit(&FkhEvent::PassStarted {
            run_id: run_id.clone(),
            tenants: tenants.len(),
        });

        let limiter = (self.config.tenant_concurrency > 0)
            .then(|| Arc::new(Semaphore::new(self.config.tenant_concurrency)));

        let mut tasks = JoinSet::new();
        for tenant in tenants {
            let this = self.clone();
            let limiter = limiter.clone();
            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let progress = TenantProgress::default();
                let result = this.reconcile_tenant(tenant, &progress).await;
                (tenant, result)
            });
        }

        let mut summary = PassSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.absorb(&outcome),
                Ok((tenant, Err(e))) => {
                    warn!(%tenant, error = %e, "Tenant reconciliation failed");
                    summary.tenants_failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Tenant task panicked");
                    summary.tenants_failed += 1;
                }
            }
        }
        summary.elapsed = started.elapsed();

        info!(
            %run_id,
            changed = summary.total_changed,
            tenants = summary.tenants_processed,
            pruned = summary.tenants_pruned,
            failed = summary.tenants_failed,
            "{summary}"
        );
        self.events.emit(&FkhEvent::PassCompleted {
            run_id,
            tenants: summary.tenants_processed,
            changed: summary.total_changed,
            elapsed_ms: summary.elapsed.as_millis() as u64,
            summary: summary.to_string(),
        });
        Ok(summary)
    }

    /// On-demand run for one tenant, subject to the cooldown and timeout.
    ///
    /// On timeout the work done so far stands and the outcome carries the
    /// partial counts.
    pub async fn run_tenant(&self, tenant: TenantId) -> Result<TenantOutcome, RunError> {
        self.cooldown
            .try_acquire(tenant)
            .map_err(|retry_after| RunError::Cooldown { retry_after })?;

        let started = Instant::now();
        let progress = TenantProgress::default();
        let timeout = self.config.on_demand_timeout();
        match tokio::time::timeout(timeout, self.reconcile_tenant(tenant, &progress)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let mut outcome = progress.outcome(tenant, started.elapsed());
                outcome.timed_out = true;
                warn!(%tenant, changed = outcome.changed, "On-demand run timed out");
                self.events.emit(&FkhEvent::TenantReconciled {
                    tenant,
                    leaves: outcome.leaves,
                    changed: outcome.changed,
                    gone: outcome.gone,
                    timed_out: true,
                });
                Ok(outcome)
            }
        }
    }

    async fn reconcile_tenant(
        &self,
        tenant: TenantId,
        progress: &TenantProgress,
    ) -> Result<TenantOutcome, DirectoryError> {
        let started = Instant::now();
        let tracked = match self.prune_tenant(tenant, progress).await? {
            Pruned::Kept(tracked) => tracked,
            Pruned::TenantRemoved => {
                return Ok(TenantOutcome {
                    pruned: true,
                    elapsed: started.elapsed(),
                    ..TenantOutcome::empty(tenant)
                });
            }
            Pruned::Skipped => {
                return Ok(TenantOutcome {
                    skipped: true,
                    elapsed: started.elapsed(),
                    ..TenantOutcome::empty(tenant)
                });
            }
        };

        let expansion = traversal::expand(self.gateway.as_ref(), &tracked).await;
        progress
            .leaves
            .store(expansion.leaves.len(), Ordering::Relaxed);
        debug!(
            %tenant,
            leaves = expansion.leaves.len(),
            skipped_containers = expansion.containers_skipped,
            "Expanded tracked set"
        );

        let gateway = self.gateway.as_ref();
        futures::stream::iter(expansion.leaves)
            .map(|leaf| keepalive::apply(gateway, leaf))
            .buffer_unordered(self.config.leaf_concurrency.max(1))
            .for_each(|outcome| {
                progress.record(outcome);
                futures::future::ready(())
            })
            .await;

        let outcome = progress.outcome(tenant, started.elapsed());
        info!(
            %tenant,
            leaves = outcome.leaves,
            changed = outcome.changed,
            gone = outcome.gone,
            "Tenant reconciled"
        );
        self.events.emit(&FkhEvent::TenantReconciled {
            tenant,
            leaves: outcome.leaves,
            changed: outcome.changed,
            gone: outcome.gone,
            timed_out: false,
        });
        Ok(outcome)
    }

    /// Drop the tenant if it is unreachable, otherwise drop rows whose
    /// resource no longer exists. Returns the surviving rows.
    async fn prune_tenant(
        &self,
        tenant: TenantId,
        progress: &TenantProgress,
    ) -> Result<Pruned, DirectoryError> {
        match self.gateway.resolve_tenant(tenant).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() || e.is_forbidden() => {
                self.directory.delete_tenant(tenant).await?;
                info!(%tenant, "Tenant unreachable, removed its tracked resources");
                self.events.emit(&FkhEvent::TenantPruned { tenant });
                return Ok(Pruned::TenantRemoved);
            }
            Err(e) => {
                warn!(%tenant, error = %e, "Could not resolve tenant, skipping this pass");
                return Ok(Pruned::Skipped);
            }
        }

        let tracked = self.directory.list_tracked(tenant).await?;
        let mut kept = Vec::with_capacity(tracked.len());
        for row in tracked {
            match self.gateway.resolve(row.resource_id).await {
                Err(e) if e.is_not_found() => {
                    if self.directory.delete_tracked(tenant, row.resource_id).await? {
                        progress.stale_removed.fetch_add(1, Ordering::Relaxed);
                    }
                    info!(%tenant, resource = %row.resource_id, kind = %row.kind, "Removed stale tracked resource");
                    self.events.emit(&FkhEvent::ResourcePruned {
                        tenant,
                        resource: row.resource_id,
                    });
                }
                Err(e) if e.is_transient() => {
                    debug!(%tenant, resource = %row.resource_id, error = %e, "Keeping row after transient lookup failure");
                    kept.push(row);
                }
                _ => kept.push(row),
            }
        }
        Ok(Pruned::Kept(kept))
    }

    /// Number of distinct leaves tracked by reachable tenants. Tracked posts
    /// are counted as-is, without a lookup. Read-only: unreachable tenants
    /// are skipped, not pruned.
    pub async fn monitored_leaf_count(&self) -> Result<usize, DirectoryError> {
        let mut leaves = HashSet::new();
        for tenant in self.directory.list_tenants().await? {
            if let Err(e) = self.gateway.resolve_tenant(tenant).await {
                debug!(%tenant, error = %e, "Tenant not counted");
                continue;
            }
            let tracked = self.directory.list_tracked(tenant).await?;
            let expansion = traversal::expand(self.gateway.as_ref(), &tracked).await;
            leaves.extend(expansion.leaves);
        }
        Ok(leaves.len())
    }
}
