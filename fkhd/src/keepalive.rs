//! Keep-alive: make sure a leaf is not archived.

use fkh_common::{Gateway, ResourceId};
use tracing::{debug, warn};

/// What a keep-alive call did to one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The leaf was archived and is now live.
    Changed,
    /// The leaf was already live, or the change could not be made.
    Unchanged,
    /// The leaf no longer exists.
    Gone,
}

/// Ensure `leaf` is live. Never errors; failures are logged and reported
/// as [`ApplyOutcome::Unchanged`].
///
/// Only archived leaves are written to, so calling this twice on the same
/// leaf issues at most one remote mutation.
pub async fn apply(gateway: &dyn Gateway, leaf: ResourceId) -> ApplyOutcome {
    let handle = match gateway.resolve(leaf).await {
        Ok(handle) => handle,
        Err(e) if e.is_not_found() => {
            debug!(%leaf, "Thread no longer exists");
            return ApplyOutcome::Gone;
        }
        Err(e) => {
            debug!(%leaf, error = %e, "Could not resolve thread");
            return ApplyOutcome::Unchanged;
        }
    };

    if !handle.is_leaf() {
        warn!(%leaf, kind = ?handle.kind, "Tracked post is not a thread");
        return ApplyOutcome::Unchanged;
    }
    if !handle.archived {
        return ApplyOutcome::Unchanged;
    }

    match gateway.set_archived(leaf, false).await {
        Ok(()) => {
            debug!(%leaf, name = %handle.name, "Unarchived thread");
            ApplyOutcome::Changed
        }
        Err(e) if e.is_not_found() => ApplyOutcome::Gone,
        Err(e) => {
            if e.is_transient() {
                warn!(%leaf, error = %e, "Failed to unarchive thread");
            } else {
                debug!(%leaf, error = %e, "Not allowed to unarchive thread");
            }
            ApplyOutcome::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fkh_common::{GatewayError, MockGateway};
    use std::time::Duration;

    fn gateway() -> MockGateway {
        let gw = MockGateway::default();
        gw.add_forum(10, None)
            .add_thread(1, 10, true)
            .add_thread(2, 10, false);
        gw
    }

    #[tokio::test]
    async fn test_archived_leaf_is_unarchived_once() {
        let gw = gateway();
        assert_eq!(apply(&gw, ResourceId(1)).await, ApplyOutcome::Changed);
        assert_eq!(gw.is_archived(1), Some(false));

        assert_eq!(apply(&gw, ResourceId(1)).await, ApplyOutcome::Unchanged);
        assert_eq!(gw.set_archived_calls(), vec![(ResourceId(1), false)]);
    }

    #[tokio::test]
    async fn test_live_leaf_is_never_written() {
        let gw = gateway();
        assert_eq!(apply(&gw, ResourceId(2)).await, ApplyOutcome::Unchanged);
        assert_eq!(apply(&gw, ResourceId(2)).await, ApplyOutcome::Unchanged);
        assert!(gw.set_archived_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_leaf_is_gone() {
        let gw = gateway();
        assert_eq!(apply(&gw, ResourceId(404)).await, ApplyOutcome::Gone);
        assert!(gw.set_archived_calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_unchanged_and_retried_next_time() {
        let gw = gateway();
        gw.fail_next_set_archived(
            1,
            GatewayError::RateLimited {
                retry_after: Duration::from_secs(1),
            },
        );
        assert_eq!(apply(&gw, ResourceId(1)).await, ApplyOutcome::Unchanged);
        assert_eq!(gw.is_archived(1), Some(true));

        assert_eq!(apply(&gw, ResourceId(1)).await, ApplyOutcome::Changed);
    }

    #[tokio::test]
    async fn test_hidden_leaf_is_unchanged() {
        let gw = gateway();
        gw.hide(1);
        assert_eq!(apply(&gw, ResourceId(1)).await, ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_non_thread_is_left_alone() {
        let gw = gateway();
        assert_eq!(apply(&gw, ResourceId(10)).await, ApplyOutcome::Unchanged);
        assert!(gw.set_archived_calls().is_empty());
    }
}
