//! Event broadcast for pass results and status refreshes.
//!
//! Every event goes out as one JSON line so any subscriber (the log sink in
//! `main`, tests, a future status surface) sees the same payload.

use chrono::Utc;
use fkh_common::{ResourceId, TenantId};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_BUFFER: usize = 256;

/// Daemon events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FkhEvent {
    PassStarted {
        run_id: String,
        tenants: usize,
    },
    PassCompleted {
        run_id: String,
        tenants: usize,
        changed: usize,
        elapsed_ms: u64,
        summary: String,
    },
    TenantReconciled {
        tenant: TenantId,
        leaves: usize,
        changed: usize,
        gone: usize,
        timed_out: bool,
    },
    TenantPruned {
        tenant: TenantId,
    },
    ResourcePruned {
        tenant: TenantId,
        resource: ResourceId,
    },
    StatusRefreshed {
        monitored: usize,
    },
}

impl FkhEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PassStarted { .. } => "pass_started",
            Self::PassCompleted { .. } => "pass_completed",
            Self::TenantReconciled { .. } => "tenant_reconciled",
            Self::TenantPruned { .. } => "tenant_pruned",
            Self::ResourcePruned { .. } => "resource_pruned",
            Self::StatusRefreshed { .. } => "status_refreshed",
        }
    }
}

/// Broadcast channel for daemon events (JSON lines).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl EventBus {
    /// Create a new event bus. Buffers below the default are raised to it.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(DEFAULT_BUFFER));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: &FkhEvent) {
        let payload = json!({
            "event": event.name(),
            "data": event,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event.name(), err),
        }
    }

    /// Forward every event to the log at debug level.
    pub fn spawn_log_sink(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(line) => debug!(target: "fkhd::events", "{line}"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event log sink lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
