//! Timers that drive the reconciler.
//!
//! Full passes fire on cron expressions; the monitored-count status is
//! refreshed on a plain interval. Neither knows anything about how a pass
//! works beyond calling into [`Reconciler`].

use crate::events::FkhEvent;
use crate::reconcile::Reconciler;
use fkh_common::config::ScheduleConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Cron-driven full passes.
pub struct PassScheduler {
    scheduler: JobScheduler,
    jobs: Vec<Uuid>,
}

impl PassScheduler {
    /// Register one job per cron expression and start the scheduler.
    pub async fn start(
        reconciler: Reconciler,
        config: &ScheduleConfig,
    ) -> Result<Self, JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;
        let running = Arc::new(Mutex::new(()));
        let mut jobs = Vec::new();

        if config.enabled {
            for expr in &config.cron {
                let reconciler = reconciler.clone();
                let running = running.clone();
                let job = Job::new_async(expr.as_str(), move |_id, _scheduler| {
                    let reconciler = reconciler.clone();
                    let running = running.clone();
                    Box::pin(async move {
                        run_scheduled_pass(&reconciler, &running).await;
                    })
                })?;
                jobs.push(scheduler.add(job).await?);
                debug!(cron = %expr, "Registered pass schedule");
            }
            info!(jobs = jobs.len(), "Pass scheduler started");
        } else {
            info!("Scheduled passes disabled");
        }

        scheduler.start().await?;
        Ok(Self { scheduler, jobs })
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub async fn shutdown(mut self) -> Result<(), JobSchedulerError> {
        self.scheduler.shutdown().await
    }
}

/// Run one pass unless the previous one is still going.
async fn run_scheduled_pass(reconciler: &Reconciler, running: &Mutex<()>) -> bool {
    let Ok(_guard) = running.try_lock() else {
        warn!("Previous pass still running, skipping this trigger");
        return false;
    };
    if let Err(e) = reconciler.run_pass().await {
        error!(error = %e, "Scheduled pass failed");
    }
    true
}

/// Periodically recomputes how many threads are being kept alive.
pub struct StatusRefresher {
    reconciler: Reconciler,
    every: Duration,
}

impl StatusRefresher {
    pub fn new(reconciler: Reconciler, every: Duration) -> Self {
        Self { reconciler, every }
    }

    /// Recompute and publish the monitored count.
    pub async fn refresh(&self) -> Option<usize> {
        match self.reconciler.monitored_leaf_count().await {
            Ok(monitored) => {
                info!("Watching over {monitored} posts");
                self.reconciler
                    .events()
                    .emit(&FkhEvent::StatusRefreshed { monitored });
                Some(monitored)
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh monitored count");
                None
            }
        }
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Status refresher started (interval: {:?})", self.every);
            let mut ticker = interval(self.every);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}
