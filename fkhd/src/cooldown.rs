//! Per-tenant cooldown for on-demand runs.

use fkh_common::TenantId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Admits at most one on-demand run per tenant per window.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    last_run: Mutex<HashMap<TenantId, Instant>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a run now, or return how long until the tenant may run again.
    pub fn try_acquire(&self, tenant: TenantId) -> Result<(), Duration> {
        if self.window.is_zero() {
            return Ok(());
        }
        let now = Instant::now();
        let mut last_run = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = last_run.get(&tenant) {
            let elapsed = now.saturating_duration_since(*previous);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }
        last_run.insert(tenant, now);
        Ok(())
    }
}

/// "Try again in N minute(s)." with N rounded to the nearest minute.
pub fn cooldown_message(retry_after: Duration) -> String {
    let minutes = (retry_after.as_secs_f64() / 60.0).round() as u64;
    let unit = if minutes > 1 { "minutes" } else { "minute" };
    format!("Command is on cooldown. Try again in {minutes} {unit}.")
}
