//! Readiness flag served by `GET /status` and the client-side poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::SchedulerError;

/// Shared "initialization finished" flag.
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Flag starting in the not-ready state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip to ready. Idempotent.
    pub fn mark_ready(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            info!("middleware ready");
        }
    }

    /// Flip back to not ready, e.g. while shutting down.
    pub fn mark_not_ready(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Current state.
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Poll `url` every `interval` until it answers 2xx or `timeout` elapses.
///
/// Connection errors count as "not yet"; only the deadline ends the loop
/// unsuccessfully.
pub async fn wait_until_ready(
    url: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<(), SchedulerError> {
    let client = reqwest::Client::builder()
        .timeout(interval.max(Duration::from_millis(250)))
        .build()
        .map_err(|e| SchedulerError::Backend(format!("http client: {e}")))?;
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(url, attempts, "endpoint ready");
                return Ok(());
            }
            Ok(resp) => debug!(url, attempts, status = %resp.status(), "endpoint not ready"),
            Err(e) => debug!(url, attempts, error = %e, "endpoint unreachable"),
        }
        if tokio::time::Instant::now() + interval > deadline {
            return Err(SchedulerError::Backend(format!(
                "{url} not ready after {attempts} attempts ({timeout:?})"
            )));
        }
        tokio::time::sleep(interval).await;
    }
}
