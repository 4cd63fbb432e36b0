//! Startup sequence and a handle for orderly shutdown.
//!
//! Order: listener bound and serving (so `/status` answers 503), maintenance
//! loop running, initial batch submitted, dispatcher pumped, then ready.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::{OutcomeTracker, ReadyQueue, Scheduler, SchedulerError, Spawn, TaskExecutor};
use crate::runtime::api::InvokeRequest;
use crate::runtime::http::{serve, submit_request, AppState};
use crate::runtime::maintenance::spawn_maintenance;
use crate::runtime::readiness::Readiness;

/// Inputs to [`start`] besides the scheduler and listener.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Maintenance sweep period.
    pub sweep_interval: Duration,
    /// Requests submitted before the middleware reports ready.
    pub initial_batch: Vec<InvokeRequest>,
    /// Flag flipped once startup completes.
    pub readiness: Readiness,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(500),
            initial_batch: Vec::new(),
            readiness: Readiness::new(),
        }
    }
}

/// A running middleware.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    readiness: Readiness,
    shutdown: watch::Sender<bool>,
    http: JoinHandle<std::io::Result<()>>,
    maintenance: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the HTTP listener is bound to.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL, e.g. `http://127.0.0.1:5000`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Readiness flag shared with `/status`.
    pub const fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// Stop accepting requests and stop the maintenance loop.
    ///
    /// Executions already running are left to finish on the runtime.
    pub async fn shutdown(self) -> Result<(), SchedulerError> {
        self.readiness.mark_not_ready();
        let _ = self.shutdown.send(true);
        if let Err(e) = self.maintenance.await {
            warn!("maintenance loop ended abnormally: {e}");
        }
        match self.http.await {
            Ok(result) => result.map_err(|e| SchedulerError::Backend(format!("http server: {e}"))),
            Err(e) => Err(SchedulerError::Backend(format!("http task: {e}"))),
        }?;
        info!("middleware stopped");
        Ok(())
    }
}

/// Start serving `scheduler` on `listener`.
pub async fn start<Q, T, E, S>(
    scheduler: Scheduler<Q, T, E, S>,
    listener: TcpListener,
    options: StartOptions,
) -> Result<ServerHandle, SchedulerError>
where
    Q: ReadyQueue + Send + 'static,
    T: OutcomeTracker + Send + 'static,
    E: TaskExecutor,
    S: Spawn + Send + Sync + 'static,
{
    let local_addr = listener
        .local_addr()
        .map_err(|e| SchedulerError::Backend(format!("listener address: {e}")))?;
    let (shutdown, shutdown_rx) = watch::channel(false);
    let readiness = options.readiness;

    let state = AppState::new(scheduler.clone(), readiness.clone());
    let mut http_rx = shutdown_rx.clone();
    let http = tokio::spawn(serve(listener, state, async move {
        let _ = http_rx.wait_for(|stop| *stop).await;
    }));

    let maintenance = spawn_maintenance(scheduler.clone(), options.sweep_interval, shutdown_rx);
    let handle = ServerHandle {
        local_addr,
        readiness,
        shutdown,
        http,
        maintenance,
    };

    let total = options.initial_batch.len();
    let mut accepted = 0usize;
    for request in options.initial_batch {
        match submit_request(&scheduler, request) {
            Ok(response) if response.reason.is_none() => accepted += 1,
            Ok(_) => {}
            Err(e) => {
                error!("initial batch aborted: {e}");
                if let Err(stop) = handle.shutdown().await {
                    warn!("shutdown after failed batch: {stop}");
                }
                return Err(e);
            }
        }
    }
    if total > 0 {
        info!(accepted, rejected = total - accepted, "initial batch submitted");
    }
    scheduler.dispatch_ready();
    handle.readiness.mark_ready();

    Ok(handle)
}
