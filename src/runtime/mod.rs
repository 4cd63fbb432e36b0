//! Runtime glue: tokio spawner, HTTP surface, maintenance loop, readiness, startup.

pub mod api;
pub mod http;
pub mod maintenance;
pub mod readiness;
pub mod server;
pub mod tokio_spawner;

pub use api::{load_batch, InvokeRequest, InvokeResponse, QueuedView, StatusResponse, TaskView};
pub use http::{rejection_status, router, serve, submit_request, ApiError, AppState};
pub use maintenance::{run_maintenance, spawn_maintenance};
pub use readiness::{wait_until_ready, Readiness};
pub use server::{start, ServerHandle, StartOptions};
pub use tokio_spawner::TokioSpawner;
