//! Configuration models for the middleware, the scheduler, and the executor.

pub mod middleware;

pub use middleware::{
    load_dotenv, parse_policy, ConfigError, ExecutorConfig, MiddlewareConfig, SchedulerConfig,
    ServerConfig,
};
