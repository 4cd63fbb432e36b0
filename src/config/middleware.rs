//! Middleware configuration structures.
//!
//! Sources, lowest precedence first: built-in defaults, a JSON file,
//! `INVOKE_*` environment variables (a `.env` file is honoured), then CLI flags
//! applied by the binary.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{AdmissionPolicy, SchedulerLimits};
use crate::infra::ProcessConfig;

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// JSON did not match the schema.
    #[error("parse error: {0}")]
    Parse(String),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load `.env` file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, `host:port`.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
        }
    }
}

/// Admission and dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of execution slots.
    pub concurrency: u32,
    /// Maximum queued tasks before rejection.
    pub max_queue_depth: usize,
    /// What to do with tasks whose deadline looks infeasible.
    pub admission_policy: AdmissionPolicy,
    /// Re-queue attempts after an execution failure.
    pub max_retries: u32,
    /// How long terminal records stay queryable, in seconds.
    pub retention_secs: u64,
    /// Interval of the maintenance sweep, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let limits = SchedulerLimits::default();
        Self {
            concurrency: limits.concurrency,
            max_queue_depth: limits.max_queue_depth,
            admission_policy: limits.admission_policy,
            max_retries: limits.max_retries,
            retention_secs: limits.retention.as_secs(),
            sweep_interval_ms: 500,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be greater than 0".into()));
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_depth must be greater than 0".into(),
            ));
        }
        if self.retention_secs == 0 {
            return Err(ConfigError::Invalid("retention_secs must be greater than 0".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Limits handed to the scheduler.
    pub fn limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            concurrency: self.concurrency,
            max_queue_depth: self.max_queue_depth,
            admission_policy: self.admission_policy,
            max_retries: self.max_retries,
            retention: Duration::from_secs(self.retention_secs),
        }
    }

    /// Sweep period.
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Process executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Interpreter used to run work references; empty runs them directly.
    pub interpreter: String,
    /// Base directory for relative work references.
    pub script_root: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            script_root: None,
        }
    }
}

impl ExecutorConfig {
    /// Settings for [`crate::infra::ProcessExecutor`].
    pub fn process_config(&self) -> ProcessConfig {
        ProcessConfig {
            interpreter: self.interpreter.clone(),
            script_root: self.script_root.clone(),
            env: Vec::new(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Admission and dispatch.
    pub scheduler: SchedulerConfig,
    /// Process executor.
    pub executor: ExecutorConfig,
    /// JSON task batch submitted at startup.
    pub initial_batch: Option<PathBuf>,
    /// CSV performance log destination.
    pub perf_log: Option<PathBuf>,
}

impl MiddlewareConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind_addr must not be empty".into()));
        }
        self.scheduler.validate()
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&input)
    }

    /// Apply `INVOKE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Apply `INVOKE_*` overrides from an arbitrary lookup, then validate.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("INVOKE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("INVOKE_CONCURRENCY") {
            self.scheduler.concurrency = parse_num("INVOKE_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("INVOKE_MAX_QUEUE_DEPTH") {
            self.scheduler.max_queue_depth = parse_num("INVOKE_MAX_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = get("INVOKE_ADMISSION_POLICY") {
            self.scheduler.admission_policy = parse_policy(&v)?;
        }
        if let Some(v) = get("INVOKE_MAX_RETRIES") {
            self.scheduler.max_retries = parse_num("INVOKE_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("INVOKE_RETENTION_SECS") {
            self.scheduler.retention_secs = parse_num("INVOKE_RETENTION_SECS", &v)?;
        }
        if let Some(v) = get("INVOKE_SWEEP_INTERVAL_MS") {
            self.scheduler.sweep_interval_ms = parse_num("INVOKE_SWEEP_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("INVOKE_INTERPRETER") {
            self.executor.interpreter = v;
        }
        if let Some(v) = get("INVOKE_SCRIPT_ROOT") {
            self.executor.script_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("INVOKE_INITIAL_BATCH") {
            self.initial_batch = Some(PathBuf::from(v));
        }
        if let Some(v) = get("INVOKE_PERF_LOG") {
            self.perf_log = Some(PathBuf::from(v));
        }
        self.validate()
    }
}

fn parse_num<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: `{value}` is not a valid number")))
}

/// Parse an admission policy name (`best_effort` / `strict`).
pub fn parse_policy(value: &str) -> Result<AdmissionPolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "best_effort" => Ok(AdmissionPolicy::BestEffort),
        "strict" => Ok(AdmissionPolicy::Strict),
        other => Err(ConfigError::Invalid(format!(
            "unknown admission policy `{other}` (expected best_effort or strict)"
        ))),
    }
}
