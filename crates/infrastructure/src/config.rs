use std::path::Path;

use domainscout_domain::{ScoutError, ScoutResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    Redis,
    InMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub url: String,
    /// How long a claimed task may stay unacked before the recovery loop
    /// puts it back on the pending queue.
    pub lease_seconds: u64,
    pub connect_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            url: "redis://127.0.0.1:6379/0".to_string(),
            lease_seconds: 900,
            connect_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    /// Jobs are reaped this long after creation (24h in production).
    pub retention_seconds: u64,
    /// Log tail returned in a status snapshot.
    pub log_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "redis://127.0.0.1:6379/0".to_string(),
            retention_seconds: 86_400,
            log_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Explicit worker id; a `worker-{hex}` id is generated when empty.
    pub worker_id: Option<String>,
    /// Number of worker loops started in `worker`/`all` mode.
    pub count: usize,
    pub task_timeout_seconds: u64,
    /// Bounded wait of a single claim call.
    pub claim_timeout_seconds: u64,
    /// External pipeline executable, invoked as `{command} {args..} {domain}`.
    pub pipeline_command: String,
    pub pipeline_args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            count: 4,
            task_timeout_seconds: 300,
            claim_timeout_seconds: 5,
            pipeline_command: "scout-pipeline".to_string(),
            pipeline_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Interval of the recovery loop (stuck-claim requeue + job reaping).
    pub recovery_interval_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            recovery_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub dispatcher: DispatcherConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file, falling back to defaults when
    /// the path is absent, then applies `DOMAINSCOUT_*` env overrides.
    pub fn load(path: Option<&str>) -> ScoutResult<Self> {
        let mut config = match path {
            Some(p) if Path::new(p).exists() => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| ScoutError::Configuration(format!("read {p}: {e}")))?;
                toml::from_str(&raw)
                    .map_err(|e| ScoutError::Configuration(format!("parse {p}: {e}")))?
            }
            Some(p) => {
                debug!("config file {} not found, using defaults", p);
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DOMAINSCOUT_REDIS_URL") {
            self.queue.url = url.clone();
            self.store.url = url;
        }
        if let Ok(backend) = std::env::var("DOMAINSCOUT_QUEUE_BACKEND") {
            if let Ok(parsed) = parse_queue_backend(&backend) {
                self.queue.backend = parsed;
            }
        }
        if let Ok(bind) = std::env::var("DOMAINSCOUT_BIND") {
            self.api.bind_address = bind;
        }
        if let Ok(count) = std::env::var("DOMAINSCOUT_WORKERS") {
            if let Ok(n) = count.parse() {
                self.worker.count = n;
            }
        }
    }

    pub fn validate(&self) -> ScoutResult<()> {
        if self.queue.backend == QueueBackend::Redis
            && !self.queue.url.starts_with("redis://")
            && !self.queue.url.starts_with("rediss://")
        {
            return Err(ScoutError::Configuration(format!(
                "queue.url must start with redis:// or rediss://, got '{}'",
                self.queue.url
            )));
        }
        if self.worker.count == 0 {
            return Err(ScoutError::Configuration(
                "worker.count must be greater than 0".to_string(),
            ));
        }
        if self.worker.task_timeout_seconds == 0 {
            return Err(ScoutError::Configuration(
                "worker.task_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_queue_backend(s: &str) -> ScoutResult<QueueBackend> {
    match s.to_lowercase().as_str() {
        "redis" => Ok(QueueBackend::Redis),
        "in_memory" | "memory" => Ok(QueueBackend::InMemory),
        other => Err(ScoutError::Configuration(format!(
            "unsupported queue backend '{other}', expected redis or in_memory"
        ))),
    }
}
