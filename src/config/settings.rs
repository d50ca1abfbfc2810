use serde::Deserialize;

use crate::dispatcher::AdmissionPolicy;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub dispatcher: DispatcherSettings,
    pub workers: WorkerSettings,
    pub forward: ForwardSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Address the WebSocket ingress binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// The ingress channel: where submitted messages are queued.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DispatcherSettings {
    pub channel: String,
    pub capacity: usize,
    pub policy: AdmissionPolicy,
}

/// Worker pool sizing, retry policy and shutdown patience.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WorkerSettings {
    pub count: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub shutdown_timeout_secs: u64,
}

/// Optional second stage. When enabled, messages processed on the ingress
/// channel are republished onto `channel` and consumed by their own pool.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ForwardSettings {
    pub enabled: bool,
    pub channel: String,
    pub capacity: usize,
    pub policy: AdmissionPolicy,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PersistenceSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled
/// from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub dispatcher: Option<PartialDispatcherSettings>,
    pub workers: Option<PartialWorkerSettings>,
    pub forward: Option<PartialForwardSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDispatcherSettings {
    pub channel: Option<String>,
    pub capacity: Option<usize>,
    pub policy: Option<AdmissionPolicy>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialWorkerSettings {
    pub count: Option<usize>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialForwardSettings {
    pub enabled: Option<bool>,
    pub channel: Option<String>,
    pub capacity: Option<usize>,
    pub policy: Option<AdmissionPolicy>,
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPersistenceSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let dispatcher = self.dispatcher.unwrap_or_default();
        let workers = self.workers.unwrap_or_default();
        let forward = self.forward.unwrap_or_default();
        let persistence = self.persistence.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
            },
            dispatcher: DispatcherSettings {
                channel: dispatcher.channel.unwrap_or(defaults.dispatcher.channel),
                capacity: dispatcher.capacity.unwrap_or(defaults.dispatcher.capacity),
                policy: dispatcher.policy.unwrap_or(defaults.dispatcher.policy),
            },
            workers: WorkerSettings {
                count: workers.count.unwrap_or(defaults.workers.count),
                max_retries: workers.max_retries.unwrap_or(defaults.workers.max_retries),
                initial_backoff_ms: workers
                    .initial_backoff_ms
                    .unwrap_or(defaults.workers.initial_backoff_ms),
                max_backoff_ms: workers
                    .max_backoff_ms
                    .unwrap_or(defaults.workers.max_backoff_ms),
                shutdown_timeout_secs: workers
                    .shutdown_timeout_secs
                    .unwrap_or(defaults.workers.shutdown_timeout_secs),
            },
            forward: ForwardSettings {
                enabled: forward.enabled.unwrap_or(defaults.forward.enabled),
                channel: forward.channel.unwrap_or(defaults.forward.channel),
                capacity: forward.capacity.unwrap_or(defaults.forward.capacity),
                policy: forward.policy.unwrap_or(defaults.forward.policy),
                workers: forward.workers.unwrap_or(defaults.forward.workers),
            },
            persistence: PersistenceSettings {
                path: persistence.path.unwrap_or(defaults.persistence.path),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
        }
    }
}

impl Settings {
    /// Rejects combinations the relay cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatcher.channel.trim().is_empty() {
            return Err("dispatcher.channel must not be empty".to_string());
        }
        if self.dispatcher.capacity == 0 {
            return Err("dispatcher.capacity must be at least 1".to_string());
        }
        if self.workers.count == 0 {
            return Err("workers.count must be at least 1".to_string());
        }
        if self.workers.max_backoff_ms < self.workers.initial_backoff_ms {
            return Err("workers.max_backoff_ms must not be below initial_backoff_ms".to_string());
        }
        if self.forward.enabled {
            if self.forward.channel.trim().is_empty() {
                return Err("forward.channel must not be empty".to_string());
            }
            if self.forward.channel == self.dispatcher.channel {
                return Err("forward.channel must differ from dispatcher.channel".to_string());
            }
            if self.forward.capacity == 0 {
                return Err("forward.capacity must be at least 1".to_string());
            }
            if self.forward.workers == 0 {
                return Err("forward.workers must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            dispatcher: DispatcherSettings {
                channel: "producer".to_string(),
                capacity: 1000,
                policy: AdmissionPolicy::Block,
            },
            workers: WorkerSettings {
                count: 4,
                max_retries: 3,
                initial_backoff_ms: 100,
                max_backoff_ms: 5000,
                shutdown_timeout_secs: 30,
            },
            forward: ForwardSettings {
                enabled: false,
                channel: "consumer".to_string(),
                capacity: 1000,
                policy: AdmissionPolicy::Block,
                workers: 1,
            },
            persistence: PersistenceSettings {
                path: "msgrelay_db".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
