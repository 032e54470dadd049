use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global configuration for Weaver
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeaverConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub tasks: TaskDefaultsConfig,
    #[serde(default)]
    pub ctx_proxy: CtxProxyConfig,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the durable model database; unset means in-memory
    pub db_path: Option<PathBuf>,

    /// Root directory of the resource storage
    pub resource_dir: Option<PathBuf>,

    /// Working directory for executions and plugin workdirs
    pub workdir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: Some(PathBuf::from("weaver.db")),
            resource_dir: Some(PathBuf::from("resources")),
            workdir: None,
        }
    }
}

/// Executor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker slots of the thread-pool executor
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Hard wall-clock ceiling for subprocess operations, in seconds
    pub subprocess_timeout_secs: Option<u64>,
}

fn default_pool_size() -> usize {
    1
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            subprocess_timeout_secs: None,
        }
    }
}

/// Retry policy applied to tasks that don't specify their own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefaultsConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    #[serde(default)]
    pub retry_interval_secs: f64,

    #[serde(default)]
    pub ignore_failure: bool,
}

fn default_max_attempts() -> i32 {
    1
}

impl Default for TaskDefaultsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_interval_secs: 0.0,
            ignore_failure: false,
        }
    }
}

/// Ctx proxy client defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtxProxyConfig {
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,
}

fn default_proxy_timeout() -> u64 {
    30
}

impl Default for CtxProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout(),
        }
    }
}

impl WeaverConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (WEAVER__*)
    /// 2. Config file (weaver.yaml in current dir or ~/.config/weaver/weaver.yaml)
    /// 3. Defaults (lowest priority)
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_builder = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&WeaverConfig::default())?)
            // Add config file from current directory
            .add_source(
                config::File::with_name("weaver")
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            // Add config file from user's config directory
            .add_source(
                config::File::with_name(&format!(
                    "{}/.config/weaver/weaver",
                    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
                ))
                .format(config::FileFormat::Yaml)
                .required(false),
            )
            // Add environment variables with WEAVER_ prefix
            .add_source(
                config::Environment::with_prefix("WEAVER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = config_builder.build()?;
        config.try_deserialize()
    }
}
