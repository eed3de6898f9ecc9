//! Configuration management for the LockBank server
//!
//! Settings come from `conf/application.yml` (optional), then environment
//! variables such as `LOCKBANK__LOCK__PROVIDER`, then command-line flags.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Config, Environment};
use lockbank_core::TransferConfig;
use lockbank_lock::{CacheLockConfig, CoordinationLockConfig, ProviderKind};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

pub const LOCK_PROVIDER: &str = "lockbank.lock.provider";
pub const CACHE_KEY_PREFIX: &str = "lockbank.lock.cache.key-prefix";
pub const CACHE_RETRY_INTERVAL_MS: &str = "lockbank.lock.cache.retry-interval-ms";
pub const CACHE_MAX_RETRY_INTERVAL_MS: &str = "lockbank.lock.cache.max-retry-interval-ms";
pub const CACHE_BACKOFF_MULTIPLIER: &str = "lockbank.lock.cache.backoff-multiplier";
pub const CACHE_REDIS_URL: &str = "lockbank.lock.cache.redis-url";
pub const COORDINATION_ROOT: &str = "lockbank.lock.coordination.root";
pub const COORDINATION_POLL_INTERVAL_MS: &str = "lockbank.lock.coordination.poll-interval-ms";
pub const TRANSFER_LOCK_WAIT_MS: &str = "lockbank.transfer.lock-wait-ms";
pub const TRANSFER_LOCK_LEASE_MS: &str = "lockbank.transfer.lock-lease-ms";
pub const TRANSFER_KEY_NAMESPACE: &str = "lockbank.transfer.key-namespace";
pub const LOGS_PATH: &str = "lockbank.logs.path";
pub const LOGS_LEVEL: &str = "lockbank.logs.level";
pub const LOGS_CONSOLE: &str = "lockbank.logs.console";
pub const LOGS_FILE: &str = "lockbank.logs.file";

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "lockbank-server", version, about = "LockBank administrative tool")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    /// Initially active lock provider
    #[arg(short = 'p', long = "provider")]
    pub provider: Option<String>,
    /// Redis URL for the cache provider; the in-process store is used when unset
    #[arg(long = "redis-url", env = "LOCKBANK_REDIS_URL")]
    pub redis_url: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print provider status and lock statistics
    Status,
    /// Switch the active lock provider
    Switch { provider: String },
    /// Probe whether a provider's backend is reachable
    Available { provider: String },
    /// Release a lock regardless of its holder
    ForceUnlock {
        key: String,
        /// Provider to release on; defaults to the active one
        #[arg(long)]
        provider: Option<String>,
    },
    /// Run the two-account transfer scenario
    Demo,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        Self::load(&cli.config_file, cli.provider.clone(), cli.redis_url.clone())
    }

    pub fn load(
        config_file: &str,
        provider: Option<String>,
        redis_url: Option<String>,
    ) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(config::File::with_name(config_file).required(false))
            .add_source(
                Environment::with_prefix("lockbank")
                    .prefix_separator("__")
                    .separator("__")
                    .keep_prefix(true)
                    .try_parsing(true),
            );

        if let Some(v) = provider {
            builder = builder.set_override(LOCK_PROVIDER, v)?;
        }
        if let Some(v) = redis_url {
            builder = builder.set_override(CACHE_REDIS_URL, v)?;
        }

        let config = builder
            .build()
            .with_context(|| format!("Failed to build configuration from {}", config_file))?;

        Ok(Configuration { config })
    }

    fn millis(&self, key: &str, default: u64) -> Duration {
        let ms = self
            .config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default);
        Duration::from_millis(ms)
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_provider(&self) -> anyhow::Result<ProviderKind> {
        let name = self
            .config
            .get_string(LOCK_PROVIDER)
            .unwrap_or(ProviderKind::Cache.as_str().to_string());
        Ok(name.parse::<ProviderKind>()?)
    }

    pub fn redis_url(&self) -> Option<String> {
        self.config
            .get_string(CACHE_REDIS_URL)
            .ok()
            .filter(|url| !url.trim().is_empty())
    }

    pub fn cache_lock_config(&self) -> CacheLockConfig {
        let defaults = CacheLockConfig::default();
        CacheLockConfig {
            key_prefix: self
                .config
                .get_string(CACHE_KEY_PREFIX)
                .unwrap_or(defaults.key_prefix),
            retry_interval: self.millis(CACHE_RETRY_INTERVAL_MS, 10),
            max_retry_interval: self.millis(CACHE_MAX_RETRY_INTERVAL_MS, 200),
            backoff_multiplier: self
                .config
                .get_float(CACHE_BACKOFF_MULTIPLIER)
                .unwrap_or(defaults.backoff_multiplier),
        }
    }

    pub fn coordination_lock_config(&self) -> CoordinationLockConfig {
        let defaults = CoordinationLockConfig::default();
        CoordinationLockConfig {
            root: self
                .config
                .get_string(COORDINATION_ROOT)
                .unwrap_or(defaults.root),
            poll_interval: self.millis(COORDINATION_POLL_INTERVAL_MS, 50),
        }
    }

    // ========================================================================
    // Transfer Configuration
    // ========================================================================

    pub fn transfer_config(&self) -> TransferConfig {
        let defaults = TransferConfig::default();
        TransferConfig {
            lock_wait: self.millis(TRANSFER_LOCK_WAIT_MS, 3000),
            lock_lease: self.millis(TRANSFER_LOCK_LEASE_MS, 10_000),
            key_namespace: self
                .config
                .get_string(TRANSFER_KEY_NAMESPACE)
                .unwrap_or(defaults.key_namespace),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    /// `LOCKBANK_LOG_*` variables first, then any `lockbank.logs.*` keys on top
    pub fn logging_config(&self) -> LoggingConfig {
        let env = LoggingConfig::from_env();
        let level = self
            .config
            .get_string(LOGS_LEVEL)
            .unwrap_or(env.console_level.to_string());

        LoggingConfig::from_config(
            self.config
                .get_string(LOGS_PATH)
                .ok()
                .or_else(|| Some(env.log_dir.display().to_string())),
            self.config
                .get_bool(LOGS_CONSOLE)
                .unwrap_or(env.console_output),
            self.config.get_bool(LOGS_FILE).unwrap_or(env.file_logging),
            level,
        )
    }
}
