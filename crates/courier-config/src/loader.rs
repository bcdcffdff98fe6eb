//! Configuration loader with file and environment variable support

use crate::{AppConfig, BrokerDriver, ConfigError, DispatchStrategy};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "courier.toml",
    "./config/config.toml",
    "/etc/courier/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("COURIER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // Database
        if let Ok(val) = env::var("COURIER_DATABASE_URL") {
            config.database.url = val;
        }
        if let Ok(val) = env::var("COURIER_DATABASE_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                config.database.max_connections = max;
            }
        }

        // Redis
        if let Ok(val) = env::var("COURIER_REDIS_URL") {
            config.redis.url = val;
        }

        // Broker
        if let Ok(val) = env::var("COURIER_BROKER_DRIVER") {
            match val.to_lowercase().as_str() {
                "rabbitmq" => config.broker.driver = BrokerDriver::Rabbitmq,
                "none" => config.broker.driver = BrokerDriver::None,
                _ => {}
            }
        }
        if let Ok(val) = env::var("COURIER_BROKER_URL") {
            config.broker.url = val;
        }
        if let Ok(val) = env::var("COURIER_BROKER_EXCHANGE") {
            config.broker.exchange = val;
        }
        if let Ok(val) = env::var("COURIER_BROKER_EXCHANGE_TYPE") {
            config.broker.exchange_type = val;
        }
        if let Ok(val) = env::var("COURIER_BROKER_QUEUE") {
            config.broker.queue = val;
        }
        if let Ok(val) = env::var("COURIER_BROKER_ROUTING_KEY") {
            config.broker.routing_key = val;
        }
        if let Ok(val) = env::var("COURIER_BROKER_PREFETCH") {
            if let Ok(prefetch) = val.parse() {
                config.broker.prefetch = prefetch;
            }
        }
        if let Ok(val) = env::var("COURIER_BROKER_DURABLE") {
            config.broker.durable = val.parse().unwrap_or(true);
        }

        // Outbox
        if let Ok(val) = env::var("COURIER_OUTBOX_DISPATCH_STRATEGY") {
            match val.to_lowercase().as_str() {
                "direct" => config.outbox.dispatch_strategy = DispatchStrategy::Direct,
                "broker" => config.outbox.dispatch_strategy = DispatchStrategy::Broker,
                _ => {}
            }
        }
        if let Ok(val) = env::var("COURIER_OUTBOX_POLL_INTERVAL_SECS") {
            if let Ok(interval) = val.parse() {
                config.outbox.poll_interval_secs = interval;
            }
        }
        if let Ok(val) = env::var("COURIER_OUTBOX_BATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.outbox.batch_size = size;
            }
        }

        // Import
        if let Ok(val) = env::var("COURIER_IMPORT_TTL_SECONDS") {
            if let Ok(ttl) = val.parse() {
                config.import.default_ttl_seconds = ttl;
            }
        }
        if let Ok(val) = env::var("COURIER_IMPORT_PROCESS_BATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.import.process_batch_size = size;
            }
        }

        // Files
        if let Ok(val) = env::var("COURIER_FILES_ROOT") {
            config.files.root_dir = val;
        }

        // Telegram
        if let Ok(val) = env::var("COURIER_TELEGRAM_API_ID") {
            if let Ok(id) = val.parse() {
                config.telegram.api_id = id;
            }
        }
        if let Ok(val) = env::var("COURIER_TELEGRAM_API_HASH") {
            config.telegram.api_hash = val;
        }

        // WhatsApp
        if let Ok(val) = env::var("COURIER_WHATSAPP_BASE_URL") {
            config.whatsapp.base_url = val;
        }
        if let Ok(val) = env::var("COURIER_WHATSAPP_API_KEY") {
            config.whatsapp.api_key = val;
        }

        // Worker
        if let Ok(val) = env::var("COURIER_METRICS_PORT") {
            if let Ok(port) = val.parse() {
                config.worker.metrics_port = port;
            }
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [redis]
            url = "redis://cache:6379"
            "#
        )
        .unwrap();

        let loader = ConfigLoader::with_path(file.path());
        let config = loader.load().unwrap();
        assert_eq!(config.redis.url, "redis://cache:6379");
    }

    #[test]
    fn test_missing_explicit_path_falls_back_to_defaults() {
        let loader = ConfigLoader::with_path("/nonexistent/courier.toml");
        let config = loader.load().unwrap();
        assert_eq!(config.outbox.batch_size, 50);
    }
}
