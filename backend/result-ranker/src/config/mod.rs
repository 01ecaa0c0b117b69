use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Environment variable prefix for every ranker setting
pub const ENV_PREFIX: &str = "RANKER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ranker: RankerConfig,
    pub redis: RedisConfig,
}

/// Ranking and persistence settings, read from `RANKER_*`
#[derive(Debug, Clone, Deserialize)]
pub struct RankerConfig {
    /// Model output width, also the label buffer capacity
    #[serde(default = "default_output_units")]
    pub output_units: usize,
    /// Minimum spacing between two snapshot writes (ms)
    #[serde(default = "default_debounce_interval_ms")]
    pub debounce_interval_ms: u64,
    /// How long shutdown waits for the last snapshot write (ms)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default)]
    pub storage_strategy: Option<StorageStrategy>,
    /// Role that earns an owner a private ranking under `user-role`
    #[serde(default = "default_ranking_role")]
    pub ranking_role: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Fixed seed for model initialization, random when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Where ranking snapshots are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageStrategy {
    /// Process-local, lost on exit
    Memory,
    /// One Redis key per owner
    Username,
    /// Own Redis key for ranking-role holders, shared default key otherwise
    UserRole,
}

fn default_output_units() -> usize {
    10_000
}

fn default_debounce_interval_ms() -> u64 {
    30_000
}

fn default_shutdown_timeout_ms() -> u64 {
    2_000
}

fn default_ranking_role() -> String {
    "ranker".to_string()
}

fn default_key_prefix() -> String {
    "ranking:nn".to_string()
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            output_units: default_output_units(),
            debounce_interval_ms: default_debounce_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            storage_strategy: None,
            ranking_role: default_ranking_role(),
            key_prefix: default_key_prefix(),
            rng_seed: None,
        }
    }
}

impl RankerConfig {
    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Configured strategy, falling back to per-username storage
    pub fn storage_strategy(&self) -> StorageStrategy {
        match self.storage_strategy {
            Some(strategy) => strategy,
            None => {
                warn!("No ranking storage strategy configured, defaulting to username");
                StorageStrategy::Username
            }
        }
    }

    pub fn with_output_units(mut self, output_units: usize) -> Self {
        self.output_units = output_units;
        self
    }

    pub fn with_debounce_interval(mut self, interval: Duration) -> Self {
        self.debounce_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_storage_strategy(mut self, strategy: StorageStrategy) -> Self {
        self.storage_strategy = Some(strategy);
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit variable set instead of the process environment
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let ranker: RankerConfig = envy::prefixed(ENV_PREFIX).from_iter(vars.iter().cloned())?;
        if ranker.output_units == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}OUTPUT_UNITS must be greater than zero",
                ENV_PREFIX
            )));
        }

        let redis_url = vars
            .iter()
            .find(|(key, _)| key == "REDIS_URL")
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        Ok(Config {
            ranker,
            redis: RedisConfig { url: redis_url },
        })
    }
}
