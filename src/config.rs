//! Service configuration.
//!
//! Layered the usual way: built-in defaults, then the YAML file, then
//! `BATSRV_*` environment variables. `chain` selects and tunes the bus
//! driver, `aux` describes the per-device gas gauge.

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{BatSrvError, Result};

/// Prescaler values the gauge hardware accepts.
const VALID_PRESCALERS: [u16; 7] = [1, 4, 16, 64, 256, 1024, 4096];

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, logs go to a daily rolling file in this directory
    /// instead of the console.
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8086".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

/// What to do when a discovered chain fails to initialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InitFailurePolicy {
    /// Terminate the process; a half-configured chain reads garbage.
    #[default]
    Exit,
    /// Drop the chain and rediscover on the next tick.
    Retry,
}

/// Chain polling and discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Bus driver name. `sim` runs against the simulated chain; hardware
    /// drivers register under their own names.
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Pause after a failed cycle before ticking again, giving a
    /// glitching bus room to settle.
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,
    /// Upper bound on discovery probing.
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,
    #[serde(default)]
    pub on_init_failure: InitFailurePolicy,
    /// Bank count presented by the `sim` driver.
    #[serde(default = "default_sim_banks")]
    pub sim_banks: usize,
}

fn default_driver() -> String {
    "sim".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_failure_backoff_secs() -> u64 {
    2
}

fn default_max_chain_length() -> usize {
    32
}

fn default_sim_banks() -> usize {
    3
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            poll_interval_secs: default_poll_interval_secs(),
            failure_backoff_secs: default_failure_backoff_secs(),
            max_chain_length: default_max_chain_length(),
            on_init_failure: InitFailurePolicy::default(),
            sim_banks: default_sim_banks(),
        }
    }
}

/// Per-device auxiliary gas gauge settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuxConfig {
    /// Gauge address on the auxiliary bus.
    #[serde(default = "default_gauge_address")]
    pub gauge_address: u8,
    /// Current-sense shunt value, sets current and charge scaling.
    #[serde(default = "default_sense_resistor_ohms")]
    pub sense_resistor_ohms: f32,
    /// Coulomb-counter prescaler M as programmed into the gauge.
    #[serde(default = "default_prescaler")]
    pub prescaler: u16,
}

fn default_gauge_address() -> u8 {
    0x64
}

fn default_sense_resistor_ohms() -> f32 {
    0.050
}

fn default_prescaler() -> u16 {
    4096
}

impl Default for AuxConfig {
    fn default() -> Self {
        Self {
            gauge_address: default_gauge_address(),
            sense_resistor_ohms: default_sense_resistor_ohms(),
            prescaler: default_prescaler(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub aux: AuxConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file with `BATSRV_*` env overrides.
    /// Section and key are joined with a double underscore so multi-word
    /// keys stay addressable: `BATSRV_CHAIN__POLL_INTERVAL_SECS=5`.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_prefix(path, "BATSRV_")
    }

    fn load_with_prefix(path: &str, env_prefix: &str) -> Result<Self> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency before the service starts.
    pub fn validate(&self) -> Result<()> {
        self.service
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| BatSrvError::config(format!("invalid bind address '{}': {}", self.service.bind, e)))?;

        if !["trace", "debug", "info", "warn", "error"].contains(&self.service.log_level.as_str()) {
            return Err(BatSrvError::config(format!(
                "unknown log level: {}",
                self.service.log_level
            )));
        }

        if self.chain.driver.is_empty() {
            return Err(BatSrvError::config("chain driver cannot be empty"));
        }

        if self.chain.poll_interval_secs == 0 {
            return Err(BatSrvError::config("poll interval must be at least 1 second"));
        }

        if self.chain.max_chain_length == 0 {
            return Err(BatSrvError::config("max chain length must be at least 1"));
        }

        if self.chain.sim_banks == 0 || self.chain.sim_banks > self.chain.max_chain_length {
            return Err(BatSrvError::config(format!(
                "sim bank count {} outside 1..={}",
                self.chain.sim_banks, self.chain.max_chain_length
            )));
        }

        if self.aux.sense_resistor_ohms <= 0.0 {
            return Err(BatSrvError::config("sense resistor must be positive"));
        }

        if !VALID_PRESCALERS.contains(&self.aux.prescaler) {
            return Err(BatSrvError::config(format!(
                "prescaler {} not one of {:?}",
                self.aux.prescaler, VALID_PRESCALERS
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service.bind, "0.0.0.0:8086");
        assert_eq!(config.chain.driver, "sim");
        assert_eq!(config.chain.poll_interval_secs, 1);
        assert_eq!(config.chain.max_chain_length, 32);
        assert_eq!(config.chain.on_init_failure, InitFailurePolicy::Exit);
        assert_eq!(config.aux.gauge_address, 0x64);
        assert_eq!(config.aux.prescaler, 4096);
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "service:\n  bind: \"127.0.0.1:9000\"\nchain:\n  poll_interval_secs: 5\n  on_init_failure: retry\naux:\n  sense_resistor_ohms: 0.001"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.service.bind, "127.0.0.1:9000");
        assert_eq!(config.chain.poll_interval_secs, 5);
        assert_eq!(config.chain.on_init_failure, InitFailurePolicy::Retry);
        assert!((config.aux.sense_resistor_ohms - 0.001).abs() < 1e-9);
        // Untouched sections keep their defaults
        assert_eq!(config.chain.max_chain_length, 32);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("does/not/exist.yaml").unwrap();
        assert_eq!(config.chain.driver, "sim");
    }

    #[test]
    fn test_env_overrides_reach_multi_word_keys() {
        // Test-local prefix so parallel tests reading BATSRV_* stay clean
        std::env::set_var("BATSRVTEST_SERVICE__BIND", "127.0.0.1:9500");
        std::env::set_var("BATSRVTEST_CHAIN__POLL_INTERVAL_SECS", "9");
        std::env::set_var("BATSRVTEST_CHAIN__ON_INIT_FAILURE", "retry");

        let config =
            AppConfig::load_with_prefix("does/not/exist.yaml", "BATSRVTEST_").unwrap();
        assert_eq!(config.service.bind, "127.0.0.1:9500");
        assert_eq!(config.chain.poll_interval_secs, 9);
        assert_eq!(config.chain.on_init_failure, InitFailurePolicy::Retry);

        std::env::remove_var("BATSRVTEST_SERVICE__BIND");
        std::env::remove_var("BATSRVTEST_CHAIN__POLL_INTERVAL_SECS");
        std::env::remove_var("BATSRVTEST_CHAIN__ON_INIT_FAILURE");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.service.bind = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.chain.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.chain.max_chain_length = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.aux.prescaler = 5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.aux.sense_resistor_ohms = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sim_banks_bounded_by_max_length() {
        let mut config = AppConfig::default();
        config.chain.sim_banks = 40;
        assert!(config.validate().is_err());

        config.chain.max_chain_length = 64;
        assert!(config.validate().is_ok());
    }
}
