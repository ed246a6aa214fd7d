use std::{fs, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// parameters for the shared counter scenario
    pub counters: CounterConfig,
    /// parameters for the hold-and-contend scenario
    pub simple_lock: HoldConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CounterConfig {
    /// number of threads incrementing the shared counter
    pub threads: usize,
    /// lock/increment/unlock cycles per thread
    pub iterations: u64,
    /// cpu cores onto which the counter threads are pinned round robin.
    /// Empty means no pinning
    pub pin_cpus: Vec<usize>,
}

impl Default for CounterConfig {
    fn default() -> Self {
        CounterConfig {
            threads: 5,
            iterations: 100_000,
            pin_cpus: Vec::new(),
        }
    }
}

impl CounterConfig {
    /// Core the counter thread with index `id` should be pinned to, if any
    pub fn cpu_for(&self, id: usize) -> Option<usize> {
        if self.pin_cpus.is_empty() {
            None
        } else {
            Some(self.pin_cpus[id % self.pin_cpus.len()])
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HoldConfig {
    /// how long the holder thread keeps the lock, in milliseconds
    pub hold_ms: u64,
    /// how long the contender waits after the holder locked before it tries to lock, in milliseconds
    pub contender_delay_ms: u64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        HoldConfig {
            hold_ms: 100,
            contender_delay_ms: 10,
        }
    }
}

impl HoldConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }

    pub fn contender_delay(&self) -> Duration {
        Duration::from_millis(self.contender_delay_ms)
    }
}

pub fn parse_config(config_file_path: &str) -> Result<Config> {
    let config = fs::read_to_string(config_file_path)
        .context(format!("failed to read config from {}", config_file_path))?;

    toml::from_str(&config).context("failed to parse config file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.counters.threads, 5);
        assert_eq!(cfg.counters.iterations, 100_000);
        assert!(cfg.counters.pin_cpus.is_empty());
        assert_eq!(cfg.simple_lock.hold(), Duration::from_millis(100));
        assert_eq!(cfg.simple_lock.contender_delay(), Duration::from_millis(10));
    }

    #[test]
    fn partial_config_overrides_fields() {
        let cfg: Config = toml::from_str(
            r#"
            [counters]
            threads = 8
            pin_cpus = [0, 2]

            [simple_lock]
            hold_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.counters.threads, 8);
        assert_eq!(cfg.counters.iterations, 100_000);
        assert_eq!(cfg.counters.cpu_for(0), Some(0));
        assert_eq!(cfg.counters.cpu_for(3), Some(2));
        assert_eq!(cfg.simple_lock.hold_ms, 250);
        assert_eq!(cfg.simple_lock.contender_delay_ms, 10);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_config("/nonexistent/tester-config.toml").is_err());
    }
}
