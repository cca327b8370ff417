use std::env;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use governor::Quota;

use crate::engine::QueryConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,

    // Query engine
    pub probe_workers: usize,
    pub probe_timeout_ms: u64,
    pub discovery_timeout_secs: u64,
    pub master_timeout_ms: u64,
    pub probe_rate_per_sec: u32,

    // Rate limiting configs
    pub update_period_secs: u64,
    pub update_burst_limit: u32,
    pub launch_period_secs: u64,
    pub launch_burst_limit: u32,

    // Collaborator files
    pub geo_db_path: Option<String>,
    pub geo_db_url: Option<String>,
    pub settings_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            probe_workers: 64,
            probe_timeout_ms: 1500,
            discovery_timeout_secs: 5,
            master_timeout_ms: 1500,
            probe_rate_per_sec: 300,
            update_period_secs: 5,
            update_burst_limit: 4,
            launch_period_secs: 5,
            launch_burst_limit: 2,
            geo_db_path: None,
            geo_db_url: None,
            settings_path: "settings.json".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn quota(period_secs: u64, burst: u32) -> Quota {
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(Duration::from_secs(period_secs))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("BIND_ADDRESS", defaults.bind_address),
            port: env_or("PORT", defaults.port),

            probe_workers: env_or("PROBE_WORKERS", defaults.probe_workers),
            probe_timeout_ms: env_or("PROBE_TIMEOUT_MS", defaults.probe_timeout_ms),
            discovery_timeout_secs: env_or("DISCOVERY_TIMEOUT_SECS", defaults.discovery_timeout_secs),
            master_timeout_ms: env_or("MASTER_TIMEOUT_MS", defaults.master_timeout_ms),
            probe_rate_per_sec: env_or("PROBE_RATE_PER_SEC", defaults.probe_rate_per_sec),

            update_period_secs: env_or("UPDATE_PERIOD_SECS", defaults.update_period_secs),
            update_burst_limit: env_or("UPDATE_BURST_LIMIT", defaults.update_burst_limit),
            launch_period_secs: env_or("LAUNCH_PERIOD_SECS", defaults.launch_period_secs),
            launch_burst_limit: env_or("LAUNCH_BURST_LIMIT", defaults.launch_burst_limit),

            geo_db_path: env_opt("GEO_DB_PATH"),
            geo_db_url: env_opt("GEO_DB_URL"),
            settings_path: env_or("SETTINGS_PATH", defaults.settings_path),
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn query(&self) -> QueryConfig {
        QueryConfig {
            probe_workers: self.probe_workers.max(1),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            probe_rate_per_sec: self.probe_rate_per_sec,
        }
    }

    /// Budget for one master, paging included. Capped at half the discovery
    /// window so DNS and the slower masters still fit inside it.
    pub fn master_timeout(&self) -> Duration {
        let discovery = Duration::from_secs(self.discovery_timeout_secs.max(1));
        Duration::from_millis(self.master_timeout_ms.max(1)).min(discovery / 2)
    }

    pub fn update_quota(&self) -> Quota {
        quota(self.update_period_secs, self.update_burst_limit)
    }

    pub fn launch_quota(&self) -> Quota {
        quota(self.launch_period_secs, self.launch_burst_limit)
    }
}
