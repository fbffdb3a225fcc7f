use chrono::{FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortalConfig {
    /// Directory holding exported invoice tables, one `<contract>.json` per contract
    pub snapshot_dir: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_watchdog_timeout_secs")]
    pub watchdog_timeout_secs: u64,
    #[serde(default = "default_watchdog_poll_secs")]
    pub watchdog_poll_secs: u64,
    #[serde(default = "default_connectivity_probe")]
    pub connectivity_probe: String,
    #[serde(default = "default_connectivity_poll_secs")]
    pub connectivity_poll_secs: u64,
    #[serde(default = "default_login_backoff_secs")]
    pub login_backoff_secs: u64,
    #[serde(default = "default_login_backoff_cap_secs")]
    pub login_backoff_cap_secs: u64,
    /// Offset used to decide what "today" is. Defaults to São Paulo (UTC-3).
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    2
}

fn default_watchdog_timeout_secs() -> u64 {
    300
}

fn default_watchdog_poll_secs() -> u64 {
    10
}

fn default_connectivity_probe() -> String {
    "8.8.8.8:53".to_string()
}

fn default_connectivity_poll_secs() -> u64 {
    60
}

fn default_login_backoff_secs() -> u64 {
    60
}

fn default_login_backoff_cap_secs() -> u64 {
    3600
}

fn default_utc_offset_hours() -> i32 {
    -3
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_retries: default_max_retries(),
            watchdog_timeout_secs: default_watchdog_timeout_secs(),
            watchdog_poll_secs: default_watchdog_poll_secs(),
            connectivity_probe: default_connectivity_probe(),
            connectivity_poll_secs: default_connectivity_poll_secs(),
            login_backoff_secs: default_login_backoff_secs(),
            login_backoff_cap_secs: default_login_backoff_cap_secs(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl ReconcileConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_secs(self.watchdog_poll_secs)
    }

    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_secs(self.connectivity_poll_secs)
    }

    /// Linear login backoff: `login_backoff_secs * attempt`, capped.
    pub fn login_backoff(&self, attempt: u32) -> Duration {
        let secs = self
            .login_backoff_secs
            .saturating_mul(attempt as u64)
            .min(self.login_backoff_cap_secs);
        Duration::from_secs(secs)
    }

    pub fn utc_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow::anyhow!("Invalid UTC offset: {} hours", self.utc_offset_hours))
    }

    /// Calendar date in the configured offset
    pub fn today(&self) -> anyhow::Result<NaiveDate> {
        Ok(Utc::now().with_timezone(&self.utc_offset()?).date_naive())
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("BREE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_backoff_grows_linearly_then_caps() {
        let cfg = ReconcileConfig::default();
        assert_eq!(cfg.login_backoff(1), Duration::from_secs(60));
        assert_eq!(cfg.login_backoff(5), Duration::from_secs(300));
        assert_eq!(cfg.login_backoff(100), Duration::from_secs(3600));
    }

    #[test]
    fn default_offset_is_sao_paulo() {
        let cfg = ReconcileConfig::default();
        assert_eq!(cfg.utc_offset().unwrap().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let cfg = ReconcileConfig {
            utc_offset_hours: 30,
            ..ReconcileConfig::default()
        };
        assert!(cfg.utc_offset().is_err());
    }
}
