//! Runtime configuration.
//!
//! Every setting is a CLI flag with an environment fallback, so the
//! server can be configured either way:
//!
//!   gridcast --port 8080 serve
//!   WEATHER_API_KEY=... PORT=8080 gridcast

use crate::forecast::client::{DEFAULT_BASE_URL, DEFAULT_NUM_OF_ROWS};
use crate::forecast::slot::DEFAULT_PUBLICATION_DELAY_MINS;
use crate::forecast::{Cadence, FetcherConfig};
use crate::region::{CsvTable, RegionResolver};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing API key: set WEATHER_API_KEY or pass --api-key")]
    MissingApiKey,
    #[error("upstream timeout must be at least one second")]
    InvalidTimeout,
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// data.go.kr service key (the "decoding" variant).
    #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "HOST", default_value = "127.0.0.1", global = true)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000, global = true)]
    pub port: u16,

    /// CSV export of the KMA region/grid spreadsheet.
    #[arg(long, env = "REGION_TABLE", default_value = "data/coordinates.csv", global = true)]
    pub table: PathBuf,

    /// Seconds before the cached region table is re-read.
    #[arg(long, env = "REGION_CACHE_TTL_SECS", default_value_t = 3600, global = true)]
    pub cache_ttl_secs: u64,

    /// Upstream publication schedule: "hourly" or "three-hourly".
    #[arg(long, env = "WEATHER_CADENCE", default_value = "hourly", value_parser = parse_cadence, global = true)]
    pub cadence: Cadence,

    /// Minutes after the hour before hourly data is published.
    #[arg(long, env = "WEATHER_PUBLICATION_DELAY_MINS", default_value_t = DEFAULT_PUBLICATION_DELAY_MINS, global = true)]
    pub publication_delay_mins: u32,

    #[arg(long, env = "WEATHER_UPSTREAM_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub upstream_url: String,

    #[arg(long, env = "WEATHER_TIMEOUT_SECS", default_value_t = 10, global = true)]
    pub timeout_secs: u64,

    #[arg(long, env = "WEATHER_NUM_OF_ROWS", default_value_t = DEFAULT_NUM_OF_ROWS, global = true)]
    pub num_of_rows: u32,
}

fn parse_cadence(s: &str) -> Result<Cadence, String> {
    s.parse()
}

impl Config {
    /// Upstream settings; fails without a usable API key.
    pub fn fetcher_config(&self) -> Result<FetcherConfig, ConfigError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let mut config = FetcherConfig::new(api_key);
        config.base_url = self.upstream_url.clone();
        config.cadence = self.cadence.with_delay(self.publication_delay_mins);
        config.timeout = Duration::from_secs(self.timeout_secs);
        config.num_of_rows = self.num_of_rows;
        Ok(config)
    }

    pub fn resolver(&self) -> RegionResolver {
        RegionResolver::new(
            CsvTable::new(&self.table),
            Duration::from_secs(self.cache_ttl_secs),
        )
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
