use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::retry::RetryPolicy;
use crate::store::StorePaths;

const SETTINGS_FILE: &str = "harvest";
const ENV_PREFIX: &str = "HARVEST";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub base_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    /// Buffered records that trigger a snapshot compaction.
    pub batch_size: usize,
    pub settle_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    /// Consecutive listing rows older than the cutoff that end a crawl.
    pub stale_row_threshold: u32,
    pub element_timeout_secs: u64,
}

impl Settings {
    /// Defaults, then `harvest.{toml,json,yaml}` if present, then `HARVEST_*` env vars.
    pub fn load() -> Result<Self> {
        defaults()?
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn store_paths(&self) -> StorePaths {
        StorePaths::in_dir(&self.data_dir)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("data_dir", "data")?
        .set_default("base_url", "https://nuri.g2b.go.kr/")?
        .set_default("webdriver_url", "http://localhost:9515")?
        .set_default("headless", true)?
        .set_default("batch_size", 10_i64)?
        .set_default("settle_ms", 1000_i64)?
        .set_default("retry_attempts", 3_i64)?
        .set_default("retry_delay_secs", 2_i64)?
        .set_default("stale_row_threshold", 3_i64)?
        .set_default("element_timeout_secs", 10_i64)?)
}
