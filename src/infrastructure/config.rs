use crate::application::data_source::SourceSettings;
use crate::domain::query::{DriverFilter, QueryParams, TimeRange};
use chrono::{DateTime, Utc};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub api: ApiSettings,
    pub realtime: RealtimeSettings,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub query: QueryDefaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeSettings {
    pub base_url: String,
    #[serde(default)]
    pub compress_frames: bool,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

impl RealtimeSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Delays are expressed in time units so the whole schedule can be scaled at once
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub time_unit_ms: u64,
    pub settle_units: f64,
    pub fallback_units: f64,
    pub reconnect_units: f64,
    pub max_reconnect_attempts: u32,
    pub cycle_timeout_units: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: 1000,
            settle_units: 0.5,
            fallback_units: 1.0,
            reconnect_units: 5.0,
            max_reconnect_attempts: 3,
            cycle_timeout_units: 10.0,
        }
    }
}

impl TimingConfig {
    fn units(&self, units: f64) -> Duration {
        let micros = self.time_unit_ms as f64 * units.max(0.0) * 1000.0;
        Duration::from_micros(micros.round() as u64)
    }

    pub fn to_settings(&self) -> SourceSettings {
        SourceSettings {
            settle_delay: self.units(self.settle_units),
            fallback_delay: self.units(self.fallback_units),
            reconnect_delay: self.units(self.reconnect_units),
            max_reconnect_attempts: self.max_reconnect_attempts,
            cycle_timeout: self.units(self.cycle_timeout_units),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryDefaults {
    pub time_range: TimeRange,
    pub driver: String,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            time_range: TimeRange::Week,
            driver: "all".to_string(),
        }
    }
}

impl QueryDefaults {
    pub fn to_params(&self, now: DateTime<Utc>) -> QueryParams {
        let mut params = QueryParams::for_range(self.time_range, now);
        params.driver_filter = DriverFilter::from(self.driver.clone());
        params
    }
}

pub fn load_reports_config() -> anyhow::Result<ReportsConfig> {
    build_config(config::Config::builder().add_source(File::with_name("config/reports")))
}

/// Layer `REPORTS__SECTION__KEY` environment overrides on top of the given sources
fn build_config(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<ReportsConfig> {
    let settings = builder
        .add_source(Environment::with_prefix("REPORTS").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
