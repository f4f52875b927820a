//! EV Monitor
//!
//! Process wiring for the acquisition pipeline: configuration from the
//! environment, logging setup and the observers the binary registers.
//!
//! The binary runs without a location-fix source. Records still carry the
//! location keys, left unknown, with `fix_mode` 0. Embedders with a receiver
//! wrap it in [`obd_scheduler::GpsPoller`] and hand the poller to
//! [`obd_scheduler::CycleRunner::with_location`].

use anyhow::{anyhow, Context};
use obd_protocol::LinkConfig;
use obd_scheduler::{Observer, ObserverResult, SchedulerConfig};
use pid_decoder::SampleRecord;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Environment variable prefix, e.g. `EVMON_LINK__DEVICE=/dev/rfcomm0`
pub const ENV_PREFIX: &str = "EVMON";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Vehicle model, see [`obd_scheduler::vehicle_for`]
    pub vehicle: String,
    /// Protocol override (e.g., "CAN_11_500"); the model's own when unset
    pub protocol: Option<String>,
    /// Measured supply voltage to calibrate the adapter against
    pub voltage_calibration: Option<f64>,
    /// Records buffered for the output task
    pub channel_capacity: usize,
    pub link: LinkConfig,
    pub scheduler: SchedulerConfig,
    pub log: LogConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            vehicle: "IoniqBev".to_string(),
            protocol: None,
            voltage_calibration: None,
            channel_capacity: 16,
            link: LinkConfig::default(),
            scheduler: SchedulerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `EVMON_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        Self::from_environment(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn from_environment(environment: config::Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Config::try_from(&Self::default())
                    .context("encoding default configuration")?,
            )
            .add_source(environment)
            .build()
            .context("reading configuration")?;
        settings
            .try_deserialize()
            .context("invalid configuration")
    }
}

/// Initialize logging
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let level = Level::from_str(&config.level)
        .map_err(|_| anyhow!("unknown log level {:?}", config.level))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// Logs the headline values of every record
#[derive(Debug, Default)]
pub struct SummaryLogger;

impl Observer for SummaryLogger {
    fn on_record(&self, record: &SampleRecord) -> ObserverResult {
        let show = |key: &str| {
            record
                .number(key)
                .map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
        };
        info!(
            "SOC {}% (display {}%), battery {} V / {} A / {} kW, speed {}",
            show("SOC_BMS"),
            show("SOC_DISPLAY"),
            show("dcBatteryVoltage"),
            show("dcBatteryCurrent"),
            show("dcBatteryPower"),
            show("speed"),
        );
        Ok(())
    }
}
