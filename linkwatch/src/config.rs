//! Layered run settings.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, `LINKWATCH_*` environment variables and command line flags.
//! Nested keys use a double underscore in the environment, e.g.
//! `LINKWATCH_RATES__POSITION=10`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, Map};
use linkwatch_codec::SigningKey;
use linkwatch_types::StreamCategory;
use serde::Deserialize;

use crate::duration::seconds;
use crate::monitor::MonitorConfig;

/// `all_rates` value meaning "use the per-category rates".
pub const INDIVIDUAL_RATES: i32 = -1;

/// Per-category telemetry rates in Hz.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamRates {
    pub raw_sensors: u16,
    pub extended_status: u16,
    pub rc_channels: u16,
    pub position: u16,
    pub extra1: u16,
    pub extra2: u16,
    pub extra3: u16,
}

impl Default for StreamRates {
    fn default() -> Self {
        Self {
            raw_sensors: 4,
            extended_status: 4,
            rc_channels: 4,
            position: 4,
            extra1: 4,
            extra2: 4,
            extra3: 4,
        }
    }
}

impl StreamRates {
    fn get(&self, category: StreamCategory) -> u16 {
        match category {
            StreamCategory::RawSensors => self.raw_sensors,
            StreamCategory::ExtendedStatus => self.extended_status,
            StreamCategory::RcChannels => self.rc_channels,
            StreamCategory::Position => self.position,
            StreamCategory::Extra1 => self.extra1,
            StreamCategory::Extra2 => self.extra2,
            StreamCategory::Extra3 => self.extra3,
        }
    }

    /// Rates to request. Any `all_rates` other than -1 replaces every
    /// individual rate.
    pub fn resolve(&self, all_rates: i32) -> Result<Vec<(StreamCategory, u16)>> {
        if all_rates == INDIVIDUAL_RATES {
            return Ok(StreamCategory::ALL
                .iter()
                .map(|c| (*c, self.get(*c)))
                .collect());
        }
        let rate = u16::try_from(all_rates)
            .with_context(|| format!("all_rates must be -1 or 0..=65535, got {}", all_rates))?;
        Ok(StreamCategory::ALL.iter().map(|c| (*c, rate)).collect())
    }
}

/// Everything needed to configure a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub system_id: Option<u8>,
    pub component_id: Option<u8>,
    /// Seconds; unset runs until interrupted.
    pub duration: Option<f64>,
    /// Seconds without packets before an outage is declared.
    pub outage_timeout: f64,
    pub recovery_hysteresis: u32,
    pub output_dir: PathBuf,
    pub all_rates: i32,
    pub rates: StreamRates,
    pub signing_passphrase: Option<String>,
    pub signing_link_id: Option<u8>,
    pub handshake_timeout: f64,
    pub open_timeout: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_id: None,
            component_id: None,
            duration: None,
            outage_timeout: 1.0,
            recovery_hysteresis: 3,
            output_dir: PathBuf::from("output"),
            all_rates: 4,
            rates: StreamRates::default(),
            signing_passphrase: None,
            signing_link_id: None,
            handshake_timeout: 10.0,
            open_timeout: 10.0,
        }
    }
}

/// Values given on the command line. `None` leaves lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub system_id: Option<u8>,
    pub component_id: Option<u8>,
    pub duration: Option<Duration>,
    pub outage_timeout: Option<Duration>,
    pub recovery_hysteresis: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub all_rates: Option<i32>,
    pub rate_raw_sensors: Option<u16>,
    pub rate_extended_status: Option<u16>,
    pub rate_rc_channels: Option<u16>,
    pub rate_position: Option<u16>,
    pub rate_extra1: Option<u16>,
    pub rate_extra2: Option<u16>,
    pub rate_extra3: Option<u16>,
    pub signing_passphrase: Option<String>,
    pub signing_link_id: Option<u8>,
}

impl Settings {
    /// Load settings from the process environment plus `file` and `overrides`.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        Self::load_with_env(file, None, overrides)
    }

    /// As [`load`](Self::load), with an explicit environment map instead of
    /// the process environment.
    pub fn load_with_env(
        file: Option<&Path>,
        env: Option<Map<String, String>>,
        overrides: &Overrides,
    ) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("LINKWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let rate = |v: Option<u16>| v.map(i64::from);
        let secs = |v: Option<Duration>| v.map(|d| d.as_secs_f64());
        builder = builder
            .set_override_option("system_id", overrides.system_id.map(i64::from))?
            .set_override_option("component_id", overrides.component_id.map(i64::from))?
            .set_override_option("duration", secs(overrides.duration))?
            .set_override_option("outage_timeout", secs(overrides.outage_timeout))?
            .set_override_option(
                "recovery_hysteresis",
                overrides.recovery_hysteresis.map(i64::from),
            )?
            .set_override_option(
                "output_dir",
                overrides
                    .output_dir
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("all_rates", overrides.all_rates.map(i64::from))?
            .set_override_option("rates.raw_sensors", rate(overrides.rate_raw_sensors))?
            .set_override_option("rates.extended_status", rate(overrides.rate_extended_status))?
            .set_override_option("rates.rc_channels", rate(overrides.rate_rc_channels))?
            .set_override_option("rates.position", rate(overrides.rate_position))?
            .set_override_option("rates.extra1", rate(overrides.rate_extra1))?
            .set_override_option("rates.extra2", rate(overrides.rate_extra2))?
            .set_override_option("rates.extra3", rate(overrides.rate_extra3))?
            .set_override_option("signing_passphrase", overrides.signing_passphrase.clone())?
            .set_override_option(
                "signing_link_id",
                overrides.signing_link_id.map(i64::from),
            )?;

        let settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    /// Run length, if bounded.
    pub fn run_duration(&self) -> Result<Option<Duration>> {
        self.duration.map(seconds).transpose()
    }

    /// Build the per-link monitor configuration.
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let Some(system_id) = self.system_id else {
            bail!("A target system id is required (--system-id or system_id in the config)");
        };
        let Some(component_id) = self.component_id else {
            bail!("A target component id is required (--component-id or component_id in the config)");
        };
        if self.recovery_hysteresis == 0 {
            bail!("recovery_hysteresis must be at least 1");
        }

        let mut config = MonitorConfig::new(system_id, component_id)
            .with_output_dir(&self.output_dir)
            .with_outage(seconds(self.outage_timeout)?, self.recovery_hysteresis)
            .with_handshake_timeout(seconds(self.handshake_timeout)?)
            .with_open_timeout(seconds(self.open_timeout)?);
        config.stream_rates = self.rates.resolve(self.all_rates)?;

        if let Some(passphrase) = &self.signing_passphrase {
            config = config.with_signing(
                SigningKey::from_passphrase(passphrase),
                self.signing_link_id,
            );
        }
        Ok(config)
    }
}
