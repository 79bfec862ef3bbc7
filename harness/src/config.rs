//! Bench configuration for a validation run.
//!
//! Everything a run needs to know about the rig lives here: COM port names, the
//! trigger pin wired from the chip to the logic analyzer, acceptable reference
//! voltage ranges, the clock table, and the power-draw thresholds. Values are
//! loaded from a TOML file; every field has a default matching the reference
//! bench so a missing file still produces a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ParseFailed {
        path: String,
        source: toml::de::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// An inclusive numeric acceptance range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies within the range, endpoints included.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One on-chip clock to check against its expected frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSpec {
    /// Clock name, e.g. "HFCLK".
    pub name: String,
    /// Expected frequency in Hz.
    pub expected_hz: f64,
    /// Allowed deviation in parts per million.
    pub tolerance_ppm: f64,
    /// Mux-controller command that routes this clock to the scope channel.
    pub mux_command: String,
}

impl ClockSpec {
    /// Deviation of `measured_hz` from the expected frequency, in ppm.
    pub fn deviation_ppm(&self, measured_hz: f64) -> f64 {
        ((self.expected_hz - measured_hz) / self.expected_hz) * 1_000_000.0
    }

    pub fn within_tolerance(&self, measured_hz: f64) -> bool {
        self.deviation_ppm(measured_hz).abs() <= self.tolerance_ppm
    }
}

/// Metadata for one firmware binary under validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinarySpec {
    /// Path to the binary file.
    pub path: String,
    /// Branch it was built from.
    #[serde(default)]
    pub branch: String,
    /// Last commit hash this binary was validated at, if any.
    #[serde(default)]
    pub last_hash: Option<String>,
}

/// Full bench configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Name of the unit in the result tree and report.
    pub unit_name: String,
    /// COM port of the nRF board used to flash the chip.
    pub flash_port: String,
    /// COM port of the chip's own serial interface.
    pub serial_port: String,
    /// COM port of the mux-controller board.
    pub mux_port: String,
    /// Logic-analyzer DIO pin carrying the ready trigger from the chip.
    /// Hard-coded to 1 in the validation firmware.
    pub trigger_pin: u8,
    /// Seconds to wait for a trigger edge before marking the test failed.
    pub trigger_timeout_secs: u64,
    /// Acceptable range for the 1.1 V reference.
    pub voltage_range_1v1: Bounds,
    /// Acceptable range for the 1.8 V reference.
    pub voltage_range_1v8: Bounds,
    /// Clocks to verify.
    pub clocks: Vec<ClockSpec>,
    /// Acceptable supply voltage range for the power monitor.
    pub power_voltage_range: Bounds,
    /// Acceptable supply current range for the power monitor.
    pub power_current_range: Bounds,
    /// Seconds between power-monitor samples.
    pub power_sample_interval_ms: u64,
    /// Binaries tracked for nightly-style runs.
    pub binaries: Vec<BinarySpec>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            unit_name: "SCuM-Validation".to_string(),
            flash_port: "COM8".to_string(),
            serial_port: "COM11".to_string(),
            mux_port: "COM10".to_string(),
            trigger_pin: 1,
            trigger_timeout_secs: 120,
            voltage_range_1v1: Bounds::new(1.0, 1.2),
            voltage_range_1v8: Bounds::new(1.7, 1.9),
            clocks: vec![
                ClockSpec {
                    name: "HFCLK".to_string(),
                    expected_hz: 20_000_000.0,
                    tolerance_ppm: 40.0,
                    mux_command: "1_5".to_string(),
                },
                ClockSpec {
                    name: "LFCLK".to_string(),
                    expected_hz: 20_000_000.0,
                    tolerance_ppm: 40.0,
                    mux_command: "1_15".to_string(),
                },
            ],
            power_voltage_range: Bounds::new(1.0, 1.3),
            power_current_range: Bounds::new(0.00001, 0.1),
            power_sample_interval_ms: 250,
            binaries: Vec::new(),
        }
    }
}

impl ValidationConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn trigger_timeout(&self) -> Duration {
        Duration::from_secs(self.trigger_timeout_secs)
    }

    pub fn power_sample_interval(&self) -> Duration {
        Duration::from_millis(self.power_sample_interval_ms)
    }
}
