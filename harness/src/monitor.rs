//! Background power-draw monitor.
//!
//! One monitor spans the whole run: started before the firmware upload, stopped
//! after the last dependent test. It samples the energy meter on its own task
//! and accumulates into a private buffer; the aggregated statistics are handed
//! off exactly once, at the stop/join handshake, so nothing touches the shared
//! result tree concurrently.

use crate::config::Bounds;
use crate::instruments::{PowerSample, PowerSampler};
use report::{SubTestResult, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Power-monitor lifecycle errors.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// `start` was called twice, or the monitor was built without a sampler.
    #[error("power monitor already started")]
    AlreadyStarted,

    /// `stop` was called before `start`.
    #[error("power monitor not started")]
    NotStarted,

    /// The meter could not be opened when starting.
    #[error("power monitor failed to start: {reason}")]
    StartFailed { reason: String },

    /// The sampling task panicked or was cancelled.
    #[error("power monitor task failed: {reason}")]
    TaskFailed { reason: String },
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Running min/avg/max accumulator for voltage and current.
#[derive(Debug, Clone, Copy)]
struct PowerStats {
    count: u64,
    v_min: f64,
    v_max: f64,
    v_sum: f64,
    i_min: f64,
    i_max: f64,
    i_sum: f64,
}

impl PowerStats {
    fn new() -> Self {
        Self {
            count: 0,
            v_min: f64::INFINITY,
            v_max: f64::NEG_INFINITY,
            v_sum: 0.0,
            i_min: f64::INFINITY,
            i_max: f64::NEG_INFINITY,
            i_sum: 0.0,
        }
    }

    fn record(&mut self, sample: PowerSample) {
        self.count += 1;
        self.v_min = self.v_min.min(sample.volts);
        self.v_max = self.v_max.max(sample.volts);
        self.v_sum += sample.volts;
        self.i_min = self.i_min.min(sample.amps);
        self.i_max = self.i_max.max(sample.amps);
        self.i_sum += sample.amps;
    }
}

struct RunningMonitor {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<PowerStats>,
}

/// Handle for the background power monitor, owned by the sequencer for the
/// run's lifetime.
pub struct PowerMonitor {
    sampler: Option<Box<dyn PowerSampler>>,
    interval: Duration,
    voltage_range: Bounds,
    current_range: Bounds,
    running: Option<RunningMonitor>,
}

impl PowerMonitor {
    pub fn new(
        sampler: Box<dyn PowerSampler>,
        interval: Duration,
        voltage_range: Bounds,
        current_range: Bounds,
    ) -> Self {
        Self {
            sampler: Some(sampler),
            interval,
            voltage_range,
            current_range,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Open the meter and start sampling in the background.
    ///
    /// Takes one probe sample synchronously so an unreachable meter fails the
    /// start call instead of silently producing an empty run.
    pub async fn start(&mut self) -> MonitorResult<()> {
        if self.running.is_some() {
            return Err(MonitorError::AlreadyStarted);
        }
        let mut sampler = self.sampler.take().ok_or(MonitorError::AlreadyStarted)?;

        let first = match sampler.sample().await {
            Ok(sample) => sample,
            Err(err) => {
                self.sampler = Some(sampler);
                return Err(MonitorError::StartFailed {
                    reason: err.to_string(),
                });
            }
        };

        let interval = self.interval;
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let mut stats = PowerStats::new();
            stats.record(first);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        match sampler.sample().await {
                            Ok(sample) => stats.record(sample),
                            // A dropped sample is not fatal; the stats simply
                            // cover fewer points.
                            Err(err) => warn!("power sample failed: {err}"),
                        }
                    }
                }
            }
            debug!("power monitor collected {} samples", stats.count);
            stats
        });

        self.running = Some(RunningMonitor { stop_tx, join });
        Ok(())
    }

    /// Signal the sampling task to stop, wait for it to finish, and fold the
    /// accumulated statistics into sub-test records.
    pub async fn stop(&mut self) -> MonitorResult<Vec<SubTestResult>> {
        let running = self.running.take().ok_or(MonitorError::NotStarted)?;

        // The task may already have exited; a failed send just means the stop
        // raced its completion.
        let _ = running.stop_tx.send(());
        let stats = running.join.await.map_err(|err| MonitorError::TaskFailed {
            reason: err.to_string(),
        })?;

        Ok(self.summarize(&stats))
    }

    fn summarize(&self, stats: &PowerStats) -> Vec<SubTestResult> {
        if stats.count == 0 {
            return vec![SubTestResult::new("Power monitor", false)
                .with_value(Value::scalar("error", "no samples collected"))];
        }

        let v_avg = stats.v_sum / stats.count as f64;
        let i_avg = stats.i_sum / stats.count as f64;

        let voltage = |name: &str, volts: f64| {
            SubTestResult::new(name, self.voltage_range.contains(volts))
                .with_value(Value::scalar("measured", format!("{volts:.3} V")))
        };
        let current = |name: &str, amps: f64| {
            SubTestResult::new(name, self.current_range.contains(amps))
                .with_value(Value::scalar("measured", format!("{amps:.9} A")))
        };

        vec![
            voltage("Voltage minimum", stats.v_min),
            voltage("Voltage average", v_avg),
            voltage("Voltage maximum", stats.v_max),
            current("Current minimum", stats.i_min),
            current("Current average", i_avg),
            current("Current maximum", stats.i_max),
        ]
    }
}
