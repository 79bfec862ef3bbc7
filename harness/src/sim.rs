//! A simulated bench rig.
//!
//! Implements every instrument seam and collaborator against plausible in-memory
//! behavior, so the full sequencer path runs without any hardware attached. Used
//! by the integration tests and by the `sample-report` command.

use crate::config::ClockSpec;
use crate::instruments::{
    InstrumentError, InstrumentResult, MuxPort, PowerSample, PowerSampler, TriggerSource,
};
use crate::registry::{RunnerError, RunnerResult, TestContext, TestRunner};
use async_trait::async_trait;
use rand::Rng;
use report::{SubTestResult, Value};
use std::time::Duration;
use tracing::debug;

/// Trigger that fires after a fixed delay, or never.
pub struct SimTrigger {
    delay: Duration,
    fires: bool,
}

impl SimTrigger {
    pub fn new(delay: Duration) -> Self {
        Self { delay, fires: true }
    }

    /// A trigger that never raises an edge, for exercising the timeout path.
    pub fn silent() -> Self {
        Self {
            delay: Duration::ZERO,
            fires: false,
        }
    }
}

#[async_trait]
impl TriggerSource for SimTrigger {
    async fn wait_for_edge(&mut self, pin: u8) -> InstrumentResult<()> {
        if !self.fires {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        debug!("simulated rising edge on pin {pin}");
        Ok(())
    }
}

/// Mux controller that records every routing command it receives.
#[derive(Default)]
pub struct SimMux {
    pub commands: Vec<String>,
}

#[async_trait]
impl MuxPort for SimMux {
    async fn send_command(&mut self, command: &str) -> InstrumentResult<()> {
        self.commands.push(command.to_string());
        Ok(())
    }
}

/// Energy meter producing readings uniformly within the given envelopes.
pub struct SimPowerSampler {
    volts: (f64, f64),
    amps: (f64, f64),
}

impl SimPowerSampler {
    pub fn new(volts: (f64, f64), amps: (f64, f64)) -> Self {
        Self { volts, amps }
    }

    /// Readings that sit comfortably inside the default acceptance ranges.
    pub fn nominal() -> Self {
        Self::new((1.09, 1.12), (0.001, 0.003))
    }
}

#[async_trait]
impl PowerSampler for SimPowerSampler {
    async fn sample(&mut self) -> InstrumentResult<PowerSample> {
        let mut rng = rand::thread_rng();
        Ok(PowerSample {
            volts: rng.gen_range(self.volts.0..self.volts.1),
            amps: rng.gen_range(self.amps.0..self.amps.1),
        })
    }
}

/// Firmware upload that flashes instantly, or refuses with a busy port.
pub struct SimUpload {
    pub fail: bool,
}

#[async_trait]
impl TestRunner for SimUpload {
    async fn run(&mut self, ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
        if self.fail {
            return Err(RunnerError::Instrument(InstrumentError::Unavailable {
                reason: format!("port busy: {}", ctx.config.flash_port),
            }));
        }
        Ok(vec![SubTestResult::new("flash", true)
            .with_value(Value::scalar(
                "binary name",
                ctx.binary.display().to_string(),
            ))
            .with_value(Value::scalar("port", ctx.config.flash_port.clone()))])
    }
}

/// Radio self test that reports a fixed noise-floor reading.
pub struct SimSelfCheck;

#[async_trait]
impl TestRunner for SimSelfCheck {
    async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
        Ok(vec![SubTestResult::new("spectrum analyzer reachable", true)
            .with_value(Value::scalar("noise floor (dBm)", -95.0))])
    }
}

/// Digital I/O check: one sub-test per GPIO pin.
pub struct SimDigital {
    pub pins: Vec<u8>,
    pub stuck_pins: Vec<u8>,
}

impl SimDigital {
    pub fn all_good(pins: Vec<u8>) -> Self {
        Self {
            pins,
            stuck_pins: Vec::new(),
        }
    }
}

#[async_trait]
impl TestRunner for SimDigital {
    async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
        Ok(self
            .pins
            .iter()
            .map(|pin| {
                let stuck = self.stuck_pins.contains(pin);
                let mut record = SubTestResult::new(&format!("pin {pin}"), !stuck);
                if stuck {
                    record = record.with_value(Value::scalar("error", "no toggling observed"));
                }
                record
            })
            .collect())
    }
}

/// Analog check: reference voltages plus every configured clock, routed through
/// the mux controller.
pub struct SimAnalog {
    pub v1v1: f64,
    pub v1v8: f64,
    /// Simulated deviation applied to each clock, in ppm.
    pub clock_skew_ppm: f64,
}

impl SimAnalog {
    pub fn nominal() -> Self {
        Self {
            v1v1: 1.1,
            v1v8: 1.8,
            clock_skew_ppm: 5.0,
        }
    }

    fn measured_hz(&self, clock: &ClockSpec) -> f64 {
        clock.expected_hz * (1.0 - self.clock_skew_ppm / 1_000_000.0)
    }
}

#[async_trait]
impl TestRunner for SimAnalog {
    async fn run(&mut self, ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
        let mut results = vec![
            SubTestResult::new(
                "1.1V reference",
                ctx.config.voltage_range_1v1.contains(self.v1v1),
            )
            .with_value(Value::scalar("measured (V)", self.v1v1)),
            SubTestResult::new(
                "1.8V reference",
                ctx.config.voltage_range_1v8.contains(self.v1v8),
            )
            .with_value(Value::scalar("measured (V)", self.v1v8)),
        ];

        let clocks = ctx.config.clocks.clone();
        for clock in &clocks {
            ctx.mux()?.send_command(&clock.mux_command).await?;
            let measured = self.measured_hz(clock);
            results.push(
                SubTestResult::new(&clock.name, clock.within_tolerance(measured))
                    .with_value(Value::scalar("measured (Hz)", measured))
                    .with_value(Value::scalar(
                        "deviation (ppm)",
                        clock.deviation_ppm(measured),
                    )),
            );
        }
        // Route the mux back to its neutral position.
        ctx.mux()?.send_command("2_0").await?;
        Ok(results)
    }
}

/// Serial check: sweeps candidate baud rates and reports the best one.
pub struct SimSerialBaud {
    pub best_baud: u32,
}

#[async_trait]
impl TestRunner for SimSerialBaud {
    async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
        let candidates = [9_600u32, 19_200, 57_600, 115_200];
        let error_rates: Vec<f64> = candidates
            .iter()
            .map(|&baud| {
                if baud == self.best_baud {
                    0.0
                } else {
                    0.02 + (baud as f64 - self.best_baud as f64).abs() / 1.0e7
                }
            })
            .collect();
        let found = candidates.contains(&self.best_baud);
        Ok(vec![SubTestResult::new("baud sweep", found)
            .with_value(Value::scalar("best baud", self.best_baud))
            .with_value(Value::series("error rate per candidate", error_rates))])
    }
}

/// Radio TX/RX check reporting signal strength over time.
pub struct SimRadio {
    pub avg_db: f64,
}

impl SimRadio {
    pub fn nominal() -> Self {
        Self { avg_db: 42.0 }
    }
}

#[async_trait]
impl TestRunner for SimRadio {
    async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
        let signal: Vec<(f64, f64)> = (0..20)
            .map(|i| {
                let t = i as f64 * 0.1;
                (t, self.avg_db + (t * 3.0).sin() * 2.0)
            })
            .collect();
        Ok(vec![SubTestResult::new("Signal Over Time", true)
            .with_value(Value::pairs("Signal", signal))
            .with_value(Value::axis_labels("Time (s)", "signal (dB)"))
            .with_value(Value::scalar("Avg dB (dB)", self.avg_db))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;

    fn ctx_with_mux() -> TestContext {
        TestContext::new(ValidationConfig::default(), "valScript.bin")
            .with_mux(Box::new(SimMux::default()))
    }

    #[tokio::test]
    async fn analog_routes_each_clock_then_resets_the_mux() {
        let mut ctx = ctx_with_mux();
        let results = SimAnalog::nominal().run(&mut ctx).await.unwrap();

        // 1.1V, 1.8V, then one record per configured clock.
        assert_eq!(results.len(), 2 + ctx.config.clocks.len());
        assert!(results.iter().all(|r| r.passed));
    }

    #[tokio::test]
    async fn analog_without_mux_reports_missing_resource() {
        let mut ctx = TestContext::new(ValidationConfig::default(), "valScript.bin");
        let err = SimAnalog::nominal().run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, RunnerError::MissingResource { name: "mux" }));
    }

    #[tokio::test]
    async fn out_of_tolerance_clock_fails_its_record() {
        let mut ctx = ctx_with_mux();
        let mut analog = SimAnalog::nominal();
        analog.clock_skew_ppm = 100.0;
        let results = analog.run(&mut ctx).await.unwrap();
        assert!(results[..2].iter().all(|r| r.passed));
        assert!(results[2..].iter().all(|r| !r.passed));
    }

    #[tokio::test]
    async fn stuck_pin_fails_only_its_own_record() {
        let mut ctx = ctx_with_mux();
        let mut digital = SimDigital::all_good(vec![1, 2, 3]);
        digital.stuck_pins = vec![2];
        let results = digital.run(&mut ctx).await.unwrap();
        assert_eq!(
            results.iter().map(|r| r.passed).collect::<Vec<_>>(),
            [true, false, true]
        );
    }

    #[tokio::test]
    async fn failed_upload_reports_the_flash_port() {
        let mut ctx = ctx_with_mux();
        let err = SimUpload { fail: true }.run(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("COM8"));
    }

    #[tokio::test]
    async fn radio_results_carry_axis_labels_for_the_signal_plot() {
        let mut ctx = ctx_with_mux();
        let results = SimRadio::nominal().run(&mut ctx).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].values.iter().any(|v| v.is_axis_label()));
    }
}
