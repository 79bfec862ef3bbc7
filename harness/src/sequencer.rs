//! The test sequencer: drives one unit's validation run end to end.
//!
//! Execution order is fixed: self check, power-monitor start, firmware upload,
//! then the trigger-synchronized dependent tests, then monitor stop/collect,
//! then the report. Only two failures abort the run — an unreachable instrument
//! and a failed upload. Everything else is folded into the result tree as a
//! failing sub-test so the report shows exactly what was attempted.
//!
//! The HTML report is written on every exit path, fatal or not.

use crate::instruments::{InstrumentError, TriggerSource};
use crate::monitor::PowerMonitor;
use crate::registry::{RegistryParts, TestContext, TestRegistry};
use report::render::RenderedReport;
use report::{write_report, RenderError, SubTestResult, ValidationRun, Value};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Fatal sequencer errors. Everything else degrades into the result tree.
#[derive(Error, Debug)]
pub enum SequencerError {
    /// The pre-run self test failed; nothing else was attempted.
    #[error("self check '{name}' failed")]
    SelfCheckFailed { name: String },

    /// An instrument the whole run depends on could not be reached.
    #[error("hardware unavailable: {reason}")]
    HardwareUnavailable { reason: String },

    /// Firmware flashing failed; every later test is meaningless without it.
    #[error("firmware upload '{name}' failed: {reason}")]
    UploadFailed { name: String, reason: String },

    /// The final report could not be written.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// `execute` was called a second time on the same sequencer.
    #[error("sequencer already executed")]
    AlreadyExecuted,
}

pub type SequencerResult<T> = Result<T, SequencerError>;

/// Where the sequencer is in its fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    SelfCheckRunning,
    SelfCheckFailed,
    Uploading,
    UploadFailed,
    /// Index into the dependent-test list.
    Running(usize),
    MonitoringStop,
    Done,
}

enum TriggerFailure {
    /// No edge within the configured window; the test is marked failed and the
    /// run continues.
    Timeout(u64),
    /// The logic analyzer itself is gone; the run cannot continue.
    Unavailable(String),
}

/// Drives one unit through the registered tests and renders the report.
pub struct Sequencer {
    unit_name: String,
    parts: Option<RegistryParts>,
    trigger: Box<dyn TriggerSource>,
    ctx: TestContext,
    run: ValidationRun,
    state: RunState,
    report_path: PathBuf,
}

impl Sequencer {
    pub fn new(
        registry: TestRegistry,
        trigger: Box<dyn TriggerSource>,
        ctx: TestContext,
        report_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            unit_name: ctx.config.unit_name.clone(),
            parts: Some(registry.into_parts()),
            trigger,
            ctx,
            run: ValidationRun::new(),
            state: RunState::NotStarted,
            report_path: report_path.into(),
        }
    }

    /// The result tree as it stands. Valid at any point, including after a
    /// fatal error.
    pub fn run(&self) -> &ValidationRun {
        &self.run
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the full sequence and write the report.
    ///
    /// On a fatal error the partial report is still written before the error is
    /// returned; the tree stays available through [`Sequencer::run`].
    pub async fn execute(&mut self) -> SequencerResult<RenderedReport> {
        let parts = self.parts.take().ok_or(SequencerError::AlreadyExecuted)?;

        // Seed every planned test so an aborted run still reports the ones
        // never reached (empty test slots render as FAILED).
        let unit_name = self.unit_name.clone();
        let unit = self.run.ensure_unit(&unit_name);
        for name in &parts.names {
            unit.ensure_test(name);
        }

        if let Some((name, mut runner)) = parts.self_check {
            self.state = RunState::SelfCheckRunning;
            info!("running self test '{name}'");
            let results = match runner.run(&mut self.ctx).await {
                Ok(results) => results,
                Err(err) => vec![failing_record(&name, err.to_string())],
            };
            let ok = results.first().is_some_and(|r| r.passed);
            self.extend(&name, results);
            if !ok {
                self.state = RunState::SelfCheckFailed;
                return Err(self.abort(SequencerError::SelfCheckFailed { name }));
            }
        }

        let mut monitor = parts.monitor;
        if let Some((name, mon)) = monitor.as_mut() {
            info!("starting power monitor '{name}'");
            if let Err(err) = mon.start().await {
                let reason = err.to_string();
                let record = failing_record(name, reason.clone());
                let name = name.clone();
                self.extend(&name, vec![record]);
                return Err(self.abort(SequencerError::HardwareUnavailable { reason }));
            }
        }

        self.state = RunState::Uploading;
        let (upload_name, mut upload_runner) = parts.upload;
        info!("uploading test program '{}'", self.ctx.binary.display());
        match upload_runner.run(&mut self.ctx).await {
            Ok(results) => self.extend(&upload_name, results),
            Err(err) => {
                let reason = err.to_string();
                let record = SubTestResult::new(&upload_name, false)
                    .with_value(Value::scalar(
                        "binary name",
                        self.ctx.binary.display().to_string(),
                    ))
                    .with_value(Value::scalar("error", reason.clone()));
                self.extend(&upload_name, vec![record]);
                self.state = RunState::UploadFailed;
                self.stop_monitor(&mut monitor).await;
                return Err(self.abort(SequencerError::UploadFailed {
                    name: upload_name,
                    reason,
                }));
            }
        }

        for (index, (name, mut runner)) in parts.dependents.into_iter().enumerate() {
            self.state = RunState::Running(index);
            debug!("waiting for trigger before '{name}'");
            match self.wait_for_trigger().await {
                Ok(()) => {}
                Err(TriggerFailure::Timeout(secs)) => {
                    warn!("no trigger edge before '{name}', marking it failed");
                    let record =
                        failing_record(&name, format!("no trigger edge within {secs}s"));
                    self.extend(&name, vec![record]);
                    continue;
                }
                Err(TriggerFailure::Unavailable(reason)) => {
                    self.stop_monitor(&mut monitor).await;
                    return Err(self.abort(SequencerError::HardwareUnavailable { reason }));
                }
            }

            info!("running test: {name}");
            let results = match runner.run(&mut self.ctx).await {
                Ok(results) => results,
                Err(err) => {
                    warn!("test '{name}' failed to execute: {err}");
                    vec![failing_record(&name, err.to_string())]
                }
            };
            self.extend(&name, results);
        }

        self.state = RunState::MonitoringStop;
        self.stop_monitor(&mut monitor).await;

        let report = write_report(&self.run, &self.report_path)?;
        self.state = RunState::Done;
        info!("validation run complete");
        Ok(report)
    }

    async fn wait_for_trigger(&mut self) -> Result<(), TriggerFailure> {
        let window = self.ctx.config.trigger_timeout();
        let pin = self.ctx.config.trigger_pin;
        match tokio::time::timeout(window, self.trigger.wait_for_edge(pin)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(InstrumentError::Unavailable { reason }))
            | Ok(Err(InstrumentError::OperationFailed { reason })) => {
                Err(TriggerFailure::Unavailable(reason))
            }
            Err(_elapsed) => Err(TriggerFailure::Timeout(window.as_secs())),
        }
    }

    /// Stop the monitor if it is running and fold its statistics into its test
    /// slot. Runs on fatal paths too, so the sampling task never outlives the
    /// sequencer.
    async fn stop_monitor(&mut self, monitor: &mut Option<(String, PowerMonitor)>) {
        let Some((name, mon)) = monitor.as_mut() else {
            return;
        };
        if !mon.is_running() {
            return;
        }
        info!("collecting power monitor results");
        let records = match mon.stop().await {
            Ok(records) => records,
            Err(err) => vec![failing_record(name, err.to_string())],
        };
        let name = name.clone();
        self.extend(&name, records);
    }

    fn extend(&mut self, test_name: &str, results: Vec<SubTestResult>) {
        let unit_name = self.unit_name.clone();
        let unit = self.run.ensure_unit(&unit_name);
        unit.ensure_test(test_name).extend_results(results);
    }

    /// Write the partial report before surfacing a fatal error. A write failure
    /// here is logged, not propagated: the original error matters more.
    fn abort(&mut self, err: SequencerError) -> SequencerError {
        if let Err(write_err) = write_report(&self.run, &self.report_path) {
            error!("could not write report while aborting: {write_err}");
        }
        err
    }
}

fn failing_record(name: &str, error: String) -> SubTestResult {
    SubTestResult::new(name, false).with_value(Value::scalar("error", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::instruments::InstrumentResult;
    use crate::registry::{RunnerError, RunnerResult, TestRunner};
    use async_trait::async_trait;
    use report::test_pass;
    use std::time::Duration;

    struct InstantTrigger;

    #[async_trait]
    impl TriggerSource for InstantTrigger {
        async fn wait_for_edge(&mut self, _pin: u8) -> InstrumentResult<()> {
            Ok(())
        }
    }

    struct SilentTrigger;

    #[async_trait]
    impl TriggerSource for SilentTrigger {
        async fn wait_for_edge(&mut self, _pin: u8) -> InstrumentResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct LostTrigger;

    #[async_trait]
    impl TriggerSource for LostTrigger {
        async fn wait_for_edge(&mut self, _pin: u8) -> InstrumentResult<()> {
            Err(InstrumentError::Unavailable {
                reason: "logic analyzer disconnected".to_string(),
            })
        }
    }

    struct PassRunner(&'static str);

    #[async_trait]
    impl TestRunner for PassRunner {
        async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
            Ok(vec![SubTestResult::new(self.0, true)])
        }
    }

    struct ErrRunner(&'static str);

    #[async_trait]
    impl TestRunner for ErrRunner {
        async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
            Err(RunnerError::Failed {
                message: self.0.to_string(),
            })
        }
    }

    fn test_config() -> ValidationConfig {
        ValidationConfig {
            trigger_timeout_secs: 1,
            ..ValidationConfig::default()
        }
    }

    fn sequencer_with(
        registry: TestRegistry,
        trigger: Box<dyn TriggerSource>,
        dir: &tempfile::TempDir,
    ) -> Sequencer {
        let ctx = TestContext::new(test_config(), "valScript.bin");
        Sequencer::new(registry, trigger, ctx, dir.path().join("results.html"))
    }

    #[tokio::test]
    async fn happy_path_runs_every_test_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(PassRunner("flash")))
            .dependent("Digital input/output", Box::new(PassRunner("pin 1")))
            .dependent("Serial communication", Box::new(PassRunner("baud")))
            .build()
            .unwrap();
        let mut sequencer = sequencer_with(registry, Box::new(InstantTrigger), &dir);

        sequencer.execute().await.unwrap();
        assert_eq!(sequencer.state(), RunState::Done);
        assert!(sequencer.run().passed());
        assert!(dir.path().join("results.html").exists());
    }

    #[tokio::test]
    async fn upload_error_synthesizes_record_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(ErrRunner("port busy")))
            .dependent("Digital input/output", Box::new(PassRunner("pin 1")))
            .build()
            .unwrap();
        let mut sequencer = sequencer_with(registry, Box::new(InstantTrigger), &dir);

        let err = sequencer.execute().await.unwrap_err();
        assert!(matches!(err, SequencerError::UploadFailed { .. }));
        assert_eq!(sequencer.state(), RunState::UploadFailed);

        let unit = sequencer.run().unit("SCuM-Validation").unwrap();
        let upload = unit.test("Program upload").unwrap();
        assert_eq!(upload.subtests.len(), 1);
        let record = &upload.subtests[0];
        assert_eq!(record.sub_test, "Program upload");
        assert!(!record.passed);
        assert!(record
            .values
            .iter()
            .any(|v| v.name == "error" && v.data == report::ValueData::Scalar("port busy".into())));

        // The dependent test never ran; its empty slot fails the unit.
        assert!(!test_pass(unit.test("Digital input/output").unwrap()));
        // Partial report was still written.
        assert!(dir.path().join("results.html").exists());
    }

    #[tokio::test]
    async fn collaborator_error_is_recovered_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(PassRunner("flash")))
            .dependent("Analog validation", Box::new(ErrRunner("scope lost sync")))
            .dependent("Serial communication", Box::new(PassRunner("baud")))
            .build()
            .unwrap();
        let mut sequencer = sequencer_with(registry, Box::new(InstantTrigger), &dir);

        sequencer.execute().await.unwrap();
        assert_eq!(sequencer.state(), RunState::Done);

        let unit = sequencer.run().unit("SCuM-Validation").unwrap();
        let analog = unit.test("Analog validation").unwrap();
        assert!(!test_pass(analog));
        assert!(analog.subtests[0]
            .values
            .iter()
            .any(|v| v.name == "error"));
        // The later test still ran.
        assert!(test_pass(unit.test("Serial communication").unwrap()));
    }

    #[tokio::test]
    async fn trigger_timeout_marks_test_failed_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(PassRunner("flash")))
            .dependent("Digital input/output", Box::new(PassRunner("pin 1")))
            .build()
            .unwrap();
        let ctx = TestContext::new(
            ValidationConfig {
                trigger_timeout_secs: 0,
                ..ValidationConfig::default()
            },
            "valScript.bin",
        );
        let mut sequencer = Sequencer::new(
            registry,
            Box::new(SilentTrigger),
            ctx,
            dir.path().join("results.html"),
        );

        sequencer.execute().await.unwrap();
        assert_eq!(sequencer.state(), RunState::Done);

        let unit = sequencer.run().unit("SCuM-Validation").unwrap();
        let digital = unit.test("Digital input/output").unwrap();
        assert!(!test_pass(digital));
        assert!(digital.subtests[0]
            .values
            .iter()
            .any(|v| v.data == report::ValueData::Scalar("no trigger edge within 0s".into())));
    }

    #[tokio::test]
    async fn lost_trigger_hardware_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(PassRunner("flash")))
            .dependent("Digital input/output", Box::new(PassRunner("pin 1")))
            .build()
            .unwrap();
        let mut sequencer = sequencer_with(registry, Box::new(LostTrigger), &dir);

        let err = sequencer.execute().await.unwrap_err();
        assert!(matches!(err, SequencerError::HardwareUnavailable { .. }));
        assert!(dir.path().join("results.html").exists());
    }

    #[tokio::test]
    async fn failed_self_check_short_circuits_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .self_check("Radio Self Test", Box::new(ErrRunner("no spectrum analyzer")))
            .upload("Program upload", Box::new(PassRunner("flash")))
            .dependent("Digital input/output", Box::new(PassRunner("pin 1")))
            .build()
            .unwrap();
        let mut sequencer = sequencer_with(registry, Box::new(InstantTrigger), &dir);

        let err = sequencer.execute().await.unwrap_err();
        assert!(matches!(err, SequencerError::SelfCheckFailed { .. }));
        assert_eq!(sequencer.state(), RunState::SelfCheckFailed);

        // Upload never ran; its slot is empty, so the rendered report shows it
        // as failed alongside the self-check record.
        let unit = sequencer.run().unit("SCuM-Validation").unwrap();
        assert!(unit.test("Program upload").unwrap().subtests.is_empty());
        assert!(dir.path().join("results.html").exists());
    }

    #[tokio::test]
    async fn execute_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(PassRunner("flash")))
            .build()
            .unwrap();
        let mut sequencer = sequencer_with(registry, Box::new(InstantTrigger), &dir);

        sequencer.execute().await.unwrap();
        assert!(matches!(
            sequencer.execute().await.unwrap_err(),
            SequencerError::AlreadyExecuted
        ));
    }
}
