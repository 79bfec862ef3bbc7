//! End-to-end runs against the fully simulated rig.

use harness::sim::{
    SimAnalog, SimDigital, SimMux, SimPowerSampler, SimRadio, SimSelfCheck, SimSerialBaud,
    SimTrigger, SimUpload,
};
use harness::{
    PowerMonitor, RunState, Sequencer, SequencerError, TestContext, TestRegistry, ValidationConfig,
};
use report::test_pass;
use std::time::Duration;

fn sim_registry(fail_upload: bool, config: &ValidationConfig) -> TestRegistry {
    let monitor = PowerMonitor::new(
        Box::new(SimPowerSampler::nominal()),
        Duration::from_millis(1),
        config.power_voltage_range,
        config.power_current_range,
    );
    TestRegistry::builder()
        .self_check("Radio Self Test", Box::new(SimSelfCheck))
        .monitor("Power monitor", monitor)
        .upload("Program upload", Box::new(SimUpload { fail: fail_upload }))
        .dependent(
            "Digital input/output",
            Box::new(SimDigital::all_good(vec![1, 2, 3, 4])),
        )
        .dependent("Analog validation", Box::new(SimAnalog::nominal()))
        .dependent(
            "Serial communication",
            Box::new(SimSerialBaud { best_baud: 19_200 }),
        )
        .dependent("Radio TX/RX", Box::new(SimRadio::nominal()))
        .build()
        .expect("registry is valid")
}

fn sim_context(config: ValidationConfig) -> TestContext {
    TestContext::new(config, "valScript.bin").with_mux(Box::new(SimMux::default()))
}

#[tokio::test]
async fn full_simulated_run_passes_and_writes_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("results.html");
    let config = ValidationConfig::default();
    let registry = sim_registry(false, &config);
    let mut sequencer = Sequencer::new(
        registry,
        Box::new(SimTrigger::new(Duration::from_millis(1))),
        sim_context(config),
        &report_path,
    );

    let rendered = sequencer.execute().await.unwrap();
    assert_eq!(sequencer.state(), RunState::Done);
    assert!(sequencer.run().passed());
    assert!(rendered.warnings.is_empty());

    let unit = sequencer.run().unit("SCuM-Validation").unwrap();
    // Declaration order is preserved in the tree.
    let names: Vec<&str> = unit.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "Radio Self Test",
            "Power monitor",
            "Program upload",
            "Digital input/output",
            "Analog validation",
            "Serial communication",
            "Radio TX/RX",
        ]
    );

    // The monitor contributed its six statistics records.
    assert_eq!(unit.test("Power monitor").unwrap().subtests.len(), 6);

    let html = std::fs::read_to_string(&report_path).unwrap();
    assert!(html.contains("SCuM-Validation"));
    assert!(html.contains("✅ PASSED"));
    // The radio's pair series rendered with its bound axis labels.
    assert!(html.contains("Time (s)"));
    assert!(html.contains("<svg"));
    // No leftover temp file from the atomic write.
    assert!(!dir.path().join("results.html.tmp").exists());
}

#[tokio::test]
async fn busy_flash_port_aborts_but_still_reports_every_planned_test() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("results.html");
    let config = ValidationConfig::default();
    let registry = sim_registry(true, &config);
    let mut sequencer = Sequencer::new(
        registry,
        Box::new(SimTrigger::new(Duration::from_millis(1))),
        sim_context(config),
        &report_path,
    );

    let err = sequencer.execute().await.unwrap_err();
    assert!(matches!(err, SequencerError::UploadFailed { .. }));

    let unit = sequencer.run().unit("SCuM-Validation").unwrap();
    // The upload slot carries the synthesized failure record naming the binary.
    let upload = unit.test("Program upload").unwrap();
    assert!(!test_pass(upload));
    assert!(upload.subtests[0]
        .values
        .iter()
        .any(|v| v.name == "binary name"));

    // The dependent tests were never reached and stay empty, so the unit fails.
    assert!(unit.test("Radio TX/RX").unwrap().subtests.is_empty());
    assert!(!sequencer.run().passed());

    // The partial report still shows all seven planned tests.
    let html = std::fs::read_to_string(&report_path).unwrap();
    assert!(html.contains("❌ FAILED"));
    assert!(html.contains("Radio TX/RX"));
    assert!(html.contains("No sub-tests provided."));
}

#[tokio::test]
async fn silent_chip_times_out_each_test_but_finishes_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("results.html");
    let config = ValidationConfig {
        trigger_timeout_secs: 0,
        ..ValidationConfig::default()
    };
    let registry = sim_registry(false, &config);
    let mut sequencer = Sequencer::new(
        registry,
        Box::new(SimTrigger::silent()),
        sim_context(config),
        &report_path,
    );

    sequencer.execute().await.unwrap();
    assert_eq!(sequencer.state(), RunState::Done);

    let unit = sequencer.run().unit("SCuM-Validation").unwrap();
    // Upload and self check ran; every dependent test timed out waiting.
    assert!(test_pass(unit.test("Program upload").unwrap()));
    for name in [
        "Digital input/output",
        "Analog validation",
        "Serial communication",
        "Radio TX/RX",
    ] {
        let test = unit.test(name).unwrap();
        assert!(!test_pass(test), "{name} should have timed out");
        assert_eq!(test.subtests.len(), 1);
    }
    assert!(!sequencer.run().passed());
    assert!(report_path.exists());
}
