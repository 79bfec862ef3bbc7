use clap::{Parser, Subcommand};
use report::{write_report, SubTestResult, ValidationRun, Value};
use harness::sim::{
    SimAnalog, SimDigital, SimMux, SimPowerSampler, SimRadio, SimSelfCheck, SimSerialBaud,
    SimTrigger, SimUpload,
};
use harness::{
    PowerMonitor, Sequencer, TestContext, TestRegistry, TriggerSource, ValidationConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "scum-validation")]
#[command(about = "Bench validation harness and report generator for the SCuM radio chip")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full validation sequence against the simulated rig
    Run {
        /// Bench configuration file (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Firmware binary to validate
        #[arg(short, long, default_value = "valScript.bin")]
        binary: PathBuf,
        /// Where to write the HTML report
        #[arg(short, long, default_value = "results.html")]
        output: PathBuf,
        /// Simulate a busy flashing port so the upload fails
        #[arg(long)]
        fail_upload: bool,
        /// Simulate a chip that never raises its ready trigger
        #[arg(long)]
        silent_trigger: bool,
    },
    /// Render a small hand-built result tree, for eyeballing the report styling
    SampleReport {
        /// Where to write the HTML report
        #[arg(short, long, default_value = "sample-report.html")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            binary,
            output,
            fail_upload,
            silent_trigger,
        } => run_validation(config, binary, output, fail_upload, silent_trigger).await?,
        Commands::SampleReport { output } => sample_report(&output)?,
    }

    Ok(())
}

async fn run_validation(
    config: Option<PathBuf>,
    binary: PathBuf,
    output: PathBuf,
    fail_upload: bool,
    silent_trigger: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => ValidationConfig::load(&path)?,
        None => ValidationConfig::default(),
    };

    let monitor = PowerMonitor::new(
        Box::new(SimPowerSampler::nominal()),
        config.power_sample_interval(),
        config.power_voltage_range,
        config.power_current_range,
    );

    let registry = TestRegistry::builder()
        .self_check("Radio Self Test", Box::new(SimSelfCheck))
        .monitor("Power monitor", monitor)
        .upload("Program upload", Box::new(SimUpload { fail: fail_upload }))
        .dependent(
            "Digital input/output",
            Box::new(SimDigital::all_good((1..=10).collect())),
        )
        .dependent("Analog validation", Box::new(SimAnalog::nominal()))
        .dependent(
            "Serial communication",
            Box::new(SimSerialBaud { best_baud: 19_200 }),
        )
        .dependent("Radio TX/RX", Box::new(SimRadio::nominal()))
        .build()?;

    let trigger: Box<dyn TriggerSource> = if silent_trigger {
        Box::new(SimTrigger::silent())
    } else {
        Box::new(SimTrigger::new(Duration::from_millis(5)))
    };

    let ctx = TestContext::new(config, binary).with_mux(Box::new(SimMux::default()));
    let mut sequencer = Sequencer::new(registry, trigger, ctx, &output);

    match sequencer.execute().await {
        Ok(_) => {
            let verdict = if sequencer.run().passed() {
                "PASSED"
            } else {
                "FAILED"
            };
            info!("validation {verdict}; report at {}", output.display());
            if !sequencer.run().passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            error!("validation aborted: {err}; partial report at {}", output.display());
            std::process::exit(2);
        }
    }
}

/// Build and render a representative multi-unit tree exercising every value
/// shape the report knows how to draw.
fn sample_report(output: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut run = ValidationRun::new();

    let good = run.ensure_unit("SCuM-3C-07");
    good.ensure_test("Analog validation").extend_results([
        SubTestResult::new("1.1V reference", true)
            .with_value(Value::scalar("measured (V)", 1.103)),
        SubTestResult::new("supply ripple", true)
            .with_value(Value::series(
                "samples (V)",
                vec![1.101, 1.104, 1.102, 1.105, 1.103],
            )),
    ]);
    good.ensure_test("Radio TX/RX").extend_results([
        SubTestResult::new("Signal Over Time", true)
            .with_value(Value::pairs(
                "Signal",
                vec![(0.0, 41.2), (0.1, 42.8), (0.2, 43.1), (0.3, 42.0)],
            ))
            .with_value(Value::axis_labels("Time (s)", "signal (dB)"))
            .with_value(Value::scalar("Avg dB (dB)", 42.3)),
    ]);

    let bad = run.ensure_unit("SCuM-3C-09");
    bad.ensure_test("Analog validation").extend_results([
        SubTestResult::new("1.1V reference", false)
            .with_value(Value::scalar("measured (V)", 0.92))
            .with_value(Value::scalar("error", "below acceptance range")),
    ]);
    // A planned test that never ran renders as failed.
    bad.ensure_test("Radio TX/RX");

    let report = write_report(&run, output)?;
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    info!("sample report written to {}", output.display());
    Ok(())
}
