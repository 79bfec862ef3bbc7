pub mod config;
pub mod instruments;
pub mod monitor;
pub mod registry;
pub mod sequencer;
pub mod sim;

pub use config::{BinarySpec, Bounds, ClockSpec, ConfigError, ConfigResult, ValidationConfig};
pub use instruments::{
    InstrumentError, InstrumentResult, MuxPort, PowerSample, PowerSampler, TriggerSource,
};
pub use monitor::{MonitorError, MonitorResult, PowerMonitor};
pub use registry::{
    RegistryError, RegistryResult, RunnerError, RunnerResult, TestContext, TestKind, TestRegistry,
    TestRegistryBuilder, TestRunner,
};
pub use sequencer::{RunState, Sequencer, SequencerError, SequencerResult};
