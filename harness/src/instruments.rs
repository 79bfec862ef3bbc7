//! Seams for the benchtop instruments the sequencer talks to.
//!
//! The vendor SDKs (logic analyzer, scope, energy meter, mux controller) live
//! behind these traits so the sequencer and the tests never link against vendor
//! code directly. A simulated rig lives in [`crate::sim`].

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by instrument collaborators.
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// The device handle could not be opened or was lost.
    #[error("instrument unavailable: {reason}")]
    Unavailable { reason: String },

    /// The device was reached but the operation failed.
    #[error("instrument operation failed: {reason}")]
    OperationFailed { reason: String },
}

pub type InstrumentResult<T> = Result<T, InstrumentError>;

/// A logic channel that can block until the device under test pulses it.
///
/// The chip raises an edge on the trigger pin when it is ready for the next
/// check; the sequencer waits on this before every dependent test. The wait has
/// no timeout of its own — the sequencer wraps it in one.
#[async_trait]
pub trait TriggerSource: Send {
    /// Block until a rising edge is observed on `pin`.
    async fn wait_for_edge(&mut self, pin: u8) -> InstrumentResult<()>;
}

/// The microcontroller-based mux board that routes chip outputs to the scope.
#[async_trait]
pub trait MuxPort: Send {
    /// Send one routing command, e.g. `"1_5"` or the `"2_0"` reset.
    async fn send_command(&mut self, command: &str) -> InstrumentResult<()>;
}

impl std::fmt::Debug for dyn MuxPort + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn MuxPort")
    }
}

/// One reading from the energy meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub volts: f64,
    pub amps: f64,
}

/// The programmable power/energy meter sampled by the background monitor.
#[async_trait]
pub trait PowerSampler: Send + 'static {
    /// Take one voltage/current reading.
    async fn sample(&mut self) -> InstrumentResult<PowerSample>;
}
