//! The ordered test registry and the collaborator contract.
//!
//! Every validation capability — firmware upload, digital I/O, analog checks,
//! serial baud discovery, radio tests — is a [`TestRunner`] registered under a
//! display name and a [`TestKind`]. The registry is validated at construction,
//! before any hardware is touched: there must be exactly one upload entry and it
//! must come before every dependent entry, because flashing is a hard
//! precondition for everything that follows.

use crate::config::ValidationConfig;
use crate::instruments::{InstrumentError, MuxPort};
use crate::monitor::PowerMonitor;
use async_trait::async_trait;
use report::SubTestResult;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by test collaborators.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The collaborator could not do its job.
    #[error("{message}")]
    Failed { message: String },

    /// The collaborator needed a resource the context does not carry.
    #[error("missing resource: {name}")]
    MissingResource { name: &'static str },

    /// An instrument call failed underneath the collaborator.
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Shared resources a collaborator may draw on.
///
/// Collaborators have a uniform signature; the ones that need a device handle
/// resolve it from here instead of each declaring its own parameter list.
pub struct TestContext {
    /// Bench configuration for the run.
    pub config: ValidationConfig,
    /// The firmware binary under validation.
    pub binary: PathBuf,
    mux: Option<Box<dyn MuxPort>>,
}

impl TestContext {
    pub fn new(config: ValidationConfig, binary: impl Into<PathBuf>) -> Self {
        Self {
            config,
            binary: binary.into(),
            mux: None,
        }
    }

    /// Attach the mux-controller port.
    pub fn with_mux(mut self, mux: Box<dyn MuxPort>) -> Self {
        self.mux = Some(mux);
        self
    }

    /// The mux-controller port, if the rig provides one.
    pub fn mux(&mut self) -> RunnerResult<&mut dyn MuxPort> {
        match self.mux.as_mut() {
            Some(mux) => Ok(mux.as_mut()),
            None => Err(RunnerError::MissingResource { name: "mux" }),
        }
    }
}

/// One validation capability.
///
/// Implementations return the sub-test records for their check, or an error the
/// sequencer converts into a single synthetic failing record so the report never
/// has a silent gap.
#[async_trait]
pub trait TestRunner: Send {
    async fn run(&mut self, ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>>;
}

/// How an entry participates in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    /// Firmware upload. Exactly one; runs before the dependent loop; failure
    /// aborts the run.
    Upload,
    /// One-shot self test that short-circuits the whole run when it fails.
    SelfCheck,
    /// Ordinary entry in the trigger-synchronized loop.
    Dependent,
}

/// Registry construction errors. All detected before any hardware call.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry has no firmware-upload entry")]
    MissingUpload,

    #[error("duplicate firmware-upload entry '{name}'")]
    DuplicateUpload { name: String },

    #[error("firmware-upload entry '{upload}' must precede dependent entry '{dependent}'")]
    UploadAfterDependent { upload: String, dependent: String },

    #[error("duplicate self-check entry '{name}'")]
    DuplicateSelfCheck { name: String },

    #[error("duplicate power-monitor entry '{name}'")]
    DuplicateMonitor { name: String },

    #[error("duplicate test name '{name}'")]
    DuplicateName { name: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

enum BuilderSlot {
    Runner(TestKind, Box<dyn TestRunner>),
    Monitor(PowerMonitor),
}

/// Builder for [`TestRegistry`]; entries keep their declaration order.
#[derive(Default)]
pub struct TestRegistryBuilder {
    entries: Vec<(String, BuilderSlot)>,
}

impl TestRegistryBuilder {
    /// Register the firmware-upload step.
    pub fn upload(mut self, name: &str, runner: Box<dyn TestRunner>) -> Self {
        self.entries.push((
            name.to_string(),
            BuilderSlot::Runner(TestKind::Upload, runner),
        ));
        self
    }

    /// Register the one-shot self check run before everything else.
    pub fn self_check(mut self, name: &str, runner: Box<dyn TestRunner>) -> Self {
        self.entries.push((
            name.to_string(),
            BuilderSlot::Runner(TestKind::SelfCheck, runner),
        ));
        self
    }

    /// Register a trigger-synchronized test.
    pub fn dependent(mut self, name: &str, runner: Box<dyn TestRunner>) -> Self {
        self.entries.push((
            name.to_string(),
            BuilderSlot::Runner(TestKind::Dependent, runner),
        ));
        self
    }

    /// Register the power monitor that spans the whole run.
    pub fn monitor(mut self, name: &str, monitor: PowerMonitor) -> Self {
        self.entries
            .push((name.to_string(), BuilderSlot::Monitor(monitor)));
        self
    }

    /// Validate and build the registry.
    pub fn build(self) -> RegistryResult<TestRegistry> {
        let mut names: Vec<String> = Vec::with_capacity(self.entries.len());
        let mut self_check = None;
        let mut upload: Option<(String, Box<dyn TestRunner>)> = None;
        let mut dependents: Vec<(String, Box<dyn TestRunner>)> = Vec::new();
        let mut monitor = None;
        let mut saw_dependent: Option<String> = None;

        for (name, slot) in self.entries {
            if names.iter().any(|n| *n == name) {
                return Err(RegistryError::DuplicateName { name });
            }
            names.push(name.clone());

            match slot {
                BuilderSlot::Runner(TestKind::Upload, runner) => {
                    if upload.is_some() {
                        return Err(RegistryError::DuplicateUpload { name });
                    }
                    if let Some(dependent) = saw_dependent {
                        return Err(RegistryError::UploadAfterDependent {
                            upload: name,
                            dependent,
                        });
                    }
                    upload = Some((name, runner));
                }
                BuilderSlot::Runner(TestKind::SelfCheck, runner) => {
                    if self_check.is_some() {
                        return Err(RegistryError::DuplicateSelfCheck { name });
                    }
                    self_check = Some((name, runner));
                }
                BuilderSlot::Runner(TestKind::Dependent, runner) => {
                    if saw_dependent.is_none() {
                        saw_dependent = Some(name.clone());
                    }
                    dependents.push((name, runner));
                }
                BuilderSlot::Monitor(mon) => {
                    if monitor.is_some() {
                        return Err(RegistryError::DuplicateMonitor { name });
                    }
                    monitor = Some((name, mon));
                }
            }
        }

        let upload = upload.ok_or(RegistryError::MissingUpload)?;

        Ok(TestRegistry {
            names,
            self_check,
            upload,
            dependents,
            monitor,
        })
    }
}

/// The validated, ordered set of tests for one run.
pub struct TestRegistry {
    names: Vec<String>,
    self_check: Option<(String, Box<dyn TestRunner>)>,
    upload: (String, Box<dyn TestRunner>),
    dependents: Vec<(String, Box<dyn TestRunner>)>,
    monitor: Option<(String, PowerMonitor)>,
}

/// Ownership of the registry contents, consumed by the sequencer.
pub struct RegistryParts {
    pub names: Vec<String>,
    pub self_check: Option<(String, Box<dyn TestRunner>)>,
    pub upload: (String, Box<dyn TestRunner>),
    pub dependents: Vec<(String, Box<dyn TestRunner>)>,
    pub monitor: Option<(String, PowerMonitor)>,
}

impl std::fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRegistry")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl TestRegistry {
    pub fn builder() -> TestRegistryBuilder {
        TestRegistryBuilder::default()
    }

    /// Test names in declaration order, used to seed the result tree so aborted
    /// runs still show every planned test (as FAILED, since they stay empty).
    pub fn test_names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn into_parts(self) -> RegistryParts {
        RegistryParts {
            names: self.names,
            self_check: self.self_check,
            upload: self.upload,
            dependents: self.dependents,
            monitor: self.monitor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopRunner;

    #[async_trait]
    impl TestRunner for NoopRunner {
        async fn run(&mut self, _ctx: &mut TestContext) -> RunnerResult<Vec<SubTestResult>> {
            Ok(vec![SubTestResult::new("noop", true)])
        }
    }

    #[test]
    fn registry_without_upload_is_rejected() {
        let err = TestRegistry::builder()
            .dependent("Digital input/output", Box::new(NoopRunner))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingUpload));
    }

    #[test]
    fn upload_after_dependent_is_rejected() {
        let err = TestRegistry::builder()
            .dependent("Digital input/output", Box::new(NoopRunner))
            .upload("Program upload", Box::new(NoopRunner))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::UploadAfterDependent { .. }));
    }

    #[test]
    fn duplicate_upload_is_rejected() {
        let err = TestRegistry::builder()
            .upload("Program upload", Box::new(NoopRunner))
            .upload("Program upload 2", Box::new(NoopRunner))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateUpload { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = TestRegistry::builder()
            .upload("Program upload", Box::new(NoopRunner))
            .dependent("Serial communication", Box::new(NoopRunner))
            .dependent("Serial communication", Box::new(NoopRunner))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
    }

    #[test]
    fn valid_registry_preserves_declaration_order() {
        let registry = TestRegistry::builder()
            .upload("Program upload", Box::new(NoopRunner))
            .self_check("Radio Self Test", Box::new(NoopRunner))
            .dependent("Digital input/output", Box::new(NoopRunner))
            .dependent("Analog validation", Box::new(NoopRunner))
            .build()
            .unwrap();
        assert_eq!(
            registry.test_names(),
            [
                "Program upload",
                "Radio Self Test",
                "Digital input/output",
                "Analog validation",
            ]
        );
    }

    #[test]
    fn missing_mux_resolves_to_a_runner_error() {
        let mut ctx = TestContext::new(ValidationConfig::default(), "fw.bin");
        let err = ctx.mux().unwrap_err();
        assert!(matches!(err, RunnerError::MissingResource { name: "mux" }));
    }
}
