//! Isolation backend trait and implementations.
//!
//! A backend runs one command line to completion under a wall-clock deadline
//! and reports what happened. The compile and execute stages only talk to
//! this trait, so a stronger isolation layer can replace the host backend
//! without touching them.

mod host;

pub use host::HostBackend;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SandboxError;

/// One process invocation.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Working directory (the submission workspace).
    pub cwd: PathBuf,
    /// Text written to the child's stdin before it is closed. `None` connects
    /// stdin to the null device.
    pub stdin: Option<String>,
    /// Wall-clock deadline for the whole invocation.
    pub timeout: Duration,
    /// Cap on captured bytes, applied to stdout and stderr separately.
    pub max_output_bytes: usize,
}

/// Result of one process invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    /// Exit code, `None` if killed by a signal or by the deadline.
    pub exit_code: Option<i32>,
    /// Captured stdout (partial if the deadline hit).
    pub stdout: String,
    /// Captured stderr (partial if the deadline hit).
    pub stderr: String,
    /// The deadline elapsed first and the process was killed.
    pub timed_out: bool,
    /// Output exceeded the cap and was cut.
    pub truncated: bool,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Finished on its own with exit code zero.
    pub const fn succeeded(&self) -> bool {
        !self.timed_out && matches!(self.exit_code, Some(0))
    }
}

/// Trait for isolation backends.
///
/// Implementations must guarantee that the process is terminated and reaped
/// before `run` returns, on every path.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Run the process described by `spec`.
    ///
    /// Timeouts and nonzero exits are reported in the outcome; only failures
    /// to start or supervise the process are errors.
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutcome, SandboxError>;
}
