//! Error taxonomy for the sandbox core.
//!
//! Only conditions that prevent a submission from being attempted at all are
//! errors. Validation, compile, runtime and timeout outcomes are reported as
//! an [`ExecutionStatus`](crate::result::ExecutionStatus) instead.

use std::io;

use thiserror::Error;

/// Failure that keeps a submission from reaching a terminal status.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The language id is not in the registry. Nothing was spawned or written.
    #[error("unsupported language: '{0}'")]
    UnsupportedLanguage(String),

    /// The host environment failed us: missing toolchain binary, scratch
    /// directory not writable, broken pipe plumbing.
    #[error("{context}: {source}")]
    Environment {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A command template expanded to nothing runnable.
    #[error("invalid command template for '{language}': {reason}")]
    InvalidTemplate { language: String, reason: String },
}

impl SandboxError {
    pub(crate) fn environment(context: impl Into<String>, source: io::Error) -> Self {
        Self::Environment {
            context: context.into(),
            source,
        }
    }

    /// Map a spawn failure to an environment error naming the program.
    pub(crate) fn spawn(program: &str, source: io::Error) -> Self {
        let context = if source.kind() == io::ErrorKind::NotFound {
            format!("toolchain binary not found: {program}")
        } else {
            format!("failed to spawn {program}")
        };
        Self::environment(context, source)
    }

    /// Whether the error came from the host environment rather than the input.
    pub const fn is_environment(&self) -> bool {
        matches!(self, Self::Environment { .. })
    }
}
