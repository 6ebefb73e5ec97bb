//! Result assembly: stage outcomes in, one [`ExecutionResult`] out.

use std::time::Duration;

use serde::Serialize;

use crate::compile::CompileOutcome;
use crate::execute::RunOutcome;
use crate::validator::ValidationOutcome;

/// Terminal state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    ValidationFailed,
    CompileFailed,
    RuntimeError,
    Timeout,
}

/// Structured response handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: Option<String>,
    pub diagnostics: Vec<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn new(status: ExecutionStatus, diagnostics: Vec<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: None,
            diagnostics,
            exit_code: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Errors first, then warnings.
    pub fn validation_failed(validation: &ValidationOutcome) -> Self {
        let mut diagnostics = validation.errors.clone();
        diagnostics.extend(validation.warnings.iter().map(|w| format!("warning: {w}")));
        Self::new(ExecutionStatus::ValidationFailed, diagnostics)
    }

    /// A compile timeout is reported as `Timeout`, anything else as `CompileFailed`.
    pub fn compile_failed(compile: CompileOutcome, mut notes: Vec<String>) -> Self {
        let status = if compile.timed_out {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::CompileFailed
        };
        notes.extend(compile.diagnostics);
        Self::new(status, notes)
    }

    pub fn from_run(run: RunOutcome, mut notes: Vec<String>) -> Self {
        let status = if run.timed_out {
            ExecutionStatus::Timeout
        } else if run.exit_code == Some(0) {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::RuntimeError
        };

        if let (ExecutionStatus::RuntimeError, Some(code)) = (status, run.exit_code) {
            notes.push(format!("Process exited with code {code}"));
        }
        notes.extend(run.notes);

        Self {
            status,
            stdout: run.stdout,
            stderr: (!run.stderr.is_empty()).then_some(run.stderr),
            diagnostics: notes,
            exit_code: run.exit_code,
            duration_ms: 0,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(exit_code: Option<i32>, stderr: &str, timed_out: bool) -> RunOutcome {
        RunOutcome {
            stdout: "out\n".into(),
            stderr: stderr.into(),
            exit_code,
            timed_out,
            notes: Vec::new(),
        }
    }

    #[test]
    fn success_carries_stdout() {
        let result = ExecutionResult::from_run(run(Some(0), "", false), Vec::new());
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "out\n");
        assert!(result.stderr.is_none());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn success_keeps_stderr_warnings() {
        let result = ExecutionResult::from_run(run(Some(0), "deprecated\n", false), Vec::new());
        assert!(result.is_success());
        assert_eq!(result.stderr.as_deref(), Some("deprecated\n"));
    }

    #[test]
    fn nonzero_exit_is_runtime_error() {
        let result = ExecutionResult::from_run(
            run(Some(1), "Traceback ...\nZeroDivisionError\n", false),
            vec!["warning: x".into()],
        );
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(
            result.diagnostics,
            vec!["warning: x", "Process exited with code 1"]
        );
    }

    #[test]
    fn signal_is_runtime_error() {
        let result = ExecutionResult::from_run(run(None, "", false), Vec::new());
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
    }

    #[test]
    fn timeout_wins_over_exit_code() {
        let result = ExecutionResult::from_run(run(None, "", true), Vec::new());
        assert_eq!(result.status, ExecutionStatus::Timeout);
    }

    #[test]
    fn compile_failures() {
        let failed = CompileOutcome {
            ok: false,
            timed_out: false,
            diagnostics: vec!["Compilation error:\nbad".into()],
        };
        let result = ExecutionResult::compile_failed(failed, Vec::new());
        assert_eq!(result.status, ExecutionStatus::CompileFailed);
        assert_eq!(result.diagnostics, vec!["Compilation error:\nbad"]);

        let slow = CompileOutcome {
            ok: false,
            timed_out: true,
            diagnostics: Vec::new(),
        };
        assert_eq!(
            ExecutionResult::compile_failed(slow, Vec::new()).status,
            ExecutionStatus::Timeout
        );
    }

    #[test]
    fn validation_failure_lists_errors_then_warnings() {
        let validation = ValidationOutcome {
            is_valid: false,
            warnings: vec!["long".into()],
            errors: vec!["bad".into()],
        };
        let result = ExecutionResult::validation_failed(&validation);
        assert_eq!(result.status, ExecutionStatus::ValidationFailed);
        assert_eq!(result.diagnostics, vec!["bad", "warning: long"]);
    }

    #[test]
    fn serializes_snake_case_status() {
        let result = ExecutionResult::from_run(run(Some(0), "", false), Vec::new())
            .with_duration(Duration::from_millis(12));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["duration_ms"], 12);
        assert!(json["stderr"].is_null());
    }
}
