//! Public entry points: validate, then compile and run, then clean up.
//!
//! Each call works on its own workspace and its own child processes. The
//! only state shared between concurrent calls is the read-only registry and
//! configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use crate::backend::{HostBackend, IsolationBackend};
use crate::compile::compile;
use crate::config::{Config, Limits};
use crate::error::SandboxError;
use crate::execute::execute;
use crate::language::{LanguageProfile, LanguageRegistry};
use crate::result::ExecutionResult;
use crate::submission::Submission;
use crate::validator::{validate, ValidationOutcome};
use crate::workspace::Workspace;

/// Code execution sandbox.
pub struct Sandbox<B = HostBackend> {
    registry: Arc<LanguageRegistry>,
    backend: Arc<B>,
    limits: Limits,
    scratch_root: PathBuf,
}

impl<B> Clone for Sandbox<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            backend: Arc::clone(&self.backend),
            limits: self.limits,
            scratch_root: self.scratch_root.clone(),
        }
    }
}

impl Sandbox<HostBackend> {
    /// Sandbox running toolchains directly on the host.
    pub fn new(config: &Config) -> Self {
        Self::with_backend(config, HostBackend::new())
    }
}

impl<B: IsolationBackend> Sandbox<B> {
    pub fn with_backend(config: &Config, backend: B) -> Self {
        Self {
            registry: Arc::new(LanguageRegistry::with_overrides(&config.languages)),
            backend: Arc::new(backend),
            limits: config.limits(),
            scratch_root: config.resolved_scratch_root(),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Run only the pre-flight checks. Never touches the filesystem.
    pub fn validate_submission(
        &self,
        source: &str,
        language_id: &str,
    ) -> Result<ValidationOutcome, SandboxError> {
        let profile = self.registry.profile_for(language_id)?;
        Ok(validate(source, profile, &self.limits))
    }

    /// Validate, compile (if needed) and run one submission.
    ///
    /// Returns `Err` only for an unknown language or a host environment
    /// failure; every other outcome is an [`ExecutionResult`]. The workspace
    /// is gone and no child process is left running when this returns, and
    /// also if the future is dropped early.
    #[instrument(skip_all, fields(language = %submission.language_id))]
    pub async fn run_submission(
        &self,
        submission: Submission,
    ) -> Result<ExecutionResult, SandboxError> {
        let started = Instant::now();
        let profile = self.registry.profile_for(&submission.language_id)?;

        let validation = validate(&submission.source_text, profile, &self.limits);
        if !validation.is_valid {
            info!(errors = ?validation.errors, "Submission failed validation");
            return Ok(ExecutionResult::validation_failed(&validation).with_duration(started.elapsed()));
        }

        let mut workspace = Workspace::allocate(&self.scratch_root, &submission, profile)?;
        let result = self
            .build_and_run(&mut workspace, profile, &submission, &validation)
            .await;
        workspace.release();

        let result = result?.with_duration(started.elapsed());
        info!(
            status = ?result.status,
            duration_ms = result.duration_ms,
            "Submission finished"
        );
        Ok(result)
    }

    async fn build_and_run(
        &self,
        workspace: &mut Workspace,
        profile: &LanguageProfile,
        submission: &Submission,
        validation: &ValidationOutcome,
    ) -> Result<ExecutionResult, SandboxError> {
        let mut notes: Vec<String> = validation
            .warnings
            .iter()
            .map(|w| format!("warning: {w}"))
            .collect();
        notes.extend(workspace.diagnostics().iter().cloned());

        let compiled = compile(self.backend.as_ref(), workspace, profile, &self.limits).await?;
        if !compiled.ok {
            return Ok(ExecutionResult::compile_failed(compiled, notes));
        }

        let run = execute(
            self.backend.as_ref(),
            workspace,
            profile,
            &submission.stdin_text,
            &self.limits,
        )
        .await?;
        Ok(ExecutionResult::from_run(run, notes))
    }

    /// Blocking form of [`run_submission`](Self::run_submission) for callers
    /// without an async runtime, such as a GUI worker thread.
    ///
    /// Builds a private current-thread runtime, so it must not be called
    /// from inside another tokio runtime.
    pub fn run_blocking(
        &self,
        source: &str,
        language_id: &str,
        stdin: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SandboxError::environment("failed to start runtime", e))?;
        runtime.block_on(self.run_submission(Submission::new(source, language_id, stdin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProcessOutcome, ProcessSpec};
    use crate::language::LanguageOverride;
    use crate::result::ExecutionStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts spawns; the first `fail_first` calls exit 1.
    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl IsolationBackend for CountingBackend {
        async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutcome, SandboxError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(spec.cwd.exists(), "workspace must exist while running");
            Ok(ProcessOutcome {
                exit_code: Some(if n < self.fail_first { 1 } else { 0 }),
                stdout: format!("call {n}\n"),
                stderr: if n < self.fail_first {
                    "error: nope\n".into()
                } else {
                    String::new()
                },
                ..ProcessOutcome::default()
            })
        }
    }

    fn config(scratch: &Path) -> Config {
        Config {
            scratch_root: Some(scratch.to_path_buf()),
            ..Config::default()
        }
    }

    fn assert_scratch_empty(scratch: &Path) {
        let leftovers: Vec<_> = std::fs::read_dir(scratch)
            .map(|entries| entries.flatten().map(|e| e.path()).collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty(), "leftover workspaces: {leftovers:?}");
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn gpp_available() -> bool {
        std::process::Command::new("g++")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn java_available() -> bool {
        ["javac", "java"].iter().all(|tool| {
            std::process::Command::new(tool)
                .arg("-version")
                .output()
                .is_ok_and(|o| o.status.success())
        })
    }

    #[tokio::test]
    async fn unknown_language_fails_fast() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::with_backend(&config(scratch.path()), CountingBackend::default());

        let err = sandbox
            .run_submission(Submission::new("DISPLAY 'HI'.", "cobol", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::UnsupportedLanguage(ref id) if id == "cobol"));
        assert_eq!(sandbox.backend.calls.load(Ordering::SeqCst), 0);
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn empty_source_never_spawns() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::with_backend(&config(scratch.path()), CountingBackend::default());

        for language in ["python", "cpp", "java"] {
            let result = sandbox
                .run_submission(Submission::new("", language, ""))
                .await
                .unwrap();
            assert_eq!(result.status, ExecutionStatus::ValidationFailed);
        }
        assert_eq!(sandbox.backend.calls.load(Ordering::SeqCst), 0);
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn cpp_without_main_fails_validation() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::with_backend(&config(scratch.path()), CountingBackend::default());

        let result = sandbox
            .run_submission(Submission::new(
                "#include <iostream>\nint helper() { return 0; }\n",
                "cpp",
                "",
            ))
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::ValidationFailed);
        assert_eq!(sandbox.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compile_failure_skips_execution() {
        let scratch = tempfile::tempdir().unwrap();
        let backend = CountingBackend {
            fail_first: 1,
            ..CountingBackend::default()
        };
        let sandbox = Sandbox::with_backend(&config(scratch.path()), backend);

        let result = sandbox
            .run_submission(Submission::new("int main() { return x; }", "cpp", ""))
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::CompileFailed);
        assert_eq!(sandbox.backend.calls.load(Ordering::SeqCst), 1);
        assert!(result.diagnostics[0].contains("error: nope"));
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn compiled_language_runs_after_compile() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::with_backend(&config(scratch.path()), CountingBackend::default());

        let result = sandbox
            .run_submission(Submission::new(
                "#include <cstdio>\nint main() { puts(\"hi\"); }\n",
                "cpp",
                "",
            ))
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "call 1\n");
        assert_eq!(sandbox.backend.calls.load(Ordering::SeqCst), 2);
        assert_scratch_empty(scratch.path());
    }

    #[tokio::test]
    async fn warnings_reach_the_result() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::with_backend(&config(scratch.path()), CountingBackend::default());

        let result = sandbox
            .run_submission(Submission::new("import os\nprint(os.getcwd())\n", "python", ""))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(
            result.diagnostics,
            vec!["warning: Code contains potentially dangerous module: os"]
        );
    }

    #[tokio::test]
    async fn concurrent_submissions_are_independent() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::with_backend(&config(scratch.path()), CountingBackend::default());

        let runs = (0..8).map(|i| {
            let sandbox = sandbox.clone();
            tokio::spawn(async move {
                sandbox
                    .run_submission(Submission::new(format!("print({i})"), "python", ""))
                    .await
            })
        });
        for handle in runs.collect::<Vec<_>>() {
            let result = handle.await.unwrap().unwrap();
            assert!(result.is_success());
        }
        assert_eq!(sandbox.backend.calls.load(Ordering::SeqCst), 8);
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn validate_submission_standalone() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(&config(scratch.path()));

        let outcome = sandbox.validate_submission("if True:", "python").unwrap();
        assert!(!outcome.is_valid);
        assert!(sandbox.validate_submission("x", "cobol").is_err());
        assert_scratch_empty(scratch.path());
    }

    #[cfg(unix)]
    #[test]
    fn blocking_shell_run_and_timeout() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path());
        config.timeout_seconds = 1;
        config.languages = HashMap::from([(
            "shell".to_string(),
            LanguageOverride {
                extension: Some("sh".into()),
                run: Some("sh {source}".into()),
                ..LanguageOverride::default()
            },
        )]);
        let sandbox = Sandbox::new(&config);

        let result = sandbox.run_blocking("read x; echo \"got $x\"", "shell", "abc\n").unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "got abc\n");

        let result = sandbox.run_blocking("echo bad >&2; exit 2", "shell", "").unwrap();
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.stderr.as_deref(), Some("bad\n"));

        let started = Instant::now();
        let result = sandbox.run_blocking("while :; do :; done", "shell", "").unwrap();
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));

        assert_scratch_empty(scratch.path());
    }

    #[cfg(unix)]
    #[test]
    fn background_process_does_not_outlive_the_run() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path());
        config.timeout_seconds = 5;
        config.languages = HashMap::from([(
            "shell".to_string(),
            LanguageOverride {
                extension: Some("sh".into()),
                run: Some("sh {source}".into()),
                ..LanguageOverride::default()
            },
        )]);
        let sandbox = Sandbox::new(&config);

        let started = Instant::now();
        let result = sandbox
            .run_blocking("sleep 47 &\necho $! > /dev/stderr\necho started\n", "shell", "")
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success, "{result:?}");
        assert_eq!(result.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(3));

        let pid = result.stderr.unwrap_or_default();
        let pid = pid.trim();
        let gone = (0..40).any(|_| {
            let alive = std::process::Command::new("kill")
                .args(["-0", pid])
                .stderr(std::process::Stdio::null())
                .status()
                .is_ok_and(|s| s.success())
                && !std::fs::read_to_string(format!("/proc/{pid}/stat"))
                    .is_ok_and(|stat| stat.contains(") Z"));
            if alive {
                std::thread::sleep(Duration::from_millis(50));
            }
            !alive
        });
        assert!(gone, "sleep {pid} still running");
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn cpp_doubles_its_input() {
        if !gpp_available() {
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path());
        config.compile_timeout_seconds = 60;
        let sandbox = Sandbox::new(&config);

        let source = "#include <iostream>\nint main() {\n  long n = 0;\n  std::cin >> n;\n  std::cout << n * 2 << std::endl;\n  return 1'000 - 1000;\n}\n";
        let result = sandbox.run_blocking(source, "cpp", "21\n").unwrap();
        assert_eq!(result.status, ExecutionStatus::Success, "{result:?}");
        assert_eq!(result.stdout, "42\n");
        assert_scratch_empty(scratch.path());

        let result = sandbox
            .run_blocking("int main() { return undefined_name; }", "cpp", "")
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::CompileFailed);
        assert!(result.diagnostics[0].starts_with("Compilation error:"));
    }

    #[test]
    fn missing_toolchain_is_environment_error_without_leftovers() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path());
        config.languages = HashMap::from([(
            "ghost".to_string(),
            LanguageOverride {
                extension: Some("gh".into()),
                run: Some("no-such-interpreter-abc {source}".into()),
                ..LanguageOverride::default()
            },
        )]);
        let sandbox = Sandbox::new(&config);

        let err = sandbox.run_blocking("boo", "ghost", "").unwrap_err();
        assert!(err.is_environment());
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn python_hello() {
        if !python_available() {
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(&config(scratch.path()));

        let result = sandbox.run_blocking("print(\"hi\")", "python", "").unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "hi\n");

        // Same input, same status.
        let again = sandbox.run_blocking("print(\"hi\")", "python", "").unwrap();
        assert_eq!(again.status, result.status);
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn python_syntax_error_is_validation_failure() {
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(&config(scratch.path()));

        let result = sandbox.run_blocking("if True:", "python", "").unwrap();
        assert_eq!(result.status, ExecutionStatus::ValidationFailed);
        assert!(result.diagnostics[0].contains("Syntax error"));
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn python_infinite_loop_times_out() {
        if !python_available() {
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path());
        config.timeout_seconds = 2;
        let sandbox = Sandbox::new(&config);

        let started = Instant::now();
        let result = sandbox.run_blocking("while True: pass", "python", "").unwrap();
        let elapsed = started.elapsed();

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
        assert_scratch_empty(scratch.path());
    }

    #[test]
    fn python_runtime_error() {
        if !python_available() {
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(&config(scratch.path()));

        let result = sandbox.run_blocking("print(1 / 0)", "python", "").unwrap();
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert!(result.stderr.unwrap().contains("ZeroDivisionError"));
    }

    #[test]
    fn java_solution_class() {
        if !java_available() {
            return;
        }
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path());
        config.compile_timeout_seconds = 60;
        config.timeout_seconds = 10;
        let sandbox = Sandbox::new(&config);

        let source = "public class Solution {\n    public static void main(String[] args) {\n        System.out.println(\"ok\");\n    }\n}\n";
        let result = sandbox.run_blocking(source, "java", "").unwrap();
        assert_eq!(result.status, ExecutionStatus::Success, "{result:?}");
        assert_eq!(result.stdout, "ok\n");
        assert_scratch_empty(scratch.path());
    }
}
