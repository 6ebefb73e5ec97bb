//! Compiler stage.

use tracing::{debug, instrument, warn};

use crate::backend::{IsolationBackend, ProcessSpec};
use crate::config::Limits;
use crate::error::SandboxError;
use crate::language::LanguageProfile;
use crate::workspace::Workspace;

/// Outcome of the compile step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub ok: bool,
    /// The compile budget ran out and the compiler was killed.
    pub timed_out: bool,
    pub diagnostics: Vec<String>,
}

impl CompileOutcome {
    const fn skipped() -> Self {
        Self {
            ok: true,
            timed_out: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Build the workspace source with the profile's compile template.
///
/// A profile without a compile template succeeds without spawning anything.
#[instrument(skip_all, fields(language = %profile.id))]
pub async fn compile(
    backend: &dyn IsolationBackend,
    workspace: &mut Workspace,
    profile: &LanguageProfile,
    limits: &Limits,
) -> Result<CompileOutcome, SandboxError> {
    let Some(template) = &profile.compile else {
        debug!("Interpreted language, no compile step");
        return Ok(CompileOutcome::skipped());
    };

    let argv = template.expand(&workspace.template_vars());
    if argv.is_empty() {
        return Err(SandboxError::InvalidTemplate {
            language: profile.id.clone(),
            reason: "compile command is empty".into(),
        });
    }

    let outcome = backend
        .run(ProcessSpec {
            argv,
            cwd: workspace.root().to_path_buf(),
            stdin: None,
            timeout: limits.compile_timeout,
            max_output_bytes: limits.max_output_bytes,
        })
        .await?;

    if outcome.timed_out {
        warn!(budget = ?limits.compile_timeout, "Compilation timed out");
        return Ok(CompileOutcome {
            ok: false,
            timed_out: true,
            diagnostics: vec![format!(
                "Compilation timed out after {:?}",
                limits.compile_timeout
            )],
        });
    }

    if !outcome.succeeded() {
        // Some compilers (mcs) report errors on stdout.
        let output = if outcome.stderr.trim().is_empty() {
            outcome.stdout
        } else {
            outcome.stderr
        };
        debug!(exit_code = ?outcome.exit_code, "Compilation failed");
        return Ok(CompileOutcome {
            ok: false,
            timed_out: false,
            diagnostics: vec![format!("Compilation error:\n{}", output.trim_end())],
        });
    }

    workspace.collect_artifacts();
    debug!(elapsed_ms = outcome.elapsed.as_millis(), "Compilation succeeded");
    Ok(CompileOutcome::skipped())
}
