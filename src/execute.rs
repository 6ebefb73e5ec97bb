//! Execution stage.

use tracing::{debug, instrument};

use crate::backend::{IsolationBackend, ProcessSpec};
use crate::config::Limits;
use crate::error::SandboxError;
use crate::language::LanguageProfile;
use crate::workspace::Workspace;

/// Outcome of running the program once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Timeout, truncation and signal notes for the caller.
    pub notes: Vec<String>,
}

/// Run the (compiled or interpreted) program in `workspace`.
///
/// Empty `stdin_text` gives the program an immediately-closed stdin.
#[instrument(skip_all, fields(language = %profile.id, program = %workspace.program_name()))]
pub async fn execute(
    backend: &dyn IsolationBackend,
    workspace: &Workspace,
    profile: &LanguageProfile,
    stdin_text: &str,
    limits: &Limits,
) -> Result<RunOutcome, SandboxError> {
    let argv = profile.run.expand(&workspace.template_vars());
    if argv.is_empty() {
        return Err(SandboxError::InvalidTemplate {
            language: profile.id.clone(),
            reason: "run command is empty".into(),
        });
    }

    let outcome = backend
        .run(ProcessSpec {
            argv,
            cwd: workspace.root().to_path_buf(),
            stdin: (!stdin_text.is_empty()).then(|| stdin_text.to_owned()),
            timeout: limits.timeout,
            max_output_bytes: limits.max_output_bytes,
        })
        .await?;

    let mut notes = Vec::new();
    if outcome.timed_out {
        notes.push(format!("Execution timed out after {:?}", limits.timeout));
    } else if outcome.exit_code.is_none() {
        notes.push("Process was terminated by a signal".to_owned());
    }
    if outcome.truncated {
        notes.push(format!(
            "Output truncated to {} bytes",
            limits.max_output_bytes
        ));
    }

    debug!(
        exit_code = ?outcome.exit_code,
        timed_out = outcome.timed_out,
        elapsed_ms = outcome.elapsed.as_millis(),
        "Execution finished"
    );

    Ok(RunOutcome {
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
        timed_out: outcome.timed_out,
        notes,
    })
}
