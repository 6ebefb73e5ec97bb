//! Per-submission scratch workspaces.
//!
//! Each submission gets its own randomly-suffixed directory under the scratch
//! root, so concurrent submissions never need to coordinate. The directory is
//! removed by [`Workspace::release`], or by drop if release is never reached.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::error::SandboxError;
use crate::language::{FileStemPolicy, LanguageProfile, TemplateVars};
use crate::submission::Submission;

/// Stem used when the language doesn't care about the file name.
pub const GENERATED_STEM: &str = "main";

/// Stem used when a declared type name was required but not found.
pub const FALLBACK_TYPE_STEM: &str = "Main";

/// Exclusively-owned scratch area for one submission.
#[derive(Debug)]
pub struct Workspace {
    root: TempDir,
    source_file: PathBuf,
    program_name: String,
    artifacts: BTreeSet<PathBuf>,
    diagnostics: Vec<String>,
}

impl Workspace {
    /// Create a fresh directory under `scratch_root` and write the source.
    ///
    /// Any failure after the directory exists removes it again before the
    /// error is returned.
    #[instrument(skip_all, fields(language = %profile.id))]
    pub fn allocate(
        scratch_root: &Path,
        submission: &Submission,
        profile: &LanguageProfile,
    ) -> Result<Self, SandboxError> {
        std::fs::create_dir_all(scratch_root).map_err(|e| {
            SandboxError::environment(
                format!("failed to create scratch root {}", scratch_root.display()),
                e,
            )
        })?;

        let root = tempfile::Builder::new()
            .prefix("submission-")
            .tempdir_in(scratch_root)
            .map_err(|e| SandboxError::environment("failed to create workspace directory", e))?;

        let mut diagnostics = Vec::new();
        let program_name = match profile.file_stem {
            FileStemPolicy::Generated => GENERATED_STEM.to_owned(),
            FileStemPolicy::DeclaredType => {
                if let Some(name) = extract_public_type(&submission.source_text) {
                    name.to_owned()
                } else {
                    warn!("No public type declaration found, using fallback file name");
                    diagnostics.push(format!(
                        "no public class declaration found; source saved as {FALLBACK_TYPE_STEM}"
                    ));
                    FALLBACK_TYPE_STEM.to_owned()
                }
            }
        };

        let file_name = if profile.source_extension.is_empty() {
            program_name.clone()
        } else {
            format!("{program_name}.{}", profile.source_extension)
        };
        let source_file = root.path().join(file_name);

        // `root` drops (and removes the directory) if this fails.
        std::fs::write(&source_file, &submission.source_text)
            .map_err(|e| SandboxError::environment("failed to write source file", e))?;

        debug!(
            dir = %root.path().display(),
            program = %program_name,
            bytes = submission.source_text.len(),
            "Allocated workspace"
        );

        Ok(Self {
            root,
            source_file,
            program_name,
            artifacts: BTreeSet::new(),
            diagnostics,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// File stem; also the class name the JVM is invoked with.
    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Notes produced while allocating (e.g. name extraction fallback).
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.artifacts.iter().map(PathBuf::as_path)
    }

    pub fn template_vars(&self) -> TemplateVars<'_> {
        TemplateVars {
            source: &self.source_file,
            dir: self.root.path(),
            stem: &self.program_name,
        }
    }

    /// Record every file in the workspace other than the source as an
    /// auxiliary artifact (binaries, class files).
    pub fn collect_artifacts(&mut self) {
        let entries = match std::fs::read_dir(self.root.path()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cannot list workspace");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path != self.source_file {
                self.artifacts.insert(path);
            }
        }
        debug!(count = self.artifacts.len(), "Collected build artifacts");
    }

    /// Remove the workspace directory and everything in it.
    pub fn release(self) {
        let dir = self.root.path().to_path_buf();
        match self.root.close() {
            Ok(()) => debug!(dir = %dir.display(), "Released workspace"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

/// Best-effort scan for `public class Name` (modifiers allowed in between).
pub fn extract_public_type(source: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(
            r"\bpublic\s+(?:(?:final|abstract|static|strictfp|sealed)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        )
        .expect("class pattern is valid")
    });

    pattern
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
