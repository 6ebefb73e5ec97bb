//! Sandbox configuration.
//!
//! Loaded from a JSON file (`--config`), or inline JSON in the
//! `CODE_SANDBOX_CONFIG` environment variable, or defaults. Individual
//! `CODE_SANDBOX_*` variables override the loaded values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::language::LanguageOverride;

/// Top-level configuration for the sandbox.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wall-clock budget for running a program, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Wall-clock budget for the compile step, in seconds.
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_seconds: u64,

    /// Sources larger than this are rejected outright.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,

    /// Sources longer than this (in characters) get a warning.
    #[serde(default = "default_size_warning_chars")]
    pub size_warning_chars: usize,

    /// Cap on captured stdout and stderr, each.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Directory under which per-submission workspaces are created.
    /// Defaults to `<system temp>/code-sandbox`.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    /// Per-language toolchain overrides and additions, keyed by language id.
    #[serde(default)]
    pub languages: HashMap<String, LanguageOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            compile_timeout_seconds: default_compile_timeout(),
            max_source_bytes: default_max_source_bytes(),
            size_warning_chars: default_size_warning_chars(),
            max_output_bytes: default_max_output_bytes(),
            scratch_root: None,
            languages: HashMap::new(),
        }
    }
}

/// Budgets derived from [`Config`], with `Duration` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub compile_timeout: Duration,
    pub max_source_bytes: usize,
    pub size_warning_chars: usize,
    pub max_output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Config::default().limits()
    }
}

impl Config {
    /// Load configuration.
    ///
    /// Priority: explicit file > `CODE_SANDBOX_CONFIG` JSON > defaults, then
    /// `CODE_SANDBOX_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if let Ok(json) = std::env::var("CODE_SANDBOX_CONFIG") {
            Self::from_json(&json).context("Failed to parse CODE_SANDBOX_CONFIG")?
        } else {
            debug!("No configuration supplied, using defaults");
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Create a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }

    /// Apply `CODE_SANDBOX_TIMEOUT`, `CODE_SANDBOX_COMPILE_TIMEOUT` and
    /// `CODE_SANDBOX_SCRATCH` from `lookup`. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = parse_seconds(&lookup, "CODE_SANDBOX_TIMEOUT") {
            self.timeout_seconds = secs;
        }
        if let Some(secs) = parse_seconds(&lookup, "CODE_SANDBOX_COMPILE_TIMEOUT") {
            self.compile_timeout_seconds = secs;
        }
        if let Some(dir) = lookup("CODE_SANDBOX_SCRATCH").filter(|d| !d.is_empty()) {
            self.scratch_root = Some(PathBuf::from(dir));
        }
    }

    /// Scratch root, falling back to `<temp>/code-sandbox`. A relative root
    /// is joined onto the current directory, since toolchains run with the
    /// workspace as their working directory and need absolute file paths.
    pub fn resolved_scratch_root(&self) -> PathBuf {
        let root = self
            .scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("code-sandbox"));
        if root.is_absolute() {
            return root;
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(root),
            Err(e) => {
                warn!(error = %e, "Cannot resolve relative scratch root");
                root
            }
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            timeout: Duration::from_secs(self.timeout_seconds),
            compile_timeout: Duration::from_secs(self.compile_timeout_seconds),
            max_source_bytes: self.max_source_bytes,
            size_warning_chars: self.size_warning_chars,
            max_output_bytes: self.max_output_bytes,
        }
    }
}

fn parse_seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid timeout override");
            None
        }
    }
}

const fn default_timeout() -> u64 {
    5
}

const fn default_compile_timeout() -> u64 {
    10
}

const fn default_max_source_bytes() -> usize {
    1024 * 1024
}

const fn default_size_warning_chars() -> usize {
    50_000
}

const fn default_max_output_bytes() -> usize {
    1024 * 1024
}
