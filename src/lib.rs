//! code-sandbox library
//!
//! Runs untrusted learner submissions out of process:
//! - Language registry mapping language ids to toolchain command templates
//! - Pre-flight validation (emptiness, size, per-language syntax rules)
//! - Per-submission scratch workspaces that are always removed
//! - Compile and run stages with wall-clock limits and forced kill
//! - An MCP server exposing the sandbox as tools

pub mod backend;
pub mod compile;
pub mod config;
pub mod error;
pub mod execute;
pub mod language;
pub mod mcp;
pub mod result;
pub mod sandbox;
pub mod submission;
pub mod validator;
pub mod workspace;

pub use config::{Config, Limits};
pub use error::SandboxError;
pub use language::{LanguageProfile, LanguageRegistry};
pub use result::{ExecutionResult, ExecutionStatus};
pub use sandbox::Sandbox;
pub use submission::Submission;
pub use validator::ValidationOutcome;
