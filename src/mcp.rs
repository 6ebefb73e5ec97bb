//! MCP server implementation using rmcp.
//!
//! Exposes submission running and validation as MCP tools so an agent or an
//! editor plugin can drive the sandbox over stdio.

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::backend::IsolationBackend;
use crate::error::SandboxError;
use crate::sandbox::Sandbox;
use crate::submission::Submission;

/// MCP server wrapping a [`Sandbox`].
#[derive(Clone)]
pub struct SandboxServer<B: Clone> {
    sandbox: Sandbox<B>,
    tool_router: ToolRouter<Self>,
}

/// Parameters for the run tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunParams {
    #[schemars(description = "Language id or alias (e.g. 'python', 'cpp', 'java')")]
    pub language: String,

    #[schemars(description = "Complete program source")]
    pub code: String,

    #[schemars(description = "Text fed to the program's standard input")]
    #[serde(default)]
    pub stdin: Option<String>,
}

/// Parameters for the validate tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ValidateParams {
    #[schemars(description = "Language id or alias (e.g. 'python', 'cpp', 'java')")]
    pub language: String,

    #[schemars(description = "Complete program source")]
    pub code: String,
}

fn json_content<T: Serialize>(value: &T) -> Result<Content, McpError> {
    serde_json::to_string_pretty(value)
        .map(Content::text)
        .map_err(|e| McpError::internal_error(format!("Failed to encode result: {e}"), None))
}

fn unsupported(err: &SandboxError, available: &[&str]) -> McpError {
    McpError::invalid_params(format!("{err}. Available: {available:?}"), None)
}

#[tool_router]
impl<B: IsolationBackend + Clone + 'static> SandboxServer<B> {
    pub fn new(sandbox: Sandbox<B>) -> Self {
        Self {
            sandbox,
            tool_router: Self::tool_router(),
        }
    }

    /// Validate, compile and run a program.
    #[tool(description = "Compile (if needed) and run a program, returning its output as JSON")]
    async fn run(
        &self,
        Parameters(params): Parameters<RunParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(language = %params.language, code_len = params.code.len(), "Running submission");

        let submission = Submission::new(
            params.code,
            params.language,
            params.stdin.unwrap_or_default(),
        );
        match self.sandbox.run_submission(submission).await {
            Ok(result) => {
                let content = json_content(&result)?;
                if result.is_success() {
                    Ok(CallToolResult::success(vec![content]))
                } else {
                    Ok(CallToolResult::error(vec![content]))
                }
            }
            Err(e @ SandboxError::UnsupportedLanguage(_)) => {
                Err(unsupported(&e, &self.sandbox.registry().ids()))
            }
            Err(e) => {
                error!(error = %e, "Execution failed");
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Execution error: {e}"
                ))]))
            }
        }
    }

    /// Pre-flight checks only.
    #[tool(description = "Check a program for obvious problems without running it")]
    async fn validate(
        &self,
        Parameters(params): Parameters<ValidateParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .sandbox
            .validate_submission(&params.code, &params.language)
            .map_err(|e| unsupported(&e, &self.sandbox.registry().ids()))?;
        let content = json_content(&outcome)?;
        if outcome.is_valid {
            Ok(CallToolResult::success(vec![content]))
        } else {
            Ok(CallToolResult::error(vec![content]))
        }
    }

    #[tool(description = "List supported languages and their toolchain commands")]
    async fn languages(&self) -> Result<CallToolResult, McpError> {
        let profiles: Vec<_> = self.sandbox.registry().profiles().collect();
        Ok(CallToolResult::success(vec![json_content(&profiles)?]))
    }
}

#[tool_handler]
impl<B: IsolationBackend + Clone + 'static> ServerHandler for SandboxServer<B> {
    fn get_info(&self) -> ServerInfo {
        let languages = self.sandbox.registry().ids();

        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "code-sandbox".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Run short programs in a throwaway workspace with a wall-clock limit.\n\
                 Supported languages: {languages:?}\n\
                 \n\
                 Use the 'run' tool with:\n\
                 - language: one of {languages:?}\n\
                 - code: the program source\n\
                 - stdin: optional input text\n\
                 Use 'validate' to check code without running it."
            )),
        }
    }
}

/// Serve the sandbox over stdio.
pub async fn serve_stdio<B: IsolationBackend + Clone + 'static>(
    sandbox: Sandbox<B>,
) -> anyhow::Result<()> {
    let server = SandboxServer::new(sandbox);

    info!("Starting MCP server on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))?;

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    Ok(())
}
