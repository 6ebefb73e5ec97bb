//! code-sandbox command line
//!
//! Runs or validates a single source file, lists the configured languages,
//! or serves the sandbox as an MCP server on stdio. Results are printed to
//! stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use code_sandbox::{mcp, Config, LanguageRegistry, Sandbox, Submission};

#[derive(Parser, Debug)]
#[command(name = "code-sandbox")]
#[command(about = "Compile and run short programs in a throwaway workspace")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, compile and run a source file
    Run {
        /// Source file, or `-` to read the program from stdin
        file: PathBuf,

        /// Language id or alias; inferred from the file extension if omitted
        #[arg(short, long)]
        language: Option<String>,

        /// File whose contents are fed to the program's stdin
        #[arg(long)]
        stdin: Option<PathBuf>,

        /// Wall-clock limit for the run, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run only the pre-flight checks on a source file
    Validate {
        file: PathBuf,

        #[arg(short, long)]
        language: Option<String>,
    },

    /// List supported languages
    Languages,

    /// Serve the sandbox as an MCP server
    Serve {
        /// Run in stdio mode (for MCP clients)
        #[arg(long)]
        stdio: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // stderr, so stdout stays clean for JSON and the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Run {
            file,
            language,
            stdin,
            timeout,
        } => {
            if let Some(secs) = timeout.filter(|&s| s > 0) {
                config.timeout_seconds = secs;
            }
            let sandbox = Sandbox::new(&config);
            let language = resolve_language(sandbox.registry(), language, &file)?;
            let source = read_source(&file).await?;
            let stdin = match stdin {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => String::new(),
            };

            let result = sandbox
                .run_submission(Submission::new(source, language, stdin))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Validate { file, language } => {
            let sandbox = Sandbox::new(&config);
            let language = resolve_language(sandbox.registry(), language, &file)?;
            let source = read_source(&file).await?;

            let outcome = sandbox.validate_submission(&source, &language)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Languages => {
            let registry = LanguageRegistry::with_overrides(&config.languages);
            let profiles: Vec<_> = registry.profiles().collect();
            println!("{}", serde_json::to_string_pretty(&profiles)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { stdio } => {
            if !stdio {
                bail!("Only --stdio mode is currently supported");
            }
            let sandbox = Sandbox::new(&config);
            info!(
                languages = ?sandbox.registry().ids(),
                scratch = %sandbox.scratch_root().display(),
                "Loaded configuration"
            );
            mcp::serve_stdio(sandbox).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_language(
    registry: &LanguageRegistry,
    explicit: Option<String>,
    file: &Path,
) -> Result<String> {
    if let Some(language) = explicit {
        return Ok(language);
    }
    let Some(extension) = file.extension().and_then(|e| e.to_str()) else {
        bail!("Cannot infer language for {}; pass --language", file.display());
    };
    registry
        .profile_for_extension(extension)
        .map(|p| p.id.clone())
        .with_context(|| format!("No language uses the .{extension} extension; pass --language"))
}

async fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read program from stdin")?;
        return Ok(source);
    }
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}
