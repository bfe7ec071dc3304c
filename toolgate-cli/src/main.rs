//! Toolgate CLI - run tool calls through the gateway from a shell

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolgate_core::prelude::*;
use toolgate_core::providers::builtin::{Calculator, FileRead};

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Tool invocation gateway CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON); defaults to the layered lookup
    #[arg(short, long, global = true, env = "TOOLGATE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Root the builtin file_read tool may read from (repeatable)
    #[arg(long = "read-root", global = true)]
    read_roots: Vec<String>,

    /// Replay results from a fixture file instead of running builtin tools
    #[arg(long, global = true, conflicts_with = "record")]
    fixtures: Option<PathBuf>,

    /// Record builtin tool results into a fixture file
    #[arg(long, global = true)]
    record: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tools the gateway allows
    Tools {
        /// Print full contracts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Execute one tool call and print the result
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Budget key for the call
        #[arg(long)]
        run_id: Option<String>,

        /// Timeout override in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Scopes granted to the call (repeatable)
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Version information
    Version,
}

fn parse_args(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("--args is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--args must be a JSON object, got {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("warn");

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("toolgate {}", env!("CARGO_PKG_VERSION"));
        println!("toolgate-core {}", toolgate_core::VERSION);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::load()?,
    };

    let mut recorder = None;
    let provider: Arc<dyn Provider> = match &cli.fixtures {
        Some(path) => Arc::new(FixtureProvider::from_file("fixtures", path)?),
        None => {
            let native: Arc<dyn Provider> = Arc::new(
                NativeProvider::new("builtin")
                    .with_tool(Calculator::new()?)?
                    .with_tool(FileRead::new(cli.read_roots.clone())?)?,
            );
            if cli.record.is_some() {
                let recording = Arc::new(RecordingProvider::new(native));
                recorder = Some(Arc::clone(&recording));
                recording as Arc<dyn Provider>
            } else {
                native
            }
        }
    };

    let gateway = Gateway::builder()
        .with_config(&config)
        .provider(provider)
        .build()?;

    match cli.command {
        Commands::Tools { json } => {
            let contracts = gateway.list_tools().await;
            if json {
                let dicts: Vec<Value> = contracts.iter().map(|c| c.to_dict()).collect();
                println!("{}", serde_json::to_string_pretty(&dicts)?);
            } else if contracts.is_empty() {
                println!("No tools allowlisted");
            } else {
                for contract in contracts {
                    println!(
                        "{:<24} {:<6} {}",
                        contract.name(),
                        contract.risk(),
                        contract.description()
                    );
                }
            }
        }
        Commands::Call {
            tool,
            args,
            run_id,
            timeout_ms,
            scopes,
        } => {
            let mut call = ToolCall::new(tool).with_arguments(parse_args(&args)?);
            if let Some(run_id) = run_id {
                call = call.with_run_id(run_id);
            }
            if let Some(ms) = timeout_ms {
                call = call.with_timeout(Duration::from_millis(ms));
            }
            if !scopes.is_empty() {
                call = call.with_scopes(scopes);
            }

            let result = gateway.execute(call).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if let (Some(recording), Some(path)) = (recorder, &cli.record) {
                recording.save(path)?;
                tracing::info!(path = %path.display(), "Fixtures saved");
            }
            if !result.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(r#"{"operation": "add", "a": 2, "b": 3}"#).unwrap();
        assert_eq!(args["a"], 2);
        assert!(parse_args("[1, 2]").is_err());
        assert!(parse_args("not json").is_err());
    }

    #[test]
    fn test_call_command() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "call",
            "calculator",
            "--args",
            r#"{"a": 1}"#,
            "--scope",
            "math",
            "--run-id",
            "r1",
        ])
        .unwrap();
        match cli.command {
            Commands::Call {
                tool,
                scopes,
                run_id,
                ..
            } => {
                assert_eq!(tool, "calculator");
                assert_eq!(scopes, vec!["math"]);
                assert_eq!(run_id.as_deref(), Some("r1"));
            }
            _ => panic!("expected call"),
        }
    }
}
