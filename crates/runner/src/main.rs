//! The `databridge` binary: validate (`check`) or run (`run`) the streams
//! declared in a YAML configuration file.

mod builtins;
mod config_file;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use databridge_core::{ConfigError, MacroRegistry};
use databridge_pipeline::{validate, FunctionRegistry, RunStatus, StreamOrchestrator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "databridge",
    version,
    about = "Configuration-driven data movement between district systems"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every stream in a configuration file
    Check {
        /// Path to the stream configuration YAML
        config: PathBuf,
    },
    /// Run streams from a configuration file
    Run {
        /// Path to the stream configuration YAML
        config: PathBuf,
        /// Stream names to run (all streams when omitted)
        streams: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "databridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Run { config, streams } => run(&config, streams).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "databridge failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn registries() -> (MacroRegistry, Arc<FunctionRegistry>) {
    let macros = MacroRegistry::with_builtins();
    let mut functions = FunctionRegistry::new();
    builtins::register(&mut functions);
    (macros, Arc::new(functions))
}

/// `databridge check`: validate every stream, print findings, exit
/// non-zero if any stream is invalid.
fn check(path: &Path) -> anyhow::Result<ExitCode> {
    let bridge = config_file::load(path)?;
    let (macros, functions) = registries();

    let mut invalid = 0usize;
    for name in bridge.stream_names() {
        let config = bridge
            .stream_config(name)
            .with_context(|| format!("stream '{name}' vanished from configuration"))?;
        match validate(&config, &macros, &functions) {
            Ok(()) => tracing::info!(stream = %name, "Stream configuration valid"),
            Err(ConfigError::Invalid(findings)) => {
                invalid += 1;
                for finding in &findings {
                    eprintln!("{name}: {finding}");
                }
                tracing::warn!(stream = %name, findings = findings.len(), "Stream configuration invalid");
            }
        }
    }

    if invalid == 0 {
        println!("{} stream(s) valid", bridge.streams.len());
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// `databridge run`: run the named streams (all when none named) as
/// parallel tasks and exit with the worst report code.
async fn run(path: &Path, names: Vec<String>) -> anyhow::Result<ExitCode> {
    let bridge = config_file::load(path)?;

    let selected: Vec<String> = if names.is_empty() {
        bridge.stream_names().map(str::to_string).collect()
    } else {
        for name in &names {
            if !bridge.streams.contains_key(name) {
                anyhow::bail!("unknown stream '{name}'");
            }
        }
        names
    };
    if selected.is_empty() {
        anyhow::bail!("configuration declares no streams");
    }

    let adapters = Arc::new(databridge_delivery::default_registry());
    let (macros, functions) = registries();

    let mut handles = Vec::with_capacity(selected.len());
    for name in selected {
        let config = bridge
            .stream_config(&name)
            .with_context(|| format!("stream '{name}' vanished from configuration"))?;
        let orchestrator = StreamOrchestrator::new(
            name.clone(),
            config,
            adapters.clone(),
            macros.clone(),
            functions.clone(),
        )
        .with_context(|| format!("stream '{name}'"))?;
        handles.push(tokio::spawn(orchestrator.run()));
    }

    let mut any_failed = false;
    let mut any_partial = false;
    for outcome in futures::future::join_all(handles).await {
        match outcome {
            Ok(Ok(report)) => {
                for task in report.failed_tasks() {
                    tracing::warn!(
                        stream = %report.stream,
                        task = %task.task,
                        stage = %task.stage,
                        detail = %task.detail,
                        "Task failed",
                    );
                }
                tracing::info!(
                    stream = %report.stream,
                    run_id = %report.run_id,
                    status = %report.status,
                    tasks = report.tasks.len(),
                    "Stream finished",
                );
                match report.status {
                    RunStatus::Success => {}
                    RunStatus::PartialFailure => any_partial = true,
                    RunStatus::Failed => any_failed = true,
                }
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Stream configuration invalid");
                eprintln!("error: {err}");
                any_failed = true;
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "Stream task aborted");
                any_failed = true;
            }
        }
    }

    Ok(if any_failed {
        ExitCode::from(1)
    } else if any_partial {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}
