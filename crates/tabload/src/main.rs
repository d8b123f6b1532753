//! tabload - bulk-load delimited files from object storage into MySQL

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tabload::{Config, MySqlSink, Pipeline, RunError, RunResult, S3Store};
use tabload_common::logging::{init_logging, LogConfig, LogLevel};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const EXIT_SUCCESS: u8 = 0;
const EXIT_FILE_FAILURES: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tabload")]
#[command(author, version, about = "Load tabular files from S3 into MySQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one load run
    Run {
        /// Configuration file (TOML)
        #[arg(short, long, env = "TABLOAD_CONFIG")]
        config: Option<PathBuf>,

        /// Override the configured concurrency
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the run result as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Load and validate configuration without touching storage or the sink
    CheckConfig {
        /// Configuration file (TOML)
        #[arg(short, long, env = "TABLOAD_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tabload")
        .filter_directives("aws_config=warn,aws_smithy_runtime=warn,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid logging configuration: {}", e);
            return ExitCode::from(EXIT_FATAL);
        },
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(EXIT_FATAL);
        },
    };

    let outcome = match cli.command {
        Command::Run {
            config,
            concurrency,
            json,
        } => run(config, concurrency, json).await,
        Command::CheckConfig { config } => check_config(config),
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
        eprintln!("error: {:#}", e);
    }
    ExitCode::from(exit_status(&outcome))
}

/// Fatal errors map to 2; otherwise the command's own status
fn exit_status(outcome: &Result<u8>) -> u8 {
    match outcome {
        Ok(status) => *status,
        Err(_) => EXIT_FATAL,
    }
}

/// 0 when no file failed, 1 otherwise
fn run_status(result: &RunResult) -> u8 {
    if result.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FILE_FAILURES
    }
}

async fn run(config_path: Option<PathBuf>, concurrency: Option<usize>, json: bool) -> Result<u8> {
    let mut config = Config::load(config_path.as_deref()).map_err(RunError::from)?;
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
        config.validate().map_err(RunError::from)?;
    }

    let store = Arc::new(S3Store::new(&config.storage).await);
    let sink = Arc::new(MySqlSink::connect_lazy(&config.sink));
    let pipeline = Pipeline::new(config.pipeline_options()?, config.loader()?, store, sink);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = pipeline.run(cancel).await?;

    for failure in result.failed() {
        eprintln!("FAILED {} [{}]: {}", failure.source_key, failure.stage, failure.reason);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    info!("{}", result.summary());

    Ok(run_status(&result))
}

fn check_config(config_path: Option<PathBuf>) -> Result<u8> {
    let config = Config::load(config_path.as_deref())?;
    let location = config.location()?;

    println!("bucket: {}", location.bucket);
    println!("prefix: {}", location.prefix);
    println!("staging_directory: {}", config.staging_directory.display());
    println!("concurrency: {}", config.concurrency);
    println!(
        "sink: {}@{}:{}/{}",
        config.sink.username, config.sink.host, config.sink.port, config.sink.database
    );
    Ok(EXIT_SUCCESS)
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling run");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling run");
        },
    }

    token.cancel();
}
