//! bq-starrocks CLI - BigQuery query results to StarRocks or Cloud Storage.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use bq_starrocks::api::{self, AppState};
use bq_starrocks::{
    BigQueryWarehouse, Config, DriverImpl, ExportDriver, ExportParams, ExportResult, LoadError,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "bq-starrocks")]
#[command(about = "Export BigQuery query results to Cloud Storage or load them into StarRocks")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (default: read from environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default unless RUN_MODE=job)
    Serve {
        /// Listen port [default: config or PORT, 8080]
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one request described by JOB_* environment variables
    Job,

    /// Run one request described by arguments
    Run {
        /// Warehouse SQL
        #[arg(long)]
        query: String,

        /// Warehouse execution location (e.g. US, asia-northeast1)
        #[arg(long)]
        location: String,

        /// Destination table, `table` or `db.table`
        #[arg(long)]
        table: Option<String>,

        /// Destination database for a bare table name
        #[arg(long)]
        database: Option<String>,

        /// DDL to run instead of creating or evolving the table
        #[arg(long)]
        create_ddl: Option<String>,

        /// gs:// folder or URI pattern for Parquet export
        #[arg(long)]
        output: Option<String>,

        /// File name prefix for Parquet export
        #[arg(long)]
        filename: Option<String>,

        /// Add a timestamp to exported file names
        #[arg(long)]
        use_timestamp: bool,
    },

    /// Check warehouse credentials and destination connectivity
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), LoadError> {
    let cli = Cli::parse();

    // Variables already set in the process take precedence over the file.
    let dotenv = dotenvy::dotenv();

    setup_logging(&cli.verbosity, &cli.log_format);

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {
            info!("No .env file found, using system environment variables")
        }
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = load_config(cli.config.as_ref())?;
    let command = cli.command.unwrap_or_else(default_command);

    match command {
        Commands::Serve { port } => {
            let shutdown = setup_signal_handler();
            let warehouse = Arc::new(BigQueryWarehouse::new(&config.warehouse).await?);
            let driver = Arc::new(DriverImpl::from_config(&config).await?);

            let state = AppState::new(warehouse, Arc::clone(&driver), shutdown)
                .with_api_key(config.server.api_key.as_deref());
            let result = api::serve(port.unwrap_or(config.server.port), state).await;

            driver.close().await;
            result?;
        }

        Commands::Job => {
            let params = ExportParams::from_env()?;
            execute_once(&config, &params, cli.output_json).await?;
        }

        Commands::Run {
            query,
            location,
            table,
            database,
            create_ddl,
            output,
            filename,
            use_timestamp,
        } => {
            let params = ExportParams {
                query,
                query_location: location,
                table,
                database,
                create_ddl,
                output,
                filename,
                use_timestamp,
            };
            params.validate()?;
            execute_once(&config, &params, cli.output_json).await?;
        }

        Commands::HealthCheck => health_check(&config, cli.output_json).await?,
    }

    Ok(())
}

fn default_command() -> Commands {
    match std::env::var("RUN_MODE") {
        Ok(mode) if mode.eq_ignore_ascii_case("job") => Commands::Job,
        _ => Commands::Serve { port: None },
    }
}

/// Load configuration from a file or the environment. Every failure here is a
/// configuration error.
fn load_config(path: Option<&PathBuf>) -> Result<Config, LoadError> {
    let loaded = match path {
        Some(path) => {
            let config = Config::load(path);
            if config.is_ok() {
                info!("Loaded configuration from {:?}", path);
            }
            config
        }
        None => Config::from_env(),
    };
    loaded.map_err(|e| match e {
        LoadError::Config(_) => e,
        other => LoadError::Config(other.to_string()),
    })
}

async fn execute_once(
    config: &Config,
    params: &ExportParams,
    output_json: bool,
) -> Result<(), LoadError> {
    let cancel = setup_signal_handler();
    let warehouse = BigQueryWarehouse::new(&config.warehouse).await?;
    let driver = DriverImpl::from_config(config).await?;

    info!(driver = driver.name(), location = %params.query_location, "Starting job execution");
    let start = Instant::now();
    let result = driver.execute(&warehouse, params, &cancel).await;
    driver.close().await;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Job execution failed");
            return Err(e);
        }
    };
    let elapsed = start.elapsed().as_secs_f64();

    match &result {
        ExportResult::Exported { gcs_path } => {
            info!(gcs_path = %gcs_path, elapsed_secs = elapsed, "Job execution completed");
        }
        ExportResult::Loaded(loaded) => {
            info!(
                table = %loaded.table,
                rows = loaded.rows_loaded,
                elapsed_secs = elapsed,
                "Job execution completed"
            );
        }
    }

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result {
            ExportResult::Exported { gcs_path } => println!("Exported to {}", gcs_path),
            ExportResult::Loaded(loaded) => {
                println!("Loaded {} rows into {}", loaded.rows_loaded, loaded.table)
            }
        }
    }

    Ok(())
}

async fn health_check(config: &Config, output_json: bool) -> Result<(), LoadError> {
    let start = Instant::now();
    let warehouse = BigQueryWarehouse::new(&config.warehouse).await;
    let warehouse_latency_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let destination = match DriverImpl::from_config(config).await {
        Ok(driver) => {
            let checked = driver.health_check().await;
            driver.close().await;
            checked
        }
        Err(e) => Err(e),
    };
    let destination_latency_ms = start.elapsed().as_millis() as u64;

    let warehouse_error = warehouse.as_ref().err().map(ToString::to_string);
    let destination_error = destination.as_ref().err().map(ToString::to_string);
    let healthy = warehouse_error.is_none() && destination_error.is_none();

    if output_json {
        let report = serde_json::json!({
            "warehouse_connected": warehouse_error.is_none(),
            "warehouse_latency_ms": warehouse_latency_ms,
            "warehouse_error": warehouse_error,
            "destination_connected": destination_error.is_none(),
            "destination_latency_ms": destination_latency_ms,
            "destination_error": destination_error,
            "driver": config.driver.to_string(),
            "healthy": healthy,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Health Check Results:");
        println!(
            "  Warehouse (BigQuery): {} ({}ms)",
            if warehouse_error.is_none() { "OK" } else { "FAILED" },
            warehouse_latency_ms
        );
        if let Some(ref err) = warehouse_error {
            println!("    Error: {}", err);
        }
        println!(
            "  Destination ({}): {} ({}ms)",
            config.driver,
            if destination_error.is_none() { "OK" } else { "FAILED" },
            destination_latency_ms
        );
        if let Some(ref err) = destination_error {
            println!("    Error: {}", err);
        }
        println!(
            "\n  Overall: {}",
            if healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !healthy {
        return Err(LoadError::Config("Health check failed".to_string()));
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM (Cloud Run shutdown).
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    info!("Received {}. Shutting down gracefully...", name);
                    token.cancel();
                });
            }
            Err(e) => error!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Windows only delivers Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    cancel_token
}
