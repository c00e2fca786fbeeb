use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use errorgate::config::AppConfig;
use errorgate::error::{classify, ErrorRecord, RawError};
use errorgate::lifecycle::{install_panic_hook, install_signal_handler, ShutdownCoordinator};
use errorgate::logging::{init_logging, LoggingConfig};
use errorgate::policy::{ErrorHandler, ResponsePayload, RuntimeEnvironment};
use errorgate::server::{create_router, AppState, DemoStore};

/// Runtime environment as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EnvironmentArg {
    /// Full error details and stacks in responses
    #[value(alias = "dev")]
    Development,
    /// Status and message only
    #[value(alias = "prod")]
    Production,
}

impl From<EnvironmentArg> for RuntimeEnvironment {
    fn from(arg: EnvironmentArg) -> Self {
        match arg {
            EnvironmentArg::Development => RuntimeEnvironment::Development,
            EnvironmentArg::Production => RuntimeEnvironment::Production,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "errorgate")]
#[command(version)]
#[command(about = "Error classification and response shaping for HTTP services")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the demonstration HTTP service
    Serve {
        /// Path to a TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Runtime environment (overrides the configuration)
        #[arg(long, short, value_enum)]
        environment: Option<EnvironmentArg>,

        /// Port to listen on (overrides the configuration)
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Classify a raw error given as JSON and print the result
    Classify {
        /// Environment used to shape the client payload
        #[arg(long, short, value_enum, default_value = "production")]
        environment: EnvironmentArg,

        /// File containing the raw error; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

/// Exit codes for the classify command
mod exit_codes {
    use std::process::ExitCode;

    /// Input could not be read or was not JSON
    pub fn bad_input() -> ExitCode {
        ExitCode::from(2)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Serve {
            config,
            environment,
            port,
        } => {
            let app_config = match AppConfig::load(config.as_deref()) {
                Ok(app_config) => app_config,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            serve(app_config.with_overrides(environment.map(Into::into), port)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Classify { environment, file } => {
            Ok(classify_command(environment.into(), file))
        }
    }
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = ShutdownCoordinator::new(config.grace_period());
    install_signal_handler(&shutdown)?;
    install_panic_hook(&shutdown);

    let handler = ErrorHandler::from_config(&config, Arc::new(shutdown.clone()));
    let store = DemoStore::new();
    let state = AppState::new(handler, store.clone(), shutdown.clone());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        environment = %config.environment,
        log_dir = %config.log_dir.display(),
        "Server is listening"
    );

    let signal = shutdown.clone();
    let served = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            signal.wait().await;
            tracing::info!("Closing server...");
        })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "server stopped with an error");
    }

    tracing::info!("Server closed, closing store connection...");
    store.disconnect().await;
    shutdown.finish_with(&served);

    served.map_err(Into::into)
}

/// Classification result printed by `errorgate classify`
#[derive(Debug, Serialize)]
struct ClassifyReport {
    classification: ErrorRecord,
    response: ReportedResponse,
    fatal: bool,
}

#[derive(Debug, Serialize)]
struct ReportedResponse {
    status: u16,
    body: ResponsePayload,
}

fn classify_command(environment: RuntimeEnvironment, file: Option<PathBuf>) -> ExitCode {
    let input = match read_input(file.as_ref()) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::bad_input();
        }
    };
    let value: Value = match serde_json::from_str(&input) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error: input is not valid JSON: {}", e);
            return exit_codes::bad_input();
        }
    };

    let record = classify(RawError::from(value));
    let report = ClassifyReport {
        response: ReportedResponse {
            status: record.http_status(),
            body: ResponsePayload::render(&record, environment),
        },
        fatal: !record.is_operational(),
        classification: record,
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn read_input(file: Option<&PathBuf>) -> std::io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}
