//! VM Deployer - Entry Point
//!
//! Serves `POST /deploy` by default. With `--event=<file>` it runs a single
//! deployment from an event file, prints the response and exits.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use vm_deployer::deploy::pipeline::Deployer;
use vm_deployer::errors::DeployError;
use vm_deployer::filesys::file::File;
use vm_deployer::logs::{init_logging, LogOptions};
use vm_deployer::server::serve::serve;
use vm_deployer::server::state::ServerState;
use vm_deployer::storage::settings::Settings;
use vm_deployer::utils::version_info;

use serde_json::Value;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    // Load settings
    let settings = match load_settings(cli_args.get("config")).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let server_settings = settings.server.clone();
    let deployer = match Deployer::from_settings(settings) {
        Ok(deployer) => Arc::new(deployer),
        Err(e) => {
            error!("Failed to initialize the deployer: {e}");
            return ExitCode::FAILURE;
        }
    };

    // One-shot run from an event file
    if let Some(path) = cli_args.get("event") {
        return run_event(&deployer, path).await;
    }

    info!("Running VM Deployer {}", version.version);
    let state = Arc::new(ServerState::new(deployer));
    let handle = match serve(&server_settings, state, await_shutdown_signal()).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start the server: {e}");
            return ExitCode::FAILURE;
        }
    };

    match handle.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!("Server failed: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Server task failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Settings file (optional) overlaid with the environment
async fn load_settings(path: Option<&String>) -> Result<Settings, DeployError> {
    let mut settings = match path {
        Some(path) => File::new(path).read_json::<Settings>().await?,
        None => Settings::default(),
    };
    settings.apply_process_env()?;
    Ok(settings)
}

async fn run_event(deployer: &Deployer, path: &str) -> ExitCode {
    let event = match File::new(path).read_json::<Value>().await {
        Ok(event) => event,
        Err(e) => {
            error!("Unable to read event file {}: {e}", path);
            return ExitCode::FAILURE;
        }
    };

    let response = deployer.handle_event(event).await;
    let printed = serde_json::json!({
        "statusCode": response.status,
        "body": response.body,
    });
    match serde_json::to_string_pretty(&printed) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Failed to render response: {e}"),
    }

    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
