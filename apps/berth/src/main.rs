//! berth - queue-driven installer for packages and web apps
//!
//! This is the CLI application. It loads configuration, opens the job
//! database, wires the local platform and drives the install pipeline
//! through the ops crate.

mod cli;
mod display;
mod error;
mod events;
mod logging;
mod setup;

use crate::cli::{Cli, Commands};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use crate::setup::SystemSetup;
use berth_config::Config;
use berth_events::EventReceiver;
use berth_ops::{EnqueueReport, InstallService, JobInfo, OperationResult, ProgressReport};
use berth_types::{ColorChoice, Job};
use clap::Parser;
use std::path::Path;
use std::process;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    cli.command.validate().map_err(CliError::InvalidArguments)?;

    // File config (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);

    init_tracing(cli.global.json, cli.global.debug, &config.log_dir());
    info!(command = cli.command.name(), "Starting berth v{}", env!("CARGO_PKG_VERSION"));

    let mut setup = SystemSetup::new(config.clone());
    setup.initialize().await?;

    let (event_sender, event_receiver) = berth_events::channel();
    let service = setup.build_service(event_sender)?;

    if cli.command.runs_pipeline() {
        let channels = setup
            .take_channels()
            .ok_or_else(|| CliError::Setup("platform channels already taken".to_string()))?;
        let resumed = service
            .start(channels.transport_rx, channels.lifecycle_rx)
            .await?;
        info!(resumed, "Install service running");
    }

    let renderer = OutputRenderer::new(cli.global.json, config.general.color);
    let colors_enabled = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stderr().features().colors_supported(),
    };
    let mut event_handler = EventHandler::new(colors_enabled, cli.global.debug);

    let result = execute_command_with_events(
        cli.command,
        service.clone(),
        event_receiver,
        &mut event_handler,
        cli.global.json,
    )
    .await;
    service.stop().await;
    let result = result?;

    renderer.render_result(&result)?;

    if !result.is_success() {
        return Err(CliError::InvalidArguments(
            "some jobs were not accepted".to_string(),
        ));
    }

    info!("Command completed successfully");
    Ok(())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    service: InstallService,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
    json_mode: bool,
) -> Result<OperationResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, service));

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(message) = event_receiver.try_recv() {
                    dispatch_event(event_handler, message, json_mode);
                }
                return result;
            }

            message = event_receiver.recv() => {
                if let Some(message) = message {
                    dispatch_event(event_handler, message, json_mode);
                }
            }
        }
    }
}

/// JSON output stays clean; events only reach the log
fn dispatch_event(
    event_handler: &mut EventHandler,
    message: berth_events::EventMessage,
    json_mode: bool,
) {
    if json_mode {
        logging::log_event_with_tracing(&message);
    } else {
        event_handler.handle_event(message);
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    service: InstallService,
) -> Result<OperationResult, CliError> {
    match command {
        Commands::Enqueue { file } => {
            let report = submit_job_file(&service, &file, false).await?;
            Ok(OperationResult::Enqueue(report))
        }

        Commands::UpdateAll { file } => {
            let report = submit_job_file(&service, &file, true).await?;
            Ok(OperationResult::Enqueue(report))
        }

        Commands::List => Ok(berth_ops::list_jobs(service.context()).await?),

        Commands::Cancel { id } => {
            if service.cancel(&id).await? {
                Ok(OperationResult::Success(format!("Cancelled {id}")))
            } else {
                Err(CliError::InvalidArguments(format!("no job with id {id}")))
            }
        }

        Commands::Progress { id } => {
            let (total_size_bytes, bytes_downloaded) = service.progress(&id).await?;
            Ok(OperationResult::Progress(ProgressReport {
                job_id: id,
                total_size_bytes,
                bytes_downloaded,
            }))
        }

        Commands::Faults => Ok(berth_ops::list_faults(service.context()).await?),

        Commands::Resume => {
            service.wait_idle().await;
            Ok(berth_ops::list_jobs(service.context()).await?)
        }
    }
}

/// Admit every job in `file`, then wait for the queue to drain
async fn submit_job_file(
    service: &InstallService,
    file: &Path,
    is_update: bool,
) -> Result<EnqueueReport, CliError> {
    let jobs = berth_ops::load_job_file(file).await?;
    let ids: Vec<String> = jobs.iter().map(|job| job.id.clone()).collect();

    let mut report = EnqueueReport::default();
    for job in jobs {
        let id = job.id.clone();
        if submit(service, job, is_update).await {
            report.accepted.push(id);
        } else {
            report.rejected.push(id);
        }
    }

    service.wait_idle().await;

    for id in &ids {
        if let Some(job) = service.jobs().get_by_id(id).await? {
            report.remaining.push(JobInfo::from(&job));
        }
    }
    Ok(report)
}

async fn submit(service: &InstallService, job: Job, is_update: bool) -> bool {
    if is_update {
        service.enqueue_update(job).await
    } else {
        service.enqueue(job).await
    }
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool, log_dir: &Path) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if debug_enabled {
        // Structured JSON logs to a timestamped file
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            if !json_mode {
                eprintln!("Warning: Failed to create log directory: {e}");
            }
        }

        let log_file = log_dir.join(format!(
            "berth-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| {
                                tracing_subscriber::EnvFilter::new(
                                    "info,berth=debug,berth_ops=debug,berth_install=debug",
                                )
                            },
                        ),
                    )
                    .init();

                if !json_mode {
                    eprintln!("Debug logging enabled: {}", log_file.display());
                }
                return;
            }
            Err(e) => {
                if !json_mode {
                    eprintln!("Warning: Failed to create log file: {e}");
                }
            }
        }
    }

    if json_mode {
        // Nothing may contaminate the JSON document on stdout
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("warn,berth=warn,berth_ops=warn")
                }),
            )
            .init();
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs) {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if global.json {
        config.general.default_output = berth_types::OutputFormat::Json;
    }
}
