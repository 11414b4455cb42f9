//! `tanglebox` application entry point.
//!
//! The binary parses the command line, loads layered configuration, installs
//! the `tracing` subscriber, connects to the container engine and hands off to
//! the library API. Domain errors are converted into `eyre` reports here.
//!
//! Exit codes: `0` on success, `1` when some files failed, `2` when a sandbox
//! instance could not be removed.

use std::path::PathBuf;
use std::process::ExitCode;

use bollard::Docker;
use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use tanglebox::api::{self, CommandOutcome, SandboxStatus};
use tanglebox::batch::{BatchRequest, Operation};
use tanglebox::config::{AppConfig, BatchArgs, Cli, Commands, load_config};
use tanglebox::engine::{EngineConnector, InstanceStatus, SocketResolver};
use tanglebox::error::{FilesystemError, Result as TangleboxResult};
use tracing_subscriber::EnvFilter;

fn main() -> EyreResult<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli).map_err(Report::from)?;
    let runtime = EngineConnector::create_runtime().map_err(Report::from)?;
    let outcome = runtime
        .block_on(run(&cli, &config))
        .map_err(Report::from)?;

    Ok(ExitCode::from(outcome.exit_code()))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli, config: &AppConfig) -> TangleboxResult<CommandOutcome> {
    let env = mockable::DefaultEnv::new();
    let resolver = SocketResolver::new(&env);
    let docker =
        EngineConnector::connect_with_fallback_and_verify_async(config.engine_socket.as_deref(), &resolver)
            .await?;

    match &cli.command {
        Commands::Tangle(args) => batch(&docker, config, Operation::Extract, args).await,
        Commands::Detangle(args) => batch(&docker, config, Operation::SyncBack, args).await,
        Commands::Evaluate(args) => batch(&docker, config, Operation::Evaluate, args).await,
        Commands::Monitor(args) => {
            let root = current_dir()?.join(&args.folder);
            api::run_monitor(&docker, config, &root, shutdown_signal()).await
        }
        Commands::Status => {
            let status = api::sandbox_status(&docker, config).await?;
            report_status(&status);
            Ok(CommandOutcome::Success)
        }
    }
}

async fn batch(
    docker: &Docker,
    config: &AppConfig,
    operation: Operation,
    args: &BatchArgs,
) -> TangleboxResult<CommandOutcome> {
    let (project, target) = args.resolve(&current_dir()?);
    let request = BatchRequest::new(operation, project, target).with_allow_list(args.files.clone());
    api::run_batch(docker, config, request).await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "cannot listen for Ctrl-C; stopping monitor");
    }
}

fn current_dir() -> TangleboxResult<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|error| FilesystemError::IoError {
        path: PathBuf::from("."),
        message: error.to_string(),
    })?;
    Utf8PathBuf::from_path_buf(dir).map_err(|path| {
        FilesystemError::IoError {
            path,
            message: String::from("working directory is not valid UTF-8"),
        }
        .into()
    })
}

#[expect(clippy::print_stdout, reason = "status output is the command's result")]
fn report_status(status: &SandboxStatus) {
    let image_state = if status.image_present { "present" } else { "missing" };
    let instance_state = match &status.instance_status {
        InstanceStatus::Absent => String::from("absent"),
        InstanceStatus::Running => String::from("running"),
        InstanceStatus::Stopped { state } => format!("stopped ({state})"),
    };
    println!("image    {}: {image_state}", status.image);
    println!("instance {}: {instance_state}", status.instance);
}
