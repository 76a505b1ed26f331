use std::process::ExitCode;

use apt_adapter::{
    cli::{error::CliError, Cli},
    command::OsCommandExecutor,
    context::Context,
    packages::AptPackageManager,
};
use clap::Parser;
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_debug_info() {
        println!("Printing debug info");
        println!("CLI: {:#?}", cli);
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            err.into()
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.load_config()?;
    config.log.try_init()?;
    debug!(config = ?config, "configuration loaded");

    let ctx = Context::new();
    create_shutdown_signal_handler(ctx.clone())?;

    let executor = OsCommandExecutor::new()
        .with_timeout(config.command_timeout.map(Into::into))
        .with_shutdown_timeout(config.shutdown_timeout.into());
    let manager = AptPackageManager::new(executor, config.commands());

    let report = cli
        .operation
        .execute(&manager, &ctx)
        .inspect_err(|err| error!("{err}"))?;

    if let Some(report) = report {
        println!("{}", cli.output().render(&report)?);
    }
    Ok(())
}

/// Cancels `ctx` on SIGINT or SIGTERM so that running package tools are terminated.
fn create_shutdown_signal_handler(ctx: Context) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received termination signal. Stopping running commands");
        ctx.cancel();
    })
    .inspect_err(|e| error!("Could not set signal handler: {e}"))
}
