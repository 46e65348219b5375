mod cli;
mod error;
mod listener;
mod manager;

use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, Command};
use manager::{Manager, ManagerOptions};

fn main() -> ExitCode {
	let cli = Cli::parse_args();

	if let Some(Command::Version) = cli.command {
		Cli::print_version();
		return ExitCode::SUCCESS;
	}

	runtime::init_logging(cli.debug);

	let manager = match Manager::new(ManagerOptions::from_cli(&cli)) {
		Ok(manager) => Arc::new(manager),
		Err(err) => {
			log::error!("failed starting up: {err}");
			return ExitCode::FAILURE;
		}
	};

	if let Err(err) = runtime::signal::install(manager.shutdown_handle()) {
		log::error!("failed installing signal handler: {err}");
		return ExitCode::FAILURE;
	}

	match manager.run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			log::error!("exiting after fatal error: {err}");
			ExitCode::FAILURE
		}
	}
}
