use clap::{Parser, Subcommand};

use config::DEFAULT_PORT;

/// Source repository printed by the `version` subcommand.
pub const SOURCE_URL: &str = "https://github.com/bridged-tunnel/bridged";

#[derive(Debug, Parser)]
#[command(name = "bridged", version, about = "bridges Ethernet segments across hosts over TCP")]
pub struct Cli {
	/// Config file to load.
	#[arg(long, default_value = "bridged.yaml")]
	pub config: String,

	/// Watch the config file and live-reload segments on change.
	#[arg(long, default_value_t = false)]
	pub reload: bool,

	/// Verbose logging on interface writes and dial retries.
	#[arg(long, default_value_t = false)]
	pub debug: bool,

	/// Listen address for the shared TCP port, overriding the config's `listen` field.
	#[arg(long)]
	pub listen_address: Option<String>,

	/// Listen port for the shared TCP port, overriding the config's `listen` field.
	#[arg(long)]
	pub listen_port: Option<u16>,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Print the crate version and upstream source location.
	Version,
}

impl Cli {
	pub fn parse_args() -> Self {
		Self::parse()
	}

	pub fn print_version() {
		println!("\tversion: {}", env!("CARGO_PKG_VERSION"));
		println!("\tsource : {SOURCE_URL}");
	}

	pub fn resolved_port(&self) -> u16 {
		self.listen_port.unwrap_or(DEFAULT_PORT)
	}
}
