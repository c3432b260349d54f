use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jumpgate_coord::CoordConfig;
use jumpgate_proto::InstanceId;

#[derive(Parser, Debug)]
#[command(name = "jumpgate")]
#[command(about = "Inspect jump action instances and send them commands")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// TOML settings file
	#[arg(long, value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Runtime directory shared by cooperating instances
	#[arg(long, value_name = "DIR", global = true)]
	pub runtime_dir: Option<PathBuf>,

	/// Bound for mutex and endpoint operations
	#[arg(long, value_name = "MS", global = true, value_parser = clap::value_parser!(u64).range(1..))]
	pub timeout_ms: Option<u64>,

	/// Verbose logging
	#[arg(short, long, global = true)]
	pub verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
	/// List registered instances, most recently joined first
	Instances {
		/// Application identifier
		#[arg(long)]
		app: String,
	},
	/// Send an execute request for a command id
	Send {
		/// Application identifier
		#[arg(long)]
		app: String,

		/// Target this instance instead of the first reachable one
		#[arg(long, value_name = "UUID")]
		instance: Option<InstanceId>,

		/// Command id of the jump action
		command_id: String,
	},
	/// Run a demo instance that prints each action it executes
	Serve {
		/// Application identifier
		#[arg(long)]
		app: String,

		/// Prefix of the self-execution token
		#[arg(long, default_value = "/jump:")]
		prefix: String,

		/// Launcher path written into start info
		#[arg(long, value_name = "PATH", default_value = "jumpgate-launcher")]
		launcher: PathBuf,

		/// Command ids to register
		#[arg(required = true)]
		command_ids: Vec<String>,
	},
}

impl Cli {
	/// Settings file, then environment, then flags.
	pub fn coord_config(&self) -> jumpgate_coord::Result<CoordConfig> {
		let base = match &self.config {
			Some(path) => CoordConfig::load(path)?,
			None => CoordConfig::default(),
		};
		let mut config = base.with_env_overrides()?;
		if let Some(dir) = &self.runtime_dir {
			config.runtime_dir = Some(dir.clone());
		}
		if let Some(ms) = self.timeout_ms {
			config.timeout_ms = ms;
		}
		Ok(config)
	}
}
