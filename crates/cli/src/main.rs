//! Jumpgate diagnostics binary.
//!
//! Lists the instances registered for an application, sends execute requests
//! the way a launcher would, and can run a demo instance.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use jumpgate::{Delivery, JumpAction, JumpActionsManager, JumpTask, OwnerContext, ProcessInfo, deliver, send_execute};
use jumpgate_coord::{CoordConfig, Coordinator};
use jumpgate_proto::InstanceId;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if cli.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let config = cli.coord_config().context("invalid settings")?;

	match cli.command {
		Command::Instances { app } => list_instances(&Coordinator::new(app, &config)),
		Command::Send { app, instance, command_id } => {
			send(&Coordinator::new(app, &config), instance, &command_id).await
		}
		Command::Serve {
			app,
			prefix,
			launcher,
			command_ids,
		} => serve(app, &config, &prefix, &launcher, &command_ids).await,
	}
}

fn list_instances(coordinator: &Coordinator) -> anyhow::Result<()> {
	let guard = coordinator.lock()?;
	let instances = coordinator.application_instances(&guard)?;
	guard.release()?;

	if instances.is_empty() {
		println!("no instances registered for {}", coordinator.application_id());
	}
	for id in instances {
		let path = coordinator.endpoint_path(id);
		let state = if path.exists() { "listening" } else { "stale" };
		println!("{id}\t{state}\t{}", path.display());
	}
	Ok(())
}

async fn send(coordinator: &Coordinator, instance: Option<InstanceId>, command_id: &str) -> anyhow::Result<()> {
	match instance {
		Some(id) => {
			send_execute(&coordinator.endpoint_path(id), command_id, coordinator.timeout())
				.await
				.with_context(|| format!("instance {id} did not accept {command_id:?}"))?;
			println!("delivered to {id}");
		}
		None => match deliver(coordinator, command_id).await? {
			Delivery::Delivered(id) => println!("delivered to {id}"),
			Delivery::NoLiveInstance => {
				anyhow::bail!("no live instance of {} accepted {command_id:?}", coordinator.application_id())
			}
		},
	}
	Ok(())
}

async fn serve(app: String, config: &CoordConfig, prefix: &str, launcher: &Path, command_ids: &[String]) -> anyhow::Result<()> {
	let process = Arc::new(ProcessInfo::from_env(app.clone()).context("cannot read process identity")?);
	let (owner, mut queue) = OwnerContext::channel("main");
	let manager = JumpActionsManager::new(Coordinator::new(app, config), process, owner);

	let tasks: Vec<Arc<JumpTask>> = command_ids
		.iter()
		.map(|id| {
			let name = id.clone();
			Arc::new(JumpTask::new(id.clone(), move || println!("executed {name}")))
		})
		.collect();

	{
		let update = manager.update()?;
		for task in &tasks {
			let action: Arc<dyn JumpAction> = task.clone();
			update.register_action(&action, prefix, launcher)?;
		}
		update.finish()?;
	}

	for task in &tasks {
		if let Some(info) = task.start_info() {
			println!("{}\t{} {}", task.command_id(), info.launcher_path.display(), info.arguments);
		}
	}
	if let Some(id) = manager.instance_id() {
		info!(instance = %id, "serving; press Ctrl-C to stop");
	}

	loop {
		tokio::select! {
			signal = tokio::signal::ctrl_c() => {
				signal.context("cannot listen for Ctrl-C")?;
				break;
			}
			more = queue.run_next() => {
				if !more {
					break;
				}
			}
		}
	}

	manager.shutdown()?;
	Ok(())
}
