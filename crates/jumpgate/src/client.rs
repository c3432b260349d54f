//! Sending side of the endpoint protocol, used by launchers.

use std::path::Path;
use std::time::Duration;

use jumpgate_coord::Coordinator;
use jumpgate_proto::{EndpointFrame, InstanceId, write_frame};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Sends one `Execute(command_id)` frame to the endpoint at `path`.
///
/// Completes once the frame is written. The receiving instance runs the
/// action later on its owner context.
///
/// # Errors
///
/// Returns [`Error::Endpoint`] if nothing is listening at `path` and
/// [`Error::EndpointTimeout`] if the exchange exceeds `timeout`.
pub async fn send_execute(path: &Path, command_id: &str, timeout: Duration) -> Result<()> {
	let exchange = async {
		let mut stream = UnixStream::connect(path).await.map_err(|e| Error::endpoint(path, e))?;
		write_frame(&mut stream, &EndpointFrame::execute(command_id)).await?;
		stream.shutdown().await.map_err(|e| Error::endpoint(path, e))?;
		Ok(())
	};

	tokio::time::timeout(timeout, exchange)
		.await
		.map_err(|_| Error::EndpointTimeout {
			path: path.to_path_buf(),
			op: "accept",
			timeout,
		})?
}

/// Result of [`deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	/// The command reached this instance.
	Delivered(InstanceId),
	/// No registered instance accepted the command.
	NoLiveInstance,
}

/// Sends `command_id` to the most recently joined instance that answers.
///
/// The registry is snapshotted under the global mutex on the blocking pool,
/// then the mutex is released before any endpoint is contacted. Unreachable
/// instances are skipped; a crashed instance stays listed until the next join
/// prunes it.
///
/// # Errors
///
/// Returns an error only if the registry cannot be read.
pub async fn deliver(coordinator: &Coordinator, command_id: &str) -> Result<Delivery> {
	let instances = {
		let coordinator = coordinator.clone();
		tokio::task::spawn_blocking(move || -> Result<Vec<InstanceId>> {
			let guard = coordinator.lock()?;
			let instances = coordinator.application_instances(&guard)?;
			guard.release()?;
			Ok(instances)
		})
		.await
		.map_err(|e| Error::Io(std::io::Error::other(e)))??
	};

	for id in instances {
		let path = coordinator.endpoint_path(id);
		match send_execute(&path, command_id, coordinator.timeout()).await {
			Ok(()) => {
				info!(instance = %id, %command_id, "command delivered");
				return Ok(Delivery::Delivered(id));
			}
			Err(error) => debug!(instance = %id, %error, "instance unreachable; trying next"),
		}
	}

	debug!(%command_id, application = coordinator.application_id(), "no live instance");
	Ok(Delivery::NoLiveInstance)
}
