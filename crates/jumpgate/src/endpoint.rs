//! Per-instance endpoint accepting `Execute(command_id)` from launchers.
//!
//! The listener runs on its own thread with a current-thread tokio runtime, so
//! the application's UI thread is never borrowed for socket work. An inbound
//! frame only queues the action on its owner context; the connection does not
//! wait for it to run, only for an open update to commit.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use jumpgate_proto::{EndpointFrame, read_frame};
use tokio::io::AsyncRead;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::registry::ActionRegistry;

/// Connections idle longer than this between frames are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Listening endpoint owned by one instance.
///
/// Closed exactly once, either by [`Self::close`], [`Self::abort`], or drop
/// (which aborts).
#[derive(Debug)]
pub struct Endpoint {
	path: PathBuf,
	shutdown: CancellationToken,
	done: Option<mpsc::Receiver<()>>,
	thread: Option<JoinHandle<()>>,
}

impl Endpoint {
	/// Binds the endpoint at `path` and waits until it accepts connections.
	///
	/// A stale socket file left at `path` by a crashed process is replaced.
	///
	/// # Errors
	///
	/// Returns [`Error::Endpoint`] if the socket cannot be bound and
	/// [`Error::EndpointTimeout`] if the listener is not ready within
	/// `timeout`.
	pub fn open(path: impl Into<PathBuf>, registry: Arc<ActionRegistry>, timeout: Duration) -> Result<Self> {
		let path = path.into();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).map_err(|e| Error::endpoint(parent, e))?;
		}
		match std::fs::remove_file(&path) {
			Ok(()) => debug!(path = %path.display(), "removed stale endpoint socket"),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => return Err(Error::endpoint(&path, e)),
		}

		let shutdown = CancellationToken::new();
		let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);
		let (done_tx, done_rx) = mpsc::sync_channel::<()>(1);

		let thread = {
			let thread_path = path.clone();
			let shutdown = shutdown.clone();
			std::thread::Builder::new()
				.name("jumpgate-endpoint".into())
				.spawn(move || {
					run_listener(&thread_path, registry, shutdown, ready_tx);
					let _ = done_tx.send(());
				})
				.map_err(|e| Error::endpoint(&path, e))?
		};

		let endpoint = Self {
			path,
			shutdown,
			done: Some(done_rx),
			thread: Some(thread),
		};

		match ready_rx.recv_timeout(timeout) {
			Ok(Ok(())) => {
				info!(path = %endpoint.path.display(), "endpoint listening");
				Ok(endpoint)
			}
			Ok(Err(e)) => {
				let path = endpoint.path.clone();
				endpoint.abort();
				Err(Error::endpoint(path, e))
			}
			Err(RecvTimeoutError::Timeout) => {
				let path = endpoint.path.clone();
				endpoint.abort();
				Err(Error::EndpointTimeout {
					path,
					op: "open",
					timeout,
				})
			}
			Err(RecvTimeoutError::Disconnected) => {
				let path = endpoint.path.clone();
				endpoint.abort();
				Err(Error::endpoint(path, io::Error::other("endpoint thread exited before listening")))
			}
		}
	}

	/// Socket address of this endpoint.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Stops listening, waits up to `timeout` for the listener thread, and
	/// removes the socket file.
	///
	/// # Errors
	///
	/// Returns [`Error::EndpointTimeout`] if the thread does not stop in time
	/// (the socket file is still removed) or [`Error::Endpoint`] if the socket
	/// file cannot be removed.
	pub fn close(mut self, timeout: Duration) -> Result<()> {
		self.shutdown.cancel();
		let finished = match self.done.take() {
			Some(done) => !matches!(done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout)),
			None => true,
		};
		let thread = self.thread.take();
		let removed = self.remove_socket();

		if !finished {
			warn!(path = %self.path.display(), ?timeout, "endpoint thread did not stop in time; detaching");
			return Err(Error::EndpointTimeout {
				path: self.path.clone(),
				op: "close",
				timeout,
			});
		}
		if let Some(thread) = thread
			&& thread.join().is_err()
		{
			error!(path = %self.path.display(), "endpoint thread panicked");
		}
		info!(path = %self.path.display(), "endpoint closed");
		removed
	}

	/// Stops listening and removes the socket without waiting for the
	/// listener thread. Never fails.
	pub fn abort(mut self) {
		self.abort_inner();
	}

	fn abort_inner(&mut self) {
		self.shutdown.cancel();
		self.done = None;
		if self.thread.take().is_some() {
			if let Err(error) = self.remove_socket() {
				warn!(%error, "failed to remove endpoint socket");
			}
			debug!(path = %self.path.display(), "endpoint aborted");
		}
	}

	fn remove_socket(&self) -> Result<()> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(Error::endpoint(&self.path, e)),
		}
	}
}

impl Drop for Endpoint {
	fn drop(&mut self) {
		self.abort_inner();
	}
}

fn run_listener(path: &Path, registry: Arc<ActionRegistry>, shutdown: CancellationToken, ready: mpsc::SyncSender<io::Result<()>>) {
	let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(e) => {
			let _ = ready.send(Err(e));
			return;
		}
	};

	runtime.block_on(async move {
		let listener = match UnixListener::bind(path) {
			Ok(listener) => listener,
			Err(e) => {
				let _ = ready.send(Err(e));
				return;
			}
		};
		let _ = ready.send(Ok(()));
		serve(listener, registry, shutdown).await;
	});
}

async fn serve(listener: UnixListener, registry: Arc<ActionRegistry>, shutdown: CancellationToken) {
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => {
				debug!("endpoint shutting down");
				break;
			}
			res = listener.accept() => {
				match res {
					Ok((stream, _addr)) => {
						tokio::spawn(handle_connection(stream, registry.clone()));
					}
					Err(e) => {
						error!(error = %e, "failed to accept endpoint connection");
					}
				}
			}
		}
	}
}

/// Reads execute frames until the peer hangs up, dispatching each one.
pub(crate) async fn handle_connection<S>(mut stream: S, registry: Arc<ActionRegistry>)
where
	S: AsyncRead + Unpin,
{
	trace!("endpoint connection opened");
	loop {
		match tokio::time::timeout(IDLE_TIMEOUT, read_frame(&mut stream)).await {
			Ok(Ok(EndpointFrame::Execute { command_id })) => {
				// May wait for an open update to commit.
				let registry = registry.clone();
				if let Err(error) = tokio::task::spawn_blocking(move || registry.lookup_and_run(&command_id)).await {
					error!(%error, "dispatch task failed");
				}
			}
			Ok(Err(e)) if e.is_disconnect() => break,
			Ok(Err(error)) => {
				warn!(%error, "closing endpoint connection after bad frame");
				break;
			}
			Err(_) => {
				debug!("endpoint connection idle; closing");
				break;
			}
		}
	}
	trace!("endpoint connection closed");
}
