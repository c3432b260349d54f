//! Coordination primitives bound to one application identity.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jumpgate_proto::{AppPaths, InstanceId};

use crate::config::CoordConfig;
use crate::error::Result;
use crate::mutex::{GlobalMutex, GlobalMutexGuard};
use crate::store::{FileInstanceStore, InstanceStore};

/// Global mutex, instance registry, and endpoint addressing for one
/// application.
///
/// Every process constructing a coordinator with the same application id and
/// runtime root shares the same mutex and registry. Clones share the store.
#[derive(Clone)]
pub struct Coordinator {
	application_id: String,
	paths: AppPaths,
	mutex: GlobalMutex,
	store: Arc<dyn InstanceStore>,
	timeout: Duration,
}

impl std::fmt::Debug for Coordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Coordinator")
			.field("application_id", &self.application_id)
			.field("dir", &self.paths.dir())
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

impl Coordinator {
	/// Creates a coordinator backed by the shared registry file.
	#[must_use]
	pub fn new(application_id: impl Into<String>, config: &CoordConfig) -> Self {
		let application_id = application_id.into();
		let paths = AppPaths::new(config.runtime_root(), &application_id);
		let store = Arc::new(FileInstanceStore::new(paths.instances_path()));
		Self::assemble(application_id, paths, store, config.timeout())
	}

	/// Creates a coordinator with a custom registry store.
	///
	/// The mutex and endpoint sockets still live under the configured runtime
	/// root.
	#[must_use]
	pub fn with_store(application_id: impl Into<String>, config: &CoordConfig, store: Arc<dyn InstanceStore>) -> Self {
		let application_id = application_id.into();
		let paths = AppPaths::new(config.runtime_root(), &application_id);
		Self::assemble(application_id, paths, store, config.timeout())
	}

	fn assemble(application_id: String, paths: AppPaths, store: Arc<dyn InstanceStore>, timeout: Duration) -> Self {
		Self {
			application_id,
			mutex: GlobalMutex::new(paths.mutex_path()),
			paths,
			store,
			timeout,
		}
	}

	/// Stable identifier of the application.
	#[must_use]
	pub fn application_id(&self) -> &str {
		&self.application_id
	}

	/// Runtime directory layout.
	#[must_use]
	pub fn paths(&self) -> &AppPaths {
		&self.paths
	}

	/// Bound for mutex and endpoint operations.
	#[must_use]
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Acquires the global mutex within the configured timeout.
	///
	/// # Errors
	///
	/// See [`GlobalMutex::acquire`].
	pub fn lock(&self) -> Result<GlobalMutexGuard> {
		self.mutex.acquire(self.timeout)
	}

	/// Acquires the global mutex, logging instead of failing.
	#[must_use]
	pub fn lock_best_effort(&self) -> Option<GlobalMutexGuard> {
		self.mutex.acquire_best_effort(self.timeout)
	}

	/// Reads the live instance sequence, most recently joined first.
	///
	/// # Errors
	///
	/// Propagates store failures.
	pub fn application_instances(&self, guard: &GlobalMutexGuard) -> Result<Vec<InstanceId>> {
		self.store.load(guard)
	}

	/// Replaces the live instance sequence.
	///
	/// # Errors
	///
	/// Propagates store failures.
	pub fn update_instances(&self, guard: &GlobalMutexGuard, instances: &[InstanceId]) -> Result<()> {
		self.store.store(guard, instances)
	}

	/// Address of the endpoint owned by `id`.
	#[must_use]
	pub fn endpoint_path(&self, id: InstanceId) -> PathBuf {
		self.paths.endpoint_path(id)
	}
}
