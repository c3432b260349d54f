//! Instance registry storage.

use std::io::Write;
use std::path::{Path, PathBuf};

use jumpgate_proto::InstanceId;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{CoordError, Result};
use crate::mutex::GlobalMutexGuard;

/// Backing store for the shared instance registry.
///
/// Both operations require the global mutex; the guard argument is only a
/// witness that it is held.
pub trait InstanceStore: Send + Sync + 'static {
	/// Reads the current sequence, most recently joined first.
	fn load(&self, guard: &GlobalMutexGuard) -> Result<Vec<InstanceId>>;

	/// Replaces the whole sequence.
	fn store(&self, guard: &GlobalMutexGuard, instances: &[InstanceId]) -> Result<()>;
}

/// Registry kept as one UUID per line in a shared file.
///
/// Writes go through a temporary file renamed over the target, so readers see
/// either the old or the new sequence.
#[derive(Debug, Clone)]
pub struct FileInstanceStore {
	path: PathBuf,
}

impl FileInstanceStore {
	/// Creates a store for the registry file at `path`.
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Registry file location.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl InstanceStore for FileInstanceStore {
	fn load(&self, _guard: &GlobalMutexGuard) -> Result<Vec<InstanceId>> {
		let text = match std::fs::read_to_string(&self.path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(CoordError::io(&self.path, e)),
		};

		Ok(text
			.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty())
			.filter_map(|line| match line.parse() {
				Ok(id) => Some(id),
				Err(error) => {
					warn!(path = %self.path.display(), line, %error, "skipping malformed registry entry");
					None
				}
			})
			.collect())
	}

	fn store(&self, _guard: &GlobalMutexGuard, instances: &[InstanceId]) -> Result<()> {
		let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
		std::fs::create_dir_all(dir).map_err(|e| CoordError::io(dir, e))?;

		let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CoordError::io(dir, e))?;
		for id in instances {
			writeln!(tmp, "{id}").map_err(|e| CoordError::io(tmp.path(), e))?;
		}
		tmp.as_file().sync_all().map_err(|e| CoordError::io(tmp.path(), e))?;
		tmp.persist(&self.path).map_err(|e| CoordError::io(&self.path, e.error))?;
		Ok(())
	}
}

/// In-process registry, for tests and embedders without a shared filesystem.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
	instances: Mutex<Vec<InstanceId>>,
}

impl MemoryInstanceStore {
	/// Creates an empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Current contents, bypassing the mutex.
	#[must_use]
	pub fn snapshot(&self) -> Vec<InstanceId> {
		self.instances.lock().clone()
	}
}

impl InstanceStore for MemoryInstanceStore {
	fn load(&self, _guard: &GlobalMutexGuard) -> Result<Vec<InstanceId>> {
		Ok(self.instances.lock().clone())
	}

	fn store(&self, _guard: &GlobalMutexGuard, instances: &[InstanceId]) -> Result<()> {
		*self.instances.lock() = instances.to_vec();
		Ok(())
	}
}
