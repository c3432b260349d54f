//! Named cross-process mutex backed by an advisory file lock.
//!
//! The lock file doubles as an owner record: the holder writes its pid into it
//! after locking and truncates it before unlocking. A record found right after
//! locking therefore means the previous holder died inside its critical
//! section. The kernel drops advisory locks of dead processes, so such a
//! mutex is reported as [`Acquisition::Abandoned`] and still counts as
//! acquired.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{CoordError, Result};

/// Delay between lock attempts while contended.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a guard came to hold the mutex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
	/// The previous holder released normally.
	Clean,
	/// The previous holder never released; its owner record is kept here.
	Abandoned {
		/// Owner record left behind, usually a pid.
		previous_owner: String,
	},
}

/// Global mutex for one application.
#[derive(Debug, Clone)]
pub struct GlobalMutex {
	path: PathBuf,
}

impl GlobalMutex {
	/// Creates a handle for the lock file at `path`. Nothing is opened yet.
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Lock file backing this mutex.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Blocks until the mutex is held or `timeout` elapses.
	///
	/// # Errors
	///
	/// Returns [`CoordError::MutexTimeout`] when the bound is exceeded and
	/// [`CoordError::Io`] when the lock file cannot be opened or locked.
	pub fn acquire(&self, timeout: Duration) -> Result<GlobalMutexGuard> {
		let mut file = self.open()?;
		let deadline = Instant::now() + timeout;

		loop {
			match file.try_lock_exclusive() {
				Ok(()) => break,
				Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
					let now = Instant::now();
					if now >= deadline {
						return Err(CoordError::MutexTimeout {
							path: self.path.clone(),
							timeout,
						});
					}
					std::thread::sleep(POLL_INTERVAL.min(deadline - now));
				}
				Err(e) => return Err(CoordError::io(&self.path, e)),
			}
		}

		let acquisition = match claim(&mut file) {
			Ok(acquisition) => acquisition,
			Err(e) => {
				let _ = FileExt::unlock(&file);
				return Err(CoordError::io(&self.path, e));
			}
		};

		match &acquisition {
			Acquisition::Clean => debug!(path = %self.path.display(), "global mutex acquired"),
			Acquisition::Abandoned { previous_owner } => warn!(
				path = %self.path.display(),
				previous_owner = %previous_owner,
				"global mutex was abandoned by its previous holder; proceeding"
			),
		}

		Ok(GlobalMutexGuard {
			file: Some(file),
			path: self.path.clone(),
			acquisition,
		})
	}

	/// Like [`Self::acquire`], but failures are logged instead of returned.
	///
	/// Used on teardown paths that must neither error nor block without bound.
	#[must_use]
	pub fn acquire_best_effort(&self, timeout: Duration) -> Option<GlobalMutexGuard> {
		match self.acquire(timeout) {
			Ok(guard) => Some(guard),
			Err(error) => {
				warn!(path = %self.path.display(), %error, "best-effort mutex acquisition failed");
				None
			}
		}
	}

	fn open(&self) -> Result<File> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent).map_err(|e| CoordError::io(parent, e))?;
		}
		OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(&self.path)
			.map_err(|e| CoordError::io(&self.path, e))
	}
}

/// Reads any stale owner record, then writes ours.
fn claim(file: &mut File) -> io::Result<Acquisition> {
	let mut previous = String::new();
	file.seek(SeekFrom::Start(0))?;
	file.read_to_string(&mut previous)?;

	file.set_len(0)?;
	file.seek(SeekFrom::Start(0))?;
	writeln!(file, "{}", std::process::id())?;
	file.flush()?;

	let previous = previous.trim();
	Ok(if previous.is_empty() {
		Acquisition::Clean
	} else {
		Acquisition::Abandoned {
			previous_owner: previous.to_string(),
		}
	})
}

/// Proof that the global mutex is held. Releases on drop.
#[derive(Debug)]
pub struct GlobalMutexGuard {
	file: Option<File>,
	path: PathBuf,
	acquisition: Acquisition,
}

impl GlobalMutexGuard {
	/// How this guard obtained the mutex.
	#[must_use]
	pub fn acquisition(&self) -> &Acquisition {
		&self.acquisition
	}

	/// Lock file backing the held mutex.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Clears the owner record and unlocks.
	///
	/// # Errors
	///
	/// Returns [`CoordError::Io`] if the record cannot be cleared. The lock is
	/// released regardless.
	pub fn release(mut self) -> Result<()> {
		self.release_inner()
	}

	fn release_inner(&mut self) -> Result<()> {
		let Some(file) = self.file.take() else {
			return Ok(());
		};
		let cleared = file.set_len(0);
		let unlocked = FileExt::unlock(&file);
		debug!(path = %self.path.display(), "global mutex released");
		cleared.and(unlocked).map_err(|e| CoordError::io(&self.path, e))
	}
}

impl Drop for GlobalMutexGuard {
	fn drop(&mut self) {
		if let Err(error) = self.release_inner() {
			warn!(%error, "failed to release global mutex cleanly");
		}
	}
}
