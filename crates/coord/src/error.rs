//! Error types for coordination primitives.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the global mutex, the instance store, or configuration.
#[derive(Debug, Error)]
pub enum CoordError {
	/// The global mutex was not acquired before the deadline.
	#[error("timed out after {timeout:?} waiting for global mutex {}", path.display())]
	MutexTimeout {
		/// Lock file backing the mutex.
		path: PathBuf,
		/// Bound that was exceeded.
		timeout: Duration,
	},

	/// A shared runtime file could not be read or written.
	#[error("I/O error on {}: {error}", path.display())]
	Io {
		/// File or directory involved.
		path: PathBuf,
		/// The underlying I/O error.
		#[source]
		error: std::io::Error,
	},

	/// Configuration values are out of range.
	#[error("invalid configuration: {0}")]
	Config(String),

	/// Configuration file is not valid TOML for [`crate::CoordConfig`].
	#[error("config parse error: {0}")]
	Toml(#[from] toml::de::Error),
}

impl CoordError {
	pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
		Self::Io {
			path: path.into(),
			error,
		}
	}
}

/// Result type for coordination operations.
pub type Result<T, E = CoordError> = std::result::Result<T, E>;
