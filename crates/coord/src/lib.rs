//! Cross-process coordination primitives for jumpgate.
//!
//! Every cooperating process of one application shares a runtime directory
//! holding two things: a lock file that acts as the *global mutex*, and the
//! *instance registry* listing the identifiers of live, endpoint-listening
//! instances. [`Coordinator`] bundles both for one application identity.
//!
//! The registry may only be read or written while the global mutex is held.
//! Store operations take a [`GlobalMutexGuard`] as a witness, so code that
//! skips the mutex does not compile.

#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod mutex;
pub mod store;

pub use config::CoordConfig;
pub use coordinator::Coordinator;
pub use error::{CoordError, Result};
pub use mutex::{Acquisition, GlobalMutex, GlobalMutexGuard};
pub use store::{FileInstanceStore, InstanceStore, MemoryInstanceStore};

/// Helpers for simulating crashed processes in tests.
#[doc(hidden)]
pub mod test_helpers {
	use std::path::Path;

	/// Leaves an owner record in the lock file without holding the lock, as a
	/// process that died mid-critical-section would.
	pub fn abandon_mutex(lock_path: &Path, pid: u32) -> std::io::Result<()> {
		if let Some(parent) = lock_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(lock_path, format!("{pid}\n"))
	}
}
