//! Filesystem layout of the shared runtime directory.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::types::InstanceId;

/// Environment variable overriding the runtime root.
pub const RUNTIME_DIR_ENV: &str = "JUMPGATE_RUNTIME_DIR";

/// Fixed name component of every endpoint socket.
pub const ENDPOINT_NAME: &str = "jump";

/// Longest readable prefix kept in directory names.
///
/// Unix socket paths are limited to roughly 100 bytes, and the key shares that
/// budget with the runtime root and the instance UUID.
const MAX_PREFIX_LEN: usize = 16;

/// Hex digits of the application id digest appended to every key.
const DIGEST_LEN: usize = 16;

/// Returns the default runtime root shared by all applications.
///
/// # Resolution Order
///
/// 1. `JUMPGATE_RUNTIME_DIR` environment variable.
/// 2. System runtime directory (e.g., `$XDG_RUNTIME_DIR`).
/// 3. System temp directory (e.g., `/tmp`).
///
/// The last two are suffixed with `jumpgate`.
#[must_use]
pub fn default_runtime_root() -> PathBuf {
	if let Ok(p) = std::env::var(RUNTIME_DIR_ENV) {
		return PathBuf::from(p);
	}

	dirs::runtime_dir()
		.filter(|p| std::fs::create_dir_all(p).is_ok())
		.unwrap_or_else(std::env::temp_dir)
		.join("jumpgate")
}

/// Reduces an application identifier to a directory-safe key.
///
/// The key is a readable prefix (characters outside `[A-Za-z0-9._-]` become
/// `_`, then truncated) followed by a digest of the whole identifier, so
/// distinct identifiers never share a key.
#[must_use]
pub fn application_key(application_id: &str) -> String {
	let prefix: String = application_id
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
				c
			} else {
				'_'
			}
		})
		.take(MAX_PREFIX_LEN)
		.collect();
	let prefix = if prefix.trim_matches('.').is_empty() { "default" } else { prefix.as_str() };

	let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, application_id.as_bytes()).simple().to_string();
	format!("{prefix}-{}", &digest[..DIGEST_LEN])
}

/// Per-application view of the runtime directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
	dir: PathBuf,
}

impl AppPaths {
	/// Creates the layout for `application_id` under `runtime_root`.
	#[must_use]
	pub fn new(runtime_root: impl AsRef<Path>, application_id: &str) -> Self {
		Self {
			dir: runtime_root.as_ref().join(application_key(application_id)),
		}
	}

	/// Directory holding every shared file for this application.
	#[must_use]
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Lock file backing the global mutex.
	#[must_use]
	pub fn mutex_path(&self) -> PathBuf {
		self.dir.join("instances.lock")
	}

	/// File holding the instance registry.
	#[must_use]
	pub fn instances_path(&self) -> PathBuf {
		self.dir.join("instances")
	}

	/// Socket address of the endpoint owned by `id`.
	#[must_use]
	pub fn endpoint_path(&self, id: InstanceId) -> PathBuf {
		self.dir.join(format!("{}-{ENDPOINT_NAME}.sock", id.as_uuid().simple()))
	}
}
