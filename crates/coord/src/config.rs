//! Coordination settings.
//!
//! Settings come from defaults, optionally a TOML file, and finally the
//! environment:
//!
//! ```toml
//! runtime-dir = "/run/user/1000/jumpgate"
//! timeout-ms = 3000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use jumpgate_proto::paths::{RUNTIME_DIR_ENV, default_runtime_root};
use serde::{Deserialize, Serialize};

use crate::error::{CoordError, Result};

/// Environment variable overriding [`CoordConfig::timeout_ms`].
pub const TIMEOUT_ENV: &str = "JUMPGATE_TIMEOUT_MS";

/// Bound applied to mutex acquisition and endpoint open/close by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Settings shared by every coordinator of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CoordConfig {
	/// Runtime root; falls back to [`default_runtime_root`] when unset.
	pub runtime_dir: Option<PathBuf>,
	/// Bound for mutex and endpoint operations, in milliseconds.
	pub timeout_ms: u64,
}

impl Default for CoordConfig {
	fn default() -> Self {
		Self {
			runtime_dir: None,
			timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
		}
	}
}

impl CoordConfig {
	/// Parses settings from TOML text.
	///
	/// # Errors
	///
	/// Returns [`CoordError::Toml`] for syntax or schema errors and
	/// [`CoordError::Config`] for out-of-range values.
	pub fn from_toml_str(input: &str) -> Result<Self> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads settings from a TOML file.
	///
	/// # Errors
	///
	/// Returns [`CoordError::Io`] if the file cannot be read, otherwise as
	/// [`Self::from_toml_str`].
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|e| CoordError::io(path, e))?;
		Self::from_toml_str(&text)
	}

	/// Applies `JUMPGATE_RUNTIME_DIR` and `JUMPGATE_TIMEOUT_MS` on top.
	///
	/// # Errors
	///
	/// Returns [`CoordError::Config`] if the timeout variable is not a positive
	/// integer.
	pub fn with_env_overrides(mut self) -> Result<Self> {
		if let Ok(dir) = std::env::var(RUNTIME_DIR_ENV) {
			self.runtime_dir = Some(PathBuf::from(dir));
		}
		if let Ok(raw) = std::env::var(TIMEOUT_ENV) {
			self.timeout_ms = raw
				.trim()
				.parse()
				.map_err(|_| CoordError::Config(format!("{TIMEOUT_ENV}={raw:?} is not an integer")))?;
		}
		self.validate()?;
		Ok(self)
	}

	/// Bound for mutex and endpoint operations.
	#[must_use]
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	/// Resolved runtime root.
	#[must_use]
	pub fn runtime_root(&self) -> PathBuf {
		self.runtime_dir.clone().unwrap_or_else(default_runtime_root)
	}

	fn validate(&self) -> Result<()> {
		if self.timeout_ms == 0 {
			return Err(CoordError::Config("timeout-ms must be greater than zero".into()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serial_test::serial;

	use super::*;

	#[test]
	fn empty_toml_yields_defaults() {
		assert_eq!(CoordConfig::from_toml_str("").unwrap(), CoordConfig::default());
		assert_eq!(CoordConfig::default().timeout(), DEFAULT_TIMEOUT);
	}

	#[test]
	fn toml_overrides_fields() {
		let config = CoordConfig::from_toml_str("runtime-dir = \"/tmp/jg\"\ntimeout-ms = 250\n").unwrap();
		assert_eq!(config.runtime_root(), PathBuf::from("/tmp/jg"));
		assert_eq!(config.timeout(), Duration::from_millis(250));
	}

	#[test]
	fn zero_timeout_is_rejected() {
		let err = CoordConfig::from_toml_str("timeout-ms = 0").unwrap_err();
		assert!(matches!(err, CoordError::Config(_)));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = CoordConfig::from_toml_str("timeout = 5").unwrap_err();
		assert!(matches!(err, CoordError::Toml(_)));
	}

	#[test]
	#[serial]
	fn env_overrides_win() {
		// SAFETY: serialized with every other test touching these variables.
		unsafe {
			std::env::set_var(RUNTIME_DIR_ENV, "/tmp/jg-env");
			std::env::set_var(TIMEOUT_ENV, "1200");
		}
		let config = CoordConfig::from_toml_str("timeout-ms = 10").unwrap().with_env_overrides();
		unsafe {
			std::env::remove_var(RUNTIME_DIR_ENV);
			std::env::remove_var(TIMEOUT_ENV);
		}

		let config = config.unwrap();
		assert_eq!(config.runtime_dir, Some(PathBuf::from("/tmp/jg-env")));
		assert_eq!(config.timeout_ms, 1200);
	}

	#[test]
	#[serial]
	fn malformed_env_timeout_is_rejected() {
		unsafe {
			std::env::set_var(TIMEOUT_ENV, "soon");
		}
		let result = CoordConfig::default().with_env_overrides();
		unsafe {
			std::env::remove_var(TIMEOUT_ENV);
		}

		assert!(matches!(result, Err(CoordError::Config(_))));
	}
}
