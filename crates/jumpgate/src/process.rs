//! Identity of the current process.

use std::path::{Path, PathBuf};

/// What the manager needs to know about the running process.
pub trait CurrentProcess: Send + Sync + 'static {
	/// Path of the running executable.
	fn executable_path(&self) -> &Path;

	/// Stable identifier shared by every instance of the application.
	fn application_id(&self) -> &str;

	/// Command-line arguments, including argument 0.
	fn command_line_args(&self) -> &[String];
}

/// Plain [`CurrentProcess`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
	executable_path: PathBuf,
	application_id: String,
	args: Vec<String>,
}

impl ProcessInfo {
	/// Builds process identity from explicit values.
	pub fn new(application_id: impl Into<String>, executable_path: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			executable_path: executable_path.into(),
			application_id: application_id.into(),
			args: args.into_iter().map(Into::into).collect(),
		}
	}

	/// Reads the executable path and arguments of this process.
	///
	/// Arguments that are not valid Unicode are converted lossily.
	///
	/// # Errors
	///
	/// Returns an error if the executable path cannot be determined.
	pub fn from_env(application_id: impl Into<String>) -> std::io::Result<Self> {
		let executable_path = std::env::current_exe()?;
		let args = std::env::args_os().map(|arg| arg.to_string_lossy().into_owned());
		Ok(Self::new(application_id, executable_path, args))
	}
}

impl CurrentProcess for ProcessInfo {
	fn executable_path(&self) -> &Path {
		&self.executable_path
	}

	fn application_id(&self) -> &str {
		&self.application_id
	}

	fn command_line_args(&self) -> &[String] {
		&self.args
	}
}
