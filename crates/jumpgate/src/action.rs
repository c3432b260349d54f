//! Jump action abstraction.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// A shortcut pinned to the shell's jump menu.
///
/// Implementors are shared as `Arc<dyn JumpAction>`; the manager keeps only a
/// weak reference, so dropping the last strong reference unregisters the
/// action from endpoint dispatch.
pub trait JumpAction: Send + Sync + 'static {
	/// Stable identifier, unique within this process's action set.
	fn command_id(&self) -> &str;

	/// Executable the shell should start. `None` means this process's own
	/// executable.
	fn application_path(&self) -> Option<&Path> {
		None
	}

	/// Arguments for the target executable.
	fn arguments(&self) -> &str {
		""
	}

	/// Working directory for the target executable.
	fn working_directory(&self) -> Option<&Path> {
		None
	}

	/// Receives the launcher path and launcher command line computed at
	/// registration, for the jump-list UI to pin.
	fn set_start_info(&self, launcher_path: &Path, arguments: &str);

	/// Runs the action. Always invoked on the action's owner context.
	fn execute(&self);
}

/// Launcher invocation assigned to a [`JumpTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartInfo {
	/// Launcher executable the shell starts.
	pub launcher_path: PathBuf,
	/// Launcher command line.
	pub arguments: String,
}

type Handler = Box<dyn Fn() + Send + Sync>;

/// Closure-backed [`JumpAction`].
pub struct JumpTask {
	command_id: String,
	application_path: Option<PathBuf>,
	arguments: String,
	working_directory: Option<PathBuf>,
	start_info: Mutex<Option<StartInfo>>,
	handler: Handler,
}

impl fmt::Debug for JumpTask {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JumpTask")
			.field("command_id", &self.command_id)
			.field("application_path", &self.application_path)
			.field("arguments", &self.arguments)
			.field("working_directory", &self.working_directory)
			.field("start_info", &*self.start_info.lock())
			.finish_non_exhaustive()
	}
}

impl JumpTask {
	/// Creates a task running `handler` when executed.
	pub fn new(command_id: impl Into<String>, handler: impl Fn() + Send + Sync + 'static) -> Self {
		Self {
			command_id: command_id.into(),
			application_path: None,
			arguments: String::new(),
			working_directory: None,
			start_info: Mutex::new(None),
			handler: Box::new(handler),
		}
	}

	/// Targets another executable instead of this process.
	#[must_use]
	pub fn with_application_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.application_path = Some(path.into());
		self
	}

	/// Sets the target executable's arguments.
	#[must_use]
	pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
		self.arguments = arguments.into();
		self
	}

	/// Sets the target executable's working directory.
	#[must_use]
	pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
		self.working_directory = Some(dir.into());
		self
	}

	/// Launcher invocation from the most recent registration.
	#[must_use]
	pub fn start_info(&self) -> Option<StartInfo> {
		self.start_info.lock().clone()
	}
}

impl JumpAction for JumpTask {
	fn command_id(&self) -> &str {
		&self.command_id
	}

	fn application_path(&self) -> Option<&Path> {
		self.application_path.as_deref()
	}

	fn arguments(&self) -> &str {
		&self.arguments
	}

	fn working_directory(&self) -> Option<&Path> {
		self.working_directory.as_deref()
	}

	fn set_start_info(&self, launcher_path: &Path, arguments: &str) {
		*self.start_info.lock() = Some(StartInfo {
			launcher_path: launcher_path.to_path_buf(),
			arguments: arguments.to_string(),
		});
	}

	fn execute(&self) {
		(self.handler)();
	}
}
