//! Percent-escaping and the launcher command line.
//!
//! Every token the launcher receives is percent-escaped, so tokens never
//! contain spaces and the whole line splits on whitespace.

use std::path::{Path, PathBuf};

/// Percent-escapes `input` for use as a single command-line token.
///
/// Only RFC 3986 unreserved characters are kept as is.
#[must_use]
pub fn escape(input: &str) -> String {
	urlencoding::encode(input).into_owned()
}

/// Reverses [`escape`].
///
/// # Errors
///
/// Returns [`InvocationError::Utf8`] if the decoded bytes are not UTF-8.
pub fn unescape(input: &str) -> Result<String, InvocationError> {
	urlencoding::decode(input)
		.map(|s| s.into_owned())
		.map_err(|_| InvocationError::Utf8(input.to_string()))
}

/// Token a process finds in its own arguments when launched to run
/// `command_id`.
#[must_use]
pub fn self_token(arg_prefix: &str, command_id: &str) -> String {
	format!("{arg_prefix}{}", escape(command_id))
}

/// Errors from [`LauncherInvocation::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
	/// Fewer than the four mandatory tokens.
	#[error("launcher command line has {0} tokens, expected 4 or 5")]
	TokenCount(usize),
	/// The arguments token is not wrapped in double quotes.
	#[error("arguments token {0:?} is not quoted")]
	Unquoted(String),
	/// A token does not decode to UTF-8.
	#[error("token {0:?} does not decode to UTF-8")]
	Utf8(String),
}

/// Launcher command line for one registered action.
///
/// Tokens, in order: application id, escaped command id, escaped target
/// executable, quoted escaped arguments, and optionally the escaped working
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherInvocation {
	/// Stable application identifier, used verbatim. Must not contain
	/// whitespace; the manager rejects such ids before writing start info.
	pub application_id: String,
	/// Command id of the action.
	pub command_id: String,
	/// Executable to start when no live instance accepts the command.
	pub executable: PathBuf,
	/// Arguments for `executable`.
	pub arguments: String,
	/// Working directory for `executable`.
	pub working_directory: Option<PathBuf>,
}

impl LauncherInvocation {
	/// Renders the space-joined command line.
	#[must_use]
	pub fn to_command_line(&self) -> String {
		let mut tokens = vec![
			self.application_id.clone(),
			escape(&self.command_id),
			escape_path(&self.executable),
			format!("\"{}\"", escape(&self.arguments)),
		];
		if let Some(dir) = &self.working_directory {
			tokens.push(escape_path(dir));
		}
		tokens.join(" ")
	}

	/// Parses a command line produced by [`Self::to_command_line`].
	///
	/// # Errors
	///
	/// See [`InvocationError`].
	pub fn parse(line: &str) -> Result<Self, InvocationError> {
		let tokens: Vec<&str> = line.split_whitespace().collect();
		Self::from_tokens(&tokens)
	}

	/// Parses already-split tokens, as a launcher receives them in `argv`.
	///
	/// # Errors
	///
	/// See [`InvocationError`].
	pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, InvocationError> {
		let [application_id, command_id, executable, arguments, rest @ ..] = tokens else {
			return Err(InvocationError::TokenCount(tokens.len()));
		};
		if rest.len() > 1 {
			return Err(InvocationError::TokenCount(tokens.len()));
		}

		let arguments = arguments.as_ref();
		let quoted = arguments
			.strip_prefix('"')
			.and_then(|s| s.strip_suffix('"'))
			.ok_or_else(|| InvocationError::Unquoted(arguments.to_string()))?;

		Ok(Self {
			application_id: application_id.as_ref().to_string(),
			command_id: unescape(command_id.as_ref())?,
			executable: PathBuf::from(unescape(executable.as_ref())?),
			arguments: unescape(quoted)?,
			working_directory: rest
				.first()
				.map(|dir| unescape(dir.as_ref()).map(PathBuf::from))
				.transpose()?,
		})
	}
}

fn escape_path(path: &Path) -> String {
	escape(&path.to_string_lossy())
}
