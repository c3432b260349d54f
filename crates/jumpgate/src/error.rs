//! Error types for jump action management.

use std::path::PathBuf;
use std::time::Duration;

use jumpgate_coord::CoordError;
use jumpgate_proto::CodecError;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// An operation was called in the wrong transaction state.
	#[error("invalid state: {0}")]
	InvalidState(&'static str),
	/// An argument was rejected before any state changed.
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
	/// Global mutex or instance registry failure.
	#[error(transparent)]
	Coord(#[from] CoordError),
	/// An endpoint operation did not finish within its bound.
	#[error("endpoint {} did not {op} within {timeout:?}", path.display())]
	EndpointTimeout {
		/// Socket path of the endpoint.
		path: PathBuf,
		/// `"open"`, `"close"`, or `"accept"` for a peer endpoint.
		op: &'static str,
		/// Bound that was exceeded.
		timeout: Duration,
	},
	/// The endpoint socket could not be bound, connected, or removed.
	#[error("endpoint {}: {error}", path.display())]
	Endpoint {
		/// Socket path of the endpoint.
		path: PathBuf,
		/// The underlying I/O error.
		#[source]
		error: std::io::Error,
	},
	/// A frame could not be written to a peer endpoint.
	#[error(transparent)]
	Codec(#[from] CodecError),
	/// Process identity could not be read.
	#[error("{0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	pub(crate) fn endpoint(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
		Self::Endpoint {
			path: path.into(),
			error,
		}
	}
}

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
