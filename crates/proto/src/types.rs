//! Identifier and frame types shared between instances and launchers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-lifetime identifier of one live application instance.
///
/// Generated when a process first registers a jump action and never reused by
/// another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
	/// Generates a fresh random identifier.
	#[must_use]
	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}

	/// Returns the underlying UUID.
	#[must_use]
	pub const fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl fmt::Display for InstanceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.hyphenated().fmt(f)
	}
}

impl FromStr for InstanceId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// Frames accepted by an instance endpoint.
///
/// No response frame exists: the caller learns nothing beyond
/// whether the frame was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointFrame {
	/// Run the action registered under `command_id` on its owner context.
	Execute {
		/// Command identifier of the target action.
		command_id: String,
	},
}

impl EndpointFrame {
	/// Builds an execute frame.
	#[must_use]
	pub fn execute(command_id: impl Into<String>) -> Self {
		Self::Execute {
			command_id: command_id.into(),
		}
	}
}
