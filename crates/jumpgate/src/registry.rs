//! Per-process action registry.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::action::JumpAction;
use crate::owner::OwnerContext;

/// How long a dispatch waits for an open update when none is configured.
const DEFAULT_UPDATE_WAIT: Duration = Duration::from_secs(3);

/// What [`ActionRegistry::lookup_and_run`] did with a command id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// The action was queued on its owner context.
	Scheduled,
	/// No action is registered under the id.
	Missing,
	/// The action was dropped; its entry has been evicted.
	Expired,
	/// The owner context no longer accepts work.
	OwnerClosed,
}

struct RegisteredAction {
	action: Weak<dyn JumpAction>,
	owner: OwnerContext,
}

#[derive(Default)]
struct Inner {
	entries: HashMap<String, RegisteredAction>,
	/// Set between [`ActionRegistry::begin`] and [`ActionRegistry::commit`].
	updating: bool,
}

/// Command id to weakly held action, plus the context it runs on.
///
/// The lock is held only while the map is touched, never while an action
/// runs, so endpoint threads and update transactions can interleave freely.
/// While an update is open the set is incomplete, so [`Self::lookup_and_run`]
/// waits for the commit (bounded by the update wait) before looking up.
pub struct ActionRegistry {
	inner: Mutex<Inner>,
	settled: Condvar,
	update_wait: Duration,
}

impl Default for ActionRegistry {
	fn default() -> Self {
		Self::with_update_wait(DEFAULT_UPDATE_WAIT)
	}
}

impl std::fmt::Debug for ActionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("ActionRegistry")
			.field("len", &inner.entries.len())
			.field("updating", &inner.updating)
			.field("update_wait", &self.update_wait)
			.finish()
	}
}

impl ActionRegistry {
	/// Creates an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an empty registry whose dispatches wait at most `update_wait`
	/// for an open update to commit.
	#[must_use]
	pub fn with_update_wait(update_wait: Duration) -> Self {
		Self {
			inner: Mutex::new(Inner::default()),
			settled: Condvar::new(),
			update_wait,
		}
	}

	/// Registers `action` under its command id, replacing any previous entry.
	pub fn register(&self, action: &Arc<dyn JumpAction>, owner: OwnerContext) {
		let command_id = action.command_id().to_string();
		trace!(%command_id, owner = owner.name(), "registering action");
		self.inner.lock().entries.insert(
			command_id,
			RegisteredAction {
				action: Arc::downgrade(action),
				owner,
			},
		);
	}

	/// Empties the registry and holds dispatches until [`Self::commit`].
	pub fn begin(&self) {
		let mut inner = self.inner.lock();
		inner.entries.clear();
		inner.updating = true;
	}

	/// Publishes the action set built since [`Self::begin`] and wakes waiting
	/// dispatches.
	pub fn commit(&self) {
		self.inner.lock().updating = false;
		self.settled.notify_all();
	}

	/// Removes every entry and releases waiting dispatches.
	pub fn clear(&self) {
		{
			let mut inner = self.inner.lock();
			inner.entries.clear();
			inner.updating = false;
		}
		self.settled.notify_all();
	}

	/// Returns true between [`Self::begin`] and [`Self::commit`].
	#[must_use]
	pub fn is_updating(&self) -> bool {
		self.inner.lock().updating
	}

	/// Number of entries, including expired ones not yet evicted.
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	/// Returns true if there are no entries.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.lock().entries.is_empty()
	}

	/// Returns true if `command_id` maps to a live action.
	#[must_use]
	pub fn contains(&self, command_id: &str) -> bool {
		self.inner
			.lock()
			.entries
			.get(command_id)
			.is_some_and(|entry| entry.action.strong_count() > 0)
	}

	/// Sorted ids of live actions.
	#[must_use]
	pub fn command_ids(&self) -> Vec<String> {
		let mut ids: Vec<_> = self
			.inner
			.lock()
			.entries
			.iter()
			.filter(|(_, entry)| entry.action.strong_count() > 0)
			.map(|(id, _)| id.clone())
			.collect();
		ids.sort();
		ids
	}

	/// Queues the action registered under `command_id` on its owner context.
	///
	/// Blocks while an update is open, up to the update wait, then looks up
	/// against whatever is registered. Returns as soon as the job is queued.
	/// Unknown and expired ids are benign races with the shell and only
	/// logged.
	pub fn lookup_and_run(&self, command_id: &str) -> DispatchOutcome {
		let mut inner = self.inner.lock();
		if inner.updating {
			let deadline = Instant::now() + self.update_wait;
			while inner.updating {
				if self.settled.wait_until(&mut inner, deadline).timed_out() {
					debug!(%command_id, wait = ?self.update_wait, "update still open; dispatching against current actions");
					break;
				}
			}
		}
		Self::dispatch_locked(inner, command_id)
	}

	/// Like [`Self::lookup_and_run`] but never waits for an open update.
	/// Used by the thread that holds the update open.
	pub(crate) fn dispatch(&self, command_id: &str) -> DispatchOutcome {
		Self::dispatch_locked(self.inner.lock(), command_id)
	}

	fn dispatch_locked(mut inner: MutexGuard<'_, Inner>, command_id: &str) -> DispatchOutcome {
		let Some(entry) = inner.entries.get(command_id) else {
			debug!(%command_id, "no action registered; ignoring");
			return DispatchOutcome::Missing;
		};
		let (action, owner) = match entry.action.upgrade() {
			Some(action) => (action, entry.owner.clone()),
			None => {
				inner.entries.remove(command_id);
				debug!(%command_id, "action was dropped; evicted");
				return DispatchOutcome::Expired;
			}
		};
		drop(inner);

		if owner.post(move || action.execute()) {
			debug!(%command_id, owner = owner.name(), "action scheduled");
			DispatchOutcome::Scheduled
		} else {
			warn!(%command_id, owner = owner.name(), "owner context closed; action dropped");
			DispatchOutcome::OwnerClosed
		}
	}
}
