//! Registration transactions and instance lifecycle.
//!
//! A [`JumpActionsManager`] moves through three states:
//!
//! - **idle**: no transaction open, global mutex not held.
//! - **updating**: between [`JumpActionsManager::begin_update`] and
//!   [`JumpActionsManager::end_update`]. The global mutex is held the whole
//!   time.
//! - **shut down**: terminal; the instance has left the registry.
//!
//! Lock order is always the manager's own state lock first, then the global
//! mutex. The endpoint thread only touches the [`ActionRegistry`], never the
//! manager state; a dispatch arriving while a transaction is open waits in the
//! registry until the transaction ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jumpgate_coord::{Coordinator, GlobalMutexGuard};
use jumpgate_proto::InstanceId;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::action::JumpAction;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::escape::{LauncherInvocation, self_token};
use crate::owner::OwnerContext;
use crate::process::CurrentProcess;
use crate::registry::ActionRegistry;

#[cfg(test)]
mod tests;

/// Source of the launcher executable path written into start info.
pub trait LauncherPath {
	/// Path of the launcher executable.
	fn launcher_path(&self) -> PathBuf;
}

impl LauncherPath for Path {
	fn launcher_path(&self) -> PathBuf {
		self.to_path_buf()
	}
}

impl LauncherPath for PathBuf {
	fn launcher_path(&self) -> PathBuf {
		self.clone()
	}
}

impl LauncherPath for str {
	fn launcher_path(&self) -> PathBuf {
		PathBuf::from(self)
	}
}

impl LauncherPath for String {
	fn launcher_path(&self) -> PathBuf {
		PathBuf::from(self)
	}
}

struct Instance {
	id: InstanceId,
	endpoint: Endpoint,
}

#[derive(Default)]
struct ManagerState {
	/// Global mutex guard held while a transaction is open.
	transaction: Option<GlobalMutexGuard>,
	/// Set once the first registration joins the registry.
	instance: Option<Instance>,
	shut_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
	/// Wait for the endpoint to stop, report failures.
	Cooperative,
	/// Never block on the endpoint, never fail.
	BestEffort,
}

/// Registers jump actions for one process and owns its registry membership.
///
/// Dropping the manager without [`Self::shutdown`] still leaves the registry
/// when the global mutex can be taken within the timeout; otherwise the stale
/// entry is pruned by the next instance that joins.
pub struct JumpActionsManager {
	coordinator: Coordinator,
	process: Arc<dyn CurrentProcess>,
	default_owner: OwnerContext,
	actions: Arc<ActionRegistry>,
	state: Mutex<ManagerState>,
}

impl std::fmt::Debug for JumpActionsManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JumpActionsManager")
			.field("coordinator", &self.coordinator)
			.field("default_owner", &self.default_owner)
			.field("actions", &self.actions)
			.finish_non_exhaustive()
	}
}

impl JumpActionsManager {
	/// Creates an idle manager.
	///
	/// Actions registered without an [`OwnerContext`] installed on the calling
	/// thread run on `default_owner`.
	pub fn new(coordinator: Coordinator, process: Arc<dyn CurrentProcess>, default_owner: OwnerContext) -> Self {
		let actions = Arc::new(ActionRegistry::with_update_wait(coordinator.timeout()));
		Self {
			coordinator,
			process,
			default_owner,
			actions,
			state: Mutex::new(ManagerState::default()),
		}
	}

	/// Coordination primitives this manager uses.
	#[must_use]
	pub fn coordinator(&self) -> &Coordinator {
		&self.coordinator
	}

	/// Actions reachable through this instance's endpoint.
	#[must_use]
	pub fn actions(&self) -> &ActionRegistry {
		&self.actions
	}

	/// Registry identifier of this instance, once it has joined.
	#[must_use]
	pub fn instance_id(&self) -> Option<InstanceId> {
		self.state.lock().instance.as_ref().map(|instance| instance.id)
	}

	/// Socket path of this instance's endpoint, once it has joined.
	#[must_use]
	pub fn endpoint_path(&self) -> Option<PathBuf> {
		self.state
			.lock()
			.instance
			.as_ref()
			.map(|instance| instance.endpoint.path().to_path_buf())
	}

	/// Returns true while a transaction is open.
	#[must_use]
	pub fn is_updating(&self) -> bool {
		self.state.lock().transaction.is_some()
	}

	/// Opens a transaction: takes the global mutex and clears the action
	/// registry. Endpoint dispatches wait until the transaction ends.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidState`] if a transaction is already open or the
	/// manager is shut down, and [`Error::Coord`] if the global mutex cannot be
	/// acquired. On error nothing changes.
	pub fn begin_update(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.shut_down {
			return Err(Error::InvalidState("manager has been shut down"));
		}
		if state.transaction.is_some() {
			return Err(Error::InvalidState("update already in progress"));
		}

		let guard = self.coordinator.lock()?;
		self.actions.begin();
		state.transaction = Some(guard);
		debug!(application = self.coordinator.application_id(), "update opened");
		Ok(())
	}

	/// Closes the open transaction and releases the global mutex.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidState`] if no transaction is open. A failure to
	/// release the mutex is reported after the transaction is closed.
	pub fn end_update(&self) -> Result<()> {
		let mut state = self.state.lock();
		let Some(guard) = state.transaction.take() else {
			return Err(Error::InvalidState("no update in progress"));
		};
		self.actions.commit();
		let released = guard.release();
		drop(state);
		debug!(application = self.coordinator.application_id(), "update closed");
		released.map_err(Into::into)
	}

	/// Opens a transaction that closes itself when the returned guard drops.
	///
	/// # Errors
	///
	/// See [`Self::begin_update`].
	pub fn update(&self) -> Result<UpdateGuard<'_>> {
		self.begin_update()?;
		Ok(UpdateGuard { manager: self, open: true })
	}

	/// Registers `action` in the open transaction.
	///
	/// The first registration of this manager's life joins the instance
	/// registry and opens the endpoint. The action receives its launcher start
	/// info, and is bound to the calling thread's [`OwnerContext`] (or the
	/// default owner). If this process was launched with the action's self
	/// token in its arguments, the action is queued on its owner before this
	/// returns, on every registration that matches.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidState`] outside a transaction,
	/// [`Error::InvalidArgument`] for an empty command id or an application id
	/// containing whitespace, and endpoint or
	/// registry errors if joining fails. On error the action is not
	/// registered.
	pub fn register_action<L>(&self, action: &Arc<dyn JumpAction>, arg_prefix: &str, launcher: &L) -> Result<()>
	where
		L: LauncherPath + ?Sized,
	{
		let command_id = action.command_id();
		if command_id.is_empty() {
			return Err(Error::InvalidArgument("action has an empty command id"));
		}
		if self.process.application_id().chars().any(char::is_whitespace) {
			return Err(Error::InvalidArgument("application id contains whitespace"));
		}
		let token = self_token(arg_prefix, command_id);

		let run_now = {
			let mut state = self.state.lock();
			let state = &mut *state;
			let Some(guard) = state.transaction.as_ref() else {
				return Err(Error::InvalidState("register_action called outside an update"));
			};
			if state.instance.is_none() {
				state.instance = Some(self.join(guard)?);
			}

			let invocation = self.invocation_for(action.as_ref(), &token);
			action.set_start_info(&launcher.launcher_path(), &invocation.to_command_line());

			let owner = OwnerContext::current().unwrap_or_else(|| self.default_owner.clone());
			self.actions.register(action, owner);

			self.process.command_line_args().iter().skip(1).any(|arg| *arg == token)
		};

		if run_now {
			info!(%command_id, "process was launched for this action; running it");
			self.actions.dispatch(command_id);
		}
		Ok(())
	}

	/// Leaves the registry and closes the endpoint.
	///
	/// Reuses the global mutex if a transaction is open, otherwise acquires it.
	/// Idempotent; later calls return `Ok(())`.
	///
	/// # Errors
	///
	/// Returns [`Error::Coord`] if the mutex cannot be acquired or the
	/// registry cannot be rewritten, and endpoint errors if it does not close
	/// in time. The manager is shut down regardless.
	pub fn shutdown(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.shut_down {
			return Ok(());
		}
		state.shut_down = true;
		self.actions.clear();

		let held = state.transaction.take();
		let Some(instance) = state.instance.take() else {
			let released = held.map_or(Ok(()), GlobalMutexGuard::release);
			drop(state);
			debug!(application = self.coordinator.application_id(), "shut down without joining");
			return released.map_err(Into::into);
		};

		let (guard, lock_error) = match held {
			Some(guard) => (Some(guard), None),
			None => match self.coordinator.lock() {
				Ok(guard) => (Some(guard), None),
				Err(error) => (None, Some(Error::from(error))),
			},
		};

		let left = self.leave(instance, guard.as_ref(), Teardown::Cooperative);
		let released = guard.map_or(Ok(()), GlobalMutexGuard::release);
		drop(state);

		match lock_error {
			Some(error) => Err(error),
			None => left.and(released.map_err(Into::into)),
		}
	}

	fn join(&self, guard: &GlobalMutexGuard) -> Result<Instance> {
		let id = InstanceId::generate();
		let endpoint = Endpoint::open(self.coordinator.endpoint_path(id), self.actions.clone(), self.coordinator.timeout())?;

		let registered = self.coordinator.application_instances(guard).and_then(|mut instances| {
			instances.retain(|other| {
				let listening = self.coordinator.endpoint_path(*other).exists();
				if !listening {
					debug!(instance = %other, "pruning instance without endpoint");
				}
				listening
			});
			instances.insert(0, id);
			self.coordinator.update_instances(guard, &instances)
		});
		if let Err(error) = registered {
			endpoint.abort();
			return Err(error.into());
		}

		info!(instance = %id, endpoint = %endpoint.path().display(), "joined instance registry");
		Ok(Instance { id, endpoint })
	}

	fn leave(&self, instance: Instance, guard: Option<&GlobalMutexGuard>, mode: Teardown) -> Result<()> {
		let Instance { id, endpoint } = instance;
		let mut first_error: Option<Error> = None;

		match guard {
			Some(guard) => {
				let removed = self.coordinator.application_instances(guard).and_then(|mut instances| {
					instances.retain(|other| *other != id);
					self.coordinator.update_instances(guard, &instances)
				});
				if let Err(error) = removed {
					warn!(instance = %id, %error, "failed to remove instance from registry");
					first_error.get_or_insert(error.into());
				}
			}
			None => warn!(instance = %id, "global mutex unavailable; leaving registry entry for pruning"),
		}

		match mode {
			Teardown::Cooperative => {
				if let Err(error) = endpoint.close(self.coordinator.timeout()) {
					warn!(instance = %id, %error, "endpoint did not close cleanly");
					first_error.get_or_insert(error);
				}
			}
			Teardown::BestEffort => endpoint.abort(),
		}

		info!(instance = %id, ?mode, "left instance registry");
		first_error.map_or(Ok(()), Err)
	}

	fn invocation_for(&self, action: &dyn JumpAction, token: &str) -> LauncherInvocation {
		let own = self.process.executable_path();
		let executable = action.application_path().filter(|path| !path.as_os_str().is_empty()).unwrap_or(own);

		let mut arguments = action.arguments().to_string();
		if executable == own {
			if !arguments.is_empty() {
				arguments.push(' ');
			}
			arguments.push_str(token);
		}

		LauncherInvocation {
			application_id: self.process.application_id().to_string(),
			command_id: action.command_id().to_string(),
			executable: executable.to_path_buf(),
			arguments,
			working_directory: action.working_directory().map(Path::to_path_buf),
		}
	}
}

impl Drop for JumpActionsManager {
	fn drop(&mut self) {
		let state = self.state.get_mut();
		if state.shut_down {
			return;
		}
		state.shut_down = true;
		self.actions.clear();
		let held = state.transaction.take();
		let Some(instance) = state.instance.take() else {
			return;
		};

		let guard = held.or_else(|| self.coordinator.lock_best_effort());
		// Failures were logged by `leave`.
		let _ = self.leave(instance, guard.as_ref(), Teardown::BestEffort);
	}
}

/// Open transaction returned by [`JumpActionsManager::update`].
///
/// Dropping the guard ends the transaction, logging any failure.
#[derive(Debug)]
#[must_use = "the update ends when the guard drops"]
pub struct UpdateGuard<'a> {
	manager: &'a JumpActionsManager,
	open: bool,
}

impl UpdateGuard<'_> {
	/// See [`JumpActionsManager::register_action`].
	///
	/// # Errors
	///
	/// See [`JumpActionsManager::register_action`].
	pub fn register_action<L>(&self, action: &Arc<dyn JumpAction>, arg_prefix: &str, launcher: &L) -> Result<()>
	where
		L: LauncherPath + ?Sized,
	{
		self.manager.register_action(action, arg_prefix, launcher)
	}

	/// Ends the transaction, reporting release failures.
	///
	/// # Errors
	///
	/// See [`JumpActionsManager::end_update`].
	pub fn finish(mut self) -> Result<()> {
		self.open = false;
		self.manager.end_update()
	}
}

impl Drop for UpdateGuard<'_> {
	fn drop(&mut self) {
		if self.open
			&& let Err(error) = self.manager.end_update()
		{
			warn!(%error, "failed to end update");
		}
	}
}
