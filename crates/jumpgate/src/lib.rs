//! Routes shell-invoked jump actions to the live instance that owns them.
//!
//! A process registers its jump actions inside an update transaction on a
//! [`JumpActionsManager`]. The first registration joins the shared instance
//! registry and opens this process's [`Endpoint`]. Each registration produces
//! the launcher command line handed to the shell. If the process itself was
//! started to run one of the actions, that action fires while it is
//! registered.
//!
//! A launcher later looks the instance up in the registry and sends
//! `Execute(command_id)` to its endpoint (see [`client`]). The endpoint
//! enqueues the matching action on its [`OwnerContext`] and returns without
//! waiting for it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jumpgate::{JumpAction, JumpActionsManager, JumpTask, OwnerContext, ProcessInfo};
//! use jumpgate_coord::{CoordConfig, Coordinator};
//!
//! # fn main() -> jumpgate::Result<()> {
//! let config = CoordConfig::default().with_env_overrides()?;
//! let coordinator = Coordinator::new("Contoso.Editor", &config);
//! let process = Arc::new(ProcessInfo::from_env("Contoso.Editor")?);
//! let (owner, mut queue) = OwnerContext::channel("ui");
//! let manager = JumpActionsManager::new(coordinator, process, owner);
//!
//! let open_recent: Arc<dyn JumpAction> = Arc::new(JumpTask::new("open-recent", || println!("open recent")));
//! {
//! 	let update = manager.update()?;
//! 	update.register_action(&open_recent, "/jump:", "/usr/lib/contoso/launcher")?;
//! 	update.finish()?;
//! }
//!
//! // On the UI thread's event loop:
//! queue.run_pending();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod action;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod escape;
pub mod manager;
pub mod owner;
pub mod process;
pub mod registry;

pub use action::{JumpAction, JumpTask, StartInfo};
pub use client::{Delivery, deliver, send_execute};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use escape::LauncherInvocation;
pub use manager::{JumpActionsManager, LauncherPath, UpdateGuard};
pub use owner::{Dispatch, Job, OwnerContext, OwnerQueue};
pub use process::{CurrentProcess, ProcessInfo};
pub use registry::{ActionRegistry, DispatchOutcome};
