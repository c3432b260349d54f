//! Owner contexts: the queues jump actions execute on.
//!
//! An action must run on the context that registered it, typically a UI
//! thread's event loop. Endpoint threads never run actions themselves; they
//! post a [`Job`] and return. Jobs posted to one context run in FIFO order.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Unit of work posted to an owner context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Sink for jobs bound to one execution context.
///
/// Implement this to route actions into an existing UI dispatcher.
pub trait Dispatch: Send + Sync + 'static {
	/// Enqueues `job`. Returns false if the context no longer accepts work.
	fn post(&self, job: Job) -> bool;
}

impl Dispatch for mpsc::UnboundedSender<Job> {
	fn post(&self, job: Job) -> bool {
		self.send(job).is_ok()
	}
}

thread_local! {
	static CURRENT: RefCell<Option<OwnerContext>> = const { RefCell::new(None) };
}

/// Cloneable handle to an execution context.
#[derive(Clone)]
pub struct OwnerContext {
	name: Arc<str>,
	dispatch: Arc<dyn Dispatch>,
}

impl fmt::Debug for OwnerContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("OwnerContext").field(&self.name).finish()
	}
}

impl OwnerContext {
	/// Wraps an existing dispatcher.
	pub fn new(name: impl Into<Arc<str>>, dispatch: impl Dispatch) -> Self {
		Self {
			name: name.into(),
			dispatch: Arc::new(dispatch),
		}
	}

	/// Creates a FIFO context and the queue its owning thread drains.
	pub fn channel(name: impl Into<Arc<str>>) -> (Self, OwnerQueue) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self::new(name, tx), OwnerQueue { rx })
	}

	/// Name used in logs.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Enqueues `job`. Returns false if the context has shut down.
	pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
		self.dispatch.post(Box::new(job))
	}

	/// Context installed on the calling thread, if any.
	#[must_use]
	pub fn current() -> Option<Self> {
		CURRENT.with(|current| current.borrow().clone())
	}

	/// Installs this context as the calling thread's owner until the guard is
	/// dropped. Nested guards restore the previous context.
	#[must_use = "the context is uninstalled when the guard drops"]
	pub fn enter(&self) -> EnterGuard {
		let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
		EnterGuard { previous }
	}
}

/// Restores the previously installed context on drop.
#[derive(Debug)]
pub struct EnterGuard {
	previous: Option<OwnerContext>,
}

impl Drop for EnterGuard {
	fn drop(&mut self) {
		let previous = self.previous.take();
		CURRENT.with(|current| *current.borrow_mut() = previous);
	}
}

/// Receiving side of [`OwnerContext::channel`].
#[derive(Debug)]
pub struct OwnerQueue {
	rx: mpsc::UnboundedReceiver<Job>,
}

impl OwnerQueue {
	/// Runs every job queued so far and returns how many ran.
	pub fn run_pending(&mut self) -> usize {
		let mut ran = 0;
		while let Ok(job) = self.rx.try_recv() {
			job();
			ran += 1;
		}
		ran
	}

	/// Waits for the next job and runs it. Returns false once every context
	/// handle is gone and the queue is drained.
	pub async fn run_next(&mut self) -> bool {
		match self.rx.recv().await {
			Some(job) => {
				job();
				true
			}
			None => false,
		}
	}

	/// Runs jobs until every context handle is dropped.
	pub async fn run(mut self) {
		while self.run_next().await {}
	}
}
