use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use jumpgate_coord::{CoordConfig, CoordError, InstanceStore, MemoryInstanceStore, test_helpers};
use pretty_assertions::assert_eq;

use super::*;
use crate::action::JumpTask;
use crate::client::{Delivery, deliver, send_execute};
use crate::owner::OwnerQueue;
use crate::process::ProcessInfo;
use crate::registry::DispatchOutcome;

const APP: &str = "Contoso";
const EXE: &str = "/opt/contoso/app";
const LAUNCHER: &str = "/opt/contoso/launcher";
const WAIT: Duration = Duration::from_secs(5);

fn config(dir: &tempfile::TempDir) -> CoordConfig {
	CoordConfig {
		runtime_dir: Some(dir.path().to_path_buf()),
		timeout_ms: 2000,
	}
}

fn manager_with(config: &CoordConfig, args: &[&str]) -> (JumpActionsManager, OwnerQueue) {
	let process = Arc::new(ProcessInfo::new(APP, EXE, args.iter().copied()));
	let (owner, queue) = OwnerContext::channel("ui");
	(JumpActionsManager::new(Coordinator::new(APP, config), process, owner), queue)
}

fn manager(dir: &tempfile::TempDir) -> (JumpActionsManager, OwnerQueue) {
	manager_with(&config(dir), &[EXE])
}

fn counting(id: &str) -> (Arc<dyn JumpAction>, Arc<AtomicUsize>) {
	let hits = Arc::new(AtomicUsize::new(0));
	let h = hits.clone();
	let action: Arc<dyn JumpAction> = Arc::new(JumpTask::new(id, move || {
		h.fetch_add(1, Ordering::SeqCst);
	}));
	(action, hits)
}

fn registered_instances(config: &CoordConfig) -> Vec<InstanceId> {
	let coordinator = Coordinator::new(APP, config);
	let guard = coordinator.lock().unwrap();
	coordinator.application_instances(&guard).unwrap()
}

#[test]
fn register_requires_open_update() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	let (action, _) = counting("open");

	let err = manager.register_action(&action, "/jump:", LAUNCHER).unwrap_err();
	assert!(matches!(err, Error::InvalidState(_)), "unexpected: {err}");
	assert!(matches!(manager.end_update(), Err(Error::InvalidState(_))));
	assert!(manager.actions().is_empty());
	assert_eq!(manager.instance_id(), None);
}

#[test]
fn nested_begin_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);

	manager.begin_update().unwrap();
	assert!(matches!(manager.begin_update(), Err(Error::InvalidState(_))));
	assert!(manager.is_updating());
	manager.end_update().unwrap();
	assert!(!manager.is_updating());

	manager.begin_update().unwrap();
	manager.end_update().unwrap();
}

#[test]
fn empty_command_id_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	let (action, _) = counting("");

	let update = manager.update().unwrap();
	let err = update.register_action(&action, "/jump:", LAUNCHER).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)), "unexpected: {err}");
	assert_eq!(manager.instance_id(), None);
}

#[test]
fn each_update_replaces_the_action_set() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager(&dir);
	let (a, _) = counting("a");
	let (b, _) = counting("b");
	let (c1, c1_hits) = counting("c");
	let (c2, c2_hits) = counting("c");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.register_action(&b, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	assert_eq!(manager.actions().command_ids(), vec!["a".to_string(), "b".to_string()]);

	let update = manager.update().unwrap();
	update.register_action(&b, "/jump:", LAUNCHER).unwrap();
	update.register_action(&c1, "/jump:", LAUNCHER).unwrap();
	update.register_action(&c2, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	assert_eq!(manager.actions().command_ids(), vec!["b".to_string(), "c".to_string()]);

	assert_eq!(manager.actions().lookup_and_run("a"), DispatchOutcome::Missing);
	assert_eq!(manager.actions().lookup_and_run("c"), DispatchOutcome::Scheduled);
	queue.run_pending();
	assert_eq!(c1_hits.load(Ordering::SeqCst), 0);
	assert_eq!(c2_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_update_leaves_no_actions() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	let (a, _) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	manager.update().unwrap().finish().unwrap();
	assert!(manager.actions().is_empty());
	assert!(manager.instance_id().is_some());
}

#[test]
fn first_registration_joins_once() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");

	manager.update().unwrap().finish().unwrap();
	assert_eq!(manager.instance_id(), None);
	assert!(registered_instances(&config).is_empty());

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	let id = manager.instance_id().unwrap();
	assert_eq!(registered_instances(&config), vec![id]);
	assert!(manager.endpoint_path().unwrap().exists());

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	assert_eq!(manager.instance_id(), Some(id));
	assert_eq!(registered_instances(&config), vec![id]);
}

#[test]
fn later_instances_are_listed_first() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let (first, _q1) = manager_with(&config, &[EXE]);
	let (second, _q2) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");

	for manager in [&first, &second] {
		let update = manager.update().unwrap();
		update.register_action(&a, "/jump:", LAUNCHER).unwrap();
		update.finish().unwrap();
	}

	assert_eq!(
		registered_instances(&config),
		vec![second.instance_id().unwrap(), first.instance_id().unwrap()]
	);
}

#[test]
fn join_prunes_entries_without_endpoint() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let crashed = InstanceId::generate();
	{
		let coordinator = Coordinator::new(APP, &config);
		let guard = coordinator.lock().unwrap();
		coordinator.update_instances(&guard, &[crashed]).unwrap();
	}

	let (manager, _queue) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");
	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	assert_eq!(registered_instances(&config), vec![manager.instance_id().unwrap()]);
}

#[test]
fn start_info_targets_own_executable_with_self_token() {
	let dir = tempfile::tempdir().unwrap();
	let process = Arc::new(ProcessInfo::new(APP, "app.exe", ["app.exe"]));
	let (owner, _queue) = OwnerContext::channel("ui");
	let manager = JumpActionsManager::new(Coordinator::new(APP, &config(&dir)), process, owner);
	let task = Arc::new(JumpTask::new("open-recent", || {}));
	let action: Arc<dyn JumpAction> = task.clone();

	let update = manager.update().unwrap();
	update.register_action(&action, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	let info = task.start_info().unwrap();
	assert_eq!(info.launcher_path, PathBuf::from(LAUNCHER));
	assert_eq!(info.arguments, "Contoso open-recent app.exe \"%2Fjump%3Aopen-recent\"");

	let parsed = LauncherInvocation::parse(&info.arguments).unwrap();
	assert_eq!(parsed.executable, PathBuf::from("app.exe"));
	assert_eq!(parsed.arguments, "/jump:open-recent");
	assert_eq!(parsed.working_directory, None);
}

#[test]
fn start_info_for_foreign_executable_has_no_self_token() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	let task = Arc::new(
		JumpTask::new("notes", || {})
			.with_application_path("/usr/bin/notes")
			.with_arguments("--new")
			.with_working_directory("/home/me"),
	);
	let action: Arc<dyn JumpAction> = task.clone();

	let update = manager.update().unwrap();
	update.register_action(&action, "/jump:", Path::new(LAUNCHER)).unwrap();
	update.finish().unwrap();

	let parsed = LauncherInvocation::parse(&task.start_info().unwrap().arguments).unwrap();
	assert_eq!(parsed.application_id, APP);
	assert_eq!(parsed.command_id, "notes");
	assert_eq!(parsed.executable, PathBuf::from("/usr/bin/notes"));
	assert_eq!(parsed.arguments, "--new");
	assert_eq!(parsed.working_directory, Some(PathBuf::from("/home/me")));
}

#[test]
fn own_arguments_precede_self_token() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	let task = Arc::new(JumpTask::new("open file", || {}).with_arguments("--fast"));
	let action: Arc<dyn JumpAction> = task.clone();

	let update = manager.update().unwrap();
	update.register_action(&action, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	let parsed = LauncherInvocation::parse(&task.start_info().unwrap().arguments).unwrap();
	assert_eq!(parsed.executable, PathBuf::from(EXE));
	assert_eq!(parsed.arguments, "--fast /jump:open%20file");
}

#[test]
fn self_launched_action_runs_on_each_registration() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager_with(&config(&dir), &[EXE, "/jump:open-recent"]);
	let (recent, recent_hits) = counting("open-recent");
	let (other, other_hits) = counting("other");

	let update = manager.update().unwrap();
	update.register_action(&other, "/jump:", LAUNCHER).unwrap();
	update.register_action(&recent, "/jump:", LAUNCHER).unwrap();
	assert_eq!(queue.run_pending(), 1);
	update.finish().unwrap();
	assert_eq!(recent_hits.load(Ordering::SeqCst), 1);
	assert_eq!(other_hits.load(Ordering::SeqCst), 0);

	let update = manager.update().unwrap();
	update.register_action(&recent, "/jump:", LAUNCHER).unwrap();
	assert_eq!(queue.run_pending(), 1);
	update.finish().unwrap();
	assert_eq!(recent_hits.load(Ordering::SeqCst), 2);
	assert_eq!(other_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn self_token_matches_escaped_command_id() {
	let dir = tempfile::tempdir().unwrap();
	let (escaped, mut escaped_queue) = manager_with(&config(&dir), &[EXE, "/jump:open%20file"]);
	let (raw, mut raw_queue) = manager_with(&config(&dir), &[EXE, "/jump:open file"]);
	let (action, hits) = counting("open file");

	for manager in [&escaped, &raw] {
		let update = manager.update().unwrap();
		update.register_action(&action, "/jump:", LAUNCHER).unwrap();
		update.finish().unwrap();
	}

	assert_eq!(escaped_queue.run_pending(), 1);
	assert_eq!(raw_queue.run_pending(), 0);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn argument_zero_never_triggers() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager_with(&config(&dir), &["/jump:a"]);
	let (a, _) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	assert_eq!(queue.run_pending(), 0);
}

#[test]
fn installed_owner_context_wins_over_default() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut ui_queue) = manager(&dir);
	let (worker, mut worker_queue) = OwnerContext::channel("worker");
	let (a, hits) = counting("a");

	let update = manager.update().unwrap();
	{
		let _entered = worker.enter();
		update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	}
	update.finish().unwrap();

	manager.actions().lookup_and_run("a");
	assert_eq!(ui_queue.run_pending(), 0);
	assert_eq!(worker_queue.run_pending(), 1);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn dropped_action_is_not_dispatched() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager(&dir);
	let (a, hits) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	drop(a);

	assert_eq!(manager.actions().lookup_and_run("a"), DispatchOutcome::Expired);
	assert_eq!(queue.run_pending(), 0);
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn endpoint_dispatches_to_owner() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager(&dir);
	let (a, hits) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	send_execute(&manager.endpoint_path().unwrap(), "a", WAIT).await.unwrap();
	assert!(tokio::time::timeout(WAIT, queue.run_next()).await.unwrap());
	assert_eq!(hits.load(Ordering::SeqCst), 1);

	assert_eq!(
		deliver(manager.coordinator(), "a").await.unwrap(),
		Delivery::Delivered(manager.instance_id().unwrap())
	);
	assert!(tokio::time::timeout(WAIT, queue.run_next()).await.unwrap());
	assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn endpoint_request_during_rebuild_reaches_new_action() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager(&dir);
	let (a, hits) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	let update = manager.update().unwrap();
	send_execute(&manager.endpoint_path().unwrap(), "a", WAIT).await.unwrap();
	std::thread::sleep(Duration::from_millis(50));
	assert_eq!(queue.run_pending(), 0);
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	assert!(tokio::time::timeout(WAIT, queue.run_next()).await.unwrap());
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn dispatch_during_rebuild_waits_for_registration() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, mut queue) = manager(&dir);
	let (a, hits) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	let update = manager.update().unwrap();
	let outcome = std::thread::scope(|scope| {
		let waiter = scope.spawn(|| manager.actions().lookup_and_run("a"));
		std::thread::sleep(Duration::from_millis(50));
		update.register_action(&a, "/jump:", LAUNCHER).unwrap();
		update.finish().unwrap();
		waiter.join().unwrap()
	});

	assert_eq!(outcome, DispatchOutcome::Scheduled);
	assert_eq!(queue.run_pending(), 1);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn application_id_with_whitespace_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let process = Arc::new(ProcessInfo::new("Contoso Editor", EXE, [EXE]));
	let (owner, _queue) = OwnerContext::channel("ui");
	let manager = JumpActionsManager::new(Coordinator::new("Contoso Editor", &config(&dir)), process, owner);
	let (a, _) = counting("a");

	let update = manager.update().unwrap();
	let err = update.register_action(&a, "/jump:", LAUNCHER).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)), "unexpected: {err}");
	update.finish().unwrap();
	assert_eq!(manager.instance_id(), None);
	assert!(manager.actions().is_empty());
}

#[test]
fn update_guard_closes_on_early_return() {
	fn failing(manager: &JumpActionsManager, action: &Arc<dyn JumpAction>) -> Result<()> {
		let update = manager.update()?;
		update.register_action(action, "/jump:", LAUNCHER)?;
		Err(Error::InvalidArgument("stop here"))
	}

	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	let (a, _) = counting("a");

	assert!(failing(&manager, &a).is_err());
	assert!(!manager.is_updating());
	manager.begin_update().unwrap();
	manager.end_update().unwrap();
}

#[test]
fn failed_begin_leaves_manager_idle() {
	let dir = tempfile::tempdir().unwrap();
	let config = CoordConfig {
		runtime_dir: Some(dir.path().to_path_buf()),
		timeout_ms: 100,
	};
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let other = Coordinator::new(APP, &config);

	let held = other.lock().unwrap();
	let err = manager.begin_update().unwrap_err();
	assert!(matches!(err, Error::Coord(CoordError::MutexTimeout { .. })), "unexpected: {err}");
	assert!(!manager.is_updating());

	held.release().unwrap();
	manager.begin_update().unwrap();
	manager.end_update().unwrap();
}

#[test]
fn update_holds_global_mutex() {
	let dir = tempfile::tempdir().unwrap();
	let config = CoordConfig {
		runtime_dir: Some(dir.path().to_path_buf()),
		timeout_ms: 100,
	};
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let other = Coordinator::new(APP, &config);

	let update = manager.update().unwrap();
	assert!(matches!(other.lock(), Err(CoordError::MutexTimeout { .. })));
	update.finish().unwrap();
	assert!(other.lock().is_ok());
}

#[test]
fn shutdown_leaves_registry_and_closes_endpoint() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	let endpoint = manager.endpoint_path().unwrap();

	manager.shutdown().unwrap();
	assert!(registered_instances(&config).is_empty());
	assert!(!endpoint.exists());
	assert!(manager.actions().is_empty());

	manager.shutdown().unwrap();
	assert!(matches!(manager.begin_update(), Err(Error::InvalidState(_))));
}

#[test]
fn shutdown_during_update_reuses_held_mutex() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");

	manager.begin_update().unwrap();
	manager.register_action(&a, "/jump:", LAUNCHER).unwrap();
	manager.shutdown().unwrap();

	assert!(!manager.is_updating());
	assert!(registered_instances(&config).is_empty());
}

#[test]
fn shutdown_before_joining_is_harmless() {
	let dir = tempfile::tempdir().unwrap();
	let (manager, _queue) = manager(&dir);
	manager.shutdown().unwrap();
	assert_eq!(manager.instance_id(), None);
}

#[test]
fn drop_leaves_registry() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();
	let endpoint = manager.endpoint_path().unwrap();

	drop(manager);
	assert!(registered_instances(&config).is_empty());
	assert!(!endpoint.exists());
}

#[test]
fn teardown_proceeds_over_abandoned_mutex() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let (manager, _queue) = manager_with(&config, &[EXE]);
	let (a, _) = counting("a");

	let update = manager.update().unwrap();
	update.register_action(&a, "/jump:", LAUNCHER).unwrap();
	update.finish().unwrap();

	let lock_path = manager.coordinator().paths().mutex_path();
	test_helpers::abandon_mutex(&lock_path, 999_999).unwrap();

	manager.shutdown().unwrap();
	assert!(registered_instances(&config).is_empty());
}

/// Store that counts read-modify-write cycles that overlap.
#[derive(Default)]
struct CheckedStore {
	inner: MemoryInstanceStore,
	busy: AtomicBool,
	overlaps: AtomicUsize,
}

impl InstanceStore for CheckedStore {
	fn load(&self, guard: &GlobalMutexGuard) -> jumpgate_coord::Result<Vec<InstanceId>> {
		if self.busy.swap(true, Ordering::SeqCst) {
			self.overlaps.fetch_add(1, Ordering::SeqCst);
		}
		std::thread::sleep(Duration::from_millis(20));
		self.inner.load(guard)
	}

	fn store(&self, guard: &GlobalMutexGuard, instances: &[InstanceId]) -> jumpgate_coord::Result<()> {
		std::thread::sleep(Duration::from_millis(20));
		let stored = self.inner.store(guard, instances);
		self.busy.store(false, Ordering::SeqCst);
		stored
	}
}

#[test]
fn concurrent_instances_never_lose_updates() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(&dir);
	let store = Arc::new(CheckedStore::default());
	let (a, _) = counting("a");

	let managers: Vec<(JumpActionsManager, OwnerQueue)> = std::thread::scope(|scope| {
		let handles: Vec<_> = (0..4)
			.map(|_| {
				let store: Arc<dyn InstanceStore> = store.clone();
				let config = &config;
				let a = &a;
				scope.spawn(move || {
					let process = Arc::new(ProcessInfo::new(APP, EXE, [EXE]));
					let (owner, queue) = OwnerContext::channel("ui");
					let manager = JumpActionsManager::new(Coordinator::with_store(APP, config, store), process, owner);
					let update = manager.update().unwrap();
					update.register_action(a, "/jump:", LAUNCHER).unwrap();
					update.finish().unwrap();
					(manager, queue)
				})
			})
			.collect();
		handles.into_iter().map(|handle| handle.join().unwrap()).collect()
	});

	let mut joined: Vec<_> = managers.iter().map(|(m, _)| m.instance_id().unwrap()).collect();
	let mut listed = store.inner.snapshot();
	joined.sort();
	listed.sort();
	assert_eq!(listed, joined);

	std::thread::scope(|scope| {
		for (manager, _) in &managers {
			scope.spawn(move || manager.shutdown().unwrap());
		}
	});
	assert!(store.inner.snapshot().is_empty());
	assert_eq!(store.overlaps.load(Ordering::SeqCst), 0);
}
