use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::host::{BoxFuture, SchedulerHost};
use crate::state::{Scheduler, SchedulerConfig};
use crate::types::{FileId, Priority, TargetId, TaskError, TaskOutcome};

#[derive(Default)]
struct MockHost {
	prepared: Mutex<HashSet<TargetId>>,
	indexed: Mutex<HashSet<(FileId, TargetId)>>,
	fail_prepare_for: Mutex<HashSet<TargetId>>,
	topo_rank: Mutex<HashMap<TargetId, u32>>,
	prepare_calls: AtomicUsize,
	index_calls: AtomicUsize,
	concurrent_prepare: AtomicUsize,
	max_concurrent_prepare: AtomicUsize,
	concurrent_index: AtomicUsize,
	max_concurrent_index: AtomicUsize,
}

impl MockHost {
	fn mark_prepared(&self, target: &TargetId) {
		self.prepared.lock().insert(target.clone());
	}

	fn mark_indexed(&self, file: &FileId, target: &TargetId) {
		self.indexed.lock().insert((file.clone(), target.clone()));
	}

	fn set_rank(&self, target: &TargetId, rank: u32) {
		self.topo_rank.lock().insert(target.clone(), rank);
	}
}

impl SchedulerHost for MockHost {
	fn prepare(&self, target: TargetId, cancel: CancellationToken) -> BoxFuture<'_, Result<(), TaskError>> {
		Box::pin(async move {
			self.prepare_calls.fetch_add(1, Ordering::SeqCst);
			let concurrent = self.concurrent_prepare.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_concurrent_prepare.fetch_max(concurrent, Ordering::SeqCst);
			tokio::select! {
				_ = cancel.cancelled() => {
					self.concurrent_prepare.fetch_sub(1, Ordering::SeqCst);
					return Err(TaskError::PreparationFailed(target));
				}
				_ = tokio::time::sleep(Duration::from_millis(30)) => {}
			}
			self.concurrent_prepare.fetch_sub(1, Ordering::SeqCst);
			if self.fail_prepare_for.lock().contains(&target) {
				return Err(TaskError::PreparationFailed(target));
			}
			self.prepared.lock().insert(target);
			Ok(())
		})
	}

	fn index(&self, file: FileId, target: TargetId, cancel: CancellationToken) -> BoxFuture<'_, Result<(), TaskError>> {
		Box::pin(async move {
			self.index_calls.fetch_add(1, Ordering::SeqCst);
			let concurrent = self.concurrent_index.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_concurrent_index.fetch_max(concurrent, Ordering::SeqCst);
			tokio::select! {
				_ = cancel.cancelled() => {
					self.concurrent_index.fetch_sub(1, Ordering::SeqCst);
					return Err(TaskError::IndexFailed(file, target));
				}
				_ = tokio::time::sleep(Duration::from_millis(20)) => {}
			}
			self.concurrent_index.fetch_sub(1, Ordering::SeqCst);
			self.indexed.lock().insert((file, target));
			Ok(())
		})
	}

	fn is_prepared(&self, target: &TargetId) -> bool {
		self.prepared.lock().contains(target)
	}

	fn is_indexed(&self, file: &FileId, target: &TargetId) -> bool {
		self.indexed.lock().contains(&(file.clone(), target.clone()))
	}

	fn topological_rank(&self, target: &TargetId) -> u32 {
		self.topo_rank.lock().get(target).copied().unwrap_or(0)
	}
}

fn file(name: &str) -> FileId {
	FileId::new(std::path::PathBuf::from(name))
}

fn target(name: &str) -> TargetId {
	TargetId::new(name)
}

#[tokio::test]
async fn cold_start_prepares_then_indexes() {
	let host = Arc::new(MockHost::default());
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 2 });

	let mut sub = scheduler.submit_index(file("a.swift"), target("Lib"), Priority::Interactive);
	let outcome = sub.outcome().await;
	assert!(outcome.is_success());
	assert_eq!(host.prepare_calls.load(Ordering::SeqCst), 1);
	assert_eq!(host.index_calls.load(Ordering::SeqCst), 1);
	assert!(host.is_prepared(&target("Lib")));
	assert!(host.is_indexed(&file("a.swift"), &target("Lib")));
}

#[tokio::test]
async fn coalesces_concurrent_submissions_of_same_key() {
	let host = Arc::new(MockHost::default());
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 2 });

	let mut subs: Vec<_> = (0..5).map(|_| scheduler.submit_prepare(target("Lib"), Priority::Promoted)).collect();
	let outcomes = futures_join_all(&mut subs).await;

	assert!(outcomes.iter().all(|o| o.is_success()));
	assert_eq!(host.prepare_calls.load(Ordering::SeqCst), 1, "exactly one underlying execution (P6)");
}

#[tokio::test]
async fn no_duplicate_concurrent_preparations() {
	let host = Arc::new(MockHost::default());
	host.set_rank(&target("A"), 0);
	host.set_rank(&target("B"), 1);
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 2 });

	let mut a = scheduler.submit_prepare(target("A"), Priority::Promoted);
	let mut b = scheduler.submit_prepare(target("B"), Priority::Promoted);
	let _ = a.outcome().await;
	let _ = b.outcome().await;

	assert_eq!(host.max_concurrent_prepare.load(Ordering::SeqCst), 1, "P1: single prep slot serializes targets");
}

#[tokio::test]
async fn no_duplicate_concurrent_indexing_across_files() {
	let host = Arc::new(MockHost::default());
	host.mark_prepared(&target("Lib"));
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 1 });

	let mut a = scheduler.submit_index(file("a.swift"), target("Lib"), Priority::Promoted);
	let mut b = scheduler.submit_index(file("b.swift"), target("Lib"), Priority::Promoted);
	let _ = a.outcome().await;
	let _ = b.outcome().await;

	assert_eq!(host.max_concurrent_index.load(Ordering::SeqCst), 1, "P2 with a single index slot");
}

#[tokio::test]
async fn dependent_first_no_op_when_already_indexed() {
	let host = Arc::new(MockHost::default());
	host.mark_prepared(&target("Lib"));
	host.mark_indexed(&file("a.swift"), &target("Lib"));
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 1 });

	let mut sub = scheduler.submit_index(file("a.swift"), target("Lib"), Priority::Promoted);
	let outcome = sub.outcome().await;

	assert!(outcome.is_success());
	assert_eq!(host.index_calls.load(Ordering::SeqCst), 0, "rule 5: no-op when already indexed");
}

#[tokio::test]
async fn cancelling_last_subscriber_cancels_underlying_work() {
	let host = Arc::new(MockHost::default());
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 1 });

	let sub = scheduler.submit_prepare(target("Lib"), Priority::Promoted);
	tokio::time::sleep(Duration::from_millis(5)).await;
	sub.cancel();
	tokio::time::sleep(Duration::from_millis(60)).await;

	assert!(!host.is_prepared(&target("Lib")), "cancelled preparation never marks up to date");
}

#[tokio::test]
async fn cancelling_one_of_two_subscribers_keeps_work_running() {
	let host = Arc::new(MockHost::default());
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 1 });

	let first = scheduler.submit_prepare(target("Lib"), Priority::Promoted);
	let mut second = scheduler.submit_prepare(target("Lib"), Priority::Promoted);
	tokio::time::sleep(Duration::from_millis(5)).await;
	first.cancel();

	let outcome = second.outcome().await;
	assert!(outcome.is_success(), "remaining subscriber still observes completion");
	assert!(host.is_prepared(&target("Lib")));
}

#[tokio::test]
async fn failed_preparation_is_reported_but_not_retried_automatically() {
	let host = Arc::new(MockHost::default());
	host.fail_prepare_for.lock().insert(target("Lib"));
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 1 });

	let mut sub = scheduler.submit_prepare(target("Lib"), Priority::Promoted);
	let outcome = sub.outcome().await;
	assert!(matches!(outcome, TaskOutcome::Failed(_)));
	assert!(!host.is_prepared(&target("Lib")));
	assert_eq!(host.prepare_calls.load(Ordering::SeqCst), 1, "no automatic retry");
}

#[tokio::test]
async fn priority_promotion_never_lowers() {
	let host = Arc::new(MockHost::default());
	let scheduler = Scheduler::new(host.clone(), SchedulerConfig { prep_slots: 1, index_slots: 1 });

	let sub = scheduler.submit_prepare(target("Lib"), Priority::Background);
	// Re-submitting the same key at a lower priority must not demote it.
	let mut lower = scheduler.submit_prepare(target("Lib"), Priority::Background);
	let mut higher = scheduler.submit_prepare(target("Lib"), Priority::Interactive);
	let _ = lower.outcome().await;
	let _ = higher.outcome().await;
	drop(sub);
	assert!(host.is_prepared(&target("Lib")));
}

async fn futures_join_all(subs: &mut [crate::ops::Subscription<MockHost>]) -> Vec<TaskOutcome> {
	let mut results = Vec::with_capacity(subs.len());
	for sub in subs.iter_mut() {
		results.push(sub.outcome().await);
	}
	results
}
