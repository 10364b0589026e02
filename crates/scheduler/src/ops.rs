use std::sync::Arc;
use std::sync::atomic::Ordering as AtomicOrdering;

use tokio::sync::{OwnedSemaphorePermit, watch};
use tracing::{debug, trace};

use crate::host::SchedulerHost;
use crate::state::{Scheduler, TaskEntry};
use crate::types::{FileId, Priority, TargetId, TaskError, TaskKey, TaskOutcome, TaskState};

/// A handle to a (possibly shared) scheduled task.
///
/// Dropping a `Subscription` releases this subscriber's interest in the
/// task. Per rule 8 of §4.3, the underlying work is cancelled only once
/// every subscriber has dropped (or explicitly cancelled).
pub struct Subscription<H: SchedulerHost> {
	scheduler: Scheduler<H>,
	entry: Arc<TaskEntry>,
	rx: watch::Receiver<Option<TaskOutcome>>,
}

impl<H: SchedulerHost> Subscription<H> {
	/// Awaits the task's outcome. Multiple subscribers of the same
	/// coalesced task each resolve independently from the same result (P6).
	pub async fn outcome(&mut self) -> TaskOutcome {
		loop {
			if let Some(outcome) = self.rx.borrow_and_update().clone() {
				return outcome;
			}
			if self.rx.changed().await.is_err() {
				return TaskOutcome::Cancelled;
			}
		}
	}

	/// Explicitly drops interest in this task, equivalent to letting the
	/// handle go out of scope.
	pub fn cancel(self) {
		drop(self);
	}

	pub fn key(&self) -> &TaskKey {
		&self.entry.key
	}
}

impl<H: SchedulerHost> Drop for Subscription<H> {
	fn drop(&mut self) {
		let previous = self.entry.subscribers.fetch_sub(1, AtomicOrdering::AcqRel);
		if previous == 1 {
			let still_active = matches!(*self.entry.state.lock(), TaskState::Queued | TaskState::Running);
			if still_active {
				debug!(key = %self.entry.key, "scheduler.cancel.last_subscriber");
				self.entry.cancel.cancel();
			}
		}
	}
}

fn task_target(key: &TaskKey) -> TargetId {
	match key {
		TaskKey::Prepare(t) => t.clone(),
		TaskKey::Index(_, t) => t.clone(),
	}
}

impl<H: SchedulerHost> Scheduler<H> {
	/// Submits (or joins) a `prepare(target)` task at the given priority.
	pub fn submit_prepare(&self, target: TargetId, priority: Priority) -> Subscription<H> {
		let key = TaskKey::Prepare(target.clone());
		let entry = self.admit(key, priority, |entry| {
			let rank = self.host.topological_rank(&target);
			self.inner.push_prepare(entry, rank);
		});
		self.subscribe(entry)
	}

	/// Submits (or joins) an `index(file, target)` task at the given
	/// priority. The prerequisite `prepare(target)` is chained lazily by
	/// the task body itself (rule 6), not at submission time, so that a
	/// `prepare` already in flight for an unrelated reason is reused
	/// rather than duplicated.
	pub fn submit_index(&self, file: FileId, target: TargetId, priority: Priority) -> Subscription<H> {
		let key = TaskKey::Index(file, target);
		let entry = self.admit(key, priority, |entry| {
			self.inner.push_index(entry);
		});
		self.subscribe(entry)
	}

	/// Looks up or creates the entry for `key`, promoting its priority and
	/// re-enqueuing (with the `on_create_or_promote` callback) when the
	/// task is freshly created or still queued and promoted upward (P7).
	fn admit(&self, key: TaskKey, priority: Priority, on_create_or_promote: impl FnOnce(Arc<TaskEntry>)) -> Arc<TaskEntry> {
		let mut entries = self.inner.entries.lock();
		if let Some(existing) = entries.get(&key).cloned() {
			drop(entries);
			let promoted = existing.promote(priority);
			let still_queued = matches!(*existing.state.lock(), TaskState::Queued);
			if promoted && still_queued {
				trace!(key = %existing.key, "scheduler.promote");
				on_create_or_promote(existing.clone());
			}
			return existing;
		}
		let sequence = self.inner.next_sequence();
		let entry = self.inner.make_entry(key.clone(), priority, sequence);
		entries.insert(key, entry.clone());
		drop(entries);
		trace!(key = %entry.key, "scheduler.submit");
		on_create_or_promote(entry.clone());
		entry
	}

	fn subscribe(&self, entry: Arc<TaskEntry>) -> Subscription<H> {
		entry.subscribers.fetch_add(1, AtomicOrdering::AcqRel);
		let rx = entry.outcome_tx.subscribe();
		Subscription { scheduler: self.clone(), entry, rx }
	}

	/// Removes `key` from the in-progress map, but only if the stored
	/// entry is still the one we finished — a resubmission after removal
	/// races harmlessly into a brand new entry otherwise.
	fn retire(&self, key: &TaskKey, entry: &Arc<TaskEntry>) {
		let mut entries = self.inner.entries.lock();
		if let Some(current) = entries.get(key)
			&& Arc::ptr_eq(current, entry)
		{
			entries.remove(key);
		}
	}

	pub(crate) fn spawn_dispatchers(&self) {
		let prep = self.clone();
		tokio::spawn(async move { prepare_dispatch_loop(prep).await });
		let index = self.clone();
		tokio::spawn(async move { index_dispatch_loop(index).await });
	}
}

async fn prepare_dispatch_loop<H: SchedulerHost>(scheduler: Scheduler<H>) {
	loop {
		let entry = next_queued(&scheduler, true).await;
		let permit = match scheduler.inner.prep_semaphore.clone().acquire_owned().await {
			Ok(permit) => permit,
			Err(_) => return,
		};
		let scheduler = scheduler.clone();
		tokio::spawn(async move { run_prepare(scheduler, entry, permit).await });
	}
}

async fn index_dispatch_loop<H: SchedulerHost>(scheduler: Scheduler<H>) {
	loop {
		let entry = next_queued(&scheduler, false).await;
		let permit = match scheduler.inner.index_semaphore.clone().acquire_owned().await {
			Ok(permit) => permit,
			Err(_) => return,
		};
		let scheduler = scheduler.clone();
		tokio::spawn(async move { run_index(scheduler, entry, permit).await });
	}
}

async fn next_queued<H: SchedulerHost>(scheduler: &Scheduler<H>, prepare_pool: bool) -> Arc<TaskEntry> {
	loop {
		let popped = if prepare_pool { scheduler.inner.pop_prepare_queued() } else { scheduler.inner.pop_index_queued() };
		if let Some(entry) = popped {
			return entry;
		}
		if prepare_pool {
			scheduler.inner.prep_notify.notified().await;
		} else {
			scheduler.inner.index_notify.notified().await;
		}
	}
}

async fn run_prepare<H: SchedulerHost>(scheduler: Scheduler<H>, entry: Arc<TaskEntry>, _permit: OwnedSemaphorePermit) {
	let target = task_target(&entry.key);
	debug!(target = %target, "scheduler.prepare.start");
	let result = scheduler.host.prepare(target.clone(), entry.cancel.clone()).await;
	let outcome = outcome_from_result(&entry, result);
	debug!(target = %target, outcome = %outcome_label(&outcome), "scheduler.prepare.finish");
	entry.finish(outcome);
	scheduler.retire(&entry.key, &entry);
}

async fn run_index<H: SchedulerHost>(scheduler: Scheduler<H>, entry: Arc<TaskEntry>, _permit: OwnedSemaphorePermit) {
	let (file, target) = match &entry.key {
		TaskKey::Index(f, t) => (f.clone(), t.clone()),
		TaskKey::Prepare(_) => unreachable!("index dispatch loop only pops Index tasks"),
	};

	if !scheduler.host.is_prepared(&target) {
		let priority = entry.live_priority();
		let mut prereq = scheduler.submit_prepare(target.clone(), priority);
		match prereq.outcome().await {
			TaskOutcome::Completed => {}
			TaskOutcome::Cancelled => {
				entry.finish(TaskOutcome::Cancelled);
				scheduler.retire(&entry.key, &entry);
				return;
			}
			TaskOutcome::Failed(_) => {
				entry.finish(TaskOutcome::Failed(Arc::new(TaskError::PreparationFailed(target.clone()))));
				scheduler.retire(&entry.key, &entry);
				return;
			}
		}
	}

	if entry.cancel.is_cancelled() {
		entry.finish(TaskOutcome::Cancelled);
		scheduler.retire(&entry.key, &entry);
		return;
	}

	if scheduler.host.is_indexed(&file, &target) {
		// Rule 5: an equivalent task completed the work first.
		trace!(file = %file, target = %target, "scheduler.index.no_op");
		entry.finish(TaskOutcome::Completed);
		scheduler.retire(&entry.key, &entry);
		return;
	}

	debug!(file = %file, target = %target, "scheduler.index.start");
	let result = scheduler.host.index(file.clone(), target.clone(), entry.cancel.clone()).await;
	let outcome = outcome_from_result(&entry, result);
	debug!(file = %file, target = %target, outcome = %outcome_label(&outcome), "scheduler.index.finish");
	entry.finish(outcome);
	scheduler.retire(&entry.key, &entry);
}

fn outcome_from_result(entry: &TaskEntry, result: Result<(), TaskError>) -> TaskOutcome {
	if entry.cancel.is_cancelled() {
		return TaskOutcome::Cancelled;
	}
	match result {
		Ok(()) => TaskOutcome::Completed,
		Err(err) => TaskOutcome::Failed(Arc::new(err)),
	}
}

fn outcome_label(outcome: &TaskOutcome) -> &'static str {
	match outcome {
		TaskOutcome::Completed => "completed",
		TaskOutcome::Failed(_) => "failed",
		TaskOutcome::Cancelled => "cancelled",
	}
}
