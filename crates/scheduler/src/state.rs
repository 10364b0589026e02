use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, watch};
use tokio_util::sync::CancellationToken;

use crate::host::SchedulerHost;
use crate::types::{Priority, TaskKey, TaskOutcome, TaskState};

/// Scheduler-wide tuning, mirroring §6's `prep_slots` / `index_slots`.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
	pub prep_slots: usize,
	pub index_slots: usize,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			prep_slots: 1,
			index_slots: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).saturating_sub(1).max(1),
		}
	}
}

pub(crate) struct TaskEntry {
	pub key: TaskKey,
	pub state: Mutex<TaskState>,
	pub priority: Mutex<Priority>,
	pub sequence: u64,
	pub outcome_tx: watch::Sender<Option<TaskOutcome>>,
	pub cancel: CancellationToken,
	pub subscribers: AtomicUsize,
}

impl TaskEntry {
	fn new(key: TaskKey, priority: Priority, sequence: u64) -> Arc<Self> {
		let (outcome_tx, _rx) = watch::channel(None);
		Arc::new(Self {
			key,
			state: Mutex::new(TaskState::Queued),
			priority: Mutex::new(priority),
			sequence,
			outcome_tx,
			cancel: CancellationToken::new(),
			subscribers: AtomicUsize::new(0),
		})
	}

	/// Raises the live priority, never lowers it (P7). Returns whether the
	/// priority was actually raised.
	pub fn promote(&self, priority: Priority) -> bool {
		let mut current = self.priority.lock();
		if priority > *current {
			*current = priority;
			true
		} else {
			false
		}
	}

	pub fn live_priority(&self) -> Priority {
		*self.priority.lock()
	}

	pub fn finish(&self, outcome: TaskOutcome) {
		let mut state = self.state.lock();
		*state = match &outcome {
			TaskOutcome::Completed => TaskState::Completed,
			TaskOutcome::Failed(_) => TaskState::Failed,
			TaskOutcome::Cancelled => TaskState::Cancelled,
		};
		drop(state);
		let _ = self.outcome_tx.send(Some(outcome));
	}
}

/// A heap entry for the single-slot preparation pool.
///
/// Ordered dependency-first (rule 7 of §4.3): lower topological rank pops
/// first, ties broken by priority, then by earliest submission. The heap
/// may contain several stale entries for the same key after a priority
/// promotion pushes a fresh one — that's fine, see `pop_queued` below.
struct PrepareHeapItem {
	topo_rank: u32,
	priority: Priority,
	sequence: u64,
	entry: Arc<TaskEntry>,
}

impl PartialEq for PrepareHeapItem {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}
impl Eq for PrepareHeapItem {}
impl PartialOrd for PrepareHeapItem {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for PrepareHeapItem {
	fn cmp(&self, other: &Self) -> Ordering {
		// BinaryHeap is a max-heap; we want the lowest topo_rank on top.
		other
			.topo_rank
			.cmp(&self.topo_rank)
			.then_with(|| self.priority.cmp(&other.priority))
			.then_with(|| other.sequence.cmp(&self.sequence))
	}
}

/// A heap entry for the multi-slot indexing pool: priority first, then
/// earliest submission (rule 2 / rule 3 of §4.3; no topological concept
/// between files).
struct IndexHeapItem {
	priority: Priority,
	sequence: u64,
	entry: Arc<TaskEntry>,
}

impl PartialEq for IndexHeapItem {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}
impl Eq for IndexHeapItem {}
impl PartialOrd for IndexHeapItem {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for IndexHeapItem {
	fn cmp(&self, other: &Self) -> Ordering {
		self.priority.cmp(&other.priority).then_with(|| other.sequence.cmp(&self.sequence))
	}
}

pub(crate) struct Inner {
	pub entries: Mutex<HashMap<TaskKey, Arc<TaskEntry>>>,
	prep_queue: Mutex<BinaryHeap<PrepareHeapItem>>,
	index_queue: Mutex<BinaryHeap<IndexHeapItem>>,
	pub prep_notify: Notify,
	pub index_notify: Notify,
	sequence: AtomicU64,
	pub prep_semaphore: Arc<Semaphore>,
	pub index_semaphore: Arc<Semaphore>,
}

impl Inner {
	pub fn new(config: SchedulerConfig) -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			prep_queue: Mutex::new(BinaryHeap::new()),
			index_queue: Mutex::new(BinaryHeap::new()),
			prep_notify: Notify::new(),
			index_notify: Notify::new(),
			sequence: AtomicU64::new(0),
			prep_semaphore: Arc::new(Semaphore::new(config.prep_slots.max(1))),
			index_semaphore: Arc::new(Semaphore::new(config.index_slots.max(1))),
		}
	}

	pub fn next_sequence(&self) -> u64 {
		self.sequence.fetch_add(1, AtomicOrdering::Relaxed)
	}

	pub fn make_entry(&self, key: TaskKey, priority: Priority, sequence: u64) -> Arc<TaskEntry> {
		TaskEntry::new(key, priority, sequence)
	}

	pub fn push_prepare(&self, entry: Arc<TaskEntry>, topo_rank: u32) {
		let priority = entry.live_priority();
		let sequence = entry.sequence;
		self.prep_queue.lock().push(PrepareHeapItem { topo_rank, priority, sequence, entry });
		self.prep_notify.notify_one();
	}

	pub fn push_index(&self, entry: Arc<TaskEntry>) {
		let priority = entry.live_priority();
		let sequence = entry.sequence;
		self.index_queue.lock().push(IndexHeapItem { priority, sequence, entry });
		self.index_notify.notify_one();
	}

	/// Pops the next entry still in `Queued` state, transitioning it to
	/// `Running` atomically. Discards stale duplicate heap entries left
	/// behind by priority promotion or cancellation.
	pub fn pop_prepare_queued(&self) -> Option<Arc<TaskEntry>> {
		let mut queue = self.prep_queue.lock();
		while let Some(item) = queue.pop() {
			let mut state = item.entry.state.lock();
			if *state == TaskState::Queued {
				*state = TaskState::Running;
				drop(state);
				return Some(item.entry);
			}
		}
		None
	}

	pub fn pop_index_queued(&self) -> Option<Arc<TaskEntry>> {
		let mut queue = self.index_queue.lock();
		while let Some(item) = queue.pop() {
			let mut state = item.entry.state.lock();
			if *state == TaskState::Queued {
				*state = TaskState::Running;
				drop(state);
				return Some(item.entry);
			}
		}
		None
	}

	pub fn queued_or_running_count(&self) -> usize {
		self.entries
			.lock()
			.values()
			.filter(|e| matches!(*e.state.lock(), TaskState::Queued | TaskState::Running))
			.count()
	}
}

/// Generic, host-driven priority task scheduler implementing §4.3 in full:
/// two independent slot pools, priority ordering with monotone promotion,
/// key-based coalescing, and cooperative cancellation.
pub struct Scheduler<H: SchedulerHost> {
	pub(crate) host: Arc<H>,
	pub(crate) inner: Arc<Inner>,
}

impl<H: SchedulerHost> Clone for Scheduler<H> {
	fn clone(&self) -> Self {
		Self { host: self.host.clone(), inner: self.inner.clone() }
	}
}

impl<H: SchedulerHost> Scheduler<H> {
	pub fn new(host: Arc<H>, config: SchedulerConfig) -> Self {
		let scheduler = Self { host, inner: Arc::new(Inner::new(config)) };
		scheduler.spawn_dispatchers();
		scheduler
	}

	/// Whether any task is queued or running (`is_indexing()` in §6).
	pub fn has_pending_work(&self) -> bool {
		self.inner.queued_or_running_count() > 0
	}

	pub fn pending_count(&self) -> usize {
		self.inner.queued_or_running_count()
	}
}
