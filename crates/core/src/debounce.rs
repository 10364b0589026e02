//! Dependency-update debouncer (§4.4), modeled directly on the teacher's
//! single-pending-set accumulator for document sync: a workspace-global
//! accumulator tracks the last submission time and a background tick
//! drains it once a quiet period has elapsed, union-merging any
//! submissions that arrive in between (P8).

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::ids::FileId;

struct DebounceState {
	pending: HashSet<FileId>,
	last_submission: Option<Instant>,
}

pub struct DependencyDebouncer {
	state: Mutex<DebounceState>,
	window: Duration,
}

impl DependencyDebouncer {
	pub fn new(window: Duration) -> Self {
		Self { state: Mutex::new(DebounceState { pending: HashSet::new(), last_submission: None }), window }
	}

	/// Accumulates `files` into the pending set and resets the quiet-period
	/// clock.
	pub fn submit(&self, files: impl IntoIterator<Item = FileId>) {
		let mut state = self.state.lock();
		state.pending.extend(files);
		state.last_submission = Some(Instant::now());
	}

	/// Called from a periodic tick. Returns the unioned pending set and
	/// clears it if the quiet period has elapsed since the last
	/// submission; otherwise returns `None` without touching the set.
	pub fn flush_due(&self) -> Option<HashSet<FileId>> {
		let mut state = self.state.lock();
		let last = state.last_submission?;
		if last.elapsed() < self.window {
			return None;
		}
		state.last_submission = None;
		Some(std::mem::take(&mut state.pending))
	}

	pub fn has_pending(&self) -> bool {
		self.state.lock().last_submission.is_some()
	}
}
