//! Up-to-date tracker (C2): the fast path. Pure in-memory, guarded by a
//! single `parking_lot::Mutex`, never held across an `.await` point.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ids::{FileId, TargetId};

#[derive(Default)]
struct TrackerState {
	prepared: FxHashSet<TargetId>,
	indexed: FxHashMap<FileId, FxHashSet<TargetId>>,
}

pub struct UpToDateTracker {
	state: Mutex<TrackerState>,
}

impl Default for UpToDateTracker {
	fn default() -> Self {
		Self::new()
	}
}

impl UpToDateTracker {
	pub fn new() -> Self {
		Self { state: Mutex::new(TrackerState::default()) }
	}

	pub fn is_prepared(&self, target: &TargetId) -> bool {
		self.state.lock().prepared.contains(target)
	}

	pub fn mark_prepared(&self, target: TargetId) {
		self.state.lock().prepared.insert(target);
	}

	/// Clears the preparation flag for every target in `targets`.
	pub fn invalidate_prepared<'a>(&self, targets: impl IntoIterator<Item = &'a TargetId>) {
		let mut state = self.state.lock();
		for target in targets {
			state.prepared.remove(target);
		}
	}

	pub fn is_indexed(&self, file: &FileId, target: &TargetId) -> bool {
		self.state.lock().indexed.get(file).is_some_and(|targets| targets.contains(target))
	}

	pub fn mark_indexed(&self, file: FileId, target: TargetId) {
		self.state.lock().indexed.entry(file).or_default().insert(target);
	}

	/// Clears all targets for each file in `files` (§4.2: "clears all T for
	/// each F").
	pub fn invalidate_indexed<'a>(&self, files: impl IntoIterator<Item = &'a FileId>) {
		let mut state = self.state.lock();
		for file in files {
			state.indexed.remove(file);
		}
	}

	/// `trigger_reindex()`: invalidates every index flag while leaving
	/// preparation flags intact (R2).
	pub fn invalidate_all_indexed(&self) {
		self.state.lock().indexed.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn target(name: &str) -> TargetId {
		TargetId::new(name)
	}
	fn file(name: &str) -> FileId {
		FileId::new(std::path::PathBuf::from(name))
	}

	#[test]
	fn mark_then_invalidate_prepared_round_trips() {
		let tracker = UpToDateTracker::new();
		tracker.mark_prepared(target("Lib"));
		assert!(tracker.is_prepared(&target("Lib")));
		tracker.invalidate_prepared([&target("Lib")]);
		assert!(!tracker.is_prepared(&target("Lib")), "R1");
	}

	#[test]
	fn indexed_is_scoped_per_target() {
		let tracker = UpToDateTracker::new();
		tracker.mark_indexed(file("a.swift"), target("Lib"));
		assert!(tracker.is_indexed(&file("a.swift"), &target("Lib")));
		assert!(!tracker.is_indexed(&file("a.swift"), &target("Other")), "invariant 2");
	}

	#[test]
	fn trigger_reindex_preserves_prepared() {
		let tracker = UpToDateTracker::new();
		tracker.mark_prepared(target("Lib"));
		tracker.mark_indexed(file("a.swift"), target("Lib"));
		tracker.invalidate_all_indexed();
		assert!(!tracker.is_indexed(&file("a.swift"), &target("Lib")));
		assert!(tracker.is_prepared(&target("Lib")), "R2");
	}
}
