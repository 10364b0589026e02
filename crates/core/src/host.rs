//! Bridges the generic scheduler to this core's actual collaborators: the
//! build-system adapter, the compile driver, and the up-to-date tracker.
//! Everything the scheduler needs beyond "run this task" is expressed
//! through `SchedulerHost`; this is the only place that implements it.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use semantic_index_scheduler::{BoxFuture, SchedulerHost, TaskError};
use tokio_util::sync::CancellationToken;

use crate::adapter::{BuildSystemAdapter, CompileDriver};
use crate::debounce::DependencyDebouncer;
use crate::ids::{FileId, TargetId};
use crate::tracker::UpToDateTracker;

pub(crate) struct ManagerHost {
	pub adapter: Arc<dyn BuildSystemAdapter>,
	pub compile_driver: Arc<dyn CompileDriver>,
	pub tracker: Arc<UpToDateTracker>,
	pub debouncer: Arc<DependencyDebouncer>,
	pub topological_rank: Arc<RwLock<FxHashMap<TargetId, u32>>>,
	pub target_sources: Arc<RwLock<FxHashMap<TargetId, Vec<FileId>>>>,
}

impl SchedulerHost for ManagerHost {
	fn prepare(&self, target: TargetId, cancel: CancellationToken) -> BoxFuture<'_, Result<(), TaskError>> {
		Box::pin(async move {
			let report = self.adapter.prepare(std::slice::from_ref(&target), cancel).await;
			match report.get(&target) {
				Some(true) => {
					self.tracker.mark_prepared(target.clone());
					self.fan_out_dependents(&target);
					Ok(())
				}
				// §4.3 failure semantics: a failed preparation does not flip the flag;
				// subsequent `index` submissions will re-attempt it.
				_ => Err(TaskError::PreparationFailed(target)),
			}
		})
	}

	fn index(&self, file: FileId, target: TargetId, cancel: CancellationToken) -> BoxFuture<'_, Result<(), TaskError>> {
		Box::pin(async move {
			let invocation = self.adapter.compile_invocation(&file, &target).await;
			match self.compile_driver.compile_for_index(&invocation, &file, &target, cancel).await {
				Ok(()) => {
					self.tracker.mark_indexed(file, target);
					Ok(())
				}
				Err(_) => Err(TaskError::IndexFailed(file, target)),
			}
		})
	}

	fn is_prepared(&self, target: &TargetId) -> bool {
		self.tracker.is_prepared(target)
	}

	fn is_indexed(&self, file: &FileId, target: &TargetId) -> bool {
		self.tracker.is_indexed(file, target)
	}

	fn topological_rank(&self, target: &TargetId) -> u32 {
		self.topological_rank.read().get(target).copied().unwrap_or(u32::MAX)
	}
}

impl ManagerHost {
	/// §4.4 dependency-update fan-out: a target finishing preparation means
	/// every dependent target's source files now see fresher dependency
	/// module artifacts, so they become candidates for the debounced
	/// `dependencies_updated` notification.
	fn fan_out_dependents(&self, target: &TargetId) {
		let dependents = self.adapter.dependents(target);
		if dependents.is_empty() {
			return;
		}
		let sources = self.target_sources.read();
		let affected: Vec<FileId> = dependents.iter().filter_map(|dep| sources.get(dep)).flatten().cloned().collect();
		if !affected.is_empty() {
			self.debouncer.submit(affected);
		}
	}
}
