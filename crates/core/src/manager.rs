//! Semantic index manager (C4): orchestrates the adapter, tracker, and
//! scheduler to service "make this file indexable / make this target
//! importable" requests, and folds in the synchronizer (C6) as
//! `wait_for_quiescence`.
//!
//! Per §9's "workspace context" design note, there is no module-level
//! static anywhere in this crate: a `SemanticIndexManager` is constructed
//! once and threaded explicitly to every caller, usually behind an `Arc`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use semantic_index_scheduler::{Priority, Scheduler, SchedulerConfig, TaskOutcome};
use tracing::{debug, info};

use crate::adapter::{BuildSystemAdapter, CompileDriver, FileChangeEvent, FileChangeKind, TargetDescriptor};
use crate::config::IndexingConfig;
use crate::debounce::DependencyDebouncer;
use crate::error::{AdapterError, ManagerError};
use crate::host::ManagerHost;
use crate::ids::{FileId, TargetId};
use crate::index_store::IndexStoreReader;
use crate::tracker::UpToDateTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparationOutcome {
	AlreadyUpToDate,
	Prepared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
	AlreadyUpToDate,
	Indexed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuiescenceOptions {
	pub include_build_graph_updates: bool,
	pub wait_for_index: bool,
}

/// Notifications emitted upward to whatever owns the LSP surface (§6). The
/// manager never touches JSON-RPC framing itself; it just calls this trait.
pub trait IndexNotificationSink: Send + Sync + 'static {
	fn dependencies_updated(&self, files: HashSet<FileId>);
	fn file_build_settings_changed(&self, files: Vec<FileId>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
	Source,
	Header,
	Artifact,
}

fn classify_file(file: &FileId) -> FileKind {
	match file.as_path().extension().and_then(|ext| ext.to_str()) {
		Some("h" | "hpp" | "hh" | "h++" | "hxx") => FileKind::Header,
		Some("o" | "obj" | "a" | "so" | "dylib" | "dll" | "swiftmodule" | "pcm") => FileKind::Artifact,
		_ => FileKind::Source,
	}
}

#[derive(Default)]
struct WorkspaceSnapshot {
	targets: Vec<TargetDescriptor>,
	file_targets: FxHashMap<FileId, Vec<TargetId>>,
}

pub struct SemanticIndexManager {
	adapter: Arc<dyn BuildSystemAdapter>,
	tracker: Arc<UpToDateTracker>,
	index_store: Arc<dyn IndexStoreReader>,
	notifications: Arc<dyn IndexNotificationSink>,
	scheduler: Scheduler<ManagerHost>,
	debouncer: Arc<DependencyDebouncer>,
	topological_rank: Arc<RwLock<FxHashMap<TargetId, u32>>>,
	target_sources: Arc<RwLock<FxHashMap<TargetId, Vec<FileId>>>>,
	snapshot: RwLock<WorkspaceSnapshot>,
	watched: parking_lot::Mutex<HashSet<FileId>>,
	config: IndexingConfig,
}

impl SemanticIndexManager {
	/// Constructs the manager and spawns its background debounce-flush
	/// task. The flush task holds only a `Weak` handle back to the
	/// manager (§9 "to avoid cycles, subscribers hold weak handles") so
	/// that dropping every `Arc<SemanticIndexManager>` lets it exit.
	pub async fn spawn(
		adapter: Arc<dyn BuildSystemAdapter>,
		index_store: Arc<dyn IndexStoreReader>,
		compile_driver: Arc<dyn CompileDriver>,
		notifications: Arc<dyn IndexNotificationSink>,
		config: IndexingConfig,
	) -> Result<Arc<Self>, ManagerError> {
		let tracker = Arc::new(UpToDateTracker::new());
		let debouncer = Arc::new(DependencyDebouncer::new(Duration::from_millis(config.dependencies_update_debounce_ms)));
		let topological_rank = Arc::new(RwLock::new(FxHashMap::default()));
		let target_sources = Arc::new(RwLock::new(FxHashMap::default()));

		let host = Arc::new(ManagerHost {
			adapter: adapter.clone(),
			compile_driver,
			tracker: tracker.clone(),
			debouncer: debouncer.clone(),
			topological_rank: topological_rank.clone(),
			target_sources: target_sources.clone(),
		});
		let scheduler =
			Scheduler::new(host, SchedulerConfig { prep_slots: config.prep_slots, index_slots: config.index_slots });

		let manager = Arc::new(Self {
			adapter,
			tracker,
			index_store,
			notifications,
			scheduler,
			debouncer,
			topological_rank,
			target_sources,
			snapshot: RwLock::new(WorkspaceSnapshot::default()),
			watched: parking_lot::Mutex::new(HashSet::new()),
			config,
		});
		manager.refresh_workspace_snapshot().await?;
		manager.spawn_debounce_flush_loop();
		manager.spawn_graph_change_listener();
		Ok(manager)
	}

	fn spawn_debounce_flush_loop(self: &Arc<Self>) {
		let weak = Arc::downgrade(self);
		tokio::spawn(async move {
			let mut tick = tokio::time::interval(Duration::from_millis(50));
			loop {
				tick.tick().await;
				let Some(manager) = weak.upgrade() else { return };
				if let Some(files) = manager.debouncer.flush_due() {
					debug!(count = files.len(), "manager.dependencies_updated");
					manager.notifications.dependencies_updated(files);
				}
			}
		});
	}

	/// §4.1: "on a build-graph change event the adapter re-queries targets
	/// and sources; the semantic index manager observes this and clears
	/// preparation flags for affected targets." Holds only a `Weak` handle,
	/// same reasoning as `spawn_debounce_flush_loop`.
	fn spawn_graph_change_listener(self: &Arc<Self>) {
		let weak = Arc::downgrade(self);
		let mut changes = self.adapter.subscribe_graph_changes();
		tokio::spawn(async move {
			loop {
				match changes.recv().await {
					Ok(()) => {}
					Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
					Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
				}
				let Some(manager) = weak.upgrade() else { return };
				if let Err(err) = manager.reload_build_graph().await {
					debug!(error = %err, "manager.graph_change_reload.failed");
					continue;
				}
				// A graph-change event (e.g. the scenario 6 "build server was
				// unresponsive, now it answered" case) may mean compile
				// settings for files already indexed have changed, without
				// any target actually entering or leaving the workspace —
				// `reload_build_graph` alone would then invalidate nothing.
				// Conservatively re-index: the next `ensure_indexed` for any
				// file picks up whatever `compile_invocation` now returns.
				manager.trigger_reindex();
			}
		});
	}

	async fn refresh_workspace_snapshot(&self) -> Result<(), ManagerError> {
		let targets = self.adapter.workspace_targets().await.map_err(ManagerError::Adapter)?;
		let ids: Vec<TargetId> = targets.iter().map(|t| t.id.clone()).collect();
		let ordered = self.adapter.topological_order(&ids);
		let rank = ordered.iter().enumerate().map(|(i, t)| (t.clone(), i as u32)).collect();
		*self.topological_rank.write() = rank;

		let mut file_targets: FxHashMap<FileId, Vec<TargetId>> = FxHashMap::default();
		let mut target_sources = FxHashMap::default();
		for target in &targets {
			let sources = self.adapter.sources(&target.id).await.map_err(ManagerError::Adapter)?;
			for file in &sources {
				file_targets.entry(file.clone()).or_default().push(target.id.clone());
			}
			target_sources.insert(target.id.clone(), sources);
		}
		*self.target_sources.write() = target_sources;
		*self.snapshot.write() = WorkspaceSnapshot { targets, file_targets };
		Ok(())
	}

	/// §3: "a file may belong to several targets, in which case a
	/// canonical target is chosen deterministically" — the minimum element
	/// of its owning targets under `topological_order`.
	fn canonical_target(&self, file: &FileId) -> Option<TargetId> {
		let candidates = self.snapshot.read().file_targets.get(file).cloned()?;
		if candidates.is_empty() {
			return None;
		}
		self.adapter.topological_order(&candidates).into_iter().next()
	}

	pub async fn ensure_prepared(&self, target: TargetId, priority: Priority) -> Result<PreparationOutcome, ManagerError> {
		if self.tracker.is_prepared(&target) {
			return Ok(PreparationOutcome::AlreadyUpToDate);
		}
		let mut sub = self.scheduler.submit_prepare(target, priority);
		match sub.outcome().await {
			TaskOutcome::Completed => Ok(PreparationOutcome::Prepared),
			TaskOutcome::Cancelled => Err(ManagerError::Cancelled),
			TaskOutcome::Failed(err) => Err(ManagerError::from(err.as_ref())),
		}
	}

	pub async fn ensure_indexed(&self, file: FileId, priority: Priority) -> Result<IndexOutcome, ManagerError> {
		let target = self.canonical_target(&file).ok_or_else(|| {
			ManagerError::Adapter(AdapterError::SettingsUnavailable { file: file.clone(), target: TargetId::new("<unowned>") })
		})?;

		// Fast path (P4, R3): a hit returns synchronously with no scheduler activity.
		if self.tracker.is_indexed(&file, &target) {
			return Ok(IndexOutcome::AlreadyUpToDate);
		}

		// Filesystem freshness check (§4.4): avoids re-indexing after a close/reopen
		// when a unit file already exists and postdates the source.
		if let Some(outcome) = self.check_filesystem_freshness(&file, &target).await {
			return Ok(outcome);
		}

		let mut sub = self.scheduler.submit_index(file, target, priority);
		match sub.outcome().await {
			TaskOutcome::Completed => Ok(IndexOutcome::Indexed),
			TaskOutcome::Cancelled => Err(ManagerError::Cancelled),
			TaskOutcome::Failed(err) => Err(ManagerError::from(err.as_ref())),
		}
	}

	async fn check_filesystem_freshness(&self, file: &FileId, target: &TargetId) -> Option<IndexOutcome> {
		let unit_mtime = self.index_store.unit_file_mtime(file, target)?;
		let source_mtime = tokio::fs::metadata(file.as_path()).await.ok()?.modified().ok()?;
		if unit_mtime > source_mtime {
			self.tracker.mark_indexed(file.clone(), target.clone());
			Some(IndexOutcome::AlreadyUpToDate)
		} else {
			None
		}
	}

	/// Fire-and-forget background re-index, used by the re-indexing policy
	/// below where the router's caller is not itself waiting on the result.
	fn ensure_indexed_background(self: &Arc<Self>, file: FileId) {
		let manager = self.clone();
		tokio::spawn(async move {
			if let Err(err) = manager.ensure_indexed(file.clone(), Priority::Background).await {
				debug!(file = %file, error = %err, "manager.background_reindex.failed");
			}
		});
	}

	pub fn register_watched(&self, file: FileId) {
		self.watched.lock().insert(file);
	}

	pub fn unregister_watched(&self, file: &FileId) {
		self.watched.lock().remove(file);
	}

	pub fn is_indexing(&self) -> bool {
		self.scheduler.has_pending_work()
	}

	/// Invalidates every index flag while leaving preparation flags
	/// intact (R2); subsequent `ensure_indexed` calls redo the work.
	pub fn trigger_reindex(&self) {
		self.tracker.invalidate_all_indexed();
	}

	/// C6: resolves once all currently known work has settled. The raw
	/// index database's own ingestion of emitted unit files lives outside
	/// this core (§1) — `wait_for_index` here only covers the scheduler's
	/// queued/running tasks, which is the part this core can observe.
	pub async fn wait_for_quiescence(&self, opts: QuiescenceOptions) {
		// Reloads are applied synchronously inside `route`/the graph-change
		// listener, so there is never an outstanding reload left to wait for
		// by the time this is called.
		let _ = opts.include_build_graph_updates;
		if !opts.wait_for_index {
			return;
		}
		// Fire-and-forget background submissions (e.g. from `ensure_indexed_background`)
		// are `tokio::spawn`ed by a caller that may not itself suspend before returning,
		// so give them a chance to reach their first submission point before the first
		// `has_pending_work` read below.
		for _ in 0..4 {
			tokio::task::yield_now().await;
		}
		while self.scheduler.has_pending_work() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	}

	/// Rule 1 of §4.5, invoked by the router when a manifest-affecting
	/// event is observed: re-query targets/sources, invalidate preparation
	/// for every target whose declared dependency edges changed (added,
	/// removed, or newly/no-longer present) **and** everything that
	/// transitively depends on one of those targets (Invariant 3), then
	/// notify consumers.
	pub(crate) async fn reload_build_graph(&self) -> Result<(), ManagerError> {
		let previous: FxHashMap<TargetId, HashSet<TargetId>> = self
			.snapshot
			.read()
			.targets
			.iter()
			.map(|t| (t.id.clone(), t.dependencies.iter().cloned().collect()))
			.collect();
		self.refresh_workspace_snapshot().await?;
		let current: FxHashMap<TargetId, HashSet<TargetId>> = self
			.snapshot
			.read()
			.targets
			.iter()
			.map(|t| (t.id.clone(), t.dependencies.iter().cloned().collect()))
			.collect();

		let mut changed: HashSet<TargetId> = HashSet::new();
		for (id, deps) in &current {
			if previous.get(id) != Some(deps) {
				changed.insert(id.clone());
			}
		}
		for id in previous.keys() {
			if !current.contains_key(id) {
				changed.insert(id.clone());
			}
		}

		if changed.is_empty() {
			return Ok(());
		}

		let mut to_invalidate = changed.clone();
		for target in &changed {
			to_invalidate.extend(self.adapter.dependents(target));
		}
		info!(count = to_invalidate.len(), "manager.build_graph_reloaded");
		self.tracker.invalidate_prepared(to_invalidate.iter());

		let affected_files: Vec<FileId> = {
			let snapshot = self.snapshot.read();
			to_invalidate
				.iter()
				.flat_map(|t| snapshot.file_targets.iter().filter(move |(_, ts)| ts.contains(t)).map(|(f, _)| f.clone()))
				.collect()
		};
		self.notifications.file_build_settings_changed(affected_files);
		Ok(())
	}

	/// C4's `on_files_changed` entry point (rules 2 and 3 of §4.5, plus the
	/// per-file-kind re-indexing policy of §4.4). Called by the router
	/// after any manifest-triggered reload for the same batch has already
	/// been applied (ordering guarantee (d) of §5).
	pub(crate) async fn on_files_changed(self: &Arc<Self>, events: &[FileChangeEvent]) -> Result<(), ManagerError> {
		let mut targets_to_invalidate: HashSet<TargetId> = HashSet::new();
		let mut debounced_files: Vec<FileId> = Vec::new();

		for event in events {
			if event.kind == FileChangeKind::Deleted {
				self.tracker.invalidate_indexed(std::iter::once(&event.file));
				continue;
			}

			match classify_file(&event.file) {
				FileKind::Source => {
					// Invariant 4: modifying F invalidates index_up_to_date[F, ·] and
					// preparation_up_to_date[T'] for every T' depending on F's target,
					// but not T's own preparation flag.
					self.tracker.invalidate_indexed(std::iter::once(&event.file));
					if let Some(owning_targets) = self.snapshot.read().file_targets.get(&event.file).cloned() {
						for owner in &owning_targets {
							targets_to_invalidate.extend(self.adapter.dependents(owner));
						}
					}
					self.ensure_indexed_background(event.file.clone());
				}
				FileKind::Header => {
					if let Some(main_file) = self.index_store.main_file_including(&event.file) {
						self.ensure_indexed_background(main_file);
					} else {
						debug!(file = %event.file, "manager.header_changed.no_known_includer");
					}
				}
				FileKind::Artifact => {
					// Rule 3 of §4.5: the core doesn't know which downstream
					// files depend on this module, so conservatively mark
					// every file currently in scope as having updated
					// dependencies rather than just the artifact itself.
					debounced_files.extend(self.snapshot.read().file_targets.keys().cloned());
				}
			}
		}

		if !targets_to_invalidate.is_empty() {
			self.tracker.invalidate_prepared(targets_to_invalidate.iter());
		}
		if !debounced_files.is_empty() {
			self.debouncer.submit(debounced_files);
		}
		Ok(())
	}

}
