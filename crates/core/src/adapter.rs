//! Build-system adapter (C1): a uniform, read-only view over targets,
//! sources, compiler arguments, dependency order, and target preparation.
//! Concrete build systems (package-manager-native, compilation-database,
//! external build server over JSON-RPC) are consumed only through this
//! trait, never a concrete struct — the scheduler and tracker downstream
//! must not know which variant is behind it.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
use crate::ids::{FileId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileInvocationKind {
	/// Real settings obtained from the build system.
	Real,
	/// Synthesized best-effort settings used when real settings are not
	/// yet available (§4.1 fallback semantics).
	Fallback,
}

#[derive(Debug, Clone)]
pub struct CompileInvocation {
	pub arguments: Vec<String>,
	pub working_directory: PathBuf,
	pub kind: CompileInvocationKind,
}

#[derive(Debug, Clone)]
pub struct TargetDescriptor {
	pub id: TargetId,
	pub dependencies: Vec<TargetId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
	Created,
	Modified,
	Deleted,
}

#[derive(Debug, Clone)]
pub struct FileChangeEvent {
	pub file: FileId,
	pub kind: FileChangeKind,
}

/// Per-target preparation outcome, as reported by `prepare` (§4.1: "must
/// not stop on a single-target failure; partial success is reported per
/// target").
pub type PrepareReport = HashMap<TargetId, bool>;

#[async_trait]
pub trait BuildSystemAdapter: Send + Sync + 'static {
	/// Ordered targets with their declared dependencies.
	async fn workspace_targets(&self) -> Result<Vec<TargetDescriptor>, AdapterError>;

	/// Source files belonging to `target`.
	async fn sources(&self, target: &TargetId) -> Result<Vec<FileId>, AdapterError>;

	/// Argument vector and working directory to compile `file` in `target`.
	/// Never fails outright: on build-server unresponsiveness this returns
	/// a `CompileInvocationKind::Fallback` invocation instead.
	async fn compile_invocation(&self, file: &FileId, target: &TargetId) -> CompileInvocation;

	/// Stable sort of `targets` such that dependencies precede dependents.
	fn topological_order(&self, targets: &[TargetId]) -> Vec<TargetId>;

	/// Every target reachable from `target` in the reverse dependency graph.
	fn dependents(&self, target: &TargetId) -> Vec<TargetId>;

	/// Drives the external build system to produce importable module
	/// artifacts for every target in `targets`. Must not abort on a single
	/// failing target; the returned map reports success per target.
	async fn prepare(&self, targets: &[TargetId], cancel: CancellationToken) -> PrepareReport;

	/// Whether an observed change to `file` should trigger re-discovery of
	/// targets/sources (e.g. a package manifest).
	fn file_affects_build_settings(&self, file: &FileId) -> bool;

	/// Subscribes to asynchronous build-graph change notifications.
	fn subscribe_graph_changes(&self) -> tokio::sync::broadcast::Receiver<()>;
}

/// The per-language compiler driver and syntactic service (§1: "treated as
/// opaque 'prepare-and-compile' providers"). This is the single seam
/// through which an `index(F, T)` task drives that external collaborator
/// to produce an index-store unit file; the core never parses source or
/// invokes a compiler directly.
#[async_trait]
pub trait CompileDriver: Send + Sync + 'static {
	async fn compile_for_index(
		&self,
		invocation: &CompileInvocation,
		file: &FileId,
		target: &TargetId,
		cancel: CancellationToken,
	) -> Result<(), AdapterError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
	//! An in-memory `BuildSystemAdapter` double for exercising the manager
	//! and router without a real build system, analogous to the fixture
	//! document stores used elsewhere in the workspace's test suites.

	use std::collections::HashSet;
	use std::time::Duration;

	use parking_lot::Mutex;
	use tokio::sync::broadcast;

	use super::*;

	#[derive(Default)]
	struct FixtureState {
		targets: Vec<TargetDescriptor>,
		sources: HashMap<TargetId, Vec<FileId>>,
		fail_prepare: HashSet<TargetId>,
		manifest_files: HashSet<FileId>,
		prepare_delay: Option<Duration>,
		unresponsive: HashSet<FileId>,
	}

	/// Configurable in-memory build-system adapter for tests.
	pub struct FixtureAdapter {
		state: Mutex<FixtureState>,
		graph_changes: broadcast::Sender<()>,
	}

	impl Default for FixtureAdapter {
		fn default() -> Self {
			let (graph_changes, _rx) = broadcast::channel(16);
			Self { state: Mutex::new(FixtureState::default()), graph_changes }
		}
	}

	impl FixtureAdapter {
		pub fn new() -> Self {
			Self::default()
		}

		pub fn add_target(&self, target: TargetId, dependencies: Vec<TargetId>, sources: Vec<FileId>) {
			let mut state = self.state.lock();
			state.targets.push(TargetDescriptor { id: target.clone(), dependencies });
			state.sources.insert(target, sources);
		}

		pub fn mark_manifest(&self, file: FileId) {
			self.state.lock().manifest_files.insert(file);
		}

		pub fn fail_prepare_for(&self, target: TargetId) {
			self.state.lock().fail_prepare.insert(target);
		}

		pub fn notify_graph_changed(&self) {
			let _ = self.graph_changes.send(());
		}

		/// Marks `file` as served by an unresponsive build server: until
		/// [`FixtureAdapter::resolve`] is called, `compile_invocation` returns a
		/// synthesized `Fallback` invocation for it instead of blocking.
		pub fn set_unresponsive(&self, file: FileId) {
			self.state.lock().unresponsive.insert(file);
		}

		/// Simulates the build server's delayed response finally arriving.
		pub fn resolve(&self, file: &FileId) {
			self.state.lock().unresponsive.remove(file);
			let _ = self.graph_changes.send(());
		}
	}

	#[async_trait]
	impl BuildSystemAdapter for FixtureAdapter {
		async fn workspace_targets(&self) -> Result<Vec<TargetDescriptor>, AdapterError> {
			Ok(self.state.lock().targets.clone())
		}

		async fn sources(&self, target: &TargetId) -> Result<Vec<FileId>, AdapterError> {
			Ok(self.state.lock().sources.get(target).cloned().unwrap_or_default())
		}

		async fn compile_invocation(&self, file: &FileId, _target: &TargetId) -> CompileInvocation {
			let fallback = self.state.lock().unresponsive.contains(file);
			if fallback {
				return CompileInvocation {
					arguments: vec!["-fsyntax-only".to_string()],
					working_directory: PathBuf::from("."),
					kind: CompileInvocationKind::Fallback,
				};
			}
			CompileInvocation {
				arguments: vec![file.as_path().display().to_string()],
				working_directory: PathBuf::from("."),
				kind: CompileInvocationKind::Real,
			}
		}

		fn topological_order(&self, targets: &[TargetId]) -> Vec<TargetId> {
			let state = self.state.lock();
			let mut ranked: Vec<_> = targets
				.iter()
				.map(|t| {
					let rank = state.targets.iter().position(|d| &d.id == t).unwrap_or(usize::MAX);
					(rank, t.clone())
				})
				.collect();
			ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));
			ranked.into_iter().map(|(_, t)| t).collect()
		}

		fn dependents(&self, target: &TargetId) -> Vec<TargetId> {
			let state = self.state.lock();
			let mut seen = HashSet::new();
			let mut frontier = vec![target.clone()];
			while let Some(current) = frontier.pop() {
				for descriptor in &state.targets {
					if descriptor.dependencies.contains(&current) && seen.insert(descriptor.id.clone()) {
						frontier.push(descriptor.id.clone());
					}
				}
			}
			seen.into_iter().collect()
		}

		async fn prepare(&self, targets: &[TargetId], cancel: CancellationToken) -> PrepareReport {
			let delay = self.state.lock().prepare_delay;
			if let Some(delay) = delay {
				tokio::select! {
					_ = cancel.cancelled() => {}
					_ = tokio::time::sleep(delay) => {}
				}
			}
			let state = self.state.lock();
			targets.iter().map(|t| (t.clone(), !state.fail_prepare.contains(t))).collect()
		}

		fn file_affects_build_settings(&self, file: &FileId) -> bool {
			self.state.lock().manifest_files.contains(file)
		}

		fn subscribe_graph_changes(&self) -> broadcast::Receiver<()> {
			self.graph_changes.subscribe()
		}
	}

	/// A `CompileDriver` double that always succeeds unless the target has
	/// been added to its fail set, optionally after a configured delay.
	#[derive(Default)]
	pub struct FixtureCompileDriver {
		fail_for: Mutex<HashSet<TargetId>>,
		delay: Mutex<Option<Duration>>,
		last_kind: Mutex<HashMap<FileId, CompileInvocationKind>>,
	}

	impl FixtureCompileDriver {
		pub fn new() -> Self {
			Self::default()
		}

		pub fn fail_for(&self, target: TargetId) {
			self.fail_for.lock().insert(target);
		}

		pub fn set_delay(&self, delay: Duration) {
			*self.delay.lock() = Some(delay);
		}

		/// The `CompileInvocationKind` of the most recent invocation seen for
		/// `file`, if any.
		pub fn last_kind(&self, file: &FileId) -> Option<CompileInvocationKind> {
			self.last_kind.lock().get(file).copied()
		}
	}

	#[async_trait]
	impl CompileDriver for FixtureCompileDriver {
		async fn compile_for_index(
			&self,
			invocation: &CompileInvocation,
			file: &FileId,
			target: &TargetId,
			cancel: CancellationToken,
		) -> Result<(), AdapterError> {
			self.last_kind.lock().insert(file.clone(), invocation.kind);
			let delay = *self.delay.lock();
			if let Some(delay) = delay {
				tokio::select! {
					_ = cancel.cancelled() => {}
					_ = tokio::time::sleep(delay) => {}
				}
			}
			if self.fail_for.lock().contains(target) {
				return Err(AdapterError::GraphReloadFailed { reason: format!("fixture compile failure for {target}") });
			}
			Ok(())
		}
	}
}
