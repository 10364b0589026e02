use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::types::{FileId, TargetId, TaskError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Work the scheduler drives but does not itself know how to perform.
///
/// The scheduler is a generic priority/slot/coalescing engine (§4.3); it
/// has no notion of build systems or index stores. A `SchedulerHost`
/// supplies the actual preparation and indexing work, plus the two
/// up-to-date checks the scheduler needs to implement rule 5 (dependent-
/// first no-op) and rule 6 (prepare-before-index chaining) without
/// reaching into the tracker itself.
pub trait SchedulerHost: Send + Sync + 'static {
	/// Drives target preparation. Must observe `cancel` at cooperative
	/// points and return promptly once it is signalled.
	fn prepare(&self, target: TargetId, cancel: CancellationToken) -> BoxFuture<'_, Result<(), TaskError>>;

	/// Drives an index-store update for one file in one target.
	fn index(&self, file: FileId, target: TargetId, cancel: CancellationToken) -> BoxFuture<'_, Result<(), TaskError>>;

	/// True if `target` is already known to be prepared (tracker fast path).
	/// Consulted by the scheduler before chaining a `prepare` prerequisite
	/// and again by the index task body itself (rule 5).
	fn is_prepared(&self, target: &TargetId) -> bool;

	/// True if `file` is already indexed in `target` (tracker fast path).
	fn is_indexed(&self, file: &FileId, target: &TargetId) -> bool;

	/// Stable rank such that dependencies precede dependents (§4.1
	/// `topological_order`). Lower ranks run first within the prepare pool.
	fn topological_rank(&self, target: &TargetId) -> u32;
}
