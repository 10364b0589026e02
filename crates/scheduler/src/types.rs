use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Opaque, stable identifier for a build-system target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(pub Arc<str>);

impl TargetId {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TargetId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Canonical, symlink-resolved path to a source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub Arc<PathBuf>);

impl FileId {
	pub fn new(path: PathBuf) -> Self {
		Self(Arc::new(path))
	}

	pub fn as_path(&self) -> &std::path::Path {
		&self.0
	}
}

impl fmt::Display for FileId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.display())
	}
}

/// Dispatch key a task is deduplicated by.
///
/// `Index` tasks carry their canonical target alongside the file because
/// the same file indexed in two different targets is genuinely distinct
/// work (§3: marking a file up to date in one target does not affect
/// another).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
	Prepare(TargetId),
	Index(FileId, TargetId),
}

impl fmt::Display for TaskKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TaskKey::Prepare(t) => write!(f, "prepare({t})"),
			TaskKey::Index(file, t) => write!(f, "index({file}, {t})"),
		}
	}
}

/// Scheduling priority. Three tiers, not strict preemption levels — a
/// running task is never preempted by a higher-priority submission.
///
/// The middle tier exists so a promoted `Background` task can rank above
/// un-promoted background work without being indistinguishable from a
/// fresh `Interactive` request (promotion only ever raises, per rule 7 of
/// §4.3, and an `Interactive` submission should still win any tie against
/// a promoted-but-still-background task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
	Background = 0,
	Promoted = 1,
	Interactive = 2,
}

/// Outcome of a completed, failed, or cancelled task, shared with every
/// subscriber of a coalesced submission.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
	Completed,
	Failed(Arc<TaskError>),
	Cancelled,
}

impl TaskOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, TaskOutcome::Completed)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
	#[error("preparation failed for target {0}")]
	PreparationFailed(TargetId),
	#[error("index update failed for {0} in target {1}")]
	IndexFailed(FileId, TargetId),
	#[error("host callback panicked")]
	HostPanicked,
}

/// Current lifecycle state of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	Queued,
	Running,
	Completed,
	Failed,
	Cancelled,
}
