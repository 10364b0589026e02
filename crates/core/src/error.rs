use std::path::PathBuf;

use crate::ids::{FileId, TargetId};

/// Errors surfaced by the build-system adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
	#[error("build server did not respond within {timeout_ms}ms")]
	Timeout { timeout_ms: u64 },
	#[error("failed to reload build graph: {reason}")]
	GraphReloadFailed { reason: String },
	#[error("no compile settings available for {file} in {target}")]
	SettingsUnavailable { file: FileId, target: TargetId },
	#[error("io error at {path}")]
	Io {
		path: PathBuf,
		#[source]
		error: std::io::Error,
	},
}

/// Errors surfaced by the semantic index manager boundary.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
	#[error("preparation failed for {0}")]
	PreparationFailed(TargetId),
	#[error("index update failed for {0} in {1}")]
	IndexFailed(FileId, TargetId),
	#[error("operation cancelled")]
	Cancelled,
	#[error(transparent)]
	Adapter(#[from] AdapterError),
}

impl From<&semantic_index_scheduler::TaskError> for ManagerError {
	fn from(err: &semantic_index_scheduler::TaskError) -> Self {
		match err {
			semantic_index_scheduler::TaskError::PreparationFailed(target) => ManagerError::PreparationFailed(target.clone()),
			semantic_index_scheduler::TaskError::IndexFailed(file, target) => {
				ManagerError::IndexFailed(file.clone(), target.clone())
			}
			semantic_index_scheduler::TaskError::HostPanicked => {
				ManagerError::Adapter(AdapterError::GraphReloadFailed { reason: "host callback panicked".into() })
			}
		}
	}
}

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
