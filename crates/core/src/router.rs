//! File-change router (C5): converts a batch of filesystem events into
//! build-graph reloads and re-indexing decisions. Driven by an
//! externally-owned file watcher — this router does not spawn or own a
//! watcher thread itself, mirroring a filesystem indexer fed through a
//! channel by a caller-owned walk rather than owning the walk's thread
//! pool.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::{BuildSystemAdapter, FileChangeEvent};
use crate::error::ManagerError;
use crate::manager::SemanticIndexManager;

pub struct FileChangeRouter {
	adapter: Arc<dyn BuildSystemAdapter>,
}

impl FileChangeRouter {
	pub fn new(adapter: Arc<dyn BuildSystemAdapter>) -> Self {
		Self { adapter }
	}

	/// Synchronous batch entry point a caller-owned file watcher invokes.
	/// Ordering guarantee (d) of §5: all invalidations for this batch are
	/// applied (the graph reload, if any, then the per-event policy)
	/// before any new schedule decisions are made for the next batch.
	/// Returns whether a build-graph reload was triggered (rule 1 of
	/// §4.5), so a caller can decide whether to emit its own
	/// `file_build_settings_changed` framing on top of the manager's
	/// notification sink.
	pub async fn route(&self, manager: &Arc<SemanticIndexManager>, events: Vec<FileChangeEvent>) -> Result<bool, ManagerError> {
		if events.is_empty() {
			return Ok(false);
		}

		let graph_reload_needed = events.iter().any(|event| self.adapter.file_affects_build_settings(&event.file));
		if graph_reload_needed {
			debug!(count = events.len(), "router.build_graph_reload_triggered");
			manager.reload_build_graph().await?;
		}

		manager.on_files_changed(&events).await?;
		Ok(graph_reload_needed)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;
	use std::sync::Arc;

	use super::*;
	use crate::adapter::FileChangeKind;
	use crate::adapter::testing::{FixtureAdapter, FixtureCompileDriver};
	use crate::config::IndexingConfig;
	use crate::ids::{FileId, TargetId};
	use crate::index_store::testing::FixtureIndexStoreReader;
	use crate::manager::{IndexNotificationSink, SemanticIndexManager};

	struct NullSink;
	impl IndexNotificationSink for NullSink {
		fn dependencies_updated(&self, _files: HashSet<FileId>) {}
		fn file_build_settings_changed(&self, _files: Vec<FileId>) {}
	}

	#[tokio::test]
	async fn manifest_event_triggers_reload_and_invalidates_new_targets() {
		let adapter = Arc::new(FixtureAdapter::new());
		let manifest = FileId::new(std::path::PathBuf::from("Package.swift"));
		adapter.mark_manifest(manifest.clone());

		let manager = SemanticIndexManager::spawn(
			adapter.clone(),
			Arc::new(FixtureIndexStoreReader::new()),
			Arc::new(FixtureCompileDriver::new()),
			Arc::new(NullSink),
			IndexingConfig::default(),
		)
		.await
		.unwrap();

		// A target appears only after the "manifest" changes and the graph is re-read.
		adapter.add_target(TargetId::new("NewLib"), vec![], vec![]);

		let router = FileChangeRouter::new(adapter);
		let reloaded = router.route(&manager, vec![FileChangeEvent { file: manifest, kind: FileChangeKind::Modified }]).await.unwrap();
		assert!(reloaded);
	}

	#[tokio::test]
	async fn non_manifest_event_does_not_reload() {
		let adapter = Arc::new(FixtureAdapter::new());
		let manager = SemanticIndexManager::spawn(
			adapter.clone(),
			Arc::new(FixtureIndexStoreReader::new()),
			Arc::new(FixtureCompileDriver::new()),
			Arc::new(NullSink),
			IndexingConfig::default(),
		)
		.await
		.unwrap();

		let router = FileChangeRouter::new(adapter);
		let file = FileId::new(std::path::PathBuf::from("a.swift"));
		let reloaded = router.route(&manager, vec![FileChangeEvent { file, kind: FileChangeKind::Modified }]).await.unwrap();
		assert!(!reloaded);
	}
}
