//! `IndexingConfig` (§6): deserialized from a `serde_json::Value` subtree
//! handed down by the LSP layer's `initializationOptions` — the core never
//! touches JSON-RPC framing itself, only the already-extracted config blob.

use std::path::PathBuf;

use serde::Deserialize;

fn default_build_server_timeout_secs() -> u64 {
	15
}

fn default_index_slots() -> usize {
	std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).saturating_sub(1).max(1)
}

fn default_prep_slots() -> usize {
	1
}

fn default_debounce_ms() -> u64 {
	500
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
	/// How long to wait for build-system metadata before synthesizing a
	/// fallback invocation.
	#[serde(rename = "buildServerWorkspaceRequestsTimeout", default = "default_build_server_timeout_secs")]
	pub build_server_workspace_requests_timeout_secs: u64,
	#[serde(rename = "backgroundIndexing", default = "default_true")]
	pub background_indexing: bool,
	#[serde(rename = "indexStorePath")]
	pub index_store_path: Option<PathBuf>,
	#[serde(rename = "indexDatabasePath")]
	pub index_database_path: Option<PathBuf>,
	#[serde(rename = "experimentalPrepareForIndexing")]
	pub experimental_prepare_for_indexing: bool,
	#[serde(rename = "prepSlots", default = "default_prep_slots")]
	pub prep_slots: usize,
	#[serde(rename = "indexSlots", default = "default_index_slots")]
	pub index_slots: usize,
	#[serde(rename = "dependenciesUpdateDebounceMs", default = "default_debounce_ms")]
	pub dependencies_update_debounce_ms: u64,
}

impl Default for IndexingConfig {
	fn default() -> Self {
		Self {
			build_server_workspace_requests_timeout_secs: default_build_server_timeout_secs(),
			background_indexing: true,
			index_store_path: None,
			index_database_path: None,
			experimental_prepare_for_indexing: false,
			prep_slots: default_prep_slots(),
			index_slots: default_index_slots(),
			dependencies_update_debounce_ms: default_debounce_ms(),
		}
	}
}

impl IndexingConfig {
	/// Deserializes a config from the `initializationOptions` subtree an
	/// LSP layer would hand the core; unrecognized keys are ignored.
	pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
		serde_json::from_value(value)
	}
}
