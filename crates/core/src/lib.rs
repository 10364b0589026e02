//! Semantic indexing core: the build-system adapter, up-to-date tracker,
//! semantic index manager, file-change router, and synchronizer that keep
//! editor-visible semantic results correct while a cross-file index is
//! maintained incrementally in the background.
//!
//! Task scheduling itself (priority, coalescing, cancellation) lives in
//! the sibling `semantic-index-scheduler` crate; this crate supplies that
//! scheduler with real work through the [`host`] bridge and exposes the
//! orchestration surface consumers actually call.

pub mod adapter;
pub mod config;
mod debounce;
pub mod error;
mod host;
pub mod ids;
pub mod index_store;
pub mod manager;
pub mod router;
pub mod tracker;

pub use adapter::{BuildSystemAdapter, CompileDriver, CompileInvocation, CompileInvocationKind, FileChangeEvent, FileChangeKind};
pub use config::IndexingConfig;
pub use error::{AdapterError, ManagerError, Result};
pub use ids::{FileId, TargetId};
pub use index_store::IndexStoreReader;
pub use manager::{IndexNotificationSink, IndexOutcome, PreparationOutcome, QuiescenceOptions, SemanticIndexManager};
pub use router::FileChangeRouter;
pub use tracker::UpToDateTracker;
pub use semantic_index_scheduler::Priority;
