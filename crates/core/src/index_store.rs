//! The seam onto the raw index database (out of scope per §1: "treated as
//! a persisted symbol store with a unit-file polling API"). The manager
//! needs exactly two read-only facts from it: whether a unit file is
//! fresher than its source, and which main file last included a header.

use crate::ids::{FileId, TargetId};

pub trait IndexStoreReader: Send + Sync + 'static {
	/// The on-disk modification time of the unit file for `(file, target)`,
	/// if one has ever been emitted.
	fn unit_file_mtime(&self, file: &FileId, target: &TargetId) -> Option<std::time::SystemTime>;

	/// A main file previously indexed that is known (from prior index
	/// contents) to have included `header`, used by the header re-indexing
	/// policy in §4.4.
	fn main_file_including(&self, header: &FileId) -> Option<FileId>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
	use std::collections::HashMap;
	use std::time::SystemTime;

	use parking_lot::Mutex;

	use super::*;

	#[derive(Default)]
	pub struct FixtureIndexStoreReader {
		unit_files: Mutex<HashMap<(FileId, TargetId), SystemTime>>,
		includers: Mutex<HashMap<FileId, FileId>>,
	}

	impl FixtureIndexStoreReader {
		pub fn new() -> Self {
			Self::default()
		}

		pub fn set_unit_file_mtime(&self, file: FileId, target: TargetId, mtime: SystemTime) {
			self.unit_files.lock().insert((file, target), mtime);
		}

		pub fn set_includer(&self, header: FileId, main_file: FileId) {
			self.includers.lock().insert(header, main_file);
		}
	}

	impl IndexStoreReader for FixtureIndexStoreReader {
		fn unit_file_mtime(&self, file: &FileId, target: &TargetId) -> Option<SystemTime> {
			self.unit_files.lock().get(&(file.clone(), target.clone())).copied()
		}

		fn main_file_including(&self, header: &FileId) -> Option<FileId> {
			self.includers.lock().get(header).cloned()
		}
	}
}
