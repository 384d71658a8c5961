// src/fs/mock.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use super::FileSystem;

#[derive(Debug, Clone)]
struct MockEntry {
    contents: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockEntry>,
    /// Logical clock in seconds since the epoch; bumped on every write.
    clock: u64,
}

/// In-memory filesystem with a logical clock.
///
/// Every `add_file`/`touch` advances the clock by one second, so the most
/// recently written file is always strictly the newest.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or overwrite a file, stamping it with the next clock tick.
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.clock += 1;
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(state.clock);
        state.files.insert(
            path.as_ref().to_path_buf(),
            MockEntry {
                contents: contents.into(),
                modified,
            },
        );
    }

    /// Create or overwrite a file with an explicit timestamp (seconds since
    /// the epoch). Does not advance the clock.
    pub fn add_file_at(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>, secs: u64) {
        let mut state = self.lock();
        state.files.insert(
            path.as_ref().to_path_buf(),
            MockEntry {
                contents: contents.into(),
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            },
        );
    }

    /// Bump a file's timestamp to the next clock tick, creating it empty if
    /// it does not exist.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let contents = self
            .lock()
            .files
            .get(path.as_ref())
            .map(|e| e.contents.clone())
            .unwrap_or_default();
        self.add_file(path, contents);
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.lock().files.remove(path.as_ref()).is_some()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.lock().files.get(path).map(|e| e.modified)
    }
}
