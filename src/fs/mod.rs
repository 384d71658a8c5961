// src/fs/mod.rs

//! File-state abstraction used by the up-to-date filter.
//!
//! "Exists + modification time" is the only ground truth the planner looks
//! at, so the trait is deliberately small. [`mock::MockFileSystem`] lets
//! tests control timestamps without sleeping.

use std::fmt::Debug;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

pub mod mock;

pub use mock::MockFileSystem;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn exists(&self, path: &Path) -> bool;

    /// Last modification time, or `None` if the path is missing or its
    /// metadata cannot be read.
    fn modified(&self, path: &Path) -> Option<SystemTime>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|meta| meta.modified()).ok()
    }
}
