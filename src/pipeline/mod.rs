// src/pipeline/mod.rs

//! Task graphs built in code rather than from a config file.

pub mod karaoke;

pub use karaoke::{GROUP_TASK, KaraokeJob};
