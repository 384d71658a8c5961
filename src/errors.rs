// src/errors.rs

//! Crate-wide error type for the configuration and CLI glue.
//!
//! The scheduling core has its own narrower enums (`TaskError`,
//! `GraphError`, `SubmitError`, `StageError`); this one wraps them where they
//! surface through config loading.

use thiserror::Error;

use crate::dag::GraphError;
use crate::task::TaskError;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid task: {0}")]
    Task(#[from] TaskError),

    #[error("Invalid task graph: {0}")]
    Graph(#[from] GraphError),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;
