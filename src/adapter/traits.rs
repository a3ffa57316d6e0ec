//! Adapter errors and the command execution contract

use crate::storage::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Why a source produced no rows this run.
///
/// Every variant is absorbed by the orchestrator: it is logged and the
/// source is skipped until its next run.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("command is empty after resolution")]
    EmptyCommand,

    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("command exited with {status}")]
    CommandFailed { status: String, output: String },

    #[error("command timed out after {0:?} and was terminated")]
    Timeout(Duration),

    #[error("source has no output artifact location")]
    NoArtifact,

    #[error("output artifact not found: {0:?}")]
    MissingArtifact(PathBuf),

    #[error("attach failed: {0}")]
    Attachment(String),

    #[error("query failed: {0}")]
    Query(#[source] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a finished command (stdout followed by stderr).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
}

/// Runs external processes with a hard timeout.
///
/// On timeout the implementation must terminate the process before
/// returning [`AdapterError::Timeout`]. Only the spawned process is
/// terminated: processes it started itself (e.g. a `sleep` inside
/// `sh scan.sh`) may outlive the timeout and must exit on their own.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        argv: &[String],
        working_dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, AdapterError>;
}
