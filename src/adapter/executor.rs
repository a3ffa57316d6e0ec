//! Tokio-backed command execution

use super::traits::{AdapterError, CommandExecutor, CommandOutput};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Spawns commands with `tokio::process`.
///
/// The child is killed on drop, so abandoning the wait on timeout also
/// terminates the process. Its own children are not signalled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandExecutor;

#[async_trait]
impl CommandExecutor for TokioCommandExecutor {
    async fn execute(
        &self,
        argv: &[String],
        working_dir: Option<&Path>,
        limit: Duration,
    ) -> Result<CommandOutput, AdapterError> {
        let (program, args) = argv.split_first().ok_or(AdapterError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir.filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| AdapterError::Spawn {
            program: program.clone(),
            message: e.to_string(),
        })?;

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(AdapterError::Timeout(limit)),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(CommandOutput { output: text })
        } else {
            Err(AdapterError::CommandFailed {
                status: output.status.to_string(),
                output: text,
            })
        }
    }
}
