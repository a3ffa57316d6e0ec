//! Command sources: run a process, then read the artifact it wrote

use super::params::{render_command, resolve_params};
use super::traits::{AdapterError, CommandExecutor};
use crate::object::RawRow;
use crate::settings::SettingsProvider;
use crate::source::SourceDescriptor;
use crate::storage::QueryExecutor;
use std::path::Path;
use tracing::{debug, info, warn};

/// Parse a command's output artifact.
///
/// Each line is decoded on its own. Lines without the `|` separator are
/// ignored; lines that are not UTF-8 or do not form a valid row are logged
/// and skipped without affecting the rest of the batch.
pub fn parse_artifact(source_prefix: &str, content: &[u8]) -> Vec<RawRow> {
    content
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .enumerate()
        .filter_map(|(number, bytes)| {
            let Ok(line) = std::str::from_utf8(bytes) else {
                warn!(source = %source_prefix, line = number + 1, "skipped line that is not valid UTF-8");
                return None;
            };
            if !line.contains('|') {
                if !line.trim().is_empty() {
                    debug!(source = %source_prefix, line, "ignored line without separator");
                }
                return None;
            }
            match RawRow::parse_line(line) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(source = %source_prefix, line, error = %e, "skipped invalid line in output");
                    None
                }
            }
        })
        .collect()
}

/// Remove a previous run's artifact so a command that writes nothing is
/// reported as missing output.
async fn clear_artifact(artifact: &Path) -> Result<(), AdapterError> {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn produce_rows(
    descriptor: &SourceDescriptor,
    executor: &dyn CommandExecutor,
    settings: &dyn SettingsProvider,
    queries: &dyn QueryExecutor,
) -> Result<Vec<RawRow>, AdapterError> {
    let artifact = descriptor.artifact_path().ok_or(AdapterError::NoArtifact)?;

    let params = resolve_params(&descriptor.params, settings, queries);
    let argv = render_command(&descriptor.command, &params);

    clear_artifact(&artifact).await?;

    info!(source = %descriptor.prefix, command = %descriptor.command, "executing command");
    debug!(source = %descriptor.prefix, ?argv, timeout = ?descriptor.timeout(), "resolved command");

    let output = executor
        .execute(&argv, descriptor.source_dir.as_deref(), descriptor.timeout())
        .await?;
    if !output.output.is_empty() {
        debug!(source = %descriptor.prefix, output = %output.output, "command output");
    }

    if !artifact.is_file() {
        return Err(AdapterError::MissingArtifact(artifact));
    }
    let content = tokio::fs::read(&artifact).await?;
    Ok(parse_artifact(&descriptor.prefix, &content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_valid_separated_lines() {
        let content = "\
starting scan
aa:bb|eth0|2024-01-01 10:00:00|192.168.1.2|vendor|||extra|fk
too|few|fields
|no|primary|id|x|x|x|x|x

cc:dd||2024-01-01 10:00:00|192.168.1.3|||||
";
        let rows = parse_artifact("ARP", content.as_bytes());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].primary_id, "aa:bb");
        assert_eq!(rows[1].primary_id, "cc:dd");
        assert_eq!(rows[1].secondary_id, "");
    }

    #[test]
    fn invalid_utf8_line_does_not_drop_the_batch() {
        let mut content = b"aa||t1|v|||||\n".to_vec();
        content.extend_from_slice(b"bb||t1|\xff|||||\n");
        content.extend_from_slice(b"cc||t1|w|||||\r\n");

        let rows = parse_artifact("ARP", &content);
        let ids: Vec<_> = rows.iter().map(|r| r.primary_id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "cc"]);
        assert_eq!(rows[1].foreign_key, "");
    }
}
