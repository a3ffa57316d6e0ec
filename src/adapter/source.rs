//! Dispatch from a descriptor to the producer for its kind

use super::executor::TokioCommandExecutor;
use super::traits::{AdapterError, CommandExecutor};
use super::{command, query};
use crate::object::RawRow;
use crate::settings::SettingsProvider;
use crate::source::{SourceDescriptor, SourceKind};
use crate::storage::QueryExecutor;
use std::sync::Arc;

/// Produces the raw rows of one source run.
///
/// Settings resolve `setting` parameters, `queries` runs both `sql`
/// parameters and query sources, and `executor` runs command sources.
#[derive(Clone)]
pub struct DataSourceAdapter {
    settings: Arc<dyn SettingsProvider>,
    queries: Arc<dyn QueryExecutor>,
    executor: Arc<dyn CommandExecutor>,
}

impl DataSourceAdapter {
    pub fn new(settings: Arc<dyn SettingsProvider>, queries: Arc<dyn QueryExecutor>) -> Self {
        Self {
            settings,
            queries,
            executor: Arc::new(TokioCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Execute the source and return its valid rows.
    ///
    /// An `Err` means the source did not run to completion; a source that ran
    /// and produced nothing returns an empty batch.
    pub async fn produce_rows(&self, descriptor: &SourceDescriptor) -> Result<Vec<RawRow>, AdapterError> {
        match descriptor.kind {
            SourceKind::Command => {
                command::produce_rows(
                    descriptor,
                    self.executor.as_ref(),
                    self.settings.as_ref(),
                    self.queries.as_ref(),
                )
                .await
            }
            SourceKind::LocalQuery => query::produce_local_rows(descriptor, self.queries.as_ref()),
            SourceKind::ExternalDbQuery => query::produce_external_rows(descriptor, self.queries.as_ref()),
        }
    }
}

impl std::fmt::Debug for DataSourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceAdapter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CommandOutput;
    use crate::settings::{Setting, StaticSettings};
    use crate::source::{ParamKind, SourceParam};
    use crate::storage::{OpenStore, SqliteStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes a fixed artifact into the working directory and records argv.
    struct FakeExecutor {
        artifact: Option<String>,
        fail: bool,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl FakeExecutor {
        fn writing(content: &str) -> Self {
            Self {
                artifact: Some(content.to_string()),
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(
            &self,
            argv: &[String],
            working_dir: Option<&Path>,
            _timeout: Duration,
        ) -> Result<CommandOutput, AdapterError> {
            self.seen.lock().unwrap().push(argv.to_vec());
            if let (Some(content), Some(dir)) = (&self.artifact, working_dir) {
                std::fs::write(dir.join(crate::source::OUTPUT_ARTIFACT), content)?;
            }
            if self.fail {
                return Err(AdapterError::CommandFailed {
                    status: "exit status: 1".to_string(),
                    output: String::new(),
                });
            }
            Ok(CommandOutput { output: "done".to_string() })
        }
    }

    fn adapter(executor: Arc<FakeExecutor>) -> DataSourceAdapter {
        let settings = StaticSettings::default().with("SCAN_IFACE", Setting::new("text", json!("eth0")));
        let store = SqliteStore::open_in_memory().unwrap();
        DataSourceAdapter::new(Arc::new(settings), Arc::new(store)).with_executor(executor)
    }

    #[tokio::test]
    async fn command_source_reads_artifact_with_substituted_params() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(FakeExecutor::writing("aa|eth0|t1|up||||x|\nnoise\n"));
        let d = SourceDescriptor::new("ARP", SourceKind::Command, "scan --iface={iface}")
            .with_source_dir(dir.path())
            .with_param(SourceParam {
                name: "iface".to_string(),
                kind: ParamKind::Setting,
                value: "SCAN_IFACE".to_string(),
                sensitive: false,
            });

        let rows = adapter(executor.clone()).produce_rows(&d).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].watched1, "up");
        assert_eq!(
            executor.seen.lock().unwrap()[0],
            vec!["scan".to_string(), "--iface=eth0".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_artifact_is_an_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(FakeExecutor {
            artifact: None,
            fail: false,
            seen: Mutex::new(Vec::new()),
        });
        let d = SourceDescriptor::new("ARP", SourceKind::Command, "scan").with_source_dir(dir.path());

        let err = adapter(executor).produce_rows(&d).await.unwrap_err();
        assert!(matches!(err, AdapterError::MissingArtifact(_)));
    }

    #[tokio::test]
    async fn failed_command_ignores_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(FakeExecutor {
            artifact: Some("aa|||||||x|".to_string()),
            fail: true,
            seen: Mutex::new(Vec::new()),
        });
        let d = SourceDescriptor::new("ARP", SourceKind::Command, "scan").with_source_dir(dir.path());

        let err = adapter(executor).produce_rows(&d).await.unwrap_err();
        assert!(matches!(err, AdapterError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn command_without_location_has_no_artifact() {
        let executor = Arc::new(FakeExecutor::writing(""));
        let d = SourceDescriptor::new("ARP", SourceKind::Command, "scan");

        let err = adapter(executor.clone()).produce_rows(&d).await.unwrap_err();
        assert!(matches!(err, AdapterError::NoArtifact));
        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_artifact_is_an_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(FakeExecutor::writing(""));
        let d = SourceDescriptor::new("ARP", SourceKind::Command, "scan").with_source_dir(dir.path());

        let rows = adapter(executor).produce_rows(&d).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn previous_artifact_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(crate::source::OUTPUT_ARTIFACT), "aa|||||||x|").unwrap();
        let executor = Arc::new(FakeExecutor {
            artifact: None,
            fail: false,
            seen: Mutex::new(Vec::new()),
        });
        let d = SourceDescriptor::new("ARP", SourceKind::Command, "scan").with_source_dir(dir.path());

        let err = adapter(executor).produce_rows(&d).await.unwrap_err();
        assert!(matches!(err, AdapterError::MissingArtifact(_)));
    }
}
