//! Source orchestration
//!
//! Runs sources one at a time: produce rows, record history, reconcile in a
//! single transaction, then map events downstream. Execution and mapping
//! failures are absorbed into the run's report; only a failed transaction is
//! returned to the caller.

use crate::adapter::{CommandExecutor, DataSourceAdapter};
use crate::config::ConfigError;
use crate::mapper::DownstreamMapper;
use crate::object::TIMESTAMP_FORMAT;
use crate::reconcile::{observe, reconcile_in, ReconcileError, StatusCounts};
use crate::settings::SettingsProvider;
use crate::source::{RunTrigger, SourceDescriptor};
use crate::storage::{ObjectStore, QueryExecutor};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Failures that leave the caller responsible for retrying
#[derive(Debug, Error)]
pub enum RunError {
    #[error("source {prefix}: reconciliation failed: {source}")]
    Transaction {
        prefix: String,
        #[source]
        source: ReconcileError,
    },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What one source run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub prefix: String,
    /// Set when the source could not be executed; nothing was reconciled.
    pub execution_error: Option<String>,
    pub rows_received: usize,
    pub observed_counts: StatusCounts,
    pub merged_counts: StatusCounts,
    pub inserted: usize,
    pub updated: usize,
    pub events_written: usize,
    pub mapped_rows: usize,
    pub rescan_requested: bool,
}

impl RunReport {
    fn skipped(prefix: &str, reason: String) -> Self {
        Self {
            prefix: prefix.to_string(),
            execution_error: Some(reason),
            ..Default::default()
        }
    }

    pub fn reconciled(&self) -> bool {
        self.execution_error.is_none()
    }
}

/// Accumulated state of a scan cycle.
#[derive(Debug, Default)]
pub struct ScanState {
    pub reports: Vec<RunReport>,
    /// Sources whose transaction failed, with the error
    pub failures: Vec<(String, String)>,
    /// Sticky: any source in the cycle asked for a rescan
    pub rescan_requested: bool,
}

impl ScanState {
    fn record(&mut self, result: Result<RunReport, RunError>, prefix: &str) {
        match result {
            Ok(report) => {
                self.rescan_requested |= report.rescan_requested;
                self.reports.push(report);
            }
            Err(e) => self.failures.push((prefix.to_string(), e.to_string())),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs configured sources against one store.
pub struct Orchestrator<S> {
    store: Arc<S>,
    adapter: DataSourceAdapter,
    mapper: DownstreamMapper,
    descriptors: Vec<SourceDescriptor>,
}

impl<S> Orchestrator<S>
where
    S: ObjectStore + QueryExecutor + 'static,
{
    pub fn new(
        store: Arc<S>,
        settings: Arc<dyn SettingsProvider>,
        descriptors: Vec<SourceDescriptor>,
        rescan_table: impl Into<String>,
    ) -> Self {
        let queries: Arc<dyn QueryExecutor> = store.clone();
        Self {
            adapter: DataSourceAdapter::new(settings, queries),
            mapper: DownstreamMapper::new(rescan_table),
            store,
            descriptors,
        }
    }

    /// Replace the command executor, e.g. with a scripted one in tests.
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.adapter = self.adapter.with_executor(executor);
        self
    }

    pub fn descriptors(&self) -> &[SourceDescriptor] {
        &self.descriptors
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn descriptor(&self, prefix: &str) -> Option<&SourceDescriptor> {
        self.descriptors.iter().find(|d| d.prefix == prefix)
    }

    /// Run one source at the current local time.
    pub async fn run_source(&self, descriptor: &SourceDescriptor) -> Result<RunReport, RunError> {
        let now = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.run_source_at(descriptor, &now).await
    }

    /// Run one source, stamping missing objects and history with `now`.
    pub async fn run_source_at(
        &self,
        descriptor: &SourceDescriptor,
        now: &str,
    ) -> Result<RunReport, RunError> {
        let prefix = descriptor.prefix.as_str();
        info!(source = %prefix, name = %descriptor.name(), "running source");

        let rows = match self.adapter.produce_rows(descriptor).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(source = %prefix, error = %e, "source execution failed; skipping reconciliation");
                return Ok(RunReport::skipped(prefix, e.to_string()));
            }
        };
        let rows_received = rows.len();
        info!(source = %prefix, rows = rows_received, "rows received");

        if let Err(e) = self.store.append_history(prefix, &rows, now) {
            warn!(source = %prefix, error = %e, "failed to record history");
        }

        let observed = observe(descriptor, rows);
        let outcome = self
            .store
            .transaction(|tx| reconcile_in(tx, descriptor, observed, now))
            .map_err(|e| {
                error!(source = %prefix, error = %e, "reconciliation rolled back");
                RunError::Transaction {
                    prefix: prefix.to_string(),
                    source: e,
                }
            })?;

        let mapped = match &descriptor.mapping {
            Some(mapping) => self.mapper.apply(self.store.as_ref(), prefix, mapping, &outcome.events),
            None => Default::default(),
        };
        if mapped.rescan_requested {
            debug!(source = %prefix, table = %self.mapper.rescan_table(), "rescan requested");
        }

        let report = RunReport {
            prefix: prefix.to_string(),
            execution_error: None,
            rows_received,
            inserted: outcome.to_insert.len(),
            updated: outcome.to_update.len(),
            events_written: outcome.events.len(),
            observed_counts: outcome.observed_counts,
            merged_counts: outcome.merged_counts,
            mapped_rows: mapped.rows_written,
            rescan_requested: mapped.rescan_requested,
        };
        info!(
            source = %prefix,
            inserted = report.inserted,
            updated = report.updated,
            events = report.events_written,
            "source run complete"
        );
        Ok(report)
    }

    /// Run every source whose trigger matches, in load order.
    ///
    /// `is_due` further filters `schedule` sources; other triggers ignore it.
    pub async fn run_cycle<F>(&self, trigger: RunTrigger, is_due: F) -> ScanState
    where
        F: Fn(&SourceDescriptor) -> bool,
    {
        let selected = self
            .descriptors
            .iter()
            .filter(|d| d.run == trigger && trigger != RunTrigger::Disabled)
            .filter(|d| trigger != RunTrigger::Schedule || is_due(*d));

        let mut state = ScanState::default();
        for descriptor in selected {
            let result = self.run_source(descriptor).await;
            state.record(result, &descriptor.prefix);
        }
        debug!(
            ?trigger,
            runs = state.reports.len(),
            failures = state.failures.len(),
            rescan = state.rescan_requested,
            "cycle complete"
        );
        state
    }

    /// Run the named sources regardless of their trigger.
    pub async fn run_named(&self, prefixes: &[String]) -> Result<ScanState, RunError> {
        let selected = prefixes
            .iter()
            .map(|p| {
                self.descriptor(p)
                    .ok_or_else(|| RunError::UnknownSource(p.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = ScanState::default();
        for descriptor in selected {
            let result = self.run_source(descriptor).await;
            state.record(result, &descriptor.prefix);
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterError, CommandOutput};
    use crate::object::Status;
    use crate::settings::StaticSettings;
    use crate::source::SourceKind;
    use crate::storage::{OpenStore, SqliteStore};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    struct TimingOut;

    #[async_trait]
    impl CommandExecutor for TimingOut {
        async fn execute(&self, _: &[String], _: Option<&Path>, limit: Duration) -> Result<CommandOutput, AdapterError> {
            Err(AdapterError::Timeout(limit))
        }
    }

    const DEVICES: &str = "SELECT mac, '', 't', ip, '', '', '', '', '' FROM devices";

    fn store() -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE devices (mac TEXT, ip TEXT);
                 INSERT INTO devices VALUES ('aa', '10.0.0.1');",
            )
            .unwrap();
        Arc::new(store)
    }

    fn orchestrator(store: Arc<SqliteStore>, descriptors: Vec<SourceDescriptor>) -> Orchestrator<SqliteStore> {
        Orchestrator::new(store, Arc::new(StaticSettings::default()), descriptors, "CurrentScan")
            .with_executor(Arc::new(TimingOut))
    }

    #[tokio::test]
    async fn run_records_history_and_objects() {
        let store = store();
        let d = SourceDescriptor::new("DEV", SourceKind::LocalQuery, DEVICES);
        let report = orchestrator(store.clone(), vec![d.clone()])
            .run_source_at(&d, "2024-01-01 00:00:00")
            .await
            .unwrap();

        assert!(report.reconciled());
        assert_eq!(report.rows_received, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.history_count("DEV").unwrap(), 1);
        assert_eq!(store.objects("DEV").unwrap()[0].status, Status::New);
    }

    #[tokio::test]
    async fn execution_failure_leaves_objects_untouched() {
        let store = store();
        let query = SourceDescriptor::new("ARP", SourceKind::LocalQuery, DEVICES);
        let orch = orchestrator(store.clone(), vec![]);
        orch.run_source_at(&query, "t1").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let command = SourceDescriptor::new("ARP", SourceKind::Command, "scan").with_source_dir(dir.path());
        let report = orch.run_source_at(&command, "t2").await.unwrap();

        assert!(!report.reconciled());
        assert_eq!(store.objects("ARP").unwrap()[0].status, Status::New);
        assert_eq!(store.history_count("ARP").unwrap(), 1);
    }

    #[tokio::test]
    async fn cycle_selects_by_trigger_and_due() {
        let store = store();
        let descriptors = vec![
            SourceDescriptor::new("ONE", SourceKind::LocalQuery, DEVICES).with_run(RunTrigger::Schedule),
            SourceDescriptor::new("TWO", SourceKind::LocalQuery, DEVICES).with_run(RunTrigger::Schedule),
            SourceDescriptor::new("OFF", SourceKind::LocalQuery, DEVICES),
        ];
        let orch = orchestrator(store.clone(), descriptors);

        let state = orch.run_cycle(RunTrigger::Schedule, |d| d.prefix == "TWO").await;
        assert_eq!(state.reports.len(), 1);
        assert_eq!(state.reports[0].prefix, "TWO");

        let state = orch.run_cycle(RunTrigger::Disabled, |_| true).await;
        assert!(state.reports.is_empty());
    }

    #[tokio::test]
    async fn transaction_failure_is_recorded_and_cycle_continues() {
        let store = store();
        let descriptors = vec![
            SourceDescriptor::new("BAD", SourceKind::LocalQuery, DEVICES).with_run(RunTrigger::Once),
            SourceDescriptor::new("GOOD", SourceKind::LocalQuery, DEVICES).with_run(RunTrigger::Once),
        ];
        let orch = orchestrator(store.clone(), descriptors);
        store
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON source_objects
                 WHEN NEW.source_prefix = 'BAD'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let state = orch.run_cycle(RunTrigger::Once, |_| true).await;
        assert!(!state.is_success());
        assert_eq!(state.failures[0].0, "BAD");
        assert_eq!(state.reports.len(), 1);
        assert!(store.objects("BAD").unwrap().is_empty());
        assert_eq!(store.objects("GOOD").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_named_source_is_an_error() {
        let orch = orchestrator(store(), vec![]);
        let err = orch.run_named(&["NOPE".to_string()]).await.unwrap_err();
        assert!(matches!(err, RunError::UnknownSource(_)));
    }
}
