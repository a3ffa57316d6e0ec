//! Source descriptor types

use crate::config::ConfigError;
use crate::object::{Status, WatchedSlot};
use crate::storage::is_valid_identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Timeout applied when a descriptor does not declare one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// File a command source writes its rows to, inside its source directory.
pub const OUTPUT_ARTIFACT: &str = "last_result.log";

/// How a source produces its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Run an external command that writes a `|`-separated artifact
    #[serde(alias = "script")]
    Command,
    /// Query the primary store
    #[serde(alias = "db-query")]
    LocalQuery,
    /// Attach a second database read-only and query it
    #[serde(alias = "sqlite-db-query")]
    ExternalDbQuery,
}

/// When the orchestrator should run a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    #[default]
    Disabled,
    Once,
    Schedule,
    AlwaysAfterScan,
}

/// Where a placeholder value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// A named configuration setting
    Setting,
    /// The first column of a query against the primary store
    Sql,
}

/// A named `{placeholder}` of a command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    /// Setting name or SQL query, depending on `kind`
    pub value: String,
    /// Base64-encode list values before substitution
    #[serde(default)]
    pub sensitive: bool,
}

/// A field of an event that can be projected into a mapped table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventField {
    #[serde(rename = "Index", alias = "index")]
    Index,
    #[serde(rename = "Plugin", alias = "source_prefix")]
    SourcePrefix,
    #[serde(rename = "Object_PrimaryID", alias = "primary_id")]
    PrimaryId,
    #[serde(rename = "Object_SecondaryID", alias = "secondary_id")]
    SecondaryId,
    #[serde(rename = "DateTimeCreated", alias = "created_at")]
    CreatedAt,
    #[serde(rename = "DateTimeChanged", alias = "changed_at")]
    ChangedAt,
    #[serde(rename = "Watched_Value1", alias = "watched1")]
    Watched1,
    #[serde(rename = "Watched_Value2", alias = "watched2")]
    Watched2,
    #[serde(rename = "Watched_Value3", alias = "watched3")]
    Watched3,
    #[serde(rename = "Watched_Value4", alias = "watched4")]
    Watched4,
    #[serde(rename = "Status", alias = "status")]
    Status,
    #[serde(rename = "Extra", alias = "extra")]
    Extra,
    #[serde(rename = "UserData", alias = "user_data")]
    UserData,
    #[serde(rename = "ForeignKey", alias = "foreign_key")]
    ForeignKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub column: EventField,
    pub mapped_to: String,
}

/// Projection of accepted events into a separately schemed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub table: String,
    pub columns: Vec<ColumnMapping>,
}

/// Static configuration for one data source, immutable for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique identity namespace of the source
    pub prefix: String,
    /// Directory name of the source; defaults to the directory it was loaded from
    #[serde(default)]
    pub code_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: SourceKind,
    /// Command template or SQL query, depending on `kind`
    #[serde(alias = "cmd")]
    pub command: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub watched: Vec<WatchedSlot>,
    #[serde(default)]
    pub report_on: BTreeSet<Status>,
    #[serde(default)]
    pub run: RunTrigger,
    #[serde(default)]
    pub params: Vec<SourceParam>,
    #[serde(default)]
    pub external_db_path: Option<PathBuf>,
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    #[serde(default)]
    pub mapping: Option<Mapping>,
    /// Directory the descriptor was loaded from
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SourceDescriptor {
    /// A descriptor with defaults for everything but identity, kind and command.
    pub fn new(prefix: impl Into<String>, kind: SourceKind, command: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            code_name: prefix.to_lowercase(),
            prefix,
            display_name: None,
            kind,
            command: command.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            watched: Vec::new(),
            report_on: BTreeSet::new(),
            run: RunTrigger::Disabled,
            params: Vec::new(),
            external_db_path: None,
            artifact: None,
            mapping: None,
            source_dir: None,
        }
    }

    pub fn with_watched(mut self, slots: impl IntoIterator<Item = WatchedSlot>) -> Self {
        self.watched = slots.into_iter().collect();
        self
    }

    pub fn with_report_on(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.report_on = statuses.into_iter().collect();
        self
    }

    pub fn with_run(mut self, run: RunTrigger) -> Self {
        self.run = run;
        self
    }

    pub fn with_param(mut self, param: SourceParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_external_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.external_db_path = Some(path.into());
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn reports(&self, status: Status) -> bool {
        self.report_on.contains(&status)
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.prefix)
    }

    /// The artifact a command source writes, if it can be located.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.artifact
            .clone()
            .or_else(|| self.source_dir.as_ref().map(|dir| dir.join(OUTPUT_ARTIFACT)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.trim().is_empty() {
            return Err(ConfigError::invalid("source prefix cannot be empty"));
        }
        if self.command.trim().is_empty() {
            return Err(ConfigError::invalid(format!(
                "source {}: command cannot be empty",
                self.prefix
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::invalid(format!(
                "source {}: timeout must be > 0",
                self.prefix
            )));
        }
        if self.kind == SourceKind::ExternalDbQuery && self.external_db_path.is_none() {
            return Err(ConfigError::invalid(format!(
                "source {}: external-db-query requires external_db_path",
                self.prefix
            )));
        }
        if let Some(status) = self.report_on.iter().find(|s| matches!(s, Status::NotProcessed | Status::Exists)) {
            return Err(ConfigError::invalid(format!(
                "source {}: status {} is never reported",
                self.prefix, status
            )));
        }
        if let Some(mapping) = &self.mapping {
            if !is_valid_identifier(&mapping.table) {
                return Err(ConfigError::invalid(format!(
                    "source {}: invalid mapped table name {:?}",
                    self.prefix, mapping.table
                )));
            }
            if mapping.columns.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "source {}: mapping to {} has no columns",
                    self.prefix, mapping.table
                )));
            }
            if let Some(bad) = mapping.columns.iter().find(|c| !is_valid_identifier(&c.mapped_to)) {
                return Err(ConfigError::invalid(format!(
                    "source {}: invalid mapped column name {:?}",
                    self.prefix, bad.mapped_to
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
prefix: ARPSCAN
display_name: ARP scan
kind: script
cmd: python3 script.py subnets={subnets}
watched: [Watched_Value1, Watched_Value2]
report_on: [new, watched-changed]
run: schedule
params:
  - name: subnets
    type: setting
    value: SCAN_SUBNETS
    sensitive: true
mapping:
  table: CurrentScan
  columns:
    - column: Object_PrimaryID
      mapped_to: cur_MAC
    - column: watched1
      mapped_to: cur_IP
"#;

    #[test]
    fn parses_full_descriptor() {
        let d: SourceDescriptor = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(d.prefix, "ARPSCAN");
        assert_eq!(d.kind, SourceKind::Command);
        assert_eq!(d.timeout_seconds, DEFAULT_TIMEOUT_SECS);
        assert_eq!(d.watched, vec![WatchedSlot::Watched1, WatchedSlot::Watched2]);
        assert!(d.reports(Status::New));
        assert!(!d.reports(Status::WatchedNotChanged));
        assert_eq!(d.run, RunTrigger::Schedule);
        assert_eq!(d.params[0].kind, ParamKind::Setting);
        assert!(d.params[0].sensitive);

        let mapping = d.mapping.as_ref().unwrap();
        assert_eq!(mapping.columns[0].column, EventField::PrimaryId);
        assert_eq!(mapping.columns[1].column, EventField::Watched1);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn defaults_apply() {
        let d: SourceDescriptor =
            serde_yaml::from_str("prefix: X\nkind: local-query\ncommand: SELECT 1").unwrap();
        assert_eq!(d.run, RunTrigger::Disabled);
        assert!(d.watched.is_empty());
        assert!(d.report_on.is_empty());
        assert!(d.mapping.is_none());
    }

    #[test]
    fn external_query_needs_database_path() {
        let d = SourceDescriptor::new("EXT", SourceKind::ExternalDbQuery, "SELECT 1");
        assert!(d.validate().is_err());
        assert!(d.with_external_db("/tmp/other.db").validate().is_ok());
    }

    #[test]
    fn rejects_intermediate_report_statuses() {
        let d = SourceDescriptor::new("X", SourceKind::LocalQuery, "SELECT 1")
            .with_report_on([Status::Exists]);
        assert!(d.validate().is_err());
    }

    #[test]
    fn rejects_unsafe_mapping_identifiers() {
        let d = SourceDescriptor::new("X", SourceKind::LocalQuery, "SELECT 1").with_mapping(Mapping {
            table: "t; DROP TABLE x".to_string(),
            columns: vec![ColumnMapping {
                column: EventField::PrimaryId,
                mapped_to: "c".to_string(),
            }],
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn artifact_defaults_to_source_directory() {
        let d = SourceDescriptor::new("X", SourceKind::Command, "true").with_source_dir("/srv/sources/x");
        assert_eq!(
            d.artifact_path(),
            Some(PathBuf::from("/srv/sources/x").join(OUTPUT_ARTIFACT))
        );
        assert_eq!(
            SourceDescriptor::new("X", SourceKind::Command, "true").artifact_path(),
            None
        );
    }
}
