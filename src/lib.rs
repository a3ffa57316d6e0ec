//! Scanledger: change detection for tabular source snapshots
//!
//! Each configured source (an external command or a SQL query) produces a
//! batch of rows per run. The engine reconciles the batch against the
//! objects it already knows for that source and records, per object, whether
//! it is new, changed, unchanged, or missing from the latest scan.
//!
//! # Core Concepts
//!
//! - **Sources**: descriptors naming how rows are produced and which value
//!   slots are watched for change
//! - **Objects**: the durable state of one identity within a source
//! - **Events**: immutable snapshots emitted for the statuses a source reports on
//!
//! # Example
//!
//! ```
//! use scanledger::{observe, reconcile, RawRow, SourceDescriptor, SourceKind, Status, WatchedSlot};
//!
//! let source = SourceDescriptor::new("ARP", SourceKind::Command, "scan.sh")
//!     .with_watched([WatchedSlot::Watched1])
//!     .with_report_on([Status::New]);
//! let row = RawRow::parse_line("aa:bb|eth0|2024-01-01 10:00:00|192.168.1.2|||||").unwrap();
//!
//! let outcome = reconcile(&source, observe(&source, vec![row]), vec![], "2024-01-01 10:00:00").unwrap();
//! assert_eq!(outcome.to_insert[0].status, Status::New);
//! assert_eq!(outcome.events.len(), 1);
//! ```

pub mod adapter;
pub mod config;
pub mod mapper;
pub mod object;
pub mod reconcile;
pub mod runner;
pub mod settings;
pub mod source;
pub mod storage;

pub use adapter::{AdapterError, CommandExecutor, DataSourceAdapter, TokioCommandExecutor};
pub use config::{AppConfig, ConfigError};
pub use mapper::{DownstreamMapper, MappingOutcome};
pub use object::{
    Event, IdentityKey, ObservedObject, PersistedObject, RawRow, RowError, Status, WatchedSlot,
};
pub use reconcile::{observe, reconcile, ReconcileError, ReconcileOutcome};
pub use runner::{Orchestrator, RunError, RunReport, ScanState};
pub use settings::{Setting, SettingsProvider, StaticSettings};
pub use source::{load_descriptors, RunTrigger, SourceDescriptor, SourceKind};
pub use storage::{ObjectStore, OpenStore, QueryExecutor, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
