//! Source descriptors
//!
//! Static configuration for each data source, and loading of the
//! per-source descriptor files from the sources directory.

mod descriptor;
mod loader;

pub use descriptor::{
    ColumnMapping, EventField, Mapping, ParamKind, RunTrigger, SourceDescriptor, SourceKind,
    SourceParam, DEFAULT_TIMEOUT_SECS, OUTPUT_ARTIFACT,
};
pub use loader::{load_descriptors, DESCRIPTOR_FILE};
