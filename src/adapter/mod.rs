//! Data source adapter
//!
//! Executes a source descriptor and normalizes its output into raw rows.
//! Command sources run an external process and read back the artifact it
//! writes; query sources read the primary store, or an external database
//! attached for the duration of the query.

mod command;
mod executor;
mod params;
mod query;
mod source;
mod traits;

pub use command::parse_artifact;
pub use executor::TokioCommandExecutor;
pub use params::{
    flatten_rows, flatten_setting, flatten_values, render_command, resolve_params,
    unescape_quotes, ResolvedParam, QUOTE_TOKEN,
};
pub use query::{normalize_query_rows, EXTERNAL_ALIAS};
pub use source::DataSourceAdapter;
pub use traits::{AdapterError, CommandExecutor, CommandOutput};
