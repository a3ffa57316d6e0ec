//! Downstream mapping of events into a separately schemed table

use crate::object::Event;
use crate::source::{EventField, Mapping};
use crate::storage::{MappedValue, ObjectStore};
use tracing::{debug, warn};

/// What a mapping write did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingOutcome {
    pub rows_written: usize,
    /// The rows landed in the rescan table
    pub rescan_requested: bool,
}

/// Projects accepted events into a source's mapped table.
#[derive(Debug, Clone)]
pub struct DownstreamMapper {
    rescan_table: String,
}

impl DownstreamMapper {
    pub fn new(rescan_table: impl Into<String>) -> Self {
        Self {
            rescan_table: rescan_table.into(),
        }
    }

    pub fn rescan_table(&self) -> &str {
        &self.rescan_table
    }

    /// One row per event, holding only the mapped fields in mapping order.
    pub fn project(mapping: &Mapping, events: &[Event]) -> Vec<Vec<MappedValue>> {
        events
            .iter()
            .map(|event| {
                mapping
                    .columns
                    .iter()
                    .map(|c| field_value(event, c.column))
                    .collect()
            })
            .collect()
    }

    /// Write the events to the mapped table.
    ///
    /// Best-effort: a failure is logged and reported as zero rows written,
    /// never returned.
    pub fn apply<S: ObjectStore>(
        &self,
        store: &S,
        source_prefix: &str,
        mapping: &Mapping,
        events: &[Event],
    ) -> MappingOutcome {
        if events.is_empty() {
            return MappingOutcome::default();
        }

        let columns: Vec<String> = mapping.columns.iter().map(|c| c.mapped_to.clone()).collect();
        let rows = Self::project(mapping, events);
        debug!(source = %source_prefix, table = %mapping.table, rows = rows.len(), "mapping events");

        match store.insert_mapped(&mapping.table, &columns, &rows) {
            Ok(written) => MappingOutcome {
                rows_written: written,
                rescan_requested: mapping.table == self.rescan_table,
            },
            Err(e) => {
                warn!(source = %source_prefix, table = %mapping.table, error = %e, "mapping failed");
                MappingOutcome::default()
            }
        }
    }
}

fn field_value(event: &Event, field: EventField) -> MappedValue {
    let text = |s: &str| MappedValue::Text(s.to_string());
    match field {
        EventField::Index => event.object_index.map_or(MappedValue::Null, MappedValue::Integer),
        EventField::SourcePrefix => text(&event.source_prefix),
        EventField::PrimaryId => text(&event.primary_id),
        EventField::SecondaryId => text(&event.secondary_id),
        EventField::CreatedAt => text(&event.created_at),
        EventField::ChangedAt => text(&event.changed_at),
        EventField::Watched1 => text(&event.watched.watched1),
        EventField::Watched2 => text(&event.watched.watched2),
        EventField::Watched3 => text(&event.watched.watched3),
        EventField::Watched4 => text(&event.watched.watched4),
        EventField::Status => text(event.status.as_str()),
        EventField::Extra => text(&event.extra),
        EventField::UserData => event.user_data.as_deref().map_or(MappedValue::Null, text),
        EventField::ForeignKey => text(&event.foreign_key),
    }
}
