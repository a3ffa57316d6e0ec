//! Result of one reconciliation

use crate::object::{Event, IdentityKey, PersistedObject, Status};
use std::collections::{BTreeMap, HashMap};

/// Number of objects per status.
pub type StatusCounts = BTreeMap<Status, usize>;

pub(super) fn count_statuses(statuses: impl IntoIterator<Item = Status>) -> StatusCounts {
    let mut counts = StatusCounts::new();
    for status in statuses {
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}

/// Merged objects partitioned by write, plus the events they produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Objects seen for the first time; no index yet.
    pub to_insert: Vec<PersistedObject>,
    /// Objects that already exist, keyed by their index.
    pub to_update: Vec<PersistedObject>,
    pub events: Vec<Event>,
    /// Classification of the batch's observations.
    pub observed_counts: StatusCounts,
    /// Statuses of every object written, including missing ones.
    pub merged_counts: StatusCounts,
    /// Observations dropped because their identity appeared earlier in the batch.
    pub duplicates: usize,
}

impl ReconcileOutcome {
    pub fn written(&self) -> usize {
        self.to_insert.len() + self.to_update.len()
    }

    /// Record the indexes the store assigned to `to_insert`, in order, and
    /// point the events of those objects at them.
    pub fn assign_indexes(&mut self, indexes: &[i64]) {
        let mut assigned: HashMap<IdentityKey, i64> = HashMap::with_capacity(indexes.len());
        for (object, index) in self.to_insert.iter_mut().zip(indexes) {
            object.index = Some(*index);
            assigned.insert(object.identity(), *index);
        }

        for event in self.events.iter_mut().filter(|e| e.object_index.is_none()) {
            if let Some(index) = assigned.get(&event.identity()) {
                event.object_index = Some(*index);
            }
        }
    }
}
