//! Matching, classification and merge

use super::outcome::{count_statuses, ReconcileOutcome};
use crate::object::{Event, IdentityKey, ObservedObject, PersistedObject, RawRow, Status};
use crate::source::SourceDescriptor;
use crate::storage::{ObjectTransaction, StorageError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that abort a reconciliation and roll back its transaction
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("source {source_prefix}: identity {identity} is stored more than once")]
    DuplicateIdentity {
        source_prefix: String,
        identity: IdentityKey,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Build the observations of a batch, hashing the descriptor's watched slots.
pub fn observe(descriptor: &SourceDescriptor, rows: Vec<RawRow>) -> Vec<ObservedObject> {
    rows.into_iter()
        .map(|row| ObservedObject::new(descriptor.prefix.clone(), row, &descriptor.watched))
        .collect()
}

/// Reconcile a batch against the full persisted set of its source.
///
/// Pure: nothing is written. `now` is the formatted time assigned to objects
/// that went missing. Observations repeating an identity already seen in the
/// batch are dropped.
pub fn reconcile(
    descriptor: &SourceDescriptor,
    observed: Vec<ObservedObject>,
    persisted: Vec<PersistedObject>,
    now: &str,
) -> ReconcileResult<ReconcileOutcome> {
    let prefix = descriptor.prefix.as_str();

    let mut by_identity: HashMap<IdentityKey, usize> = HashMap::with_capacity(persisted.len());
    for (position, object) in persisted.iter().enumerate() {
        if by_identity.insert(object.identity(), position).is_some() {
            return Err(ReconcileError::DuplicateIdentity {
                source_prefix: prefix.to_string(),
                identity: object.identity(),
            });
        }
    }

    let mut matched = vec![false; persisted.len()];
    let mut batch_identities: HashSet<IdentityKey> = HashSet::with_capacity(observed.len());
    let mut merged = Vec::with_capacity(observed.len() + persisted.len());
    let mut unmatched = Vec::new();
    let mut observed_statuses = Vec::with_capacity(observed.len());
    let mut duplicates = 0;

    for mut observation in observed {
        if !batch_identities.insert(observation.identity.clone()) {
            warn!(source = %prefix, identity = %observation.identity, "dropped duplicate observation");
            duplicates += 1;
            continue;
        }

        let Some(&position) = by_identity.get(&observation.identity) else {
            unmatched.push(observation);
            continue;
        };

        matched[position] = true;
        let existing = &persisted[position];

        // Only the matched object's stored values decide the outcome.
        observation.status = if observation.watched_hash == existing.watched_hash(&descriptor.watched) {
            Status::WatchedNotChanged
        } else {
            Status::WatchedChanged
        };
        observed_statuses.push(observation.status);
        merged.push(existing.merge_observation(observation));
    }

    for (object, _) in persisted.iter().zip(&matched).filter(|(_, seen)| !**seen) {
        let mut missing = object.clone();
        missing.status = Status::MissingInLastScan;
        missing.changed_at = now.to_string();
        merged.push(missing);
    }

    for observation in unmatched {
        observed_statuses.push(Status::New);
        merged.push(PersistedObject::from_new_observation(observation));
    }

    let events = merged
        .iter()
        .filter(|object| descriptor.reports(object.status))
        .map(Event::snapshot)
        .collect();
    let merged_counts = count_statuses(merged.iter().map(|o| o.status));
    let (to_insert, to_update): (Vec<_>, Vec<_>) = merged.into_iter().partition(|o| o.status == Status::New);

    Ok(ReconcileOutcome {
        to_insert,
        to_update,
        events,
        observed_counts: count_statuses(observed_statuses),
        merged_counts,
        duplicates,
    })
}

/// Load, reconcile and write one batch inside an open transaction.
///
/// Any error leaves the transaction to be rolled back by its owner.
pub fn reconcile_in(
    tx: &mut dyn ObjectTransaction,
    descriptor: &SourceDescriptor,
    observed: Vec<ObservedObject>,
    now: &str,
) -> ReconcileResult<ReconcileOutcome> {
    let persisted = tx.load_objects(&descriptor.prefix)?;
    debug!(
        source = %descriptor.prefix,
        observed = observed.len(),
        persisted = persisted.len(),
        "reconciling"
    );

    let mut outcome = reconcile(descriptor, observed, persisted, now)?;

    let indexes = tx.bulk_insert(&outcome.to_insert)?;
    outcome.assign_indexes(&indexes);
    tx.bulk_update(&outcome.to_update)?;
    tx.bulk_insert_events(&outcome.events)?;

    debug!(
        source = %descriptor.prefix,
        observed = ?outcome.observed_counts,
        merged = ?outcome.merged_counts,
        "reconciled"
    );
    Ok(outcome)
}
