//! Observed objects, persisted objects and events

use super::hash::{IdentityKey, WatchedHash, WatchedSlot};
use super::row::RawRow;
use super::status::Status;
use serde::{Deserialize, Serialize};

/// Timestamp format used for times the engine itself assigns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The four watched value slots of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedValues {
    pub watched1: String,
    pub watched2: String,
    pub watched3: String,
    pub watched4: String,
}

impl WatchedValues {
    pub fn get(&self, slot: WatchedSlot) -> &str {
        match slot {
            WatchedSlot::Watched1 => &self.watched1,
            WatchedSlot::Watched2 => &self.watched2,
            WatchedSlot::Watched3 => &self.watched3,
            WatchedSlot::Watched4 => &self.watched4,
        }
    }

    /// Hash exactly the declared slots, in declaration order.
    pub fn hash(&self, slots: &[WatchedSlot]) -> WatchedHash {
        WatchedHash::of(slots.iter().map(|slot| self.get(*slot)))
    }
}

/// One accepted row of the current batch, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedObject {
    pub source_prefix: String,
    pub identity: IdentityKey,
    pub changed_at: String,
    pub watched: WatchedValues,
    pub extra: String,
    pub foreign_key: String,
    pub watched_hash: WatchedHash,
    pub status: Status,
}

impl ObservedObject {
    pub fn new(source_prefix: impl Into<String>, row: RawRow, slots: &[WatchedSlot]) -> Self {
        let watched = WatchedValues {
            watched1: row.watched1,
            watched2: row.watched2,
            watched3: row.watched3,
            watched4: row.watched4,
        };
        let watched_hash = watched.hash(slots);

        Self {
            source_prefix: source_prefix.into(),
            identity: IdentityKey::new(row.primary_id, row.secondary_id),
            changed_at: row.changed_at,
            watched,
            extra: row.extra,
            foreign_key: row.foreign_key,
            watched_hash,
            status: Status::NotProcessed,
        }
    }
}

/// Durable state of one identity within a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedObject {
    /// Surrogate key owned by the store; `None` until first inserted.
    pub index: Option<i64>,
    pub source_prefix: String,
    pub primary_id: String,
    pub secondary_id: String,
    pub created_at: String,
    pub changed_at: String,
    #[serde(flatten)]
    pub watched: WatchedValues,
    pub status: Status,
    pub extra: String,
    /// Free-form user annotation; reconciliation never writes it.
    pub user_data: Option<String>,
    pub foreign_key: String,
}

impl PersistedObject {
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(self.primary_id.clone(), self.secondary_id.clone())
    }

    pub fn watched_hash(&self, slots: &[WatchedSlot]) -> WatchedHash {
        self.watched.hash(slots)
    }

    /// A first-seen object: created when it changed, no user data yet.
    pub fn from_new_observation(observed: ObservedObject) -> Self {
        Self {
            index: None,
            source_prefix: observed.source_prefix,
            primary_id: observed.identity.primary_id,
            secondary_id: observed.identity.secondary_id,
            created_at: observed.changed_at.clone(),
            changed_at: observed.changed_at,
            watched: observed.watched,
            status: Status::New,
            extra: observed.extra,
            user_data: None,
            foreign_key: observed.foreign_key,
        }
    }

    /// Fold an observation into this object.
    ///
    /// The observation's status and values win. `index`, `created_at` and
    /// `user_data` always stay; `changed_at` also stays when nothing watched
    /// changed.
    pub fn merge_observation(&self, observed: ObservedObject) -> Self {
        let changed_at = if observed.status == Status::WatchedNotChanged {
            self.changed_at.clone()
        } else {
            observed.changed_at
        };

        Self {
            index: self.index,
            source_prefix: observed.source_prefix,
            primary_id: observed.identity.primary_id,
            secondary_id: observed.identity.secondary_id,
            created_at: self.created_at.clone(),
            changed_at,
            watched: observed.watched,
            status: observed.status,
            extra: observed.extra,
            user_data: self.user_data.clone(),
            foreign_key: observed.foreign_key,
        }
    }
}

/// Immutable snapshot of an object at the moment a reportable status was set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Surrogate key of the object the snapshot was taken from.
    pub object_index: Option<i64>,
    pub source_prefix: String,
    pub primary_id: String,
    pub secondary_id: String,
    pub created_at: String,
    pub changed_at: String,
    #[serde(flatten)]
    pub watched: WatchedValues,
    pub status: Status,
    pub extra: String,
    pub user_data: Option<String>,
    pub foreign_key: String,
}

impl Event {
    pub fn snapshot(object: &PersistedObject) -> Self {
        Self {
            object_index: object.index,
            source_prefix: object.source_prefix.clone(),
            primary_id: object.primary_id.clone(),
            secondary_id: object.secondary_id.clone(),
            created_at: object.created_at.clone(),
            changed_at: object.changed_at.clone(),
            watched: object.watched.clone(),
            status: object.status,
            extra: object.extra.clone(),
            user_data: object.user_data.clone(),
            foreign_key: object.foreign_key.clone(),
        }
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(self.primary_id.clone(), self.secondary_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(primary: &str, changed: &str, w1: &str) -> RawRow {
        RawRow::from_fields(vec![primary, "", changed, w1, "w2", "", "", "extra", "fk"]).unwrap()
    }

    fn stored(index: i64) -> PersistedObject {
        PersistedObject {
            index: Some(index),
            source_prefix: "SRC".to_string(),
            primary_id: "P1".to_string(),
            secondary_id: String::new(),
            created_at: "t0".to_string(),
            changed_at: "t0".to_string(),
            watched: WatchedValues {
                watched1: "v1".to_string(),
                watched2: "w2".to_string(),
                ..Default::default()
            },
            status: Status::New,
            extra: "extra".to_string(),
            user_data: Some("keep me".to_string()),
            foreign_key: "fk".to_string(),
        }
    }

    #[test]
    fn observed_hash_uses_only_declared_slots() {
        let a = ObservedObject::new("SRC", row("P1", "t1", "v1"), &[WatchedSlot::Watched2]);
        let b = ObservedObject::new("SRC", row("P1", "t1", "other"), &[WatchedSlot::Watched2]);
        assert_eq!(a.watched_hash, b.watched_hash);

        let c = ObservedObject::new("SRC", row("P1", "t1", "other"), &[WatchedSlot::Watched1]);
        assert_ne!(a.watched_hash, c.watched_hash);
    }

    #[test]
    fn new_observation_is_created_at_its_change_time() {
        let observed = ObservedObject::new("SRC", row("P1", "t1", "v1"), &[]);
        let object = PersistedObject::from_new_observation(observed);
        assert_eq!(object.index, None);
        assert_eq!(object.created_at, "t1");
        assert_eq!(object.changed_at, "t1");
        assert_eq!(object.status, Status::New);
        assert_eq!(object.user_data, None);
    }

    #[test]
    fn merge_keeps_owned_fields_and_takes_new_values() {
        let mut observed = ObservedObject::new("SRC", row("P1", "t2", "v2"), &[]);
        observed.status = Status::WatchedChanged;

        let merged = stored(7).merge_observation(observed);
        assert_eq!(merged.index, Some(7));
        assert_eq!(merged.created_at, "t0");
        assert_eq!(merged.user_data.as_deref(), Some("keep me"));
        assert_eq!(merged.changed_at, "t2");
        assert_eq!(merged.watched.watched1, "v2");
        assert_eq!(merged.status, Status::WatchedChanged);
    }

    #[test]
    fn merge_keeps_changed_at_when_unchanged() {
        let mut observed = ObservedObject::new("SRC", row("P1", "t9", "v1"), &[]);
        observed.status = Status::WatchedNotChanged;

        let merged = stored(3).merge_observation(observed);
        assert_eq!(merged.changed_at, "t0");
        assert_eq!(merged.status, Status::WatchedNotChanged);
    }

    #[test]
    fn event_snapshot_copies_object() {
        let event = Event::snapshot(&stored(4));
        assert_eq!(event.object_index, Some(4));
        assert_eq!(event.identity(), IdentityKey::new("P1", ""));
        assert_eq!(event.user_data.as_deref(), Some("keep me"));
    }
}
