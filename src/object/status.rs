//! Lifecycle status of an object

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status assigned by reconciliation.
///
/// `NotProcessed` and `Exists` are intermediate markers used while a batch is
/// being classified; only the remaining variants are ever written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    NotProcessed,
    Exists,
    New,
    WatchedChanged,
    WatchedNotChanged,
    MissingInLastScan,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotProcessed => "not-processed",
            Status::Exists => "exists",
            Status::New => "new",
            Status::WatchedChanged => "watched-changed",
            Status::WatchedNotChanged => "watched-not-changed",
            Status::MissingInLastScan => "missing-in-last-scan",
        }
    }

    /// Whether the status may appear on a persisted object or event.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Status::NotProcessed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status value: {0}")]
pub struct StatusParseError(pub String);

impl FromStr for Status {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-processed" => Ok(Status::NotProcessed),
            "exists" => Ok(Status::Exists),
            "new" => Ok(Status::New),
            "watched-changed" => Ok(Status::WatchedChanged),
            "watched-not-changed" => Ok(Status::WatchedNotChanged),
            "missing-in-last-scan" => Ok(Status::MissingInLastScan),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_display_form() {
        for status in [
            Status::NotProcessed,
            Status::Exists,
            Status::New,
            Status::WatchedChanged,
            Status::WatchedNotChanged,
            Status::MissingInLastScan,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn rejects_unknown_status() {
        let err = "deleted".parse::<Status>().unwrap_err();
        assert_eq!(err.0, "deleted");
    }

    #[test]
    fn not_processed_is_never_storable() {
        assert!(!Status::NotProcessed.is_storable());
        assert!(Status::MissingInLastScan.is_storable());
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&Status::WatchedNotChanged).unwrap();
        assert_eq!(json, "\"watched-not-changed\"");
        let back: Status = serde_json::from_str("\"missing-in-last-scan\"").unwrap();
        assert_eq!(back, Status::MissingInLastScan);
    }
}
