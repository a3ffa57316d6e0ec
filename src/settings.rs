//! Settings capability used to resolve command placeholders

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed configuration setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    /// Setting type name (e.g. `text`, `list`, `subnets`, `devices.template`)
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

impl Setting {
    pub fn new(kind: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            value,
        }
    }
}

/// Looks up settings by name.
///
/// Handed to the data source adapter at construction so that parameter
/// resolution never reaches for global state.
pub trait SettingsProvider: Send + Sync {
    fn setting(&self, name: &str) -> Option<Setting>;
}

/// Settings held in memory, typically loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    settings: BTreeMap<String, Setting>,
}

impl StaticSettings {
    pub fn new(settings: BTreeMap<String, Setting>) -> Self {
        Self { settings }
    }

    pub fn with(mut self, name: impl Into<String>, setting: Setting) -> Self {
        self.settings.insert(name.into(), setting);
        self
    }
}

impl SettingsProvider for StaticSettings {
    fn setting(&self, name: &str) -> Option<Setting> {
        self.settings.get(name).cloned()
    }
}
