//! Loads descriptors from one sub-directory per source

use super::descriptor::SourceDescriptor;
use crate::config::ConfigError;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Descriptor file name inside each source directory.
pub const DESCRIPTOR_FILE: &str = "source.yaml";

/// Load every descriptor under `sources_dir`, ordered by directory name.
///
/// Directories starting with `__` or ending with `__ignore` are skipped, as are
/// directories without a descriptor file.
pub fn load_descriptors(sources_dir: &Path) -> Result<Vec<SourceDescriptor>, ConfigError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(sources_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("__") || name.ends_with("__ignore") {
            debug!(dir = %name, "skipping ignored source directory");
            continue;
        }
        dirs.push((name, entry.path()));
    }
    dirs.sort();

    let mut prefixes = HashSet::new();
    let mut descriptors = Vec::with_capacity(dirs.len());

    for (name, path) in dirs {
        let file = path.join(DESCRIPTOR_FILE);
        if !file.is_file() {
            warn!(dir = %name, "source directory has no {}", DESCRIPTOR_FILE);
            continue;
        }

        let content = std::fs::read_to_string(&file)?;
        let mut descriptor: SourceDescriptor = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Yaml { path: file.clone(), source: e })?;

        if descriptor.code_name.is_empty() {
            descriptor.code_name = name.clone();
        }
        descriptor.source_dir = Some(path);
        descriptor.validate()?;

        if !prefixes.insert(descriptor.prefix.clone()) {
            return Err(ConfigError::invalid(format!(
                "duplicate source prefix {} in {}",
                descriptor.prefix, name
            )));
        }

        debug!(source = %descriptor.prefix, kind = ?descriptor.kind, "loaded source descriptor");
        descriptors.push(descriptor);
    }

    Ok(descriptors)
}
