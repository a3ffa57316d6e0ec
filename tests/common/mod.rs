//! Shared fixtures for scanledger integration tests

#![allow(dead_code)]

use scanledger::{
    load_descriptors, OpenStore, Orchestrator, SourceDescriptor, SqliteStore, StaticSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const RESCAN_TABLE: &str = "CurrentScan";

/// A sources directory and a file-backed store in one temp directory.
pub struct Workspace {
    pub dir: TempDir,
    pub store: Arc<SqliteStore>,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sources")).unwrap();
        let store = SqliteStore::open(dir.path().join("app.db")).unwrap();
        Self {
            dir,
            store: Arc::new(store),
        }
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.dir.path().join("sources")
    }

    /// Write `source.yaml` for a source directory, returning the directory.
    pub fn add_source(&self, code_name: &str, yaml: &str) -> PathBuf {
        let path = self.sources_dir().join(code_name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("source.yaml"), yaml).unwrap();
        path
    }

    /// Write a shell script into a source directory.
    pub fn add_script(&self, code_name: &str, file: &str, body: &str) {
        std::fs::write(self.sources_dir().join(code_name).join(file), body).unwrap();
    }

    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        load_descriptors(&self.sources_dir()).unwrap()
    }

    pub fn orchestrator(&self, settings: StaticSettings) -> Orchestrator<SqliteStore> {
        Orchestrator::new(self.store.clone(), Arc::new(settings), self.descriptors(), RESCAN_TABLE)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// A nine-field artifact line.
pub fn line(primary: &str, secondary: &str, changed: &str, w1: &str) -> String {
    format!("{primary}|{secondary}|{changed}|{w1}|||||")
}

/// A script that writes the given lines to the artifact in its working directory.
pub fn artifact_script(lines: &[String]) -> String {
    let mut body = String::from("#!/bin/sh\n: > last_result.log\n");
    for l in lines {
        body.push_str(&format!("echo '{l}' >> last_result.log\n"));
    }
    body
}

