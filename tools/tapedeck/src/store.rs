//! Cassette persistence. Sessions only ever use `exists`, `read` and `write`.

use crate::errors::TapedeckError;
use crate::replay::recording::{Cassette, CassetteName};
use crate::runtime::{FileSystem, ProductionFileSystem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationOptions {
    pub pretty: bool,
}

pub trait CassetteStore: Send + Sync {
    fn exists(&self, name: &CassetteName) -> bool;
    fn read(
        &self,
        name: &CassetteName,
        options: &SerializationOptions,
    ) -> Result<Cassette, TapedeckError>;
    fn write(
        &self,
        name: &CassetteName,
        cassette: &Cassette,
        options: &SerializationOptions,
    ) -> Result<(), TapedeckError>;
}

/// One JSON document per cassette at `<dir>/<name>.json`.
pub struct FileCassetteStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileCassetteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_file_system(dir, Arc::new(ProductionFileSystem))
    }

    pub fn with_file_system(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &CassetteName) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl CassetteStore for FileCassetteStore {
    fn exists(&self, name: &CassetteName) -> bool {
        self.fs.exists(&self.path_for(name))
    }

    fn read(
        &self,
        name: &CassetteName,
        _options: &SerializationOptions,
    ) -> Result<Cassette, TapedeckError> {
        let path = self.path_for(name);
        let raw = self.fs.read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| {
            TapedeckError::Serialization(format!("cassette {}: {e}", path.display()))
        })
    }

    fn write(
        &self,
        name: &CassetteName,
        cassette: &Cassette,
        options: &SerializationOptions,
    ) -> Result<(), TapedeckError> {
        let rendered = if options.pretty {
            serde_json::to_string_pretty(cassette)
        } else {
            serde_json::to_string(cassette)
        }
        .map_err(|e| TapedeckError::Serialization(e.to_string()))?;
        self.fs.create_dir_all(&self.dir)?;
        self.fs.write_string(&self.path_for(name), &format!("{rendered}\n"))
    }
}

/// Keeps cassettes in memory; handy for tests that never touch disk.
#[derive(Default, Clone)]
pub struct MemoryCassetteStore {
    cassettes: Arc<Mutex<HashMap<String, Cassette>>>,
}

impl MemoryCassetteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &CassetteName, cassette: Cassette) {
        self.cassettes
            .lock()
            .expect("memory store lock")
            .insert(name.as_str().to_string(), cassette);
    }

    pub fn get(&self, name: &CassetteName) -> Option<Cassette> {
        self.cassettes
            .lock()
            .expect("memory store lock")
            .get(name.as_str())
            .cloned()
    }
}

impl CassetteStore for MemoryCassetteStore {
    fn exists(&self, name: &CassetteName) -> bool {
        self.cassettes
            .lock()
            .expect("memory store lock")
            .contains_key(name.as_str())
    }

    fn read(
        &self,
        name: &CassetteName,
        _options: &SerializationOptions,
    ) -> Result<Cassette, TapedeckError> {
        self.get(name)
            .ok_or_else(|| TapedeckError::Io(format!("no cassette named {name}")))
    }

    fn write(
        &self,
        name: &CassetteName,
        cassette: &Cassette,
        _options: &SerializationOptions,
    ) -> Result<(), TapedeckError> {
        self.insert(name, cassette.clone());
        Ok(())
    }
}
