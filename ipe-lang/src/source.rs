//! Source resolution
//!
//! An `importe` names a unit; a [`SourceProvider`] turns that name into
//! source text.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Source of the built-in `sistema` unit
pub const SISTEMA: &str = include_str!("sistema.ipe");

pub trait SourceProvider {
    /// Text of `unit`, or `None` when the provider doesn't know it
    fn load(&mut self, unit: &str) -> Result<Option<String>>;

    /// Name shown in diagnostics for `unit`
    fn display_name(&self, unit: &str) -> String {
        unit.to_string()
    }
}

/// Reads `<root>/<unit>.<extension>`
#[derive(Debug, Clone)]
pub struct FileProvider {
    root: PathBuf,
    extension: String,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn path_of(&self, unit: &str) -> PathBuf {
        self.root.join(format!("{}.{}", unit, self.extension))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceProvider for FileProvider {
    fn load(&mut self, unit: &str) -> Result<Option<String>> {
        let path = self.path_of(unit);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| Error::IoError {
                message: format!("{}: {}", path.display(), e),
            })
    }

    fn display_name(&self, unit: &str) -> String {
        self.path_of(unit).display().to_string()
    }
}

/// In-memory sources keyed by unit name
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    sources: HashMap<String, String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, unit: &str, text: &str) -> Self {
        self.insert(unit, text);
        self
    }

    pub fn insert(&mut self, unit: &str, text: &str) {
        self.sources.insert(unit.to_string(), text.to_string());
    }
}

impl SourceProvider for MemoryProvider {
    fn load(&mut self, unit: &str) -> Result<Option<String>> {
        Ok(self.sources.get(unit).cloned())
    }
}
