//! IPE Project Manifest (ipe.toml) Parser
//!
//! Handles parsing and validation of ipe.toml project configuration files.

use std::path::{Path, PathBuf};

use ipe_core::VmConfig;
use serde::{Deserialize, Serialize};

use crate::compiler::CompilerConfig;
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "ipe.toml";

/// IPE project manifest (ipe.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package metadata
    pub package: Package,

    /// Build configuration
    #[serde(default)]
    pub build: BuildConfig,

    /// Virtual machine settings used by `ipe run`
    #[serde(default)]
    pub vm: VmConfig,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Package authors
    #[serde(default)]
    pub authors: Vec<String>,

    /// Package description
    #[serde(default)]
    pub description: Option<String>,
}

/// Build configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program source (default: src/main.ipe)
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Directory imports are looked up in (default: src)
    #[serde(default = "default_search_root")]
    pub search_root: String,

    /// Source file extension (default: ipe)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Output directory (default: target)
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            search_root: default_search_root(),
            extension: default_extension(),
            output: default_output(),
        }
    }
}

fn default_entry() -> String {
    "src/main.ipe".to_string()
}

fn default_search_root() -> String {
    "src".to_string()
}

fn default_extension() -> String {
    "ipe".to_string()
}

fn default_output() -> String {
    "target".to_string()
}

impl Manifest {
    /// Parse a manifest from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Manifest(format!("Failed to parse ipe.toml: {}", e)))
    }

    /// Load manifest from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Manifest(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Find and load manifest by searching up from `start_dir`
    pub fn find_and_load(start_dir: &Path) -> Result<(Self, PathBuf)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let manifest_path = current.join(MANIFEST_FILE);
            if manifest_path.exists() {
                let manifest = Self::from_file(&manifest_path)?;
                return Ok((manifest, current));
            }

            if !current.pop() {
                return Err(Error::Manifest(
                    "No ipe.toml found in current directory or any parent directory".to_string(),
                ));
            }
        }
    }

    /// Serialize manifest to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Manifest(format!("Failed to serialize manifest: {}", e)))
    }

    /// Get the resolved entry point path
    pub fn entry_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.build.entry)
    }

    /// Get the resolved output directory
    pub fn output_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.build.output)
    }

    /// Compiler settings for this project
    pub fn compiler_config(&self, project_root: &Path) -> CompilerConfig {
        CompilerConfig {
            search_root: project_root.join(&self.build.search_root),
            extension: self.build.extension.clone(),
            builtin_sistema: true,
        }
    }
}

/// Create a new manifest for project scaffolding
pub fn create_manifest(name: &str, authors: Vec<String>) -> Manifest {
    Manifest {
        package: Package {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            authors,
            description: Some(format!("Um programa IPE: {}", name)),
        },
        build: BuildConfig::default(),
        vm: VmConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipe_core::DivisionByZero;

    #[test]
    fn test_parse_minimal_manifest() {
        let toml = r#"
[package]
name = "ola"
version = "0.1.0"
"#;

        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.package.name, "ola");
        assert_eq!(manifest.build.entry, "src/main.ipe");
        assert_eq!(manifest.build.extension, "ipe");
        assert_eq!(manifest.vm, VmConfig::default());
    }

    #[test]
    fn test_parse_vm_section() {
        let toml = r#"
[package]
name = "ola"
version = "0.1.0"

[build]
search_root = "lib"

[vm]
max_cycles = 1000
division_by_zero = "zero"
"#;

        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.build.search_root, "lib");
        assert_eq!(manifest.vm.max_cycles, Some(1000));
        assert_eq!(manifest.vm.division_by_zero, DivisionByZero::Zero);
    }

    #[test]
    fn test_invalid_manifest() {
        let err = Manifest::parse("[package]\nname = 3").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_create_and_round_trip() {
        let manifest = create_manifest("ola", vec!["Ana".to_string()]);
        let text = manifest.to_toml().unwrap();
        let parsed = Manifest::parse(&text).unwrap();
        assert_eq!(parsed.package.authors, vec!["Ana".to_string()]);
        assert_eq!(parsed.build.output, "target");
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = create_manifest("ola", Vec::new());
        std::fs::write(dir.path().join(MANIFEST_FILE), manifest.to_toml().unwrap()).unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let (found, root) = Manifest::find_and_load(&nested).unwrap();
        assert_eq!(found.package.name, "ola");
        assert_eq!(root, dir.path());

        let config = found.compiler_config(&root);
        assert_eq!(config.search_root, dir.path().join("src"));
    }
}
