//! Configuration file handling for mortar.
//!
//! Looks for `.config/mortar.toml` in the current directory or any parent directory.

use mortar::OrphanRef;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = ".config/mortar.toml";

/// Contents of `.config/mortar.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Connection string, overridden by `DATABASE_URL` and `--database-url`
    pub database_url: Option<String>,
    /// TOML spec file, relative to the project root; the built-in school
    /// catalog when absent
    pub specs: Option<PathBuf>,
    /// References checked by `status` and cleaned by `clean-orphans`
    #[serde(default, rename = "orphan")]
    pub orphans: Vec<OrphanRef>,
}

/// A loaded config and the file it came from.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub config: Config,
    pub path: PathBuf,
}

impl Loaded {
    /// The directory relative `specs` paths resolve against: the one
    /// containing `.config/`, or the config file's own directory when it
    /// lives anywhere else.
    pub fn project_root(&self) -> &Path {
        let dir = match self.path.parent() {
            Some(dir) if dir.as_os_str().is_empty() => return Path::new("."),
            Some(dir) => dir,
            None => return Path::new("."),
        };
        if dir.file_name().is_some_and(|name| name == ".config") {
            dir.parent().unwrap_or(dir)
        } else {
            dir
        }
    }

    /// Where the spec file lives, if one is configured.
    pub fn specs_path(&self) -> Option<PathBuf> {
        self.config
            .specs
            .as_ref()
            .map(|specs| self.project_root().join(specs))
    }
}

/// Load configuration from `.config/mortar.toml`, searching up the directory tree.
///
/// Returns `Ok(None)` when there is no config file anywhere up the tree.
pub fn load() -> Result<Option<Loaded>, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    match find_config_file(&cwd) {
        Some(path) => load_file(&path).map(Some),
        None => Ok(None),
    }
}

/// Load a specific config file.
pub fn load_file(path: &Path) -> Result<Loaded, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    Ok(Loaded {
        config,
        path: path.to_path_buf(),
    })
}

/// Find `.config/mortar.toml` by searching up the directory tree.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the file
    #[error("failed to read config {0}")]
    Io(String),
    /// Invalid TOML or unknown keys
    #[error("failed to parse config {0}")]
    Parse(String),
}
