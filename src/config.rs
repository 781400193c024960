//! Persisted configuration.
//!
//! The configuration is a small TOML file:
//!
//! ```toml
//! cache = "classweave:disk"
//! dump = "off"            # "off", "on" (changed classes) or "force" (every class)
//! denylist = ["com.example.agent."]
//! dump_dir = "classweave/dump"
//! cache_dir = "classweave/cache"
//! ```
//!
//! [`Configuration::load`] writes the defaults back when the file is missing or lacks a
//! key, so the file always documents every option. Setters mark the configuration dirty and
//! [`Configuration::save`] only touches the disk when something changed.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::Result;

/// Keys that are always written; `cache` is omitted while no cache has been selected.
const KEYS: [&str; 4] = ["dump", "denylist", "dump_dir", "cache_dir"];

/// Which classes are written to the dump directory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DumpMode {
    /// Dump nothing
    #[default]
    Off,
    /// Dump classes that a rule changed
    On,
    /// Dump every class that reaches the pipeline
    Force,
}

/// Runtime options of the transformation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<String>,
    dump: DumpMode,
    denylist: Vec<String>,
    dump_dir: PathBuf,
    cache_dir: PathBuf,
    #[serde(skip)]
    dirty: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            cache: None,
            dump: DumpMode::Off,
            denylist: Vec::new(),
            dump_dir: PathBuf::from("classweave/dump"),
            cache_dir: PathBuf::from("classweave/cache"),
            dirty: false,
        }
    }
}

impl Configuration {
    /// Read the configuration at `path`.
    ///
    /// A missing file yields the defaults, which are written to `path`. A file that lacks
    /// some keys is rewritten with the missing keys filled in.
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] for invalid TOML or values, and
    /// [`crate::Error::FileError`] if the file could not be read or written.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No configuration found, writing defaults");
            let mut config = Configuration::default();
            config.save(path, true)?;
            return Ok(config);
        }

        let text = fs::read_to_string(path)?;
        let table: toml::Table = text.parse()?;
        let incomplete = KEYS.iter().any(|key| !table.contains_key(*key));

        let mut config: Configuration = toml::Value::Table(table).try_into()?;
        if incomplete {
            debug!(path = %path.display(), "Configuration incomplete, rewriting");
            config.save(path, true)?;
        }
        Ok(config)
    }

    /// Write the configuration to `path` if it changed since the last save, or always when
    /// `force` is set. Returns `true` if the file was written.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file could not be written.
    pub fn save(&mut self, path: &Path, force: bool) -> Result<bool> {
        if !force && !self.dirty {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        self.dirty = false;
        Ok(true)
    }

    /// Preferred class cache, as `namespace:name`
    #[must_use]
    pub fn cache(&self) -> Option<&str> {
        self.cache.as_deref()
    }

    /// Change the preferred class cache
    pub fn set_cache(&mut self, cache: Option<String>) {
        if self.cache != cache {
            self.cache = cache;
            self.dirty = true;
        }
    }

    /// Dump mode
    #[must_use]
    pub fn dump(&self) -> DumpMode {
        self.dump
    }

    /// Change the dump mode
    pub fn set_dump(&mut self, dump: DumpMode) {
        if self.dump != dump {
            self.dump = dump;
            self.dirty = true;
        }
    }

    /// Additional class name prefixes that bypass all rules
    #[must_use]
    pub fn denylist(&self) -> &[String] {
        &self.denylist
    }

    /// Add a denied class name prefix
    pub fn deny(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !self.denylist.contains(&prefix) {
            self.denylist.push(prefix);
            self.dirty = true;
        }
    }

    /// Directory classes are dumped to
    #[must_use]
    pub fn dump_dir(&self) -> &Path {
        &self.dump_dir
    }

    /// Change the dump directory
    pub fn set_dump_dir(&mut self, dir: impl Into<PathBuf>) {
        self.dump_dir = dir.into();
        self.dirty = true;
    }

    /// Directory of the built-in disk cache
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Change the cache directory
    pub fn set_cache_dir(&mut self, dir: impl Into<PathBuf>) {
        self.cache_dir = dir.into();
        self.dirty = true;
    }

    /// Returns `true` if a setter changed a value since the last save
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forget pending changes without saving
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/classweave.toml");

        let config = Configuration::load(&path).unwrap();
        assert_eq!(config, Configuration::default());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("dump = \"off\""));
        assert!(!written.contains("cache ="));
    }

    #[test]
    fn partial_file_is_completed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classweave.toml");
        fs::write(&path, "dump = \"force\"\ncache = \"demo:disk\"\n").unwrap();

        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.dump(), DumpMode::Force);
        assert_eq!(config.cache(), Some("demo:disk"));
        assert!(config.denylist().is_empty());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("dump_dir"));
        assert!(written.contains("cache = \"demo:disk\""));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classweave.toml");
        fs::write(&path, "dump = \"sometimes\"\n").unwrap();
        assert!(matches!(Configuration::load(&path), Err(Error::Config(_))));

        fs::write(&path, "dump = [").unwrap();
        assert!(matches!(Configuration::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn save_tracks_dirty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classweave.toml");
        let mut config = Configuration::default();

        assert!(!config.save(&path, false).unwrap());
        assert!(!path.exists());

        config.set_dump(DumpMode::On);
        config.deny("com.example.");
        config.deny("com.example.");
        assert!(config.is_dirty());
        assert!(config.save(&path, false).unwrap());
        assert!(!config.is_dirty());
        assert!(!config.save(&path, false).unwrap());

        let reloaded = Configuration::load(&path).unwrap();
        assert_eq!(reloaded.dump(), DumpMode::On);
        assert_eq!(reloaded.denylist(), ["com.example.".to_string()]);
    }

    #[test]
    fn dump_mode_parses_case_insensitively() {
        assert_eq!("FORCE".parse::<DumpMode>().unwrap(), DumpMode::Force);
        assert_eq!(DumpMode::On.to_string(), "on");
    }
}
