//! Content-addressed on-disk [`ClassCache`].
//!
//! Entries are keyed by the SHA-1 of the original class bytes and held in a [`DashMap`]
//! while the process runs. Each entry is persisted as its own file, `<hex digest>.bin`,
//! below the cache directory, so saving only ever writes entries that were added since the
//! last save and a damaged file costs one entry rather than the whole cache.
//!
//! Loading reads the entry files in parallel with [`rayon`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use dashmap::{DashMap, DashSet};
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::{
    transform::{ClassCache, Identifier},
    utils::fs::write_creating_parents,
    Result,
};

const EXTENSION: &str = "bin";

type Key = [u8; 20];

/// A [`ClassCache`] persisted as one file per entry.
pub struct DiskCache {
    name: Identifier,
    dir: PathBuf,
    entries: DashMap<Key, Vec<u8>>,
    unsaved: DashSet<Key>,
}

impl DiskCache {
    /// Name of the cache when created through [`DiskCache::new`]
    pub const DEFAULT_NAME: (&'static str, &'static str) = ("classweave", "disk");

    /// Cache stored below `dir`, named `classweave:disk`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (namespace, name) = Self::DEFAULT_NAME;
        Self::with_name(Identifier::new(namespace, name), dir)
    }

    /// Cache stored below `dir` with a custom name
    pub fn with_name(name: Identifier, dir: impl Into<PathBuf>) -> Self {
        DiskCache {
            name,
            dir: dir.into(),
            entries: DashMap::new(),
            unsaved: DashSet::new(),
        }
    }

    /// Directory holding the entry files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of entries held in memory
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(original: &[u8]) -> Key {
        Sha1::digest(original).into()
    }

    fn entry_path(&self, key: &Key) -> PathBuf {
        let hex: String = key.iter().map(|byte| format!("{byte:02x}")).collect();
        self.dir.join(format!("{hex}.{EXTENSION}"))
    }
}

fn parse_key(path: &Path) -> Option<Key> {
    if path.extension()? != EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() != 40 || !stem.is_ascii() {
        return None;
    }

    let mut key = [0u8; 20];
    for (index, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&stem[index * 2..index * 2 + 2], 16).ok()?;
    }
    Some(key)
}

impl ClassCache for DiskCache {
    fn name(&self) -> &Identifier {
        &self.name
    }

    fn load(&self) -> Result<()> {
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "Cache directory missing, starting empty");
            return Ok(());
        }

        let files = fs::read_dir(&self.dir)?
            .map(|entry| -> Result<PathBuf> { Ok(entry?.path()) })
            .collect::<Result<Vec<_>>>()?;

        let loaded = files
            .par_iter()
            .filter_map(|path| match parse_key(path) {
                Some(key) => Some((key, path)),
                None => {
                    debug!(path = %path.display(), "Ignoring foreign file in cache directory");
                    None
                }
            })
            .map(|(key, path)| -> Result<(Key, Vec<u8>)> { Ok((key, fs::read(path)?)) })
            .collect::<Result<Vec<_>>>()?;

        info!(entries = loaded.len(), dir = %self.dir.display(), "Loaded class cache");
        for (key, bytes) in loaded {
            self.entries.insert(key, bytes);
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let pending: Vec<Key> = self.unsaved.iter().map(|key| *key).collect();
        for key in pending {
            if let Some(bytes) = self.entries.get(&key) {
                write_creating_parents(&self.entry_path(&key), bytes.value())?;
            }
            self.unsaved.remove(&key);
        }
        Ok(())
    }

    fn get(&self, original: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&Self::key(original))
            .map(|entry| entry.value().clone()))
    }

    fn put(&self, original: &[u8], transformed: &[u8]) -> Result<()> {
        let key = Self::key(original);
        self.entries.insert(key, transformed.to_vec());
        self.unsaved.insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache"));
        cache.load().unwrap();
        assert!(cache.is_empty());

        cache.put(b"original", b"transformed").unwrap();
        assert_eq!(cache.get(b"original").unwrap(), Some(b"transformed".to_vec()));
        assert_eq!(cache.get(b"other").unwrap(), None);
        cache.save().unwrap();

        let files: Vec<_> = fs::read_dir(cache.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);

        let reopened = DiskCache::new(dir.path().join("cache"));
        reopened.load().unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.get(b"original").unwrap(),
            Some(b"transformed".to_vec())
        );
        assert_eq!(reopened.name().to_string(), "classweave:disk");
    }

    #[test]
    fn foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("zz.bin"), b"short name").unwrap();

        let cache = DiskCache::new(dir.path());
        cache.load().unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn key_round_trips_through_file_name() {
        let cache = DiskCache::new("/cache");
        let key = DiskCache::key(b"abc");
        assert_eq!(parse_key(&cache.entry_path(&key)), Some(key));
        assert_eq!(
            cache.entry_path(&key),
            PathBuf::from("/cache/a9993e364706816aba3e25717850c26c9cd0d89d.bin")
        );
    }
}
