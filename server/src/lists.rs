//! File-backed player lists
//!
//! Two shapes cover every persisted collection the server reads during
//! admission:
//! - [`NameList`]: a set of names or addresses (whitelist, VIPs, banned IPs)
//! - [`KeyedList`]: a map from name to a line of data (bans, ranks)
//!
//! Both keep their contents in memory behind a `parking_lot::RwLock` and are
//! safe to share between concurrent admissions. Keys compare
//! case-insensitively. A list without a path is purely in-memory, which is
//! what most tests use.
//!
//! Saves are serialized through a dedicated mutex and written atomically:
//! the new contents go to `<file>.tmp` which then replaces the original, so a
//! crash mid-save never leaves a truncated list behind.

use crate::error::{StoreError, StoreResult};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

fn read_lines(path: &Path) -> StoreResult<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomic(path: &Path, contents: &str) -> StoreResult<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// A persisted set of names.
#[derive(Debug, Default)]
pub struct NameList {
    path: Option<PathBuf>,
    entries: RwLock<BTreeSet<String>>,
    save_lock: Mutex<()>,
}

impl NameList {
    /// Creates an empty list that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the list at `path`. A missing file is an empty list.
    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries: BTreeSet<String> = read_lines(&path)?
            .iter()
            .map(|line| normalize(line))
            .collect();
        info!("Loaded {} entries from {}", entries.len(), path.display());
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            save_lock: Mutex::new(()),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains(&normalize(name))
    }

    /// Returns false if the name was already present.
    pub fn add(&self, name: &str) -> bool {
        self.entries.write().insert(normalize(name))
    }

    /// Returns false if the name was not present.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(&normalize(name))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn save(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock();
        let contents: String = self
            .entries
            .read()
            .iter()
            .map(|name| format!("{}\n", name))
            .collect();
        write_atomic(path, &contents)
    }
}

/// A persisted map from name to one line of free-form data.
///
/// The data format belongs to the owner of the list; this type only stores
/// and persists it.
#[derive(Debug, Default)]
pub struct KeyedList {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, String>>,
    save_lock: Mutex<()>,
}

impl KeyedList {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads `key data...` lines from `path`.
    ///
    /// Lines without data are skipped with a warning rather than failing the
    /// whole load.
    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let mut entries = BTreeMap::new();
        for line in read_lines(&path)? {
            match line.split_once(' ') {
                Some((key, data)) => {
                    entries.insert(normalize(key), data.trim().to_string());
                }
                None => warn!("Skipping malformed line in {}: {}", path.display(), line),
            }
        }
        info!("Loaded {} entries from {}", entries.len(), path.display());
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            save_lock: Mutex::new(()),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(&normalize(key))
    }

    pub fn find(&self, key: &str) -> Option<String> {
        self.entries.read().get(&normalize(key)).cloned()
    }

    /// Inserts or replaces the data for `key`.
    pub fn set(&self, key: &str, data: impl Into<String>) {
        self.entries.write().insert(normalize(key), data.into());
    }

    /// Returns false if the key was not present, so a racing second removal
    /// is a harmless no-op.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(&normalize(key)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn save(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock();
        let contents: String = self
            .entries
            .read()
            .iter()
            .map(|(key, data)| format!("{} {}\n", key, data))
            .collect();
        write_atomic(path, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_list_case_insensitive() {
        let list = NameList::in_memory();
        assert!(list.add("Alice"));
        assert!(!list.add("ALICE"));
        assert!(list.contains("alice"));
        assert_eq!(list.len(), 1);

        assert!(list.remove("aLiCe"));
        assert!(!list.remove("alice"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_name_list_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vip.txt");

        let list = NameList::load(&path).unwrap();
        assert!(list.is_empty());
        list.add("Alice");
        list.add("bob");
        list.save().unwrap();

        let reloaded = NameList::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("ALICE"));
        assert!(reloaded.contains("Bob"));
        assert!(!path.with_extension("txt.tmp").exists());
    }

    #[test]
    fn test_name_list_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.txt");
        fs::write(&path, "# comment\n\nalice\n  bob  \n").unwrap();

        let list = NameList::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("bob"));
    }

    #[test]
    fn test_keyed_list_find_and_remove() {
        let list = KeyedList::in_memory();
        list.set("Alice", "some data here");

        assert!(list.contains("alice"));
        assert_eq!(list.find("ALICE").as_deref(), Some("some data here"));
        assert!(list.remove("alice"));
        assert!(!list.remove("alice"));
        assert_eq!(list.find("alice"), None);
    }

    #[test]
    fn test_keyed_list_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("ranks.txt");

        let list = KeyedList::load(&path).unwrap();
        list.set("Alice", "80");
        list.set("bob", "30 extra words");
        list.save().unwrap();

        let reloaded = KeyedList::load(&path).unwrap();
        assert_eq!(reloaded.find("alice").as_deref(), Some("80"));
        assert_eq!(reloaded.find("bob").as_deref(), Some("30 extra words"));
    }

    #[test]
    fn test_keyed_list_skips_lines_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.txt");
        fs::write(&path, "lonelykey\nalice data\n").unwrap();

        let list = KeyedList::load(&path).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.contains("alice"));
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let list = KeyedList::in_memory();
        list.set("alice", "x");
        assert!(list.save().is_ok());
    }
}
