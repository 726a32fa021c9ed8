//! C4: Version List. The set of all File Histories on this peer, plus a
//! secondary index from current path to history, persisted as one JSON
//! document and rebuilt/maintained incrementally per §3 and §4.C4.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DistriboxError, Result};
use crate::history::FileHistory;
use crate::ids::{FileId, Tick};

#[derive(Debug, Default, Serialize, Deserialize)]
struct VersionListDocument {
    histories: Vec<FileHistory>,
}

pub struct VersionList {
    path: PathBuf,
    by_id: HashMap<FileId, FileHistory>,
    by_name: HashMap<String, FileId>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VersionListStats {
    pub total_histories: usize,
    pub alive_histories: usize,
}

impl VersionList {
    /// Loads `path` if it exists, else starts empty. Rebuilds the
    /// secondary index from scratch either way — it is never itself
    /// persisted (§3).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut list = Self {
            path,
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        };
        if list.path.exists() {
            let raw = fs::read_to_string(&list.path)?;
            let document: VersionListDocument = serde_json::from_str(&raw)?;
            for history in document.histories {
                list.index(history);
            }
        }
        Ok(list)
    }

    fn index(&mut self, history: FileHistory) {
        if history.is_alive() {
            if let Some(name) = history.current_name() {
                self.by_name.insert(name.to_string(), history.file_id());
            }
        }
        self.by_id.insert(history.file_id(), history);
    }

    fn reindex_name(&mut self, file_id: FileId) {
        self.by_name.retain(|_, id| *id != file_id);
        if let Some(history) = self.by_id.get(&file_id) {
            if history.is_alive() {
                if let Some(name) = history.current_name() {
                    self.by_name.insert(name.to_string(), file_id);
                }
            }
        }
    }

    pub fn histories(&self) -> impl Iterator<Item = &FileHistory> {
        self.by_id.values()
    }

    pub fn history(&self, file_id: FileId) -> Option<&FileHistory> {
        self.by_id.get(&file_id)
    }

    /// The unique alive history currently at `name`, if any. A name once
    /// held by a now-Deleted history is not resolved here — the next
    /// Create starts a fresh history (§4.C4).
    pub fn alive_by_name(&self, name: &str) -> Option<&FileHistory> {
        self.by_name
            .get(name)
            .and_then(|file_id| self.by_id.get(file_id))
    }

    pub fn stats(&self) -> VersionListStats {
        VersionListStats {
            total_histories: self.by_id.len(),
            alive_histories: self.by_name.len(),
        }
    }

    pub fn create(&mut self, name: &str, is_directory: bool, when: Tick) -> Result<FileId> {
        let file_id = FileId::new();
        let mut history = FileHistory::new(file_id, is_directory);
        history.create(name, when)?;
        self.index(history);
        Ok(file_id)
    }

    pub fn change(
        &mut self,
        name: &str,
        new_sha1: Option<String>,
        size: u64,
        when: Tick,
    ) -> Result<FileId> {
        let file_id = self.require_alive(name)?;
        let history = self.by_id.get_mut(&file_id).expect("indexed");
        history.change(new_sha1, size, when)?;
        Ok(file_id)
    }

    /// `sha1` is passed when the detector hashes on rename because some
    /// platforms report content edits as renames (§4.C4); if it differs
    /// from the current digest this additionally appends a Changed event.
    pub fn rename(
        &mut self,
        old_name: &str,
        new_name: &str,
        sha1: Option<String>,
        size: u64,
        when: Tick,
    ) -> Result<FileId> {
        let file_id = self.require_alive(old_name)?;
        let needs_change = {
            let history = self.by_id.get(&file_id).expect("indexed");
            let current_sha1 = history.current().and_then(|event| event.sha1.clone());
            sha1.as_ref().is_some_and(|new| Some(new) != current_sha1.as_ref())
        };
        let history = self.by_id.get_mut(&file_id).expect("indexed");
        history.rename(new_name, when)?;
        if needs_change {
            let next_tick = Tick::after(history.current().map(|event| event.when));
            history.change(sha1, size, next_tick)?;
        }
        self.reindex_name(file_id);
        Ok(file_id)
    }

    pub fn delete(&mut self, name: &str, when: Tick) -> Result<FileId> {
        let file_id = self.require_alive(name)?;
        let history = self.by_id.get_mut(&file_id).expect("indexed");
        history.delete(when)?;
        self.by_name.remove(name);
        Ok(file_id)
    }

    fn require_alive(&self, name: &str) -> Result<FileId> {
        self.by_name.get(name).copied().ok_or_else(|| {
            DistriboxError::logic(format!("no alive history at name {name}"))
        })
    }

    /// Inserts a history received over a bundle that has no local
    /// counterpart yet (§4.C7 step 5), returning a mutable handle to it.
    pub fn get_or_insert_foreign(&mut self, file_id: FileId, is_directory: bool) -> &mut FileHistory {
        self.by_id
            .entry(file_id)
            .or_insert_with(|| FileHistory::new(file_id, is_directory))
    }

    pub fn reindex_after_merge(&mut self, file_id: FileId) {
        self.reindex_name(file_id);
    }

    pub fn flush(&self) -> Result<()> {
        let document = VersionListDocument {
            histories: self.by_id.values().cloned().collect(),
        };
        let serialized = serde_json::to_string_pretty(&document)?;
        write_atomic(&self.path, serialized.as_bytes())?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_change_rename_delete_lifecycle() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("VersionList.txt");
        let mut list = VersionList::open(&path)?;

        list.create("a.txt", false, Tick::from_raw(1))?;
        assert!(list.alive_by_name("a.txt").is_some());

        list.change(
            "a.txt",
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".into()),
            5,
            Tick::from_raw(2),
        )?;
        let history = list.alive_by_name("a.txt").unwrap();
        assert_eq!(history.events().len(), 2);

        list.rename("a.txt", "b.txt", None, 0, Tick::from_raw(3))?;
        assert!(list.alive_by_name("a.txt").is_none());
        assert!(list.alive_by_name("b.txt").is_some());

        list.delete("b.txt", Tick::from_raw(4))?;
        assert!(list.alive_by_name("b.txt").is_none());

        list.flush()?;
        assert!(path.exists());

        let reloaded = VersionList::open(&path)?;
        let stats = reloaded.stats();
        assert_eq!(stats.total_histories, 1);
        assert_eq!(stats.alive_histories, 0);
        Ok(())
    }

    #[test]
    fn rename_with_differing_sha1_also_appends_change() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut list = VersionList::open(tmp.path().join("VersionList.txt"))?;
        list.create("a.txt", false, Tick::from_raw(1))?;
        list.rename(
            "a.txt",
            "b.txt",
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".into()),
            5,
            Tick::from_raw(2),
        )?;
        let history = list.alive_by_name("b.txt").unwrap();
        assert_eq!(history.events().len(), 3);
        assert_eq!(
            history.current().unwrap().sha1.as_deref(),
            Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
        );
        Ok(())
    }

    #[test]
    fn change_on_unknown_name_is_logic_error() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut list = VersionList::open(tmp.path().join("VersionList.txt"))?;
        assert!(list.change("missing.txt", None, 0, Tick::from_raw(1)).is_err());
        Ok(())
    }

    #[test]
    fn by_name_index_is_one_to_one_for_alive_histories() -> Result<()> {
        let tmp = TempDir::new()?;
        let mut list = VersionList::open(tmp.path().join("VersionList.txt"))?;
        list.create("a.txt", false, Tick::from_raw(1))?;
        list.create("b.txt", false, Tick::from_raw(2))?;
        assert_eq!(list.stats().alive_histories, 2);
        list.delete("a.txt", Tick::from_raw(3))?;
        assert_eq!(list.stats().alive_histories, 1);
        Ok(())
    }
}
