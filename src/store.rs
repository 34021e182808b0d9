//! The Store (C3): in-memory map + secondary indexes + durable log, all
//! serialized behind one exclusive lock.
//!
//! Every mutation follows the same shape: append a single log record and
//! fsync it, *then* apply the in-memory transition. An acknowledged
//! mutation's effects are therefore either all visible and all durable, or
//! neither — this is what makes `bulk_set` all-or-nothing under a crash
//! (Property 5) and what lets a single `set`/`delete` satisfy Property 4.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::info;

use crate::error::{Result, StoreError};
use crate::index::IndexPair;
use crate::log::{LogRecord, LogWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closed,
}

struct Inner {
    map: HashMap<String, String>,
    index: IndexPair,
    log: LogWriter,
    state: State,
}

impl Inner {
    fn apply_set(&mut self, key: &str, value: &str) {
        if let Some(old) = self.map.get(key) {
            self.index.remove(key, old);
        }
        self.map.insert(key.to_string(), value.to_string());
        self.index.add(key, value);
    }

    /// Returns whether `key` existed prior to removal.
    fn apply_delete(&mut self, key: &str) -> bool {
        match self.map.remove(key) {
            Some(old) => {
                self.index.remove(key, &old);
                true
            }
            None => false,
        }
    }
}

/// A handle to a durable, indexed key-value store. Cheaply `Clone`-able;
/// clones share the same underlying lock and log file, matching the pattern
/// a [`crate::server::KvServer`] uses to give every connection handler its
/// own handle onto one store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
}

impl Store {
    /// Open (or create) the store backed by the journal at `path`. Replays
    /// every parseable record in file order to rebuild the map and both
    /// indexes before accepting new mutations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, false)
    }

    /// Like [`Store::open`], with the log writer's unreliable-write fault
    /// injector toggled. Test-only — production callers must use
    /// [`Store::open`].
    pub fn open_with_options(path: impl AsRef<Path>, unreliable: bool) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();

        let mut map = HashMap::new();
        let mut index = IndexPair::new();
        let mut replayed = 0usize;
        LogWriter::replay(&path, |record| {
            replayed += 1;
            // Reuse the exact in-memory transitions `Inner::apply` uses
            // online, via a throwaway `Inner` sharing the accumulators.
            apply_replayed(&mut map, &mut index, &record);
        })?;
        info!("replayed {} record(s) from {:?}", replayed, path);

        let log = LogWriter::open_with_options(&path, unreliable)?;
        info!("store opened at {:?}", path);

        Ok(Store {
            inner: Arc::new(Mutex::new(Inner {
                map,
                index,
                log,
                state: State::Open,
            })),
        })
    }

    /// Last-write-wins overwrite. Logs (and fsyncs) a `SET` record before
    /// the new value becomes visible to other callers.
    pub fn set(&self, key: String, value: String) -> Result<()> {
        let mut inner = self.lock_open()?;
        inner
            .log
            .append(&LogRecord::Set {
                key: key.clone(),
                value: value.clone(),
            })?;
        inner.apply_set(&key, &value);
        Ok(())
    }

    /// Returns the current value for `key`, or `None` if absent.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.lock_open()?;
        Ok(inner.map.get(key).cloned())
    }

    /// Removes `key` if present. Always logs a `DELETE` record (even for an
    /// absent key, matching the reference implementation), then returns
    /// whether the key existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock_open()?;
        inner.log.append(&LogRecord::Delete {
            key: key.to_string(),
        })?;
        Ok(inner.apply_delete(key))
    }

    /// Atomically apply an ordered group of sets: exactly one `BULK_SET` log
    /// record captures the whole group, then every item is applied in
    /// order. An empty `items` list is a no-op (no log record is written).
    pub fn bulk_set(&self, items: Vec<(String, String)>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock_open()?;
        inner.log.append(&LogRecord::BulkSet {
            items: items.clone(),
        })?;
        for (key, value) in &items {
            inner.apply_set(key, value);
        }
        Ok(())
    }

    /// Union full-text search: see [`IndexPair::search_full_text`].
    pub fn search_full_text(&self, query: &str) -> Result<Vec<String>> {
        let inner = self.lock_open()?;
        Ok(inner.index.search_full_text(query))
    }

    /// Cosine-similarity embedding search: see [`IndexPair::search_embedding`].
    pub fn search_embedding(&self, query: &str, top_k: usize) -> Result<Vec<(String, f64)>> {
        let inner = self.lock_open()?;
        Ok(inner.index.search_embedding(query, top_k))
    }

    /// Flush, sync, and mark the store closed. Idempotent: closing an
    /// already-closed store is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Closed {
            return Ok(());
        }
        inner.log.sync()?;
        inner.state = State::Closed;
        info!("store closed");
        Ok(())
    }

    fn lock_open(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let inner = self.inner.lock().unwrap();
        if inner.state == State::Closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }
}

fn apply_replayed(map: &mut HashMap<String, String>, index: &mut IndexPair, record: &LogRecord) {
    let apply_set = |map: &mut HashMap<String, String>, index: &mut IndexPair, key: &str, value: &str| {
        if let Some(old) = map.get(key) {
            index.remove(key, old);
        }
        map.insert(key.to_string(), value.to_string());
        index.add(key, value);
    };

    match record {
        LogRecord::Set { key, value } => apply_set(map, index, key, value),
        LogRecord::Delete { key } => {
            if let Some(old) = map.remove(key) {
                index.remove(key, &old);
            }
        }
        LogRecord::BulkSet { items } => {
            for (key, value) in items {
                apply_set(map, index, key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("data.log")).unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.set("foo".into(), "bar".into()).unwrap();
        assert_eq!(store.get("foo").unwrap(), Some("bar".to_string()));
    }

    #[test]
    fn overwrite_is_last_write_wins() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.set("k".into(), "v1".into()).unwrap();
        store.set("k".into(), "v2".into()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn get_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn delete_erases_and_reports_existed() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.set("k".into(), "v".into()).unwrap();
        assert!(store.delete("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn bulk_set_applies_all_items_in_order() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store
            .bulk_set(vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
                ("c".into(), "3".into()),
            ])
            .unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.get("b").unwrap(), Some("2".to_string()));
        assert_eq!(store.get("c").unwrap(), Some("3".to_string()));
    }

    #[test]
    fn bulk_set_empty_is_noop() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.bulk_set(vec![]).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        {
            let store = Store::open(&path).unwrap();
            store
                .set("persist_key".into(), "persist_value".into())
                .unwrap();
            store.close().unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(
            store.get("persist_key").unwrap(),
            Some("persist_value".to_string())
        );
    }

    #[test]
    fn replay_rebuilds_indexes_too() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        {
            let store = Store::open(&path).unwrap();
            store.set("k1".into(), "the quick brown fox".into()).unwrap();
            store.close().unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.search_full_text("quick").unwrap(), vec!["k1".to_string()]);
    }

    #[test]
    fn overwrite_removes_old_value_from_full_text_index() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.set("k".into(), "alpha".into()).unwrap();
        store.set("k".into(), "beta".into()).unwrap();
        assert!(store.search_full_text("alpha").unwrap().is_empty());
        assert_eq!(store.search_full_text("beta").unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.close().unwrap();
        store.close().unwrap();
    }

    #[test]
    fn mutations_after_close_are_rejected() {
        let dir = tempdir().unwrap();
        let store = open(&dir);
        store.close().unwrap();
        match store.set("k".into(), "v".into()) {
            Err(StoreError::Closed) => {}
            other => panic!("expected Closed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn delete_logs_even_for_absent_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        {
            let store = Store::open(&path).unwrap();
            assert!(!store.delete("never-set").unwrap());
            store.close().unwrap();
        }
        // A DELETE record for a never-seen key is harmless on replay.
        let store = Store::open(&path).unwrap();
        assert_eq!(store.get("never-set").unwrap(), None);
    }

    #[test]
    fn concurrent_bulk_sets_leave_one_consistent_winner() {
        use std::thread;

        let dir = tempdir().unwrap();
        let store = open(&dir);
        let keys: Vec<String> = (0..5).map(|i| format!("k{}", i)).collect();

        let handles: Vec<_> = ["v1", "v2"]
            .iter()
            .map(|tag| {
                let store = store.clone();
                let keys = keys.clone();
                let tag = tag.to_string();
                thread::spawn(move || {
                    for _ in 0..20 {
                        let items: Vec<(String, String)> =
                            keys.iter().map(|k| (k.clone(), tag.clone())).collect();
                        store.bulk_set(items).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let values: Vec<String> = keys
            .iter()
            .map(|k| store.get(k).unwrap().unwrap())
            .collect();
        let distinct: std::collections::HashSet<&String> = values.iter().collect();
        assert_eq!(distinct.len(), 1);
    }
}
