use std::{
    path::Path,
    time::{Duration, Instant},
};

use redb::{
    Database,
    DatabaseError,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    Table,
    TableDefinition,
    backends::InMemoryBackend,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

const PAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("pages");
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// How long to sleep between attempts to acquire the database file lock.
const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Default wait for the database file lock before giving up.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

type Records<'txn> = Table<'txn, &'static str, &'static [u8]>;

/// The independently keyed collections held by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Pages,
    Users,
}

impl Collection {
    fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Collection::Pages => PAGES,
            Collection::Users => USERS,
        }
    }

    /// Singular noun used in `NotFound` / `Conflict` errors.
    pub fn kind(self) -> &'static str {
        match self {
            Collection::Pages => "page",
            Collection::Users => "user",
        }
    }
}

/// Transactional key-value store holding the canonical page and user records.
///
/// Every mutation runs in its own redb write transaction, so concurrent
/// readers observe either the whole change or none of it.
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    /// Open or create the store at `path`.
    ///
    /// If another handle holds the database lock, retries until `timeout`
    /// elapses and then fails with [`Error::StoreUnavailable`].
    pub fn open(path: &Path, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let db = loop {
            match Database::create(path) {
                Ok(db) => break db,
                Err(DatabaseError::DatabaseAlreadyOpen)
                    if Instant::now() < deadline =>
                {
                    std::thread::sleep(OPEN_RETRY_INTERVAL);
                }
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    return Err(Error::StoreUnavailable(format!(
                        "record store is locked by another process \
                         (waited {}ms)",
                        timeout.as_millis()
                    )));
                }
                Err(err) => return Err(redb::Error::from(err).into()),
            }
        };
        Self::initialize(db)
    }

    /// Create a store backed by memory only (for tests and throwaway runs).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(redb::Error::from)?;
        Self::initialize(db)
    }

    fn initialize(db: Database) -> Result<Self> {
        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(PAGES)?;
        txn.open_table(USERS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` against the collection's table inside one write transaction.
    ///
    /// The transaction commits only if `f` succeeds; otherwise it is aborted
    /// and nothing `f` did becomes visible.
    fn write<T>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut Records<'_>) -> Result<T>,
    ) -> Result<T> {
        let txn = self.db.begin_write()?;
        let outcome = {
            let mut table = txn.open_table(collection.definition())?;
            f(&mut table)
        };
        match outcome {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort()?;
                Err(err)
            }
        }
    }

    /// Insert or overwrite `key`.
    pub fn put(
        &self,
        collection: Collection,
        key: &str,
        value: &[u8],
    ) -> Result<()> {
        self.write(collection, |table| {
            table.insert(key, value)?;
            Ok(())
        })
    }

    /// Insert `key`, failing with `Conflict` if it already exists.
    pub fn insert_new(
        &self,
        collection: Collection,
        key: &str,
        value: &[u8],
    ) -> Result<()> {
        self.write(collection, |table| {
            if table.get(key)?.is_some() {
                return Err(Error::conflict(collection.kind(), key));
            }
            table.insert(key, value)?;
            Ok(())
        })
    }

    /// Overwrite `key`, failing with `NotFound` if it does not exist.
    pub fn replace_existing(
        &self,
        collection: Collection,
        key: &str,
        value: &[u8],
    ) -> Result<()> {
        self.write(collection, |table| {
            if table.get(key)?.is_none() {
                return Err(Error::not_found(collection.kind(), key));
            }
            table.insert(key, value)?;
            Ok(())
        })
    }

    /// Fetch the raw value for `key`; `None` when absent.
    pub fn get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(collection.definition())?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    pub fn exists(&self, collection: Collection, key: &str) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(collection.definition())?;
        Ok(table.get(key)?.is_some())
    }

    /// Remove `key`. Returns whether anything was removed.
    pub fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        self.write(collection, |table| Ok(table.remove(key)?.is_some()))
    }

    /// Move the record at `old_key` to `new_key` in a single transaction.
    ///
    /// Fails with `Conflict` if `new_key` is taken (checked first, so two
    /// racing renames to the same target resolve to one success and one
    /// conflict) and with `NotFound` if `old_key` is absent.
    pub fn rename(
        &self,
        collection: Collection,
        old_key: &str,
        new_key: &str,
    ) -> Result<()> {
        self.write(collection, |table| {
            if table.get(new_key)?.is_some() {
                return Err(Error::conflict(collection.kind(), new_key));
            }
            let value = match table.get(old_key)? {
                Some(guard) => guard.value().to_vec(),
                None => {
                    return Err(Error::not_found(collection.kind(), old_key));
                }
            };
            table.insert(new_key, value.as_slice())?;
            table.remove(old_key)?;
            Ok(())
        })
    }

    pub fn count(&self, collection: Collection) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(collection.definition())?;
        Ok(table.len()? as usize)
    }

    /// All keys in the collection, in key order.
    pub fn keys(&self, collection: Collection) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(collection.definition())?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            result.push(k.value().to_string());
        }
        Ok(result)
    }

    /// Return all (key, value) pairs in a single read transaction.
    pub fn entries(
        &self,
        collection: Collection,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(collection.definition())?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(result)
    }

    // -- Typed records --

    pub fn put_json<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        record: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.put(collection, key, &bytes)
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>> {
        match self.get(collection, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    fn test_store() -> (tempfile::TempDir, RecordStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            RecordStore::open(&tmp.path().join("records.redb"), DEFAULT_OPEN_TIMEOUT)
                .unwrap();
        (tmp, store)
    }

    #[test]
    fn pages_crud() {
        let (_tmp, store) = test_store();

        assert_eq!(store.get(Collection::Pages, "intro").unwrap(), None);
        assert!(!store.exists(Collection::Pages, "intro").unwrap());

        store.put(Collection::Pages, "intro", b"v1").unwrap();
        assert_eq!(
            store.get(Collection::Pages, "intro").unwrap(),
            Some(b"v1".to_vec())
        );

        store.put(Collection::Pages, "intro", b"v2").unwrap();
        assert_eq!(
            store.get(Collection::Pages, "intro").unwrap(),
            Some(b"v2".to_vec())
        );
        assert_eq!(store.count(Collection::Pages).unwrap(), 1);

        assert!(store.delete(Collection::Pages, "intro").unwrap());
        assert!(!store.delete(Collection::Pages, "intro").unwrap());
        assert_eq!(store.count(Collection::Pages).unwrap(), 0);
    }

    #[test]
    fn collections_are_independent() {
        let store = RecordStore::open_in_memory().unwrap();

        store.put(Collection::Pages, "same", b"page").unwrap();
        store.put(Collection::Users, "same", b"user").unwrap();

        assert_eq!(
            store.get(Collection::Pages, "same").unwrap(),
            Some(b"page".to_vec())
        );
        assert_eq!(
            store.get(Collection::Users, "same").unwrap(),
            Some(b"user".to_vec())
        );
        store.delete(Collection::Users, "same").unwrap();
        assert!(store.exists(Collection::Pages, "same").unwrap());
    }

    #[test]
    fn rename_moves_record() {
        let store = RecordStore::open_in_memory().unwrap();
        store.put(Collection::Pages, "a", b"data").unwrap();

        store.rename(Collection::Pages, "a", "b").unwrap();

        assert_eq!(store.get(Collection::Pages, "a").unwrap(), None);
        assert_eq!(
            store.get(Collection::Pages, "b").unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[test]
    fn rename_onto_existing_key_conflicts_and_changes_nothing() {
        let store = RecordStore::open_in_memory().unwrap();
        store.put(Collection::Pages, "a", b"first").unwrap();
        store.put(Collection::Pages, "b", b"second").unwrap();

        let err = store.rename(Collection::Pages, "a", "b").unwrap_err();
        assert!(err.is_conflict());

        assert_eq!(
            store.get(Collection::Pages, "a").unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(
            store.get(Collection::Pages, "b").unwrap(),
            Some(b"second".to_vec())
        );
    }

    #[test]
    fn rename_missing_source_is_not_found() {
        let store = RecordStore::open_in_memory().unwrap();
        let err = store.rename(Collection::Pages, "ghost", "b").unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists(Collection::Pages, "b").unwrap());
    }

    #[test]
    fn concurrent_renames_to_same_target_resolve_once() {
        let (_tmp, store) = test_store();
        let store = Arc::new(store);
        store.put(Collection::Pages, "a", b"data").unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.rename(Collection::Pages, "a", "b")
                })
            })
            .collect();

        let outcomes: Vec<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| r.as_ref().is_err_and(Error::is_conflict))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        assert!(!store.exists(Collection::Pages, "a").unwrap());
        assert_eq!(
            store.get(Collection::Pages, "b").unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[test]
    fn insert_new_and_replace_existing() {
        let store = RecordStore::open_in_memory().unwrap();

        let err = store
            .replace_existing(Collection::Users, "alice", b"x")
            .unwrap_err();
        assert!(err.is_not_found());

        store.insert_new(Collection::Users, "alice", b"x").unwrap();
        let err = store.insert_new(Collection::Users, "alice", b"y").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            store.get(Collection::Users, "alice").unwrap(),
            Some(b"x".to_vec())
        );

        store
            .replace_existing(Collection::Users, "alice", b"z")
            .unwrap();
        assert_eq!(
            store.get(Collection::Users, "alice").unwrap(),
            Some(b"z".to_vec())
        );
    }

    #[test]
    fn keys_are_sorted() {
        let store = RecordStore::open_in_memory().unwrap();
        for key in ["m", "z", "a"] {
            store.put(Collection::Pages, key, b"").unwrap();
        }
        assert_eq!(store.keys(Collection::Pages).unwrap(), vec!["a", "m", "z"]);
        assert_eq!(store.entries(Collection::Pages).unwrap().len(), 3);
    }

    #[test]
    fn json_records_roundtrip() {
        let store = RecordStore::open_in_memory().unwrap();
        let value = serde_json::json!({"title": "Hello", "tags": ["a"]});

        store.put_json(Collection::Pages, "hello", &value).unwrap();
        let loaded: Option<serde_json::Value> =
            store.get_json(Collection::Pages, "hello").unwrap();
        assert_eq!(loaded, Some(value));

        let missing: Option<serde_json::Value> =
            store.get_json(Collection::Pages, "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.redb");

        {
            let store = RecordStore::open(&path, DEFAULT_OPEN_TIMEOUT).unwrap();
            store.put(Collection::Pages, "intro", b"hello").unwrap();
            store.put(Collection::Users, "admin", b"{}").unwrap();
        }

        {
            let store = RecordStore::open(&path, DEFAULT_OPEN_TIMEOUT).unwrap();
            assert_eq!(
                store.get(Collection::Pages, "intro").unwrap(),
                Some(b"hello".to_vec())
            );
            assert_eq!(store.count(Collection::Users).unwrap(), 1);
        }
    }

    #[test]
    fn locked_store_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("records.redb");
        let _held = RecordStore::open(&path, DEFAULT_OPEN_TIMEOUT).unwrap();

        let started = Instant::now();
        let err = RecordStore::open(&path, Duration::from_millis(150))
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)), "{err:?}");
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
