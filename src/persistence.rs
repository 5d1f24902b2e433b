//! Persistent collections.
//!
//! `SESSION`, `IP`, `GLOBAL`, `USER` and `RESOURCE` survive between
//! transactions through a [`PersistenceEngine`]. A transaction loads a
//! record when `initcol`, `setsid` or `setuid` first names it, and writes
//! back every record it changed once the logging phase has run. Concurrent
//! transactions updating the same record race; the last writer wins.

use crate::error::{Error, Result};
use crate::variables::{Collection, VariableName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A stored collection: `(key, values)` pairs in the order the
/// collection held them.
pub type PersistedCollection = Vec<(String, Vec<String>)>;

/// Prefix of the hidden keys that hold `expirevar` deadlines.
pub(crate) const EXPIRE_PREFIX: &str = "__expire_";

/// Key-value storage for persistent collections.
pub trait PersistenceEngine: Send + Sync {
    /// Fetch a record.
    fn get(&self, key: &str) -> Result<Option<PersistedCollection>>;
    /// Store a record, replacing any previous one.
    fn set(&self, key: &str, value: PersistedCollection) -> Result<()>;
}

/// Storage key for a collection record.
pub fn collection_key(web_app_id: &str, collection: VariableName, partition: &str) -> String {
    format!("c-{}-{}-{}", web_app_id, collection.lower_name(), partition)
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// First value of `key`, compared ignoring ASCII case.
fn number(record: &PersistedCollection, key: &str) -> Option<i64> {
    let (_, values) = record.iter().find(|(k, _)| k.eq_ignore_ascii_case(key))?;
    values.first()?.parse().ok()
}

/// Whether a record has outlived its `TIMEOUT`.
fn is_expired(record: &PersistedCollection, now: i64) -> bool {
    let Some(timeout) = number(record, "TIMEOUT") else {
        return false;
    };
    let last = number(record, "LAST_UPDATE_TIME")
        .or_else(|| number(record, "CREATE_TIME"))
        .unwrap_or(now);
    timeout > 0 && last + timeout <= now
}

/// In-process storage. The default backend.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    records: RwLock<HashMap<String, PersistedCollection>>,
}

impl InMemoryPersistence {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl PersistenceEngine for InMemoryPersistence {
    fn get(&self, key: &str) -> Result<Option<PersistedCollection>> {
        let now = unix_now();
        {
            let records = self.records.read();
            match records.get(key) {
                None => return Ok(None),
                Some(record) if !is_expired(record, now) => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }
        self.records.write().remove(key);
        Ok(None)
    }

    fn set(&self, key: &str, value: PersistedCollection) -> Result<()> {
        self.records.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON file per record under `SecDataDir`.
#[derive(Debug)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Store records under `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| Error::Persistence {
            message: format!("{}: {}", dir.display(), e),
        })?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Directory records are kept in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn persistence_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Persistence {
        message: format!("{}: {}", path.display(), e),
    }
}

impl PersistenceEngine for FilePersistence {
    fn get(&self, key: &str) -> Result<Option<PersistedCollection>> {
        let path = self.path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence_error(&path, e)),
        };
        let record: PersistedCollection =
            serde_json::from_str(&content).map_err(|e| persistence_error(&path, e))?;
        if is_expired(&record, unix_now()) {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn set(&self, key: &str, value: PersistedCollection) -> Result<()> {
        let path = self.path(key);
        let json = serde_json::to_vec(&value).map_err(|e| persistence_error(&path, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| persistence_error(&path, e))?;
        std::io::Write::write_all(&mut tmp, &json).map_err(|e| persistence_error(&path, e))?;
        tmp.persist(&path).map_err(|e| persistence_error(&path, e.error))?;
        Ok(())
    }
}

/// Load a collection record, creating a fresh one when the store has none
/// or fails. Expired `expirevar` entries are dropped.
pub(crate) fn load(
    engine: &dyn PersistenceEngine,
    key: &str,
    partition: &str,
    timeout: u64,
) -> Collection {
    let now = unix_now();
    let record = match engine.get(key) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(key, error = %e, "persistent collection unavailable, starting empty");
            None
        }
    };

    let mut collection = Collection::case_insensitive();
    match record {
        Some(record) => {
            for (k, values) in record {
                collection.set(&k, values);
            }
            purge_expired_vars(&mut collection, now);
        }
        None => {
            collection.set_one("KEY", partition);
            collection.set_one("CREATE_TIME", now.to_string());
            collection.set_one("IS_NEW", "1");
            collection.set_one("TIMEOUT", timeout.to_string());
            collection.set_one("UPDATE_COUNTER", "0");
        }
    }
    collection
}

fn purge_expired_vars(collection: &mut Collection, now: i64) {
    let expired: Vec<String> = collection
        .iter()
        .filter_map(|(k, values)| {
            let var = k.strip_prefix(EXPIRE_PREFIX)?;
            let deadline: i64 = values.first()?.parse().ok()?;
            (deadline <= now).then(|| var.to_string())
        })
        .collect();
    for var in expired {
        collection.remove(&var);
        collection.remove(&format!("{}{}", EXPIRE_PREFIX, var));
    }
}

/// Update the bookkeeping fields and store the collection.
pub(crate) fn store(engine: &dyn PersistenceEngine, key: &str, collection: &mut Collection, timeout: u64) {
    let now = unix_now();
    let counter = collection
        .first("UPDATE_COUNTER")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
        + 1;
    let created = collection
        .first("CREATE_TIME")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(now);

    collection.set_one("UPDATE_COUNTER", counter.to_string());
    collection.set_one("LAST_UPDATE_TIME", now.to_string());
    collection.set_one("IS_NEW", "0");
    collection.set_one("TIMEOUT", timeout.to_string());
    let elapsed = now - created;
    if elapsed > 0 {
        collection.set_one("UPDATE_RATE", (counter * 60 / elapsed).to_string());
    }

    let record: PersistedCollection = collection
        .iter()
        .map(|(k, values)| (k.to_string(), values.to_vec()))
        .collect();
    if let Err(e) = engine.set(key, record) {
        tracing::warn!(key, error = %e, "failed to store persistent collection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_key() {
        assert_eq!(
            collection_key("shop", VariableName::Ip, "10.0.0.1"),
            "c-shop-ip-10.0.0.1"
        );
    }

    #[test]
    fn test_new_record_bookkeeping() {
        let engine = InMemoryPersistence::new();
        let collection = load(&engine, "c-default-ip-1", "1", 3600);
        assert_eq!(collection.first("IS_NEW"), Some("1"));
        assert_eq!(collection.first("UPDATE_COUNTER"), Some("0"));
        assert_eq!(collection.first("TIMEOUT"), Some("3600"));
        assert!(collection.first("CREATE_TIME").is_some());
    }

    #[test]
    fn test_store_and_reload() {
        let engine = InMemoryPersistence::new();
        let mut collection = load(&engine, "k", "p", 60);
        collection.set_one("attempts", "3");
        store(&engine, "k", &mut collection, 60);

        let mut reloaded = load(&engine, "k", "p", 60);
        assert_eq!(reloaded.first("attempts"), Some("3"));
        assert_eq!(reloaded.first("IS_NEW"), Some("0"));
        assert_eq!(reloaded.first("UPDATE_COUNTER"), Some("1"));
        assert!(reloaded.first("LAST_UPDATE_TIME").is_some());

        store(&engine, "k", &mut reloaded, 60);
        assert_eq!(load(&engine, "k", "p", 60).first("UPDATE_COUNTER"), Some("2"));
    }

    #[test]
    fn test_expired_record_is_dropped() {
        let engine = InMemoryPersistence::new();
        let record = vec![
            ("TIMEOUT".to_string(), vec!["10".to_string()]),
            ("LAST_UPDATE_TIME".to_string(), vec![(unix_now() - 60).to_string()]),
        ];
        engine.set("old", record).unwrap();
        assert!(engine.get("old").unwrap().is_none());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_stored_record_expires_with_folded_keys() {
        let engine = InMemoryPersistence::new();
        let mut collection = load(&engine, "k", "p", 10);
        store(&engine, "k", &mut collection, 10);
        let mut record = engine.get("k").unwrap().unwrap();
        for (key, values) in record.iter_mut() {
            if key == "last_update_time" {
                *values = vec![(unix_now() - 60).to_string()];
            }
        }
        engine.set("k", record).unwrap();
        assert!(engine.get("k").unwrap().is_none());
    }

    #[test]
    fn test_reload_keeps_insertion_order() {
        let engine = InMemoryPersistence::new();
        let mut collection = load(&engine, "k", "p", 60);
        collection.set_one("zeta", "1");
        collection.set_one("alpha", "2");
        collection.set_one("mid", "3");
        store(&engine, "k", &mut collection, 60);

        let reloaded = load(&engine, "k", "p", 60);
        let keys: Vec<&str> = reloaded
            .iter()
            .map(|(k, _)| k)
            .filter(|k| ["zeta", "alpha", "mid"].contains(k))
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_expirevar_purged_on_load() {
        let engine = InMemoryPersistence::new();
        let pair = |k: &str, v: String| (k.to_string(), vec![v]);
        let record = vec![
            pair("blocked", "1".into()),
            pair("__expire_blocked", (unix_now() - 1).to_string()),
            pair("kept", "1".into()),
            pair("__expire_kept", (unix_now() + 600).to_string()),
        ];
        engine.set("k", record).unwrap();

        let collection = load(&engine, "k", "p", 60);
        assert!(!collection.contains_key("blocked"));
        assert!(!collection.contains_key("__expire_blocked"));
        assert_eq!(collection.first("kept"), Some("1"));
    }

    #[test]
    fn test_file_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilePersistence::new(dir.path().join("data")).unwrap();
        assert!(engine.get("c-default-ip-1.2.3.4").unwrap().is_none());

        let mut collection = load(&engine, "c-default-ip-1.2.3.4", "1.2.3.4", 3600);
        collection.set_one("score", "5");
        store(&engine, "c-default-ip-1.2.3.4", &mut collection, 3600);

        let record = engine.get("c-default-ip-1.2.3.4").unwrap().unwrap();
        assert!(record.contains(&("score".to_string(), vec!["5".to_string()])));
        assert!(engine.dir().join("c-default-ip-1.2.3.4.json").exists());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilePersistence::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(engine.get("bad").is_err());
        let collection = load(&engine, "bad", "x", 60);
        assert_eq!(collection.first("IS_NEW"), Some("1"));
    }
}
