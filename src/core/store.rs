use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};

/// Byte-oriented key-value storage with JSON helpers on top.
///
/// The Spin component runs against the host's `default` store; the native
/// server and the tests use [`MemoryStore`].
pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Read-modify-write of one key. `f` sees the current bytes and returns
    /// the replacement (`None` leaves the entry untouched) plus a result.
    fn update<R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(Option<&[u8]>) -> anyhow::Result<(Option<Vec<u8>>, R)>;

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Edit a JSON value in place, starting from `T::default()` when absent.
    fn update_json<T, R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        self.update(key, |current| {
            let mut value: T = match current {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => T::default(),
            };
            let out = f(&mut value);
            Ok((Some(serde_json::to_vec(&value)?), out))
        })
    }

    /// Edit an existing JSON value; returns the stored result, or `None`
    /// when the key is missing.
    fn modify_json<T, F>(&self, key: &str, f: F) -> anyhow::Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        self.update(key, |current| match current {
            Some(bytes) => {
                let mut value: T = serde_json::from_slice(bytes)?;
                f(&mut value);
                Ok((Some(serde_json::to_vec(&value)?), Some(value)))
            }
            None => Ok((None, None)),
        })
    }

    /// Store `value` only if `key` is free. Returns whether it was stored.
    fn claim_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.update(key, move |current| match current {
            Some(_) => Ok((None, false)),
            None => Ok((Some(bytes), true)),
        })
    }
}

pub struct SpinStore(spin_sdk::key_value::Store);

impl SpinStore {
    pub fn open_default() -> anyhow::Result<Self> {
        spin_sdk::key_value::Store::open_default()
            .map(SpinStore)
            .map_err(|e| anyhow!("failed to open key-value store: {:?}", e))
    }
}

impl KvStore for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.0
            .get(key)
            .map_err(|e| anyhow!("key-value get {}: {:?}", key, e))
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.0
            .set(key, value)
            .map_err(|e| anyhow!("key-value set {}: {:?}", key, e))
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.0
            .delete(key)
            .map_err(|e| anyhow!("key-value delete {}: {:?}", key, e))
    }

    // The host store has no compare-and-swap; one request runs per instance.
    fn update<R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(Option<&[u8]>) -> anyhow::Result<(Option<Vec<u8>>, R)>,
    {
        let current = self.get(key)?;
        let (next, out) = f(current.as_deref())?;
        if let Some(bytes) = next {
            self.set(key, &bytes)?;
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn update<R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(Option<&[u8]>) -> anyhow::Result<(Option<Vec<u8>>, R)>,
    {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let (next, out) = f(entries.get(key).map(Vec::as_slice))?;
        if let Some(bytes) = next {
            entries.insert(key.to_string(), bytes);
        }
        Ok(out)
    }
}
