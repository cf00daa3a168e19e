//! The typed keyspace: one flat mapping from key to value, plus the
//! side-maps (expiry deadlines, version counters, last-access stamps) that
//! the expiry engine, transaction engine, and eviction engine each read.
//!
//! Per the concurrency model, there is exactly one `Storage` in the whole
//! process, owned by the event loop and handed to command handlers by
//! mutable reference. Nothing here takes a lock: the single-threaded
//! cooperative scheduler is the synchronization.

pub mod glob;
pub mod ops;
pub mod value;

use std::collections::HashMap;

use crate::util::now_ms;
pub use value::{HashValue, SetValue, TypeTag, Value, ZSetValue};

pub const DEFAULT_MAX_KEYS: usize = 50_000;

pub struct Storage {
    data: HashMap<Vec<u8>, Value>,
    expires: HashMap<Vec<u8>, u64>,
    versions: HashMap<Vec<u8>, u64>,
    last_access: HashMap<Vec<u8>, u64>,
    pub max_keys: usize,
    mutations: u64,
}

impl Storage {
    pub fn new(max_keys: usize) -> Self {
        Self {
            data: HashMap::new(),
            expires: HashMap::new(),
            versions: HashMap::new(),
            last_access: HashMap::new(),
            max_keys,
            mutations: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lazily expires `key` if its deadline has passed. Must be called by
    /// every read and write path before touching `key`.
    pub fn touch(&mut self, key: &[u8]) {
        if let Some(&deadline) = self.expires.get(key) {
            if deadline <= now_ms() {
                self.remove_all_traces(key);
            }
        }
    }

    fn remove_all_traces(&mut self, key: &[u8]) {
        self.data.remove(key);
        self.expires.remove(key);
        self.last_access.remove(key);
        self.bump_version(key);
    }

    pub fn bump_version(&mut self, key: &[u8]) {
        let v = self.versions.entry(key.to_vec()).or_insert(0);
        *v += 1;
        self.mutations += 1;
    }

    /// Total number of key mutations since startup (or since the last
    /// [`Storage::reset_mutation_count`]). Drives the auto-save policy.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn reset_mutation_count(&mut self) {
        self.mutations = 0;
    }

    pub fn version_of(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.touch(key);
        self.data.contains_key(key)
    }

    pub fn type_of(&mut self, key: &[u8]) -> Option<TypeTag> {
        self.touch(key);
        self.data.get(key).map(Value::type_tag)
    }

    pub fn get_value(&mut self, key: &[u8]) -> Option<&Value> {
        self.touch(key);
        if self.data.contains_key(key) {
            self.last_access.insert(key.to_vec(), now_ms());
        }
        self.data.get(key)
    }

    /// Fetches `key` for mutation, failing with `WRONGTYPE` if it exists
    /// under a different tag than `expected`, and calling `make_default`
    /// to create it if absent.
    pub fn get_mut_typed<'a>(
        &'a mut self,
        key: &[u8],
        expected: TypeTag,
        make_default: impl FnOnce() -> Value,
    ) -> Result<&'a mut Value, ()> {
        self.touch(key);
        if let Some(existing) = self.data.get(key) {
            if existing.type_tag() != expected {
                return Err(());
            }
        } else {
            self.data.insert(key.to_vec(), make_default());
        }
        self.last_access.insert(key.to_vec(), now_ms());
        Ok(self.data.get_mut(key).unwrap())
    }

    pub fn check_type(&mut self, key: &[u8], expected: TypeTag) -> Result<bool, ()> {
        self.touch(key);
        match self.data.get(key) {
            None => Ok(false),
            Some(v) if v.type_tag() == expected => Ok(true),
            Some(_) => Err(()),
        }
    }

    /// Deletes `key` if its value becomes an empty collection (lists,
    /// hashes, sets, sorted sets, streams all vanish once emptied; plain
    /// strings never do).
    pub fn prune_if_empty(&mut self, key: &[u8]) {
        if matches!(self.data.get(key), Some(v) if v.is_empty_collection()) {
            self.remove_key(key);
        }
    }

    pub fn set_value(&mut self, key: &[u8], value: Value) {
        if !self.data.contains_key(key) {
            self.last_access.insert(key.to_vec(), now_ms());
        }
        self.data.insert(key.to_vec(), value);
        self.bump_version(key);
    }

    /// Inserts a brand-new key, enforcing the capacity guard.
    /// Overwrites of an existing key bypass the guard.
    pub fn insert_new(&mut self, key: &[u8], value: Value) -> Result<(), ()> {
        if !self.data.contains_key(key) && self.data.len() >= self.max_keys {
            return Err(());
        }
        self.set_value(key, value);
        Ok(())
    }

    pub fn remove_key(&mut self, key: &[u8]) -> bool {
        let existed = self.data.remove(key).is_some();
        self.expires.remove(key);
        self.last_access.remove(key);
        if existed {
            self.bump_version(key);
        }
        existed
    }

    pub fn flush(&mut self) {
        let keys: Vec<Vec<u8>> = self.data.keys().cloned().collect();
        self.data.clear();
        self.expires.clear();
        self.last_access.clear();
        for k in keys {
            self.bump_version(&k);
        }
    }

    pub fn keys_matching(&mut self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let live: Vec<Vec<u8>> = self.data.keys().cloned().collect();
        let mut out = Vec::new();
        for k in live {
            self.touch(&k);
            if self.data.contains_key(&k) && glob::glob_match(pattern, &k) {
                out.push(k);
            }
        }
        out
    }

    pub fn rename(&mut self, src: &[u8], dst: &[u8]) -> bool {
        self.touch(src);
        let Some(value) = self.data.remove(src) else {
            return false;
        };
        let src_deadline = self.expires.remove(src);
        self.last_access.remove(src);
        self.bump_version(src);

        // the destination's own prior state (value, deadline) is discarded
        self.expires.remove(dst);
        self.data.insert(dst.to_vec(), value);
        self.last_access.insert(dst.to_vec(), now_ms());
        if let Some(d) = src_deadline {
            self.expires.insert(dst.to_vec(), d);
        }
        self.bump_version(dst);
        true
    }

    // --- TTL ---

    pub fn set_expire_at(&mut self, key: &[u8], deadline_ms: u64) -> bool {
        self.touch(key);
        if !self.data.contains_key(key) {
            return false;
        }
        if deadline_ms <= now_ms() {
            self.remove_key(key);
            return true;
        }
        self.expires.insert(key.to_vec(), deadline_ms);
        self.bump_version(key);
        true
    }

    pub fn persist(&mut self, key: &[u8]) -> bool {
        self.touch(key);
        let removed = self.expires.remove(key).is_some();
        if removed {
            self.bump_version(key);
        }
        removed
    }

    /// `-2` absent, `-1` no deadline, else ms remaining.
    pub fn pttl(&mut self, key: &[u8]) -> i64 {
        self.touch(key);
        if !self.data.contains_key(key) {
            return -2;
        }
        match self.expires.get(key) {
            None => -1,
            Some(&deadline) => (deadline.saturating_sub(now_ms())) as i64,
        }
    }

    pub fn ttl(&mut self, key: &[u8]) -> i64 {
        match self.pttl(key) {
            -2 => -2,
            -1 => -1,
            // floor, same as Redis
            ms => ms / 1000,
        }
    }

    pub fn has_expiry(&self, key: &[u8]) -> bool {
        self.expires.contains_key(key)
    }

    pub fn deadline_of(&self, key: &[u8]) -> Option<u64> {
        self.expires.get(key).copied()
    }

    /// Snapshot of all (key, deadline) pairs with a deadline set, used to
    /// rebuild the active-expiry heap after a snapshot load.
    pub fn all_expiries(&self) -> impl Iterator<Item = (&Vec<u8>, &u64)> {
        self.expires.iter()
    }

    pub fn all_keys(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.data.keys()
    }

    pub fn get_raw(&self, key: &[u8]) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn last_access_of(&self, key: &[u8]) -> Option<u64> {
        self.last_access.get(key).copied()
    }

    pub fn keys_with_expiry(&self) -> Vec<Vec<u8>> {
        self.expires.keys().cloned().collect()
    }

    pub fn all_keys_vec(&self) -> Vec<Vec<u8>> {
        self.data.keys().cloned().collect()
    }
}
