// Copyright 2026 kaddht contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Local key/value storage with TTL expiry. Grounded on
//! `kademlia/storage.py::IStorage`/`EphemeralStorage`/`DiskStorage`.

use crate::error::DhtError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

/// Storage backend contract. Implemented by `MemoryStorage` and
/// `DiskStorage`; `Server` is generic over it so tests can swap in an
/// in-memory store while a long-running node can persist to disk.
pub trait Storage: Send + Sync {
    fn get(&mut self, key: &str) -> Option<Vec<u8>>;
    fn set(&mut self, key: &str, value: Vec<u8>);
    fn remove(&mut self, key: &str);
    fn contains_key(&mut self, key: &str) -> bool;
    fn len(&mut self) -> usize;
    fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
    fn prune(&mut self);
    /// Entries whose age is at least `age`, oldest first; stops at the
    /// first entry younger than `age` (insertion order makes this a prefix).
    fn iter_older_than(&mut self, age: Duration) -> Vec<(String, Vec<u8>)>;
    /// All live entries, insertion order, after pruning.
    fn iter(&mut self) -> Vec<(String, Vec<u8>)>;
}

struct Entry {
    birthday: Instant,
    value: Vec<u8>,
}

/// In-memory store. Preserves insertion order via a side `Vec` of keys so
/// pruning and republish iteration are deterministic, mirroring Python's
/// `OrderedDict`.
pub struct MemoryStorage {
    ttl: Duration,
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl MemoryStorage {
    pub fn new(ttl: Duration) -> Self {
        MemoryStorage { ttl, order: Vec::new(), entries: HashMap::new() }
    }

    fn remove_from_order(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.prune();
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        if self.entries.contains_key(key) {
            self.remove_from_order(key);
        }
        self.order.push(key.to_string());
        self.entries.insert(key.to_string(), Entry { birthday: Instant::now(), value });
        self.prune();
    }

    fn remove(&mut self, key: &str) {
        self.remove_from_order(key);
        self.entries.remove(key);
    }

    fn contains_key(&mut self, key: &str) -> bool {
        self.prune();
        self.entries.contains_key(key)
    }

    fn len(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }

    fn prune(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .order
            .iter()
            .take_while(|k| {
                self.entries.get(*k).map_or(true, |e| now.duration_since(e.birthday) > ttl)
            })
            .cloned()
            .collect();
        for key in expired {
            self.entries.remove(&key);
        }
        self.order.retain(|k| self.entries.contains_key(k));
    }

    fn iter_older_than(&mut self, age: Duration) -> Vec<(String, Vec<u8>)> {
        let now = Instant::now();
        self.order
            .iter()
            .take_while(|k| self.entries.get(*k).map_or(false, |e| now.duration_since(e.birthday) >= age))
            .map(|k| (k.clone(), self.entries[k].value.clone()))
            .collect()
    }

    fn iter(&mut self) -> Vec<(String, Vec<u8>)> {
        self.prune();
        self.order.iter().map(|k| (k.clone(), self.entries[k].value.clone())).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    value: Vec<u8>,
    time: SystemTime,
}

/// Disk-backed store: one file per key under a per-node directory. Missing
/// files on read are logged and treated as absent, matching the Python
/// `DiskStorage.load_data`'s `FileNotFoundError` handling; write errors
/// propagate to the caller.
pub struct DiskStorage {
    dir: PathBuf,
    ttl: Duration,
}

impl DiskStorage {
    pub fn open(dir: PathBuf, ttl: Duration) -> Result<Self, DhtError> {
        std::fs::create_dir_all(&dir)?;
        Ok(DiskStorage { dir, ttl })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_safe_name(key))
    }

    fn read_record(&self, key: &str) -> Option<DiskRecord> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).ok(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::error!("could not read stored key {}: {}", key, err);
                None
            }
        }
    }

    fn list_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        keys
    }
}

fn file_safe_name(key: &str) -> String {
    // Keys are arbitrary user strings; hash them into the 160-bit id space
    // so they're always a valid, fixed-length filename regardless of
    // characters present in the original key.
    format!("{}", crate::node::NodeId::from_key(key.as_bytes()))
}

impl Storage for DiskStorage {
    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.prune();
        self.read_record(key).map(|r| r.value)
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.prune();
        let record = DiskRecord { key: key.to_string(), value, time: SystemTime::now() };
        let path = self.path_for(key);
        match bincode::serialize(&record) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&path, bytes) {
                    log::error!("could not persist key {}: {}", key, err);
                }
            }
            Err(err) => log::error!("could not encode key {} for storage: {}", key, err),
        }
    }

    fn remove(&mut self, key: &str) {
        let path = self.path_for(key);
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::error!("could not remove key {}: {}", key, err);
            }
        }
    }

    fn contains_key(&mut self, key: &str) -> bool {
        self.prune();
        self.path_for(key).exists()
    }

    fn len(&mut self) -> usize {
        self.prune();
        self.list_keys().len()
    }

    fn prune(&mut self) {
        let now = SystemTime::now();
        for file_name in self.list_keys() {
            let path = self.dir.join(&file_name);
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(record) = bincode::deserialize::<DiskRecord>(&bytes) {
                    if now.duration_since(record.time).map_or(false, |age| age > self.ttl) {
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
        }
    }

    fn iter_older_than(&mut self, age: Duration) -> Vec<(String, Vec<u8>)> {
        let now = SystemTime::now();
        let mut out = Vec::new();
        for file_name in self.list_keys() {
            let path = self.dir.join(&file_name);
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(record) = bincode::deserialize::<DiskRecord>(&bytes) {
                    if now.duration_since(record.time).map_or(false, |a| a >= age) {
                        out.push((record.key, record.value));
                    }
                }
            }
        }
        out
    }

    fn iter(&mut self) -> Vec<(String, Vec<u8>)> {
        self.prune();
        let mut out = Vec::new();
        for file_name in self.list_keys() {
            let path = self.dir.join(&file_name);
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(record) = bincode::deserialize::<DiskRecord>(&bytes) {
                    out.push((record.key, record.value));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_within_ttl() {
        let mut storage = MemoryStorage::new(Duration::from_secs(60));
        storage.set("k", b"v".to_vec());
        assert_eq!(storage.get("k"), Some(b"v".to_vec()));
    }

    #[test]
    fn set_then_get_after_ttl_is_absent() {
        let mut storage = MemoryStorage::new(Duration::from_millis(10));
        storage.set("k", b"v".to_vec());
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn remove_on_missing_key_is_noop() {
        let mut storage = MemoryStorage::new(Duration::from_secs(60));
        storage.remove("absent");
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn resetting_a_key_preserves_single_value() {
        let mut storage = MemoryStorage::new(Duration::from_secs(60));
        storage.set("k", b"v1".to_vec());
        storage.set("k", b"v2".to_vec());
        assert_eq!(storage.get("k"), Some(b"v2".to_vec()));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn disk_storage_missing_file_returns_none() {
        let dir = std::env::temp_dir().join(format!("kaddht-test-{:?}", Instant::now()));
        let mut storage = DiskStorage::open(dir.clone(), Duration::from_secs(60)).unwrap();
        assert_eq!(storage.get("absent"), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn disk_storage_round_trips() {
        let dir = std::env::temp_dir().join(format!("kaddht-test2-{:?}", Instant::now()));
        let mut storage = DiskStorage::open(dir.clone(), Duration::from_secs(60)).unwrap();
        storage.set("k", b"v".to_vec());
        assert_eq!(storage.get("k"), Some(b"v".to_vec()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
