//! In-memory storage implementation.
//!
//! Backed by ordered maps so prefix scans and cursor pagination behave the
//! same as the RocksDB implementation. Intended for tests and development;
//! data is lost when the process exits.

use crate::{
    column_families::all_column_families,
    errors::{Result, StorageError},
    traits::{deserialize_value, serialize_key, serialize_value, Batch, Storage},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};
use tracing::debug;

type CfMap = HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>;

/// In-memory storage implementation
#[derive(Clone)]
pub struct MemoryStorage {
    data: Arc<RwLock<CfMap>>,
}

impl MemoryStorage {
    /// Create a new in-memory store with all column families present
    pub fn new() -> Self {
        let mut data = HashMap::new();
        for cf in all_column_families() {
            data.insert(cf, BTreeMap::new());
        }
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn cf_name(cf: &str) -> Result<&'static str> {
    all_column_families()
        .into_iter()
        .find(|name| *name == cf)
        .ok_or_else(|| StorageError::InvalidColumnFamily(cf.to_string()))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let cf = cf_name(cf)?;
        let key_bytes = serialize_key(key)?;

        let data = self.data.read();
        match data[cf].get(&key_bytes) {
            Some(bytes) => Ok(Some(deserialize_value(bytes)?)),
            None => Ok(None),
        }
    }

    async fn put<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync,
    {
        let cf = cf_name(cf)?;
        let key_bytes = serialize_key(key)?;
        let value_bytes = serialize_value(value)?;

        let mut data = self.data.write();
        data.get_mut(cf)
            .expect("column family initialized in new()")
            .insert(key_bytes, value_bytes);
        Ok(())
    }

    async fn delete<K>(&self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize + Send + Sync,
    {
        let cf = cf_name(cf)?;
        let key_bytes = serialize_key(key)?;

        let mut data = self.data.write();
        data.get_mut(cf)
            .expect("column family initialized in new()")
            .remove(&key_bytes);
        Ok(())
    }

    async fn exists<K>(&self, cf: &str, key: &K) -> Result<bool>
    where
        K: Serialize + Send + Sync,
    {
        let cf = cf_name(cf)?;
        let key_bytes = serialize_key(key)?;

        let data = self.data.read();
        Ok(data[cf].contains_key(&key_bytes))
    }

    async fn get_by_prefix<K, V>(&self, cf: &str, prefix: &K) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let cf = cf_name(cf)?;
        let prefix_bytes = serialize_key(prefix)?;

        let data = self.data.read();
        let mut results = Vec::new();

        for (key, value) in data[cf].range((Bound::Included(prefix_bytes.clone()), Bound::Unbounded))
        {
            if !key.starts_with(&prefix_bytes) {
                break;
            }
            results.push((key.clone(), deserialize_value(value)?));
        }

        Ok(results)
    }

    async fn scan_page<K, V>(
        &self,
        cf: &str,
        after: Option<&K>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned,
    {
        let cf = cf_name(cf)?;
        let lower = match after {
            Some(key) => Bound::Excluded(serialize_key(key)?),
            None => Bound::Unbounded,
        };

        let data = self.data.read();
        let mut results = Vec::new();

        for (key, value) in data[cf].range((lower, Bound::Unbounded)).take(limit) {
            results.push((key.clone(), deserialize_value(value)?));
        }

        Ok(results)
    }

    fn batch(&self) -> Box<dyn Batch> {
        Box::new(MemoryBatch {
            data: Arc::clone(&self.data),
            ops: Vec::new(),
        })
    }
}

enum BatchOp {
    Put(&'static str, Vec<u8>, Vec<u8>),
    Delete(&'static str, Vec<u8>),
}

/// In-memory batch implementation
///
/// Operations are staged and applied under a single write lock on commit,
/// so a batch is atomic with respect to concurrent readers.
pub struct MemoryBatch {
    data: Arc<RwLock<CfMap>>,
    ops: Vec<BatchOp>,
}

#[async_trait]
impl Batch for MemoryBatch {
    fn put_raw(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.ops.push(BatchOp::Put(cf_name(cf)?, key, value));
        Ok(())
    }

    fn delete_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()> {
        self.ops.push(BatchOp::Delete(cf_name(cf)?, key));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut data = self.data.write();
        for op in self.ops {
            match op {
                BatchOp::Put(cf, key, value) => {
                    data.get_mut(cf)
                        .expect("column family initialized in new()")
                        .insert(key, value);
                }
                BatchOp::Delete(cf, key) => {
                    data.get_mut(cf)
                        .expect("column family initialized in new()")
                        .remove(&key);
                }
            }
        }
        debug!("Batch committed successfully");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!("Batch rolled back");
    }
}
