// Copyright 2020 - 2021 Alex Dukhno
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thin adapter over `sled`. No typing happens here: every value is an
//! opaque byte string, read and written verbatim.

use std::fmt::{self, Display, Formatter};
use std::path::Path;

pub const METADATA: &str = "metadata";

#[derive(Debug, PartialEq)]
pub enum StorageError {
    Open(String),
    Io(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Open(msg) => write!(f, "failed to open database: {}", msg),
            StorageError::Io(msg) => write!(f, "storage I/O error: {}", msg),
        }
    }
}

impl From<sled::Error> for StorageError {
    fn from(error: sled::Error) -> StorageError {
        StorageError::Io(error.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Owns the on-disk environment and every open table tree.
pub struct Environment {
    db: sled::Db,
}

impl Environment {
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Environment> {
        let db = sled::open(path).map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Environment { db })
    }

    /// Opens the named tree, creating it if it does not yet exist.
    pub fn open_or_create_tree(&self, name: &str) -> StorageResult<Table> {
        let tree = self.db.open_tree(name)?;
        Ok(Table { tree })
    }

    pub fn drop_tree(&self, name: &str) -> StorageResult<()> {
        self.db.drop_tree(name)?;
        Ok(())
    }

    /// Every tree name currently known to the environment, including `metadata`.
    pub fn tree_names(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect()
    }

    /// Flushes every pending write. Called once, on `EXIT`.
    pub fn close(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// A single named tree within an `Environment`.
#[derive(Clone)]
pub struct Table {
    tree: sled::Tree,
}

impl Table {
    pub fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.tree.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key.as_bytes())?.map(|ivec| ivec.to_vec()))
    }

    pub fn delete(&self, key: &str) -> StorageResult<()> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }

    /// A fresh surrogate key, unique within this tree for its lifetime.
    pub fn next_id(&self) -> StorageResult<u64> {
        Ok(self.tree.generate_id()?)
    }

    /// Deletes every record in the tree, returning the count removed.
    pub fn truncate(&self) -> StorageResult<usize> {
        let mut count = 0;
        for item in self.tree.iter() {
            item?;
            count += 1;
        }
        self.tree.clear()?;
        Ok(count)
    }

    /// Iterates `(key, value)` pairs in unspecified order.
    pub fn scan(&self) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let mut rows = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            rows.push((String::from_utf8_lossy(&key).into_owned(), value.to_vec()));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::open(dir.path()).unwrap();
        (dir, env)
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, env) = env();
        let table = env.open_or_create_tree("T").unwrap();
        table.put("k1", b"hello").unwrap();
        assert_eq!(table.get("k1").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn missing_key_is_none_not_error() {
        let (_dir, env) = env();
        let table = env.open_or_create_tree("T").unwrap();
        assert_eq!(table.get("missing").unwrap(), None);
    }

    #[test]
    fn delete_absent_key_is_noop() {
        let (_dir, env) = env();
        let table = env.open_or_create_tree("T").unwrap();
        assert!(table.delete("missing").is_ok());
    }

    #[test]
    fn truncate_returns_deleted_count() {
        let (_dir, env) = env();
        let table = env.open_or_create_tree("T").unwrap();
        table.put("a", b"1").unwrap();
        table.put("b", b"2").unwrap();
        assert_eq!(table.truncate().unwrap(), 2);
        assert_eq!(table.scan().unwrap().len(), 0);
    }

    #[test]
    fn next_id_is_monotonically_unique() {
        let (_dir, env) = env();
        let table = env.open_or_create_tree("T").unwrap();
        let a = table.next_id().unwrap();
        let b = table.next_id().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn drop_tree_removes_it_from_tree_names() {
        let (_dir, env) = env();
        env.open_or_create_tree("T").unwrap();
        assert!(env.tree_names().iter().any(|n| n == "T"));
        env.drop_tree("T").unwrap();
        assert!(!env.tree_names().iter().any(|n| n == "T"));
    }
}
