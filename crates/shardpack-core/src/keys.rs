//! Key Tables
//!
//! An aggregated record stores each distinct partition key (and each distinct
//! explicit hash key) once, in a table, and every user record refers to its key
//! by index. `KeyTable` is the interning structure behind those tables.
//!
//! ## Invariants
//! - Indices are 0-based and assigned in first-seen order
//! - Once a key has an index, that index never changes and is never reused
//! - Inserting a key that is already present doesn't grow the table
//!
//! ## Example
//! ```ignore
//! let mut table = KeyTable::new();
//! assert_eq!(table.potential_index("a"), 0);
//! assert_eq!(table.insert("a"), (true, 0));
//! assert_eq!(table.insert("b"), (true, 1));
//! assert_eq!(table.insert("a"), (false, 0));
//! assert_eq!(table.potential_index("c"), 2);
//! ```

use std::collections::HashMap;

/// Ordered set of unique strings with O(1) index lookup.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    /// Keys in index order
    keys: Vec<String>,

    /// Key -> index
    lookup: HashMap<String, u64>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `key` would occupy if it were inserted now.
    ///
    /// This is the existing index for a known key, or the current table length
    /// for a new one. Never mutates the table, which is what lets the size
    /// predictor price a record before committing it.
    pub fn potential_index(&self, key: &str) -> u64 {
        match self.lookup.get(key) {
            Some(index) => *index,
            None => self.keys.len() as u64,
        }
    }

    /// Intern `key`, returning `(was_new, index)`.
    pub fn insert(&mut self, key: &str) -> (bool, u64) {
        if let Some(index) = self.lookup.get(key) {
            return (false, *index);
        }

        let index = self.keys.len() as u64;
        self.keys.push(key.to_string());
        self.lookup.insert(key.to_string(), index);
        (true, index)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup.contains_key(key)
    }

    /// Key stored at `index`, if any.
    pub fn get(&self, index: u64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.keys.get(i))
            .map(String::as_str)
    }

    /// All keys in index order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.lookup.clear();
    }
}
