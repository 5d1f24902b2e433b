//! Per-transaction collection store.

use super::collection::{Collection, KeySelector};
use super::name::VariableName;
use std::collections::HashMap;

/// Number of capture registers kept in `TX`.
pub const CAPTURE_REGISTERS: usize = 10;

/// Where an argument came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    /// Query string.
    Get,
    /// Request body.
    Post,
}

/// Mapping from collection name to collection, owned by one transaction.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    collections: HashMap<VariableName, Collection>,
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionStore {
    /// Create a store whose `TX` holds empty capture registers.
    pub fn new() -> Self {
        let mut store = Self {
            collections: HashMap::new(),
        };
        store.reset_captures();
        store
    }

    /// Borrow a collection if it has been created.
    pub fn collection(&self, name: VariableName) -> Option<&Collection> {
        self.collections.get(&name)
    }

    /// Borrow a collection mutably, creating it on first use.
    pub fn collection_mut(&mut self, name: VariableName) -> &mut Collection {
        self.collections.entry(name).or_insert_with(|| {
            if name.folds_keys() {
                Collection::case_insensitive()
            } else {
                Collection::new()
            }
        })
    }

    /// Replace a whole collection (used when loading persistent state).
    pub fn replace(&mut self, name: VariableName, collection: Collection) {
        self.collections.insert(name, collection);
    }

    /// Select pairs from a collection; missing collections yield nothing.
    pub fn get(
        &self,
        name: VariableName,
        selector: &KeySelector,
        exceptions: &[KeySelector],
    ) -> Vec<(&str, &str)> {
        self.collections
            .get(&name)
            .map(|c| c.get(selector, exceptions))
            .unwrap_or_default()
    }

    /// First value at `key`, or the first value of the collection when
    /// `key` is `None`.
    pub fn first(&self, name: VariableName, key: Option<&str>) -> Option<&str> {
        let collection = self.collections.get(&name)?;
        match key {
            Some(key) => collection.first(key),
            None => collection.first("").or_else(|| collection.first_any()),
        }
    }

    /// Value of a single-valued variable.
    pub fn value(&self, name: VariableName) -> Option<&str> {
        self.collections.get(&name).and_then(|c| c.first(""))
    }

    /// Set a single-valued variable.
    pub fn set_value(&mut self, name: VariableName, value: impl Into<String>) {
        self.collection_mut(name).set_one("", value);
    }

    /// Write capture register `index` (0..=9); other indices are ignored.
    pub fn capture_set(&mut self, index: usize, value: &str) {
        if index < CAPTURE_REGISTERS {
            self.collection_mut(VariableName::Tx)
                .set_one(&index.to_string(), value);
        }
    }

    /// Reset every capture register to the empty string.
    pub fn reset_captures(&mut self) {
        let tx = self.collection_mut(VariableName::Tx);
        for i in 0..CAPTURE_REGISTERS {
            tx.set_one(&i.to_string(), "");
        }
    }

    /// Record an argument in `ARGS`, its source collection and the name
    /// collections, and keep `ARGS_COMBINED_SIZE` current.
    pub fn add_argument(&mut self, source: ArgumentSource, key: &str, value: &str) {
        let (values, names) = match source {
            ArgumentSource::Get => (VariableName::ArgsGet, VariableName::ArgsGetNames),
            ArgumentSource::Post => (VariableName::ArgsPost, VariableName::ArgsPostNames),
        };
        self.collection_mut(VariableName::Args).add(key, value);
        self.collection_mut(values).add(key, value);
        self.collection_mut(VariableName::ArgsNames).add(key, key);
        self.collection_mut(names).add(key, key);

        let size: usize = self
            .value(VariableName::ArgsCombinedSize)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        self.set_value(
            VariableName::ArgsCombinedSize,
            (size + key.len() + value.len()).to_string(),
        );
    }
}
