//! Ordered multi-value collections.

use regex::Regex;
use std::collections::HashMap;

/// How a variable selector picks keys out of a collection.
#[derive(Debug, Clone)]
pub enum KeySelector {
    /// Every key (`ARGS`).
    None,
    /// One key (`ARGS:foo`).
    Literal(String),
    /// Keys matching a pattern (`ARGS:/^user/`).
    Regex(Regex),
}

impl KeySelector {
    /// Whether `key` is selected. `fold` compares literals ignoring ASCII case.
    pub fn matches(&self, key: &str, fold: bool) -> bool {
        match self {
            Self::None => true,
            Self::Literal(lit) if fold => lit.eq_ignore_ascii_case(key),
            Self::Literal(lit) => lit == key,
            Self::Regex(re) => re.is_match(key),
        }
    }

    /// Selector text as written in a rule (without the collection name).
    pub fn display(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Literal(lit) => lit.clone(),
            Self::Regex(re) => format!("/{}/", re.as_str()),
        }
    }
}

impl PartialEq for KeySelector {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// A named multi-map preserving insertion order of keys and values.
///
/// Key `""` holds the anonymous value of single-valued variables such as
/// `REQUEST_URI`.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
    fold_keys: bool,
}

impl Collection {
    /// Create an empty collection with case-sensitive keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection whose keys are ASCII case-folded.
    pub fn case_insensitive() -> Self {
        Self {
            fold_keys: true,
            ..Self::default()
        }
    }

    fn normalize<'a>(&self, key: &'a str) -> std::borrow::Cow<'a, str> {
        if self.fold_keys && key.bytes().any(|b| b.is_ascii_uppercase()) {
            std::borrow::Cow::Owned(key.to_ascii_lowercase())
        } else {
            std::borrow::Cow::Borrowed(key)
        }
    }

    /// Select `(key, value)` pairs, skipping keys matched by any exception.
    pub fn get(&self, selector: &KeySelector, exceptions: &[KeySelector]) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        for (key, values) in &self.entries {
            if !selector.matches(key, self.fold_keys) {
                continue;
            }
            if exceptions.iter().any(|ex| ex.matches(key, self.fold_keys)) {
                continue;
            }
            out.extend(values.iter().map(|v| (key.as_str(), v.as_str())));
        }
        out
    }

    /// All values stored under `key`.
    pub fn values(&self, key: &str) -> &[String] {
        self.index
            .get(self.normalize(key).as_ref())
            .map(|&i| self.entries[i].1.as_slice())
            .unwrap_or(&[])
    }

    /// First value stored under `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    /// First value of the collection regardless of key.
    pub fn first_any(&self) -> Option<&str> {
        self.entries
            .iter()
            .flat_map(|(_, values)| values.iter())
            .next()
            .map(String::as_str)
    }

    /// Replace the values of `key`.
    pub fn set(&mut self, key: &str, values: Vec<String>) {
        let key = self.normalize(key).into_owned();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = values,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, values));
            }
        }
    }

    /// Replace the values of `key` with a single value.
    pub fn set_one(&mut self, key: &str, value: impl Into<String>) {
        self.set(key, vec![value.into()]);
    }

    /// Append a value to `key`.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        let key = self.normalize(key).into_owned();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1.push(value.into()),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, vec![value.into()]));
            }
        }
    }

    /// Append a value to `key` unless it is already present.
    pub fn add_unique(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !self.values(key).iter().any(|v| *v == value) {
            self.add(key, value);
        }
    }

    /// Remove `key` and its values.
    pub fn remove(&mut self, key: &str) {
        let key = self.normalize(key);
        if let Some(i) = self.index.remove(key.as_ref()) {
            self.entries.remove(i);
            for slot in self.index.values_mut() {
                if *slot > i {
                    *slot -= 1;
                }
            }
        }
    }

    /// Remove every key.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Whether `key` exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(self.normalize(key).as_ref())
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Total number of values.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }

    /// Whether the collection holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
