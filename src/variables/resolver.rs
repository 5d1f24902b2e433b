//! Variable selector resolution.

use super::collection::KeySelector;
use super::store::CollectionStore;
use crate::parser::VariableSelector;

/// What a selector yields against the current store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `&COLLECTION[:key]`: number of selected values.
    Count(usize),
    /// Selected `(key, value)` pairs in insertion order.
    Values(Vec<(String, String)>),
}

/// Resolves variable selectors against a transaction's collections.
pub struct VariableResolver<'a> {
    store: &'a CollectionStore,
}

impl<'a> VariableResolver<'a> {
    /// Create a new resolver.
    pub fn new(store: &'a CollectionStore) -> Self {
        Self { store }
    }

    /// Resolve a selector. `exclusions` are runtime target removals for the
    /// selector's collection and are applied on top of its own exceptions.
    pub fn resolve(&self, selector: &VariableSelector, exclusions: &[KeySelector]) -> Resolution {
        let pairs = if exclusions.is_empty() {
            self.store
                .get(selector.name, &selector.key, &selector.exceptions)
        } else {
            let mut all = selector.exceptions.clone();
            all.extend(exclusions.iter().cloned());
            self.store.get(selector.name, &selector.key, &all)
        };

        if selector.count {
            Resolution::Count(pairs.len())
        } else {
            Resolution::Values(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_variables;
    use crate::variables::{ArgumentSource, VariableName};

    fn store() -> CollectionStore {
        let mut store = CollectionStore::new();
        store.add_argument(ArgumentSource::Get, "a", "1");
        store.add_argument(ArgumentSource::Get, "b", "2");
        store.add_argument(ArgumentSource::Get, "b", "3");
        store
    }

    #[test]
    fn test_resolve_values_with_exception() {
        let store = store();
        let vars = parse_variables("ARGS|!ARGS:a").unwrap();
        let resolver = VariableResolver::new(&store);
        assert_eq!(
            resolver.resolve(&vars[0], &[]),
            Resolution::Values(vec![("b".into(), "2".into()), ("b".into(), "3".into())])
        );
    }

    #[test]
    fn test_resolve_count() {
        let store = store();
        let resolver = VariableResolver::new(&store);
        let all = parse_variables("&ARGS").unwrap();
        assert_eq!(resolver.resolve(&all[0], &[]), Resolution::Count(3));
        let key = parse_variables("&ARGS:b").unwrap();
        assert_eq!(resolver.resolve(&key[0], &[]), Resolution::Count(2));
        let missing = parse_variables("&TX:nope").unwrap();
        assert_eq!(resolver.resolve(&missing[0], &[]), Resolution::Count(0));
    }

    #[test]
    fn test_runtime_exclusions() {
        let store = store();
        let vars = parse_variables("ARGS").unwrap();
        let resolver = VariableResolver::new(&store);
        let ex = [KeySelector::Literal("b".into())];
        assert_eq!(
            resolver.resolve(&vars[0], &ex),
            Resolution::Values(vec![("a".into(), "1".into())])
        );
        assert_eq!(vars[0].name, VariableName::Args);
    }
}
