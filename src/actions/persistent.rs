//! Persistent collection actions (initcol, setsid, setuid).

use crate::engine::Transaction;
use crate::macros::MacroString;
use crate::persistence::{self, collection_key};
use crate::variables::VariableName;

/// A persistent record loaded by the transaction.
#[derive(Debug, Clone)]
pub(crate) struct LoadedCollection {
    pub collection: VariableName,
    pub key: String,
    pub dirty: bool,
}

/// Load `collection` for `partition` unless the transaction already holds it.
pub(crate) fn initcol(tx: &mut Transaction, collection: VariableName, partition: &MacroString) {
    let partition = partition.expand(&tx.store).into_owned();
    if partition.is_empty() {
        tx.debug()
            .warn(format_args!("initcol {} with an empty key ignored", collection));
        return;
    }
    if tx.persistent.iter().any(|p| p.collection == collection) {
        return;
    }

    let waf = std::sync::Arc::clone(&tx.waf);
    let key = collection_key(&waf.config.web_app_id, collection, &partition);
    let loaded = persistence::load(waf.persistence.as_ref(), &key, &partition, waf.config.collection_timeout);
    tx.debug().debug(format_args!("loaded {} record {}", collection, key));
    tx.store.replace(collection, loaded);
    tx.persistent.push(LoadedCollection {
        collection,
        key,
        dirty: false,
    });
}

/// Write back every changed record. Runs once, after the logging phase.
pub(crate) fn write_back(tx: &mut Transaction) {
    let waf = std::sync::Arc::clone(&tx.waf);
    let timeout = waf.config.collection_timeout;
    for record in std::mem::take(&mut tx.persistent) {
        if !record.dirty {
            continue;
        }
        let collection = tx.store.collection_mut(record.collection);
        persistence::store(waf.persistence.as_ref(), &record.key, collection, timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Waf;

    #[test]
    fn test_initcol_loads_once() {
        let waf = Waf::from_string("").unwrap();
        let mut tx = waf.new_transaction();
        initcol(&mut tx, VariableName::Ip, &MacroString::literal("10.0.0.1"));
        assert_eq!(tx.store.first(VariableName::Ip, Some("KEY")), Some("10.0.0.1"));
        assert_eq!(tx.store.first(VariableName::Ip, Some("IS_NEW")), Some("1"));

        tx.store.collection_mut(VariableName::Ip).set_one("score", "4");
        initcol(&mut tx, VariableName::Ip, &MacroString::literal("10.0.0.2"));
        assert_eq!(tx.store.first(VariableName::Ip, Some("score")), Some("4"));
        assert_eq!(tx.persistent.len(), 1);
    }

    #[test]
    fn test_only_dirty_records_written() {
        let waf = Waf::from_string("").unwrap();
        let mut tx = waf.new_transaction();
        initcol(&mut tx, VariableName::Ip, &MacroString::literal("1.1.1.1"));
        initcol(&mut tx, VariableName::Global, &MacroString::literal("global"));
        tx.store.collection_mut(VariableName::Ip).set_one("hits", "1");
        tx.touch(VariableName::Ip);
        write_back(&mut tx);

        let mut next = waf.new_transaction();
        initcol(&mut next, VariableName::Ip, &MacroString::literal("1.1.1.1"));
        initcol(&mut next, VariableName::Global, &MacroString::literal("global"));
        assert_eq!(next.store.first(VariableName::Ip, Some("hits")), Some("1"));
        assert_eq!(next.store.first(VariableName::Ip, Some("UPDATE_COUNTER")), Some("1"));
        assert_eq!(next.store.first(VariableName::Global, Some("IS_NEW")), Some("1"));
    }
}
