//! Variable-writing actions (setvar, expirevar, setenv).

use crate::engine::Transaction;
use crate::macros::MacroString;
use crate::parser::{SetVar, SetVarOp};
use crate::persistence::EXPIRE_PREFIX;
use crate::variables::VariableName;

fn number(value: &str) -> i64 {
    value.trim().parse().unwrap_or(0)
}

/// Apply a `setvar`. Arithmetic treats missing or non-numeric values as 0.
pub(crate) fn setvar(tx: &mut Transaction, setvar: &SetVar) {
    let key = setvar.key.expand(&tx.store).into_owned();
    if key.is_empty() {
        tx.debug().warn(format_args!("setvar on {} with an empty key ignored", setvar.collection));
        return;
    }

    let result = match &setvar.op {
        SetVarOp::Set(value) => Some(value.expand(&tx.store).into_owned()),
        SetVarOp::Add(delta) | SetVarOp::Sub(delta) => {
            let current = tx.store.first(setvar.collection, Some(&key)).map_or(0, number);
            let delta = number(&delta.expand(&tx.store));
            let next = if matches!(setvar.op, SetVarOp::Add(_)) {
                current.saturating_add(delta)
            } else {
                current.saturating_sub(delta)
            };
            Some(next.to_string())
        }
        SetVarOp::Delete => None,
    };

    tx.debug().log(
        9,
        format_args!("setvar {}.{} = {:?}", setvar.collection, key, result.as_deref()),
    );
    let collection = tx.store.collection_mut(setvar.collection);
    match result {
        Some(value) => collection.set_one(&key, value),
        None => collection.remove(&key),
    }
    tx.touch(setvar.collection);
}

/// Apply an `expirevar`: the variable is dropped when its record is next
/// loaded after the deadline.
pub(crate) fn expirevar(tx: &mut Transaction, collection: VariableName, key: &str, seconds: &MacroString) {
    let seconds = number(&seconds.expand(&tx.store));
    let deadline = chrono::Utc::now().timestamp() + seconds;
    tx.store
        .collection_mut(collection)
        .set_one(&format!("{}{}", EXPIRE_PREFIX, key), deadline.to_string());
    tx.touch(collection);
}

/// Apply a `setenv`.
pub(crate) fn setenv(tx: &mut Transaction, name: &str, value: &MacroString) {
    let value = value.expand(&tx.store).into_owned();
    tx.store.collection_mut(VariableName::Env).set_one(name, value);
}
