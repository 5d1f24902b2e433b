//! Operator trait definition.

use crate::debuglog::DebugScope;
use crate::macros::MacroString;
use crate::operators::GeoDatabase;
use crate::variables::CollectionStore;
use std::borrow::Cow;

/// Transaction state an operator may read and write while it runs.
pub struct OperatorContext<'a> {
    /// The transaction's collections.
    pub store: &'a mut CollectionStore,
    /// Debug log of the transaction.
    pub debug: DebugScope<'a>,
    /// Country database configured with `SecGeoLookupDb`.
    pub geo: Option<&'a dyn GeoDatabase>,
    capture: bool,
}

impl<'a> OperatorContext<'a> {
    /// Create a context; `capture` mirrors the rule's `capture` action.
    pub fn new(
        store: &'a mut CollectionStore,
        debug: DebugScope<'a>,
        geo: Option<&'a dyn GeoDatabase>,
        capture: bool,
    ) -> Self {
        Self {
            store,
            debug,
            geo,
            capture,
        }
    }

    /// Whether the running rule captures.
    pub fn capturing(&self) -> bool {
        self.capture
    }

    /// Write capture register `index`; a no-op unless the rule captures.
    /// Bytes that are not UTF-8 are stored lossily.
    pub fn capture(&mut self, index: usize, value: &[u8]) {
        if self.capture {
            self.store.capture_set(index, &String::from_utf8_lossy(value));
        }
    }

    /// Expand a macro parameter against the current state.
    pub fn expand<'m>(&self, param: &'m MacroString) -> Cow<'m, str> {
        param.expand(self.store)
    }
}

/// A compiled match predicate.
///
/// Operators are built once at load and shared by every transaction, so
/// `evaluate` only reads the operator's own state.
pub trait Operator: Send + Sync {
    /// Test the transformed bytes of one variable. Captures, if any, are
    /// written before the caller applies negation.
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool;

    /// Operator name.
    fn name(&self) -> &'static str;
}
