//! Action execution.
//!
//! Metadata is folded into [`RuleMetadata`] when a rule is compiled. The
//! actions here run while a transaction is evaluated: non-disruptive
//! actions once per match, the disruptive action once per matched chain.

mod ctl;
mod data;
mod disruptive;
mod flow;
mod metadata;
pub(crate) mod persistent;

pub use disruptive::{resolve, DisruptiveOutcome};
pub use metadata::{RuleMetadata, Severity};

pub(crate) use flow::FlowState;

use crate::engine::Transaction;
use crate::parser::NonDisruptiveAction;
use crate::variables::VariableName;

/// Run one non-disruptive action. Flags such as `log` or `capture` are
/// compiled into the rule and never reach here.
pub(crate) fn execute(tx: &mut Transaction, action: &NonDisruptiveAction) {
    use NonDisruptiveAction as N;
    match action {
        N::SetVar(setvar) => data::setvar(tx, setvar),
        N::ExpireVar {
            collection,
            key,
            seconds,
        } => data::expirevar(tx, *collection, key, seconds),
        N::SetEnv { name, value } => data::setenv(tx, name, value),
        N::InitCol { collection, key } => persistent::initcol(tx, *collection, key),
        N::SetSid(key) => persistent::initcol(tx, VariableName::Session, key),
        N::SetUid(key) => persistent::initcol(tx, VariableName::User, key),
        N::Ctl(ctl) => ctl::apply(tx, ctl),
        N::Transformation(_)
        | N::Capture
        | N::MultiMatch
        | N::Log
        | N::NoLog
        | N::AuditLog
        | N::NoAuditLog
        | N::LogData(_) => {}
    }
}
