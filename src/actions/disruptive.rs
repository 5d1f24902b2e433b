//! Disruptive actions (deny, drop, redirect, allow, pass).

use crate::engine::Disruption;
use crate::parser::{AllowScope, DisruptiveAction};
use crate::variables::CollectionStore;

/// What a matched rule's disruptive action asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisruptiveOutcome {
    /// Interrupt the transaction.
    Interrupt(Disruption),
    /// Stop inspecting within `scope`.
    Allow(AllowScope),
    /// Continue.
    Pass,
}

/// Resolve a disruptive action with its `status:`. `block` has already
/// been replaced by the phase default at load time.
pub fn resolve(action: &DisruptiveAction, status: Option<u16>, store: &CollectionStore) -> DisruptiveOutcome {
    match action {
        DisruptiveAction::Deny => DisruptiveOutcome::Interrupt(Disruption::Status(status.unwrap_or(403))),
        DisruptiveAction::Drop => DisruptiveOutcome::Interrupt(Disruption::Drop),
        DisruptiveAction::Redirect(url) => DisruptiveOutcome::Interrupt(Disruption::Redirect {
            status: match status {
                Some(s @ (301 | 302 | 303 | 307)) => s,
                _ => 302,
            },
            url: url.expand(store).into_owned(),
        }),
        DisruptiveAction::Allow(scope) => DisruptiveOutcome::Allow(*scope),
        DisruptiveAction::Pass | DisruptiveAction::Block => DisruptiveOutcome::Pass,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::MacroString;

    #[test]
    fn test_deny_status() {
        let store = CollectionStore::new();
        assert_eq!(
            resolve(&DisruptiveAction::Deny, None, &store),
            DisruptiveOutcome::Interrupt(Disruption::Status(403))
        );
        assert_eq!(
            resolve(&DisruptiveAction::Deny, Some(429), &store),
            DisruptiveOutcome::Interrupt(Disruption::Status(429))
        );
        assert_eq!(
            resolve(&DisruptiveAction::Drop, None, &store),
            DisruptiveOutcome::Interrupt(Disruption::Drop)
        );
        assert_eq!(resolve(&DisruptiveAction::Pass, Some(500), &store), DisruptiveOutcome::Pass);
    }

    #[test]
    fn test_redirect_status() {
        let store = CollectionStore::new();
        let redirect = DisruptiveAction::Redirect(MacroString::literal("https://example.com/"));
        let url = "https://example.com/".to_string();
        assert_eq!(
            resolve(&redirect, Some(403), &store),
            DisruptiveOutcome::Interrupt(Disruption::Redirect { status: 302, url: url.clone() })
        );
        assert_eq!(
            resolve(&redirect, Some(307), &store),
            DisruptiveOutcome::Interrupt(Disruption::Redirect { status: 307, url })
        );
    }
}
