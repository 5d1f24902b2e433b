//! `ctl:` actions. They change the policy of the running transaction only.

use crate::engine::Transaction;
use crate::parser::Ctl;

pub(crate) fn apply(tx: &mut Transaction, ctl: &Ctl) {
    tx.debug().debug(format_args!("ctl {:?}", ctl));
    let policy = &mut tx.policy;
    match ctl {
        Ctl::RuleEngine(mode) => policy.rule_engine = *mode,
        Ctl::AuditEngine(mode) => policy.audit_engine = *mode,
        Ctl::AuditLogParts(edit) => policy.audit_log_parts.apply(edit),
        Ctl::RequestBodyAccess(on) => policy.request_body_access = *on,
        Ctl::ResponseBodyAccess(on) => policy.response_body_access = *on,
        Ctl::RequestBodyLimit(limit) => policy.request_body_limit = *limit,
        Ctl::RequestBodyProcessor(kind) => policy.body_processor = Some(*kind),
        Ctl::ForceRequestBodyVariable(on) => policy.force_request_body_variable = *on,
        Ctl::DebugLogLevel(level) => policy.debug_log_level = *level,
        Ctl::RuleRemoveById(ranges) => tx.removals.ids.extend(ranges.iter().copied()),
        Ctl::RuleRemoveByTag(tag) => tx.removals.tags.push(tag.clone()),
        Ctl::RuleRemoveTargetById { ids, target } => {
            tx.removals.targets_by_id.push((ids.clone(), target.clone()))
        }
        Ctl::RuleRemoveTargetByTag { tag, target } => {
            tx.removals.targets_by_tag.push((tag.clone(), target.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineMode, Waf};
    use crate::parser::{parse_single_action, Action, NonDisruptiveAction};

    fn ctl(input: &str) -> Ctl {
        match parse_single_action(input).unwrap() {
            Action::NonDisruptive(NonDisruptiveAction::Ctl(c)) => c,
            other => panic!("not a ctl: {:?}", other),
        }
    }

    #[test]
    fn test_policy_changes_stay_in_transaction() {
        let waf = Waf::from_string("SecRuleEngine On").unwrap();
        let mut tx = waf.new_transaction();
        apply(&mut tx, &ctl("ctl:ruleEngine=DetectionOnly"));
        apply(&mut tx, &ctl("ctl:requestBodyAccess=On"));
        assert_eq!(tx.policy.rule_engine, EngineMode::DetectionOnly);
        assert!(tx.policy.request_body_access);

        let other = waf.new_transaction();
        assert_eq!(other.policy.rule_engine, EngineMode::On);
        assert!(!other.policy.request_body_access);
    }

    #[test]
    fn test_runtime_removals_recorded() {
        let waf = Waf::from_string("").unwrap();
        let mut tx = waf.new_transaction();
        apply(&mut tx, &ctl("ctl:ruleRemoveById=100-200"));
        apply(&mut tx, &ctl("ctl:ruleRemoveByTag=attack-xss"));
        apply(&mut tx, &ctl("ctl:ruleRemoveTargetById=300;ARGS:pwd"));
        assert!(tx.removals.ids[0].contains(150));
        assert_eq!(tx.removals.tags, vec!["attack-xss".to_string()]);
        assert_eq!(tx.removals.targets_by_id.len(), 1);
    }
}
