//! Phase scheduling.
//!
//! Each phase runs at most once per transaction. Rules run in definition
//! order; `skip` and `skipAfter` state lives only for the phase that set
//! it, and an interruption or `allow` ends the phase early.

use super::config::EngineMode;
use super::intervention::{Intervention, MatchedRule};
use super::phase::Phase;
use super::rule::{Rule, RuleMatch};
use super::ruleset::RuleEntry;
use super::transaction::Transaction;
use crate::actions::{self, DisruptiveOutcome, FlowState};
use crate::parser::{AllowScope, RuleIdRange};
use crate::variables::{KeySelector, VariableName};
use chrono::Utc;
use std::sync::Arc;

/// Rules and targets removed by `ctl:` for the rest of a transaction.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuntimeRemovals {
    pub ids: Vec<RuleIdRange>,
    pub tags: Vec<String>,
    pub targets_by_id: Vec<(Vec<RuleIdRange>, (VariableName, KeySelector))>,
    pub targets_by_tag: Vec<(String, (VariableName, KeySelector))>,
}

impl RuntimeRemovals {
    /// Whether the chain headed by `rule` is removed.
    pub fn removes(&self, rule: &Rule) -> bool {
        self.ids.iter().any(|r| r.contains(rule.id)) || self.tags.iter().any(|t| rule.metadata.has_tag(t))
    }

    /// Targets removed from the chain headed by `rule`.
    pub fn exclusions(&self, rule: &Rule) -> Vec<(VariableName, KeySelector)> {
        let by_id = self
            .targets_by_id
            .iter()
            .filter(|(ids, _)| ids.iter().any(|r| r.contains(rule.id)))
            .map(|(_, target)| target.clone());
        let by_tag = self
            .targets_by_tag
            .iter()
            .filter(|(tag, _)| rule.metadata.has_tag(tag))
            .map(|(_, target)| target.clone());
        by_id.chain(by_tag).collect()
    }
}

impl Transaction {
    pub(crate) fn target_exclusions(&self, head: &Rule) -> Vec<(VariableName, KeySelector)> {
        self.removals.exclusions(head)
    }

    /// Whether an earlier `allow` covers `phase`.
    fn allowed(&self, phase: Phase) -> bool {
        match self.allow {
            Some((AllowScope::Transaction, _)) => phase != Phase::Logging,
            Some((AllowScope::Request, _)) => phase.is_request_phase(),
            Some((AllowScope::Phase, allowed)) => phase == allowed,
            None => false,
        }
    }

    pub(crate) fn run_phase(&mut self, phase: Phase) {
        let slot = phase.index();
        if self.phases_done[slot] {
            return;
        }
        self.phases_done[slot] = true;

        if self.policy.rule_engine == EngineMode::Off {
            return;
        }
        let logging = phase == Phase::Logging;
        if !logging && (self.intervention.is_some() || self.allowed(phase)) {
            self.debug()
                .log(4, format_args!("skipping phase {}", phase.number()));
            return;
        }

        self.store
            .set_value(VariableName::Duration, self.elapsed_micros().to_string());
        self.debug().log(4, format_args!("starting phase {}", phase.number()));

        let waf = Arc::clone(&self.waf);
        let mut flow = FlowState::default();
        for entry in waf.rules.entries() {
            let rule = match entry {
                RuleEntry::Marker(name) => {
                    flow.marker(name);
                    continue;
                }
                RuleEntry::Rule(rule) if rule.phase == phase => rule,
                RuleEntry::Rule(_) => continue,
            };
            if flow.skip_rule() {
                self.debug().log(5, format_args!("rule {} skipped", rule.id));
                continue;
            }
            if self.removals.removes(rule) {
                self.debug().log(5, format_args!("rule {} removed by ctl", rule.id));
                continue;
            }

            if let Some(m) = rule.evaluate(self) {
                self.record_match(rule, phase, m, &mut flow);
            }

            if !logging && (self.intervention.is_some() || self.allowed(phase)) {
                break;
            }
        }

        if let Some(marker) = flow.pending_marker() {
            self.debug()
                .warn(format_args!("skipAfter marker {} not found in phase {}", marker, phase.number()));
        }
        if matches!(self.allow, Some((AllowScope::Phase, p)) if p == phase) {
            self.allow = None;
        }
    }

    fn record_match(&mut self, rule: &Rule, phase: Phase, m: RuleMatch, flow: &mut FlowState) {
        let record = MatchedRule {
            rule_id: rule.id,
            phase: phase.number(),
            disruptive: rule.disruptive.name().to_string(),
            messages: m.messages,
            log_data: m.log_data,
            matched_data: m.matched_data,
            severity: rule.metadata.severity,
            tags: rule.metadata.tags.clone(),
            rev: rule.metadata.rev.clone(),
            ver: rule.metadata.ver.clone(),
            maturity: rule.metadata.maturity,
            accuracy: rule.metadata.accuracy,
            file: rule.file.as_ref().map(|p| p.display().to_string()),
            line: rule.line,
            rule_text: m.rule_text,
            log: rule.log,
            audit_log: rule.audit_log,
            timestamp: Utc::now(),
        };

        if let Some(severity) = rule.metadata.severity {
            let highest = self
                .store
                .value(VariableName::HighestSeverity)
                .and_then(|v| v.parse::<u8>().ok());
            if highest.map_or(true, |h| severity < h) {
                self.store
                    .set_value(VariableName::HighestSeverity, severity.to_string());
            }
        }
        if record.log {
            tracing::warn!(tx = %self.id, "matched {}", record.format_log());
        }
        self.debug().log(4, format_args!("rule {} matched", rule.id));
        let first_message = record.messages.first().cloned();
        self.matched.push(record);
        flow.matched(rule.skip, rule.skip_after.as_deref());

        if self.policy.rule_engine != EngineMode::On || phase == Phase::Logging {
            return;
        }
        match actions::resolve(&rule.disruptive, rule.status, &self.store) {
            DisruptiveOutcome::Interrupt(disruption) => {
                let intervention = Intervention {
                    disruption,
                    rule_id: Some(rule.id),
                    phase,
                    message: first_message,
                };
                tracing::info!(tx = %self.id, "{}", intervention.format_log());
                self.intervention = Some(intervention);
            }
            DisruptiveOutcome::Allow(scope) => {
                self.debug().log(4, format_args!("rule {} allows {:?}", rule.id, scope));
                self.allow = Some((scope, phase));
            }
            DisruptiveOutcome::Pass => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Waf;

    fn run(rules: &str, uri: &str, phase: Phase) -> Transaction {
        let waf = Waf::from_string(rules).unwrap();
        let mut tx = waf.new_transaction();
        tx.process_uri("GET", uri, "HTTP/1.1");
        for p in Phase::all().iter().filter(|p| **p <= phase) {
            tx.run_phase(*p);
        }
        tx
    }

    fn ids(tx: &Transaction) -> Vec<u64> {
        tx.matched_rules().iter().map(|m| m.rule_id).collect()
    }

    #[test]
    fn test_skip_counts_rules_in_phase() {
        let tx = run(
            r#"
            SecAction "id:1,phase:1,pass,skip:2"
            SecAction "id:2,phase:2,pass"
            SecAction "id:3,phase:1,pass"
            SecAction "id:4,phase:1,pass"
            SecAction "id:5,phase:1,pass"
            "#,
            "/",
            Phase::RequestBody,
        );
        assert_eq!(ids(&tx), vec![1, 5, 2]);
    }

    #[test]
    fn test_skip_state_resets_between_phases() {
        let tx = run(
            r#"
            SecAction "id:1,phase:1,pass,skipAfter:NOWHERE"
            SecAction "id:2,phase:1,pass"
            SecAction "id:3,phase:2,pass"
            "#,
            "/",
            Phase::RequestBody,
        );
        assert_eq!(ids(&tx), vec![1, 3]);
    }

    #[test]
    fn test_remove_by_tag_at_runtime() {
        let tx = run(
            r#"
            SecAction "id:1,phase:1,pass,ctl:ruleRemoveByTag=noisy"
            SecAction "id:2,phase:1,pass,tag:noisy"
            SecAction "id:3,phase:1,pass,tag:quiet"
            "#,
            "/",
            Phase::RequestHeaders,
        );
        assert_eq!(ids(&tx), vec![1, 3]);
    }

    #[test]
    fn test_remove_whole_target_by_tag() {
        let tx = run(
            r#"
            SecAction "id:1,phase:1,pass,ctl:ruleRemoveTargetByTag=sqli;ARGS"
            SecRule ARGS|REQUEST_FILENAME "@contains zz" "id:2,phase:1,pass,tag:sqli"
            "#,
            "/a?q=zz",
            Phase::RequestHeaders,
        );
        assert_eq!(ids(&tx), vec![1]);
    }

    #[test]
    fn test_highest_severity_keeps_lowest_number() {
        let tx = run(
            r#"
            SecAction "id:1,phase:1,pass,severity:4"
            SecAction "id:2,phase:1,pass,severity:CRITICAL"
            SecAction "id:3,phase:1,pass,severity:5"
            "#,
            "/",
            Phase::RequestHeaders,
        );
        assert_eq!(tx.variable("HIGHEST_SEVERITY", None), Some("2"));
    }

    #[test]
    fn test_logging_phase_never_interrupts() {
        let tx = run(
            r#"SecAction "id:1,phase:5,deny""#,
            "/",
            Phase::Logging,
        );
        assert_eq!(ids(&tx), vec![1]);
        assert_eq!(tx.is_interrupted(), None);
    }

    #[test]
    fn test_allow_request_covers_request_phases_only() {
        let tx = run(
            r#"
            SecAction "id:1,phase:1,allow:request"
            SecAction "id:2,phase:2,pass"
            SecAction "id:3,phase:3,pass"
            "#,
            "/",
            Phase::ResponseHeaders,
        );
        assert_eq!(ids(&tx), vec![1, 3]);
    }
}
