//! Rule groups and how they are built from parsed directives.
//!
//! Directives are applied in file order: configuration directives update a
//! [`WafConfig`], rules and markers are appended, and removal and update
//! directives change rules defined before them. Rules are compiled only once
//! every directive has been seen, so updates see the rule as written.

use super::config::WafConfig;
use super::phase::Phase;
use super::rule::{Rule, RuleSource};
use crate::error::{Error, Result, SourceLocation};
use crate::operators::UnconditionalMatchOperator;
use crate::parser::{
    apply_exclusions, Action, DataAction, Directive, DirectiveKind, DisruptiveAction, FlowAction, MetadataAction,
    NonDisruptiveAction, OperatorName, OperatorSpec, RuleIdRange, VariableList,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An entry of a rule group, in definition order.
#[derive(Debug, Clone)]
pub enum RuleEntry {
    /// A rule or chain.
    Rule(Rule),
    /// A `SecMarker`.
    Marker(String),
}

/// The ordered rules of a WAF instance.
#[derive(Debug, Clone, Default)]
pub struct RuleGroup {
    entries: Vec<RuleEntry>,
}

impl RuleGroup {
    /// Every entry in definition order.
    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    /// Every rule in definition order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.entries.iter().filter_map(|e| match e {
            RuleEntry::Rule(rule) => Some(rule),
            RuleEntry::Marker(_) => None,
        })
    }

    /// Rules of one phase.
    pub fn phase_rules(&self, phase: Phase) -> impl Iterator<Item = &Rule> {
        self.rules().filter(move |r| r.phase == phase)
    }

    /// Number of rules (chains count once).
    pub fn rule_count(&self) -> usize {
        self.rules().count()
    }

    /// Rule with the given id.
    pub fn find(&self, id: u64) -> Option<&Rule> {
        self.rules().find(|r| r.id == id)
    }

    /// Marker names in definition order.
    pub fn markers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            RuleEntry::Marker(name) => Some(name.as_str()),
            RuleEntry::Rule(_) => None,
        })
    }
}

/// A rule waiting for its chain and for later updates.
struct PendingRule {
    id: u64,
    head: RuleSource,
    links: Vec<RuleSource>,
    defaults: Vec<Action>,
    removed: bool,
}

impl PendingRule {
    fn msg(&self) -> Option<&str> {
        self.head.actions.iter().find_map(|a| match a {
            Action::Metadata(MetadataAction::Msg(m)) => Some(m.as_str()),
            _ => None,
        })
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.head
            .actions
            .iter()
            .any(|a| matches!(a, Action::Metadata(MetadataAction::Tag(t)) if t == tag))
    }

    fn in_ranges(&self, ranges: &[RuleIdRange]) -> bool {
        ranges.iter().any(|r| r.contains(self.id))
    }

    fn compile(&self) -> Result<Rule> {
        let mut rule = Rule::compile(&self.head, &self.defaults, None)
            .map_err(|e| locate(e, &self.head))?;
        let mut links = Vec::with_capacity(self.links.len());
        for source in &self.links {
            let mut link = Rule::compile(source, &self.defaults, Some(self.id)).map_err(|e| locate(e, source))?;
            link.phase = rule.phase;
            links.push(link);
        }
        let mut next: Option<Box<Rule>> = None;
        for mut link in links.into_iter().rev() {
            link.chain = next;
            next = Some(Box::new(link));
        }
        rule.chain = next;
        Ok(rule)
    }
}

fn locate(e: Error, source: &RuleSource) -> Error {
    match e {
        Error::MissingRuleId | Error::DuplicateRuleId { .. } | Error::IncompleteChain => e,
        other => other.at(&source.location, &source.text),
    }
}

enum Pending {
    Rule(PendingRule),
    Marker(String),
}

/// The phase defaults used when no `SecDefaultAction` is set.
fn builtin_defaults() -> Vec<Action> {
    vec![
        Action::NonDisruptive(NonDisruptiveAction::Log),
        Action::NonDisruptive(NonDisruptiveAction::AuditLog),
        Action::Disruptive(DisruptiveAction::Pass),
    ]
}

#[derive(Default)]
struct Builder {
    entries: Vec<Pending>,
    ids: HashSet<u64>,
    defaults: HashMap<Phase, Vec<Action>>,
    open_chain: Option<(usize, SourceLocation)>,
    config: WafConfig,
}

/// Build a rule group and configuration from directives in file order.
pub fn build(directives: Vec<Directive>) -> Result<(RuleGroup, WafConfig)> {
    let mut builder = Builder::default();
    for directive in directives {
        builder.apply(directive)?;
    }
    builder.finish()
}

impl Builder {
    fn apply(&mut self, directive: Directive) -> Result<()> {
        let Directive {
            kind,
            location,
            text,
            included,
        } = directive;

        if let Some((index, _)) = self.open_chain {
            let DirectiveKind::Rule(rule) = kind else {
                return Err(Error::IncompleteChain);
            };
            let source = RuleSource {
                variables: rule.variables,
                operator: rule.operator,
                compiled: rule.compiled,
                actions: rule.actions,
                location,
                text,
            };
            if !source.is_chained() {
                self.open_chain = None;
            }
            if let Some(Pending::Rule(pending)) = self.entries.get_mut(index) {
                pending.links.push(source);
            }
            return Ok(());
        }

        match kind {
            DirectiveKind::Rule(rule) => self.add_rule(RuleSource {
                variables: rule.variables,
                operator: rule.operator,
                compiled: rule.compiled,
                actions: rule.actions,
                location,
                text,
            }),
            DirectiveKind::Action(actions) => self.add_rule(RuleSource {
                variables: Vec::new(),
                operator: OperatorSpec {
                    negated: false,
                    name: OperatorName::UnconditionalMatch,
                    argument: String::new(),
                },
                compiled: Arc::new(UnconditionalMatchOperator),
                actions,
                location,
                text,
            }),
            DirectiveKind::Marker(name) => {
                self.entries.push(Pending::Marker(name));
                Ok(())
            }
            DirectiveKind::DefaultAction(actions) => self.set_default(actions).map_err(|e| e.at(&location, &text)),
            DirectiveKind::RemoveById(ranges) => {
                self.remove(|r| r.in_ranges(&ranges));
                Ok(())
            }
            DirectiveKind::RemoveByMsg(msg) => {
                self.remove(|r| r.msg() == Some(msg.as_str()));
                Ok(())
            }
            DirectiveKind::RemoveByTag(tag) => {
                self.remove(|r| r.has_tag(&tag));
                Ok(())
            }
            DirectiveKind::UpdateActionById { id, actions } => self
                .update_actions(id, &actions, included.then_some(&location))
                .map_err(|e| e.at(&location, &text)),
            DirectiveKind::UpdateTargetById { ids, targets } => {
                self.update_targets(|r| r.in_ranges(&ids), &targets);
                Ok(())
            }
            DirectiveKind::UpdateTargetByTag { tag, targets } => {
                self.update_targets(|r| r.has_tag(&tag), &targets);
                Ok(())
            }
            DirectiveKind::UpdateTargetByMsg { msg, targets } => {
                self.update_targets(|r| r.msg() == Some(msg.as_str()), &targets);
                Ok(())
            }
            DirectiveKind::Config(config) => {
                self.config.apply(config);
                Ok(())
            }
        }
    }

    fn add_rule(&mut self, source: RuleSource) -> Result<()> {
        let id = source.id().filter(|id| *id != 0).ok_or(Error::MissingRuleId)?;
        if !self.ids.insert(id) {
            return Err(Error::DuplicateRuleId { id });
        }
        let phase = source.phase();
        let defaults = self.defaults.get(&phase).cloned().unwrap_or_else(builtin_defaults);
        if source.is_chained() {
            self.open_chain = Some((self.entries.len(), source.location.clone()));
        }
        tracing::trace!(id, phase = phase.number(), "rule defined");
        self.entries.push(Pending::Rule(PendingRule {
            id,
            head: source,
            links: Vec::new(),
            defaults,
            removed: false,
        }));
        Ok(())
    }

    fn set_default(&mut self, actions: Vec<Action>) -> Result<()> {
        let phase = actions
            .iter()
            .find_map(|a| match a {
                Action::Metadata(MetadataAction::Phase(p)) => Some(*p),
                _ => None,
            })
            .ok_or_else(|| Error::invalid_directive("SecDefaultAction", "a phase is required"))?;
        if !actions.iter().any(|a| matches!(a, Action::Disruptive(_))) {
            return Err(Error::invalid_directive(
                "SecDefaultAction",
                "a disruptive action is required",
            ));
        }
        if actions.iter().any(|a| {
            matches!(
                a,
                Action::Metadata(MetadataAction::Id(_) | MetadataAction::Msg(_) | MetadataAction::Tag(_))
                    | Action::Flow(_)
            )
        }) {
            return Err(Error::invalid_directive(
                "SecDefaultAction",
                "metadata and flow actions are not allowed",
            ));
        }
        self.defaults.insert(phase, actions);
        Ok(())
    }

    fn rules_mut(&mut self) -> impl Iterator<Item = &mut PendingRule> {
        self.entries.iter_mut().filter_map(|e| match e {
            Pending::Rule(rule) if !rule.removed => Some(rule),
            _ => None,
        })
    }

    fn remove(&mut self, matches: impl Fn(&PendingRule) -> bool) {
        for rule in self.rules_mut() {
            if matches(rule) {
                tracing::debug!(id = rule.id, "rule removed");
                rule.removed = true;
            }
        }
    }

    fn update_targets(&mut self, matches: impl Fn(&PendingRule) -> bool, targets: &VariableList) {
        for rule in self.rules_mut() {
            if !matches(rule) {
                continue;
            }
            let variables = &mut rule.head.variables;
            for selector in &targets.selectors {
                if !variables.contains(selector) {
                    variables.push(selector.clone());
                }
            }
            apply_exclusions(variables, &targets.exclusions);
        }
    }

    fn update_actions(&mut self, id: u64, updates: &[Action], included_from: Option<&SourceLocation>) -> Result<()> {
        if updates
            .iter()
            .any(|a| matches!(a, Action::Metadata(MetadataAction::Id(_) | MetadataAction::Phase(_))))
        {
            return Err(Error::invalid_directive(
                "SecRuleUpdateActionById",
                "id and phase cannot be updated",
            ));
        }
        let Some(rule) = self.rules_mut().find(|r| r.id == id) else {
            tracing::warn!(id, "SecRuleUpdateActionById names an unknown rule");
            return Ok(());
        };
        if let Some(location) = included_from {
            if rule.head.location.file != location.file {
                return Err(Error::invalid_directive(
                    "SecRuleUpdateActionById",
                    format!("rule {} was not defined in this file", id),
                ));
            }
        }
        merge_actions(&mut rule.head.actions, updates);
        Ok(())
    }

    fn finish(self) -> Result<(RuleGroup, WafConfig)> {
        if let Some((_, location)) = &self.open_chain {
            tracing::error!(%location, "chain without a following rule");
            return Err(Error::IncompleteChain);
        }
        let mut entries = Vec::with_capacity(self.entries.len());
        for pending in self.entries {
            match pending {
                Pending::Marker(name) => entries.push(RuleEntry::Marker(name)),
                Pending::Rule(rule) if rule.removed => {}
                Pending::Rule(rule) => entries.push(RuleEntry::Rule(rule.compile()?)),
            }
        }
        let group = RuleGroup { entries };
        tracing::info!(rules = group.rule_count(), "rule group built");
        Ok((group, self.config))
    }
}

/// Slot of an action that holds a single value. `None` for actions that
/// accumulate.
fn slot(action: &Action) -> Option<&'static str> {
    Some(match action {
        Action::Metadata(MetadataAction::Msg(_)) => "msg",
        Action::Metadata(MetadataAction::Severity(_)) => "severity",
        Action::Metadata(MetadataAction::Rev(_)) => "rev",
        Action::Metadata(MetadataAction::Ver(_)) => "ver",
        Action::Metadata(MetadataAction::Maturity(_)) => "maturity",
        Action::Metadata(MetadataAction::Accuracy(_)) => "accuracy",
        Action::Data(DataAction::Status(_)) => "status",
        Action::Disruptive(_) => "disruptive",
        Action::Flow(FlowAction::Skip(_)) => "skip",
        Action::Flow(FlowAction::SkipAfter(_)) => "skipAfter",
        Action::NonDisruptive(NonDisruptiveAction::LogData(_)) => "logdata",
        Action::NonDisruptive(NonDisruptiveAction::Log | NonDisruptiveAction::NoLog) => "log",
        Action::NonDisruptive(NonDisruptiveAction::AuditLog | NonDisruptiveAction::NoAuditLog) => "auditlog",
        _ => return None,
    })
}

/// Merge `SecRuleUpdateActionById` actions: single-valued actions replace,
/// transformations replace the whole list, everything else is appended.
fn merge_actions(existing: &mut Vec<Action>, updates: &[Action]) {
    let is_transformation = |a: &Action| matches!(a, Action::NonDisruptive(NonDisruptiveAction::Transformation(_)));
    if updates.iter().any(is_transformation) {
        existing.retain(|a| !is_transformation(a));
    }
    for update in updates {
        if let Some(s) = slot(update) {
            existing.retain(|a| slot(a) != Some(s));
        }
        existing.push(update.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn group(rules: &str) -> Result<(RuleGroup, WafConfig)> {
        let mut parser = Parser::new();
        parser.parse(rules)?;
        build(parser.into_directives())
    }

    #[test]
    fn test_rules_and_markers_in_order() {
        let (group, _) = group(
            r#"
            SecRule ARGS "@rx a" "id:1,phase:1,deny"
            SecMarker END_CHECKS
            SecAction "id:2,phase:2,pass,nolog"
            "#,
        )
        .unwrap();
        assert_eq!(group.rule_count(), 2);
        assert_eq!(group.markers().collect::<Vec<_>>(), vec!["END_CHECKS"]);
        assert!(matches!(group.entries()[1], RuleEntry::Marker(_)));
        assert_eq!(group.phase_rules(Phase::RequestBody).count(), 1);
        assert!(group.find(2).unwrap().variables.is_empty());
    }

    #[test]
    fn test_config_directives_collected() {
        let (_, config) = group("SecRuleEngine DetectionOnly\nSecRequestBodyAccess On").unwrap();
        assert_eq!(config.rule_engine, super::super::EngineMode::DetectionOnly);
        assert!(config.request_body_access);
    }

    #[test]
    fn test_chain_links() {
        let (group, _) = group(
            r#"
            SecRule REQUEST_METHOD "@streq POST" "id:10,phase:2,deny,chain"
            SecRule ARGS:a "@rx x" "chain"
            SecRule ARGS:b "@rx y" "t:lowercase"
            "#,
        )
        .unwrap();
        let rule = group.find(10).unwrap();
        assert_eq!(rule.chain_len(), 3);
        let link = rule.chain.as_ref().unwrap();
        assert_eq!(link.parent_id, Some(10));
        assert_eq!(link.phase, Phase::RequestBody);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(group(r#"SecRule ARGS "@rx a" "deny""#), Err(Error::MissingRuleId)));
        assert!(matches!(
            group("SecAction \"id:1,pass\"\nSecAction \"id:1,pass\""),
            Err(Error::DuplicateRuleId { id: 1 })
        ));
        assert!(matches!(
            group(r#"SecRule ARGS "@rx a" "id:1,chain""#),
            Err(Error::IncompleteChain)
        ));
        assert!(matches!(
            group("SecRule ARGS \"@rx a\" \"id:1,chain\"\nSecMarker X"),
            Err(Error::IncompleteChain)
        ));
    }

    #[test]
    fn test_default_action_snapshot() {
        let (group, _) = group(
            r#"
            SecRule ARGS "@rx a" "id:1,phase:2,block"
            SecDefaultAction "phase:2,log,deny,status:406"
            SecRule ARGS "@rx a" "id:2,phase:2,block"
            SecRule ARGS "@rx a" "id:3,phase:1,block"
            "#,
        )
        .unwrap();
        assert_eq!(group.find(1).unwrap().disruptive, DisruptiveAction::Pass);
        assert_eq!(group.find(2).unwrap().disruptive, DisruptiveAction::Deny);
        assert_eq!(group.find(2).unwrap().status, Some(406));
        assert_eq!(group.find(3).unwrap().disruptive, DisruptiveAction::Pass);
    }

    #[test]
    fn test_default_action_requires_phase_and_disruptive() {
        assert!(group(r#"SecDefaultAction "log,deny""#).is_err());
        assert!(group(r#"SecDefaultAction "phase:2,log""#).is_err());
    }

    #[test]
    fn test_removals_apply_to_earlier_rules() {
        let (group, _) = group(
            r#"
            SecRule ARGS "@rx a" "id:1,pass,msg:'remove me'"
            SecRule ARGS "@rx a" "id:2,pass,tag:legacy"
            SecRule ARGS "@rx a" "id:3,pass"
            SecRuleRemoveByMsg "remove me"
            SecRuleRemoveByTag legacy
            SecRuleRemoveById 3
            SecRule ARGS "@rx a" "id:4,pass,tag:legacy"
            "#,
        )
        .unwrap();
        let ids: Vec<u64> = group.rules().map(|r| r.id).collect();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn test_removal_by_msg_is_exact() {
        let (group, _) = group(
            "SecRule ARGS \"@rx a\" \"id:1,pass,msg:'remove me please'\"\nSecRuleRemoveByMsg \"remove me\"",
        )
        .unwrap();
        assert_eq!(group.rule_count(), 1);
    }

    #[test]
    fn test_update_action_by_id() {
        let (group, _) = group(
            r#"
            SecRule ARGS "@rx a" "id:1,phase:2,deny,status:403,t:lowercase,tag:a,msg:'old'"
            SecRuleUpdateActionById 1 "pass,msg:'new',tag:b,t:urlDecode"
            "#,
        )
        .unwrap();
        let rule = group.find(1).unwrap();
        assert_eq!(rule.disruptive, DisruptiveAction::Pass);
        assert_eq!(rule.metadata.msg.as_ref().unwrap().as_str(), "new");
        assert_eq!(rule.metadata.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(rule.transformations.names(), vec!["urlDecode"]);
        assert_eq!(rule.status, Some(403));
    }

    #[test]
    fn test_update_action_rejects_id_and_phase() {
        let rules = "SecRule ARGS \"@rx a\" \"id:1,pass\"\nSecRuleUpdateActionById 1 \"phase:1\"";
        assert!(group(rules).is_err());
    }

    #[test]
    fn test_update_target() {
        let (group, _) = group(
            r#"
            SecRule ARGS "@rx a" "id:1,pass,tag:sqli,chain"
            SecRule ARGS "@rx b" "t:none"
            SecRuleUpdateTargetById 1 "!ARGS:password|REQUEST_URI"
            SecRuleUpdateTargetByTag sqli "REQUEST_HEADERS:Referer"
            "#,
        )
        .unwrap();
        let rule = group.find(1).unwrap();
        let names: Vec<String> = rule.variables.iter().map(|v| v.to_string()).collect();
        assert_eq!(names, vec!["ARGS", "REQUEST_URI", "REQUEST_HEADERS:Referer"]);
        assert_eq!(rule.variables[0].exceptions.len(), 1);
        assert!(rule.chain.as_ref().unwrap().variables[0].exceptions.is_empty());
    }

    #[test]
    fn test_included_update_restricted_to_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.conf");
        let other = dir.path().join("other.conf");
        std::fs::write(&other, "SecRuleUpdateActionById 1 \"pass\"\n").unwrap();
        std::fs::write(
            &main,
            "SecRule ARGS \"@rx a\" \"id:1,deny\"\nInclude other.conf\n",
        )
        .unwrap();
        let mut parser = Parser::new();
        parser.parse_file(&main).unwrap();
        assert!(build(parser.into_directives()).is_err());
    }

    #[test]
    fn test_merge_actions_slots() {
        let mut existing = crate::parser::parse_actions("id:1,log,deny,setvar:tx.a=1").unwrap();
        merge_actions(&mut existing, &crate::parser::parse_actions("nolog,drop,setvar:tx.b=1").unwrap());
        assert_eq!(existing.len(), 5);
        assert!(existing.contains(&Action::Disruptive(DisruptiveAction::Drop)));
        assert!(!existing.contains(&Action::NonDisruptive(NonDisruptiveAction::Log)));
    }
}
