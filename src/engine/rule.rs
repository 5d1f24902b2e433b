//! Compiled rules and single-rule evaluation.
//!
//! A [`Rule`] is built from a `SecRule` or `SecAction` once its phase
//! defaults are known. Evaluation walks the variable selectors, runs the
//! transformation pipeline and operator over each value, fires the rule's
//! non-disruptive actions on every match and then descends into the chain.

use super::phase::Phase;
use super::transaction::Transaction;
use crate::actions::{self, RuleMetadata};
use crate::error::{Error, Result, SourceLocation};
use crate::operators::{Operator, OperatorContext};
use crate::parser::{
    Action, DataAction, DisruptiveAction, FlowAction, MetadataAction, NonDisruptiveAction, OperatorSpec,
    VariableSelector,
};
use crate::transformations::TransformationPipeline;
use crate::variables::{KeySelector, Resolution, VariableName, VariableResolver};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A rule as it came out of the parser, before defaults are merged.
#[derive(Clone)]
pub(crate) struct RuleSource {
    pub variables: Vec<VariableSelector>,
    pub operator: OperatorSpec,
    pub compiled: Arc<dyn Operator>,
    pub actions: Vec<Action>,
    pub location: SourceLocation,
    pub text: String,
}

impl RuleSource {
    /// Whether the rule declares `chain`.
    pub fn is_chained(&self) -> bool {
        self.actions.iter().any(|a| matches!(a, Action::Flow(FlowAction::Chain)))
    }

    /// Declared id, if any.
    pub fn id(&self) -> Option<u64> {
        self.actions.iter().find_map(|a| match a {
            Action::Metadata(MetadataAction::Id(id)) => Some(*id),
            _ => None,
        })
    }

    /// Declared phase, or phase 2.
    pub fn phase(&self) -> Phase {
        self.actions
            .iter()
            .rev()
            .find_map(|a| match a {
                Action::Metadata(MetadataAction::Phase(p)) => Some(*p),
                _ => None,
            })
            .unwrap_or(Phase::RequestBody)
    }
}

/// A compiled rule, possibly the head of a chain.
#[derive(Clone)]
pub struct Rule {
    /// Rule id; 0 for chain links.
    pub id: u64,
    /// Id of the chain head for chain links.
    pub parent_id: Option<u64>,
    /// Phase the rule runs in.
    pub phase: Phase,
    /// Variable selectors in declared order.
    pub variables: Vec<VariableSelector>,
    /// Operator as written.
    pub operator: OperatorSpec,
    pub(crate) compiled: Arc<dyn Operator>,
    /// Transformations applied to every value.
    pub transformations: TransformationPipeline,
    /// Descriptive actions.
    pub metadata: RuleMetadata,
    /// `capture`
    pub capture: bool,
    /// `multiMatch`
    pub multi_match: bool,
    /// `log`
    pub log: bool,
    /// `auditlog`
    pub audit_log: bool,
    /// `status:`, own or inherited.
    pub status: Option<u16>,
    /// Disruptive action after `block` and defaults are resolved.
    pub disruptive: DisruptiveAction,
    /// Actions fired on every match.
    pub actions: Vec<NonDisruptiveAction>,
    /// `skip:`
    pub skip: Option<u32>,
    /// `skipAfter:`
    pub skip_after: Option<String>,
    /// Next link of the chain.
    pub chain: Option<Box<Rule>>,
    /// Directive text.
    pub text: String,
    /// Rules file.
    pub file: Option<PathBuf>,
    /// Line of the directive.
    pub line: usize,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("variables", &self.variables)
            .field("operator", &self.operator.display())
            .field("disruptive", &self.disruptive.name())
            .field("chain", &self.chain)
            .finish()
    }
}

/// What a matched chain produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleMatch {
    pub matched_data: Vec<String>,
    pub messages: Vec<String>,
    pub log_data: Vec<String>,
    pub rule_text: Vec<String>,
}

impl Rule {
    /// Build a rule from its source. Defaults are merged ahead of the
    /// rule's own actions; chain links only take default transformations.
    pub(crate) fn compile(source: &RuleSource, defaults: &[Action], parent_id: Option<u64>) -> Result<Self> {
        let is_link = parent_id.is_some();
        let mut rule = Rule {
            id: 0,
            parent_id,
            phase: source.phase(),
            variables: source.variables.clone(),
            operator: source.operator.clone(),
            compiled: Arc::clone(&source.compiled),
            transformations: TransformationPipeline::new(),
            metadata: RuleMetadata::default(),
            capture: false,
            multi_match: false,
            log: false,
            audit_log: false,
            status: None,
            disruptive: DisruptiveAction::Pass,
            actions: Vec::new(),
            skip: None,
            skip_after: None,
            chain: None,
            text: source.text.clone(),
            file: source.location.file.clone(),
            line: source.location.line,
        };

        let mut default_disruptive = None;
        let mut default_status = None;
        for action in defaults {
            match action {
                Action::Metadata(_) | Action::Flow(_) => {}
                Action::Disruptive(d) => default_disruptive = Some(d.clone()),
                Action::Data(DataAction::Status(s)) => default_status = Some(*s),
                Action::NonDisruptive(nd @ NonDisruptiveAction::Transformation(_)) => rule.apply(nd)?,
                Action::NonDisruptive(nd) if !is_link => rule.apply(nd)?,
                Action::NonDisruptive(_) => {}
            }
        }

        let mut own_disruptive = None;
        for action in &source.actions {
            match action {
                Action::Metadata(MetadataAction::Id(_) | MetadataAction::Phase(_)) if is_link => {
                    return Err(Error::parse("chained rules may not declare id or phase", ""));
                }
                Action::Disruptive(_) if is_link => {
                    return Err(Error::parse("chained rules may not declare a disruptive action", ""));
                }
                Action::Metadata(m) => rule.metadata.apply(m, &mut rule.id),
                Action::Data(DataAction::Status(s)) => rule.status = Some(*s),
                Action::NonDisruptive(nd) => rule.apply(nd)?,
                Action::Disruptive(d) => own_disruptive = Some(d.clone()),
                Action::Flow(FlowAction::Chain) => {}
                Action::Flow(FlowAction::Skip(n)) => rule.skip = Some(*n),
                Action::Flow(FlowAction::SkipAfter(marker)) => rule.skip_after = Some(marker.clone()),
            }
        }

        if !is_link {
            if rule.id == 0 {
                return Err(Error::MissingRuleId);
            }
            let inherited = default_disruptive.unwrap_or(DisruptiveAction::Pass);
            rule.disruptive = match own_disruptive {
                None | Some(DisruptiveAction::Block) => inherited,
                Some(d) => d,
            };
            if rule.disruptive == DisruptiveAction::Block {
                rule.disruptive = DisruptiveAction::Pass;
            }
            rule.status = rule.status.or(default_status);
        }
        Ok(rule)
    }

    fn apply(&mut self, action: &NonDisruptiveAction) -> Result<()> {
        use NonDisruptiveAction as N;
        match action {
            N::Transformation(name) => self.transformations.push_name(name)?,
            N::Capture => self.capture = true,
            N::MultiMatch => self.multi_match = true,
            N::Log => self.log = true,
            N::NoLog => {
                self.log = false;
                self.audit_log = false;
            }
            N::AuditLog => self.audit_log = true,
            N::NoAuditLog => self.audit_log = false,
            N::LogData(data) => self.metadata.log_data = Some(data.clone()),
            other => self.actions.push(other.clone()),
        }
        Ok(())
    }

    /// Number of links in the chain, this rule included.
    pub fn chain_len(&self) -> usize {
        1 + self.chain.as_ref().map_or(0, |c| c.chain_len())
    }

    /// Evaluate the chain headed by this rule. `None` when any link fails;
    /// side effects of links that matched are kept.
    pub(crate) fn evaluate(&self, tx: &mut Transaction) -> Option<RuleMatch> {
        self.publish(tx);
        let mut out = RuleMatch::default();
        let mut link = self;
        loop {
            if !link.evaluate_link(tx, self, &mut out) {
                tx.debug().log(5, format_args!("rule {} did not match at line {}", self.id, link.line));
                return None;
            }
            match &link.chain {
                Some(next) => link = next,
                None => return Some(out),
            }
        }
    }

    /// Expose the head's metadata in `RULE` and reset the match collections.
    fn publish(&self, tx: &mut Transaction) {
        let store = &mut tx.store;
        store.collection_mut(VariableName::MatchedVars).reset();
        store.collection_mut(VariableName::MatchedVarsNames).reset();

        let rule = store.collection_mut(VariableName::Rule);
        rule.reset();
        rule.set_one("id", self.id.to_string());
        rule.set_one("phase", self.phase.number().to_string());
        if let Some(msg) = &self.metadata.msg {
            rule.set_one("msg", msg.as_str());
        }
        if let Some(severity) = self.metadata.severity {
            rule.set_one("severity", severity.to_string());
        }
        if let Some(rev) = &self.metadata.rev {
            rule.set_one("rev", rev.as_str());
        }
        if let Some(ver) = &self.metadata.ver {
            rule.set_one("ver", ver.as_str());
        }
        if let Some(maturity) = self.metadata.maturity {
            rule.set_one("maturity", maturity.to_string());
        }
        if let Some(accuracy) = self.metadata.accuracy {
            rule.set_one("accuracy", accuracy.to_string());
        }
    }

    fn evaluate_link(&self, tx: &mut Transaction, head: &Rule, out: &mut RuleMatch) -> bool {
        let exclusions = tx.target_exclusions(head);
        let mut matched = false;

        if self.variables.is_empty() && self.test(tx, b"") {
            matched = true;
            self.fire(tx);
        }

        for selector in &self.variables {
            let removed: Vec<KeySelector> = exclusions
                .iter()
                .filter(|(name, _)| *name == selector.name)
                .map(|(_, key)| key.clone())
                .collect();
            if removed.iter().any(|k| matches!(k, KeySelector::None)) {
                continue;
            }

            match VariableResolver::new(&tx.store).resolve(selector, &removed) {
                Resolution::Count(n) => {
                    let value = n.to_string();
                    if self.test(tx, value.as_bytes()) {
                        matched = true;
                        let key = selector.key.display();
                        let name = if key.is_empty() {
                            selector.name.lower_name()
                        } else {
                            format!("{}.{}", selector.name.lower_name(), key)
                        };
                        out.matched_data.push(format!("{}={}", name, value));
                        record_matched_var(tx, selector.name, &key, &value);
                        self.fire(tx);
                    }
                }
                Resolution::Values(pairs) if pairs.is_empty() => {
                    if self.test(tx, b"") {
                        matched = true;
                        out.matched_data.push(matched_data(selector.name, "", ""));
                        record_matched_var(tx, selector.name, "", "");
                        self.fire(tx);
                    }
                }
                Resolution::Values(pairs) => {
                    for (key, value) in pairs {
                        let candidates = if self.multi_match {
                            self.transformations.candidates(value.as_bytes())
                        } else {
                            vec![self.transformations.apply(value.as_bytes()).into_owned()]
                        };
                        for candidate in candidates {
                            if self.test(tx, &candidate) {
                                matched = true;
                                let candidate = String::from_utf8_lossy(&candidate);
                                out.matched_data.push(matched_data(selector.name, &key, &candidate));
                                record_matched_var(tx, selector.name, &key, &candidate);
                                self.fire(tx);
                            }
                        }
                    }
                }
            }
        }

        if matched {
            if let Some(msg) = &self.metadata.msg {
                out.messages.push(msg.expand(&tx.store).into_owned());
            }
            if let Some(data) = &self.metadata.log_data {
                out.log_data.push(data.expand(&tx.store).into_owned());
            }
            out.rule_text.push(self.text.clone());
        }
        matched
    }

    /// Run the operator, applying negation after any captures.
    fn test(&self, tx: &mut Transaction, value: &[u8]) -> bool {
        if self.capture {
            tx.store.reset_captures();
        }
        let waf = Arc::clone(&tx.waf);
        let id = Arc::clone(&tx.id);
        let debug = waf.debug.scope(tx.policy.debug_log_level, &id);
        let mut ctx = OperatorContext::new(&mut tx.store, debug, waf.geo.as_deref(), self.capture);
        let result = self.compiled.evaluate(&mut ctx, value) != self.operator.negated;
        debug.log(
            9,
            format_args!(
                "operator {} against {:?}: {}",
                self.operator.display(),
                String::from_utf8_lossy(value),
                result
            ),
        );
        result
    }

    fn fire(&self, tx: &mut Transaction) {
        for action in &self.actions {
            actions::execute(tx, action);
        }
    }
}

/// `collection:key:value`, or `collection:value` for single-valued variables.
fn matched_data(name: VariableName, key: &str, value: &str) -> String {
    if key.is_empty() {
        format!("{}:{}", name.lower_name(), value)
    } else {
        format!("{}:{}:{}", name.lower_name(), key, value)
    }
}

fn record_matched_var(tx: &mut Transaction, name: VariableName, key: &str, value: &str) {
    let var_name = if key.is_empty() {
        name.as_str().to_string()
    } else {
        format!("{}:{}", name.as_str(), key)
    };
    let store = &mut tx.store;
    store.set_value(VariableName::MatchedVar, value);
    store.set_value(VariableName::MatchedVarName, var_name.as_str());
    store.collection_mut(VariableName::MatchedVars).add(&var_name, value);
    store
        .collection_mut(VariableName::MatchedVarsNames)
        .add(&var_name, var_name.as_str());
}
