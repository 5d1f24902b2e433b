//! Action list parsing for SecRule, SecAction and SecDefaultAction.
//!
//! Actions are a tagged variant grouped by what the scheduler does with
//! them: metadata describes the rule, data feeds the disruptive action,
//! non-disruptive actions run on every match, the disruptive action runs
//! once per matched chain and flow actions steer the scheduler.

use crate::audit::{AuditEngineMode, PartsEdit};
use crate::actions::Severity;
use crate::bodyprocessors::BodyProcessorKind;
use crate::engine::{EngineMode, Phase};
use crate::error::{Error, Result};
use crate::macros::MacroString;
use crate::transformations;
use crate::variables::{KeySelector, VariableName};

use super::variable::parse_target;

/// An action of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Describes the rule; never merged from defaults.
    Metadata(MetadataAction),
    /// Parameterises the disruptive action.
    Data(DataAction),
    /// Runs for every match.
    NonDisruptive(NonDisruptiveAction),
    /// Decides the fate of the transaction.
    Disruptive(DisruptiveAction),
    /// Steers rule scheduling.
    Flow(FlowAction),
}

/// Metadata actions.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataAction {
    /// Rule id.
    Id(u64),
    /// Phase the rule runs in.
    Phase(Phase),
    /// Message, may contain macros.
    Msg(MacroString),
    /// Tag.
    Tag(String),
    /// Severity, 0 (emergency) to 7 (debug).
    Severity(u8),
    /// Rule revision.
    Rev(String),
    /// Rule set version.
    Ver(String),
    /// Maturity, 1-9.
    Maturity(u8),
    /// Accuracy, 1-9.
    Accuracy(u8),
}

/// Data actions.
#[derive(Debug, Clone, PartialEq)]
pub enum DataAction {
    /// Status code for deny, drop and redirect.
    Status(u16),
}

/// Non-disruptive actions.
#[derive(Debug, Clone, PartialEq)]
pub enum NonDisruptiveAction {
    /// `t:name`; `t:none` clears the inherited pipeline.
    Transformation(String),
    /// Write operator captures to `TX:0`..`TX:9`.
    Capture,
    /// Test the value after every transformation step.
    MultiMatch,
    /// Log matches.
    Log,
    /// Do not log matches.
    NoLog,
    /// Include matches in the audit log.
    AuditLog,
    /// Exclude matches from the audit log.
    NoAuditLog,
    /// Extra data logged with a match.
    LogData(MacroString),
    /// Modify a collection variable.
    SetVar(SetVar),
    /// Load a persistent collection.
    InitCol {
        /// Persistent collection.
        collection: VariableName,
        /// Partition key.
        key: MacroString,
    },
    /// Load the `USER` collection.
    SetUid(MacroString),
    /// Load the `SESSION` collection.
    SetSid(MacroString),
    /// Set an `ENV` variable.
    SetEnv {
        /// Variable name.
        name: String,
        /// Value.
        value: MacroString,
    },
    /// Expire a persistent variable after a number of seconds.
    ExpireVar {
        /// Collection of the variable.
        collection: VariableName,
        /// Variable name.
        key: String,
        /// Lifetime in seconds.
        seconds: MacroString,
    },
    /// Change transaction policy.
    Ctl(Ctl),
}

/// Disruptive actions.
#[derive(Debug, Clone, PartialEq)]
pub enum DisruptiveAction {
    /// Stop inspecting.
    Allow(AllowScope),
    /// Use the phase's default disruptive action.
    Block,
    /// Interrupt with a status code.
    Deny,
    /// Close the connection.
    Drop,
    /// Continue.
    Pass,
    /// Interrupt with a redirect.
    Redirect(MacroString),
}

impl DisruptiveAction {
    /// Action name as written in rules.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Allow(_) => "allow",
            Self::Block => "block",
            Self::Deny => "deny",
            Self::Drop => "drop",
            Self::Pass => "pass",
            Self::Redirect(_) => "redirect",
        }
    }
}

/// What an `allow` skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowScope {
    /// Every remaining rule of phases 1-4.
    Transaction,
    /// The rest of the current phase.
    Phase,
    /// The rest of the request phases.
    Request,
}

/// Flow actions.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowAction {
    /// The next rule is this rule's chain child.
    Chain,
    /// Skip the next N rules of the phase.
    Skip(u32),
    /// Skip to just after a marker.
    SkipAfter(String),
}

/// Target of a `setvar`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetVar {
    /// Collection written.
    pub collection: VariableName,
    /// Key, may contain macros.
    pub key: MacroString,
    /// Operation.
    pub op: SetVarOp,
}

/// `setvar` operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SetVarOp {
    /// `=value`
    Set(MacroString),
    /// `=+n`
    Add(MacroString),
    /// `=-n`
    Sub(MacroString),
    /// `!name`
    Delete,
}

/// An inclusive range of rule ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleIdRange {
    /// First id.
    pub start: u64,
    /// Last id.
    pub end: u64,
}

impl RuleIdRange {
    /// Whether `id` is in the range.
    pub fn contains(&self, id: u64) -> bool {
        (self.start..=self.end).contains(&id)
    }
}

/// Parse a space or comma separated list of ids and `lo-hi` ranges.
pub fn parse_id_ranges(input: &str) -> Result<Vec<RuleIdRange>> {
    let mut ranges = Vec::new();
    for part in input.split([' ', ',', '\t']).filter(|p| !p.is_empty()) {
        let bad = || Error::invalid_directive("SecRuleRemoveById", format!("invalid rule id '{}'", part));
        let range = match part.split_once('-') {
            Some((lo, hi)) => {
                let start = lo.trim().parse().map_err(|_| bad())?;
                let end = hi.trim().parse().map_err(|_| bad())?;
                if end < start {
                    return Err(bad());
                }
                RuleIdRange { start, end }
            }
            None => {
                let id = part.parse().map_err(|_| bad())?;
                RuleIdRange { start: id, end: id }
            }
        };
        ranges.push(range);
    }
    if ranges.is_empty() {
        return Err(Error::invalid_directive("SecRuleRemoveById", "no rule ids given"));
    }
    Ok(ranges)
}

/// `ctl:` actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Ctl {
    /// `ruleEngine`
    RuleEngine(EngineMode),
    /// `auditEngine`
    AuditEngine(AuditEngineMode),
    /// `auditLogParts`
    AuditLogParts(PartsEdit),
    /// `requestBodyAccess`
    RequestBodyAccess(bool),
    /// `responseBodyAccess`
    ResponseBodyAccess(bool),
    /// `requestBodyLimit`
    RequestBodyLimit(usize),
    /// `requestBodyProcessor`
    RequestBodyProcessor(BodyProcessorKind),
    /// `forceRequestBodyVariable`
    ForceRequestBodyVariable(bool),
    /// `ruleRemoveById`
    RuleRemoveById(Vec<RuleIdRange>),
    /// `ruleRemoveByTag`
    RuleRemoveByTag(String),
    /// `ruleRemoveTargetById`
    RuleRemoveTargetById {
        /// Rules affected.
        ids: Vec<RuleIdRange>,
        /// Collection and key removed.
        target: (VariableName, KeySelector),
    },
    /// `ruleRemoveTargetByTag`
    RuleRemoveTargetByTag {
        /// Tag of the rules affected.
        tag: String,
        /// Collection and key removed.
        target: (VariableName, KeySelector),
    },
    /// `debugLogLevel`
    DebugLogLevel(u8),
}

/// Parse an action list.
pub fn parse_actions(input: &str) -> Result<Vec<Action>> {
    split_actions(input)
        .into_iter()
        .map(|raw| parse_single_action(&raw))
        .collect()
}

/// Split on commas. A value that starts with `'` right after the action's
/// colon extends to the matching `'`, commas included.
fn split_actions(input: &str) -> Vec<String> {
    let mut actions = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut prev = None;

    for c in input.chars() {
        match c {
            '\'' if !in_quotes && prev == Some(':') => in_quotes = true,
            '\'' if in_quotes => in_quotes = false,
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    actions.push(current.trim().to_string());
                }
                current.clear();
                prev = Some(c);
                continue;
            }
            _ => {}
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.trim().is_empty() {
        actions.push(current.trim().to_string());
    }
    actions
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

fn required<'a>(action: &str, argument: Option<&'a str>) -> Result<&'a str> {
    match argument {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(Error::invalid_action(action, "missing argument")),
    }
}

fn number<T: std::str::FromStr>(action: &str, argument: Option<&str>) -> Result<T> {
    let arg = required(action, argument)?;
    arg.trim()
        .parse()
        .map_err(|_| Error::invalid_action(action, format!("'{}' is not a number", arg)))
}

/// Parse a single `name[:argument]` action.
pub fn parse_single_action(input: &str) -> Result<Action> {
    let input = input.trim();
    let (name, argument) = match input.split_once(':') {
        Some((name, arg)) => (name.trim().to_ascii_lowercase(), Some(unquote(arg))),
        None => (input.to_ascii_lowercase(), None),
    };

    let action = match name.as_str() {
        "id" => {
            let id: u64 = number("id", argument)?;
            if id == 0 {
                return Err(Error::invalid_action("id", "rule id must be positive"));
            }
            Action::Metadata(MetadataAction::Id(id))
        }
        "phase" => Action::Metadata(MetadataAction::Phase(parse_phase(required("phase", argument)?)?)),
        "msg" => Action::Metadata(MetadataAction::Msg(MacroString::new(required("msg", argument)?)?)),
        "tag" => Action::Metadata(MetadataAction::Tag(required("tag", argument)?.to_string())),
        "severity" => Action::Metadata(MetadataAction::Severity(parse_severity(required(
            "severity", argument,
        )?)?)),
        "rev" => Action::Metadata(MetadataAction::Rev(argument.unwrap_or_default().to_string())),
        "ver" => Action::Metadata(MetadataAction::Ver(argument.unwrap_or_default().to_string())),
        "maturity" => Action::Metadata(MetadataAction::Maturity(number("maturity", argument)?)),
        "accuracy" => Action::Metadata(MetadataAction::Accuracy(number("accuracy", argument)?)),

        "status" => {
            let status: u16 = number("status", argument)?;
            if !(100..=599).contains(&status) {
                return Err(Error::invalid_action("status", format!("{} is not an HTTP status", status)));
            }
            Action::Data(DataAction::Status(status))
        }

        "t" => {
            let t = required("t", argument)?;
            if !t.eq_ignore_ascii_case("none") {
                transformations::lookup(t)?;
            }
            Action::NonDisruptive(NonDisruptiveAction::Transformation(t.to_string()))
        }
        "capture" => Action::NonDisruptive(NonDisruptiveAction::Capture),
        "multimatch" => Action::NonDisruptive(NonDisruptiveAction::MultiMatch),
        "log" => Action::NonDisruptive(NonDisruptiveAction::Log),
        "nolog" => Action::NonDisruptive(NonDisruptiveAction::NoLog),
        "auditlog" => Action::NonDisruptive(NonDisruptiveAction::AuditLog),
        "noauditlog" => Action::NonDisruptive(NonDisruptiveAction::NoAuditLog),
        "logdata" => Action::NonDisruptive(NonDisruptiveAction::LogData(MacroString::new(
            argument.unwrap_or_default(),
        )?)),
        "setvar" => Action::NonDisruptive(NonDisruptiveAction::SetVar(parse_setvar(required(
            "setvar", argument,
        )?)?)),
        "initcol" => {
            let arg = required("initcol", argument)?;
            let (collection, key) = arg
                .split_once('=')
                .ok_or_else(|| Error::invalid_action("initcol", "expected COLLECTION=key"))?;
            let collection = persistent_collection("initcol", collection)?;
            Action::NonDisruptive(NonDisruptiveAction::InitCol {
                collection,
                key: MacroString::new(key.trim())?,
            })
        }
        "setuid" => Action::NonDisruptive(NonDisruptiveAction::SetUid(MacroString::new(required(
            "setuid", argument,
        )?)?)),
        "setsid" => Action::NonDisruptive(NonDisruptiveAction::SetSid(MacroString::new(required(
            "setsid", argument,
        )?)?)),
        "setenv" => {
            let arg = required("setenv", argument)?;
            let (name, value) = arg.split_once('=').unwrap_or((arg, "1"));
            Action::NonDisruptive(NonDisruptiveAction::SetEnv {
                name: name.trim().to_string(),
                value: MacroString::new(value)?,
            })
        }
        "expirevar" => {
            let arg = required("expirevar", argument)?;
            let (var, seconds) = arg
                .split_once('=')
                .ok_or_else(|| Error::invalid_action("expirevar", "expected collection.name=seconds"))?;
            let (collection, key) = var
                .split_once('.')
                .ok_or_else(|| Error::invalid_action("expirevar", "expected collection.name"))?;
            Action::NonDisruptive(NonDisruptiveAction::ExpireVar {
                collection: persistent_collection("expirevar", collection)?,
                key: key.trim().to_string(),
                seconds: MacroString::new(seconds.trim())?,
            })
        }
        "ctl" => Action::NonDisruptive(NonDisruptiveAction::Ctl(parse_ctl(required("ctl", argument)?)?)),

        "allow" => {
            let scope = match argument.map(|a| a.to_ascii_lowercase()).as_deref() {
                None | Some("") => AllowScope::Transaction,
                Some("phase") => AllowScope::Phase,
                Some("request") => AllowScope::Request,
                Some(other) => {
                    return Err(Error::invalid_action("allow", format!("unknown scope '{}'", other)))
                }
            };
            Action::Disruptive(DisruptiveAction::Allow(scope))
        }
        "block" => Action::Disruptive(DisruptiveAction::Block),
        "deny" => Action::Disruptive(DisruptiveAction::Deny),
        "drop" => Action::Disruptive(DisruptiveAction::Drop),
        "pass" => Action::Disruptive(DisruptiveAction::Pass),
        "redirect" => Action::Disruptive(DisruptiveAction::Redirect(MacroString::new(required(
            "redirect", argument,
        )?)?)),

        "chain" => Action::Flow(FlowAction::Chain),
        "skip" => {
            let n: u32 = number("skip", argument)?;
            if n == 0 {
                return Err(Error::invalid_action("skip", "count must be positive"));
            }
            Action::Flow(FlowAction::Skip(n))
        }
        "skipafter" => Action::Flow(FlowAction::SkipAfter(required("skipAfter", argument)?.to_string())),

        _ => return Err(Error::UnknownAction { name: name.clone() }),
    };
    Ok(action)
}

/// Parse `1`..`5` or the names `request`, `response` and `logging`.
pub fn parse_phase(input: &str) -> Result<Phase> {
    let phase = match input.trim().to_ascii_lowercase().as_str() {
        "request" => Some(Phase::RequestBody),
        "response" => Some(Phase::ResponseBody),
        "logging" => Some(Phase::Logging),
        n => n.parse().ok().and_then(Phase::from_number),
    };
    phase.ok_or_else(|| Error::invalid_action("phase", format!("invalid phase '{}'", input)))
}

fn parse_severity(input: &str) -> Result<u8> {
    Severity::parse(input)
        .map(|s| s as u8)
        .ok_or_else(|| Error::invalid_action("severity", format!("invalid severity '{}'", input)))
}

fn persistent_collection(action: &str, name: &str) -> Result<VariableName> {
    match VariableName::from_name(name) {
        Some(v) if v.is_persistent() => Ok(v),
        _ => Err(Error::invalid_action(
            action,
            format!("'{}' is not a persistent collection", name.trim()),
        )),
    }
}

fn writable_collection(name: &str) -> Result<VariableName> {
    match VariableName::from_name(name) {
        Some(v) if v == VariableName::Tx || v.is_persistent() => Ok(v),
        _ => Err(Error::invalid_action(
            "setvar",
            format!("collection '{}' is not writable", name.trim()),
        )),
    }
}

/// Parse a `setvar` argument. Without a collection the variable is in TX.
fn parse_setvar(input: &str) -> Result<SetVar> {
    let input = input.trim();
    let split = |var: &str| -> Result<(VariableName, MacroString)> {
        match var.split_once('.') {
            Some((collection, key)) => Ok((writable_collection(collection)?, MacroString::new(key.trim())?)),
            None => Ok((VariableName::Tx, MacroString::new(var.trim())?)),
        }
    };

    if let Some(var) = input.strip_prefix('!') {
        let (collection, key) = split(var)?;
        return Ok(SetVar {
            collection,
            key,
            op: SetVarOp::Delete,
        });
    }

    let (var, value) = match input.split_once('=') {
        Some((var, value)) => (var, Some(value)),
        None => (input, None),
    };
    let (collection, key) = split(var)?;
    if key.as_str().is_empty() {
        return Err(Error::invalid_action("setvar", "missing variable name"));
    }
    let op = match value {
        None => SetVarOp::Set(MacroString::literal("1")),
        Some(v) => match (v.strip_prefix('+'), v.strip_prefix('-')) {
            (Some(n), _) => SetVarOp::Add(MacroString::new(n)?),
            (_, Some(n)) => SetVarOp::Sub(MacroString::new(n)?),
            _ => SetVarOp::Set(MacroString::new(v)?),
        },
    };
    Ok(SetVar { collection, key, op })
}

fn on_off(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(Error::invalid_action(name, format!("expected On or Off, got '{}'", value))),
    }
}

fn parse_ctl(input: &str) -> Result<Ctl> {
    let (option, value) = input
        .split_once('=')
        .ok_or_else(|| Error::invalid_action("ctl", format!("expected option=value, got '{}'", input)))?;
    let value = value.trim();
    let bad = |what: &str| Error::invalid_action("ctl", format!("invalid {} '{}'", what, value));

    let ctl = match option.trim().to_ascii_lowercase().as_str() {
        "ruleengine" => Ctl::RuleEngine(EngineMode::from_name(value).ok_or_else(|| bad("rule engine mode"))?),
        "auditengine" => {
            Ctl::AuditEngine(AuditEngineMode::from_name(value).ok_or_else(|| bad("audit engine mode"))?)
        }
        "auditlogparts" => Ctl::AuditLogParts(PartsEdit::parse(value)?),
        "requestbodyaccess" => Ctl::RequestBodyAccess(on_off("ctl", value)?),
        "responsebodyaccess" => Ctl::ResponseBodyAccess(on_off("ctl", value)?),
        "requestbodylimit" => Ctl::RequestBodyLimit(value.parse().map_err(|_| bad("limit"))?),
        "requestbodyprocessor" => Ctl::RequestBodyProcessor(
            BodyProcessorKind::from_name(value).ok_or_else(|| bad("body processor"))?,
        ),
        "forcerequestbodyvariable" => Ctl::ForceRequestBodyVariable(on_off("ctl", value)?),
        "ruleremovebyid" => Ctl::RuleRemoveById(parse_id_ranges(value)?),
        "ruleremovebytag" => Ctl::RuleRemoveByTag(value.to_string()),
        "ruleremovetargetbyid" => {
            let (ids, target) = value.split_once(';').ok_or_else(|| bad("target removal"))?;
            Ctl::RuleRemoveTargetById {
                ids: parse_id_ranges(ids)?,
                target: parse_target(target)?,
            }
        }
        "ruleremovetargetbytag" => {
            let (tag, target) = value.split_once(';').ok_or_else(|| bad("target removal"))?;
            Ctl::RuleRemoveTargetByTag {
                tag: tag.trim().to_string(),
                target: parse_target(target)?,
            }
        }
        "debugloglevel" => match value.parse::<u8>() {
            Ok(level) if level <= 9 => Ctl::DebugLogLevel(level),
            _ => return Err(bad("debug log level")),
        },
        other => {
            return Err(Error::invalid_action("ctl", format!("unsupported option '{}'", other)))
        }
    };
    Ok(ctl)
}
