//! Directive types produced by the parser.

use super::{Action, OperatorSpec, RuleIdRange, VariableList, VariableSelector};
use crate::audit::{AuditEngineMode, AuditLogFormat, AuditLogParts};
use crate::engine::{BodyLimitAction, EngineMode};
use crate::error::SourceLocation;
use crate::operators::Operator;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A parsed directive with the place it came from.
#[derive(Debug, Clone)]
pub struct Directive {
    /// What the directive does.
    pub kind: DirectiveKind,
    /// File and line of the logical line.
    pub location: SourceLocation,
    /// The logical line as written.
    pub text: String,
    /// Whether the directive came from an `Include`d file.
    pub included: bool,
}

/// Directive payloads.
#[derive(Debug, Clone)]
pub enum DirectiveKind {
    /// `SecRule`
    Rule(SecRule),
    /// `SecAction`
    Action(Vec<Action>),
    /// `SecMarker`
    Marker(String),
    /// `SecDefaultAction`
    DefaultAction(Vec<Action>),
    /// `SecRuleRemoveById`
    RemoveById(Vec<RuleIdRange>),
    /// `SecRuleRemoveByMsg`
    RemoveByMsg(String),
    /// `SecRuleRemoveByTag`
    RemoveByTag(String),
    /// `SecRuleUpdateActionById`
    UpdateActionById {
        /// Rule to update.
        id: u64,
        /// Actions to merge in.
        actions: Vec<Action>,
    },
    /// `SecRuleUpdateTargetById`
    UpdateTargetById {
        /// Rules to update.
        ids: Vec<RuleIdRange>,
        /// Targets to add or exclude.
        targets: VariableList,
    },
    /// `SecRuleUpdateTargetByTag`
    UpdateTargetByTag {
        /// Tag of the rules to update.
        tag: String,
        /// Targets to add or exclude.
        targets: VariableList,
    },
    /// `SecRuleUpdateTargetByMsg`
    UpdateTargetByMsg {
        /// Message of the rules to update.
        msg: String,
        /// Targets to add or exclude.
        targets: VariableList,
    },
    /// Engine configuration.
    Config(ConfigDirective),
}

/// A `SecRule` with its operator compiled.
#[derive(Clone)]
pub struct SecRule {
    /// Variables to inspect.
    pub variables: Vec<VariableSelector>,
    /// Operator as written.
    pub operator: OperatorSpec,
    /// Compiled operator.
    pub compiled: Arc<dyn Operator>,
    /// Declared actions.
    pub actions: Vec<Action>,
}

impl fmt::Debug for SecRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecRule")
            .field("variables", &self.variables)
            .field("operator", &self.operator)
            .field("actions", &self.actions)
            .finish()
    }
}

/// Configuration directives.
#[derive(Debug, Clone)]
pub enum ConfigDirective {
    /// `SecRuleEngine`
    RuleEngine(EngineMode),
    /// `SecRequestBodyAccess`
    RequestBodyAccess(bool),
    /// `SecRequestBodyLimit`
    RequestBodyLimit(usize),
    /// `SecRequestBodyNoFilesLimit`
    RequestBodyNoFilesLimit(usize),
    /// `SecRequestBodyInMemoryLimit`
    RequestBodyInMemoryLimit(usize),
    /// `SecRequestBodyLimitAction`
    RequestBodyLimitAction(BodyLimitAction),
    /// `SecResponseBodyAccess`
    ResponseBodyAccess(bool),
    /// `SecResponseBodyLimit`
    ResponseBodyLimit(usize),
    /// `SecResponseBodyLimitAction`
    ResponseBodyLimitAction(BodyLimitAction),
    /// `SecResponseBodyMimeType`
    ResponseBodyMimeType(Vec<String>),
    /// `SecResponseBodyMimeTypesClear`
    ResponseBodyMimeTypesClear,
    /// `SecAuditEngine`
    AuditEngine(AuditEngineMode),
    /// `SecAuditLog`
    AuditLog(PathBuf),
    /// `SecAuditLogParts`
    AuditLogParts(AuditLogParts),
    /// `SecAuditLogRelevantStatus`
    AuditLogRelevantStatus(Regex),
    /// `SecAuditLogFormat`
    AuditLogFormat(AuditLogFormat),
    /// `SecDebugLog`
    DebugLog(PathBuf),
    /// `SecDebugLogLevel`
    DebugLogLevel(u8),
    /// `SecTmpDir`
    TmpDir(PathBuf),
    /// `SecUploadDir`
    UploadDir(PathBuf),
    /// `SecDataDir`
    DataDir(PathBuf),
    /// `SecGeoLookupDb`
    GeoLookupDb(PathBuf),
    /// `SecSensorId`
    SensorId(String),
    /// `SecComponentSignature`
    ComponentSignature(String),
    /// `SecWebAppId`
    WebAppId(String),
    /// `SecArgumentSeparator`
    ArgumentSeparator(char),
    /// `SecPcreMatchLimit`
    PcreMatchLimit(u64),
    /// `SecPcreMatchLimitRecursion`
    PcreMatchLimitRecursion(u64),
    /// `SecCollectionTimeout`
    CollectionTimeout(u64),
}
